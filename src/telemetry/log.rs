use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber. `RUST_LOG` controls the
/// filter; the default keeps the data plane quiet at `info`.
pub fn setup_logging() {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(true)
		.init();
}
