use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use aigateway::config::{ConfigStore, bundle};
use aigateway::extproc::ExtProcService;
use aigateway::telemetry::metrics::Metrics;
use aigateway::{management, mcp, telemetry};
use anyhow::Context;
use clap::Parser;
use prometheus_client::registry::Registry;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(about = "AI gateway external processor", long_about = None)]
struct Args {
	/// Directory holding the filter config bundle (index.yaml + parts/).
	#[arg(short, long, value_name = "dir")]
	config_bundle: PathBuf,

	/// Listen address for the ext-proc GRPC endpoint.
	#[arg(long, default_value = "0.0.0.0:1063")]
	extproc_addr: SocketAddr,

	/// Listen address for the MCP endpoint.
	#[arg(long, default_value = "0.0.0.0:1064")]
	mcp_addr: SocketAddr,

	/// Listen address for metrics and health.
	#[arg(long, default_value = "127.0.0.1:9091")]
	admin_addr: SocketAddr,

	/// Validate the bundle and exit.
	#[arg(long)]
	validate_only: bool,
}

fn main() -> anyhow::Result<()> {
	telemetry::log::setup_logging();
	let args = Args::parse();

	tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
		.expect("failed to build runtime")
		.block_on(run(args))
}

async fn run(args: Args) -> anyhow::Result<()> {
	let config = bundle::load(&args.config_bundle).context("loading config bundle")?;
	if args.validate_only {
		println!("configuration {} is valid", config.uuid);
		return Ok(());
	}
	let store = ConfigStore::new(config);

	let mut registry = Registry::default();
	let metrics = Arc::new(Metrics::new(&mut registry));
	let registry = Arc::new(registry);

	let ct = CancellationToken::new();
	let mut tasks = tokio::task::JoinSet::new();

	// Ext-proc GRPC endpoint, one stream per proxied request.
	{
		let service = ExtProcService::new(store.clone(), metrics.clone()).into_server();
		let addr = args.extproc_addr;
		let ct = ct.clone();
		tasks.spawn(async move {
			info!("ext-proc listening on {addr}");
			tonic::transport::Server::builder()
				.add_service(service)
				.serve_with_shutdown(addr, ct.cancelled())
				.await
				.context("ext-proc server")
		});
	}

	// MCP multiplexer endpoint.
	{
		let store = store.clone();
		let addr = args.mcp_addr;
		let ct = ct.clone();
		tasks.spawn(async move {
			mcp::serve(addr, store, ct).await.context("mcp server")
		});
	}

	// Metrics and health.
	{
		let addr = args.admin_addr;
		let ct = ct.clone();
		tasks.spawn(async move {
			management::start(addr, registry, ct)
				.await
				.context("admin server")
		});
	}

	// SIGHUP reloads the bundle; a bad bundle keeps the last good config.
	tokio::spawn(bundle::watch_reload(store.clone(), args.config_bundle.clone()));

	shutdown_signal().await;
	info!("shutting down");
	ct.cancel();
	while let Some(res) = tasks.join_next().await {
		match res {
			Ok(Ok(())) => {},
			Ok(Err(e)) => warn!("server task failed: {e:#}"),
			Err(e) => warn!("failed joining server task: {e}"),
		}
	}
	Ok(())
}

async fn shutdown_signal() {
	let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
		.expect("failed to install SIGTERM handler");
	tokio::select! {
		_ = tokio::signal::ctrl_c() => {},
		_ = term.recv() => {},
	}
}
