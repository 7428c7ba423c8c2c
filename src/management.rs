//! Admin endpoints: prometheus metrics and health, served off the data
//! path.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use tokio_util::sync::CancellationToken;

use crate::*;

#[derive(Clone)]
struct App {
	registry: Arc<Registry>,
}

impl App {
	fn router(&self) -> Router {
		Router::new()
			.route("/metrics", get(metrics_handler))
			.route("/healthz", get(|| async { "ok" }))
			.with_state(self.clone())
	}
}

async fn metrics_handler(State(app): State<App>) -> Result<String, StatusCode> {
	let mut buffer = String::new();
	match encode(&mut buffer, &app.registry) {
		Ok(_) => Ok(buffer),
		Err(e) => {
			error!("error encoding metrics: {:?}", e);
			Err(StatusCode::INTERNAL_SERVER_ERROR)
		},
	}
}

pub async fn start(
	addr: std::net::SocketAddr,
	registry: Arc<Registry>,
	ct: CancellationToken,
) -> Result<(), std::io::Error> {
	let listener = tokio::net::TcpListener::bind(addr).await?;
	info!("admin server listening on {addr}");
	let app = App { registry };
	axum::serve(listener, app.router())
		.with_graceful_shutdown(async move {
			ct.cancelled().await;
		})
		.await
}
