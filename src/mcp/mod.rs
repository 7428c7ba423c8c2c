//! The MCP proxy endpoint: one Streamable-HTTP + JSON-RPC surface for
//! clients, multiplexed over every configured MCP backend. Sessions are
//! stateless: the encrypted composite session ID is the only state.

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use bytes::BytesMut;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::codec::Encoder;
use tokio_util::sync::CancellationToken;

use crate::config::ConfigStore;
use crate::mcp::rbac::{McpAuthorizationConfig, RuleSet, scopes_from_bearer};
use crate::mcp::relay::Relay;
use crate::mcp::session::{CompositeSession, EventId, SessionCrypto};
use crate::mcp::upstream::{McpBackendConfig, McpUpstream, SESSION_HEADER};
use crate::parse::sse::SseEncoder;
use crate::*;

pub mod jsonrpc;
pub mod rbac;
pub mod relay;
pub mod session;
pub mod sse;
pub mod upstream;

const DEFAULT_PATH: &str = "/mcp";
const DEFAULT_LIST_CACHE_TTL: Duration = Duration::from_secs(60);
const MAX_BODY: usize = 4_194_304;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpConfigFile {
	#[serde(default = "default_path")]
	pub path: String,
	/// Seed for the session/event ID encryption key. Every replica must
	/// share it for sessions to survive replica changes.
	pub session_seed: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub list_cache_ttl_secs: Option<u64>,
	pub backends: Vec<McpBackendConfig>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub authorization: Option<McpAuthorizationConfig>,
}

fn default_path() -> String {
	DEFAULT_PATH.to_string()
}

/// Compiled MCP configuration: backends, rules and crypto, plus the relay
/// holding the list caches.
#[derive(Debug)]
pub struct McpConfig {
	pub path: String,
	pub crypto: Arc<SessionCrypto>,
	pub relay: Arc<Relay>,
}

impl McpConfig {
	pub fn compile(file: McpConfigFile) -> anyhow::Result<Self> {
		let mut seen = std::collections::HashSet::new();
		let backends = file
			.backends
			.iter()
			.map(|b| {
				if !seen.insert(b.name.clone()) {
					anyhow::bail!("mcp backend {} is declared more than once", b.name);
				}
				Ok(Arc::new(McpUpstream::new(b)?))
			})
			.collect::<anyhow::Result<Vec<_>>>()?;
		if backends.is_empty() {
			anyhow::bail!("mcp requires at least one backend");
		}
		let authz = Arc::new(
			file
				.authorization
				.as_ref()
				.map(RuleSet::compile)
				.transpose()?
				.unwrap_or_default(),
		);
		let ttl = file
			.list_cache_ttl_secs
			.map(Duration::from_secs)
			.unwrap_or(DEFAULT_LIST_CACHE_TTL);
		Ok(McpConfig {
			path: file.path,
			crypto: Arc::new(SessionCrypto::new(&file.session_seed)?),
			relay: Arc::new(Relay::new(backends, authz, ttl)),
		})
	}
}

#[derive(Clone)]
struct App {
	config: ConfigStore,
}

/// Serve the MCP endpoint. The path is config-driven, so a fallback
/// handler re-checks it against the current snapshot on every request.
pub async fn serve(
	addr: std::net::SocketAddr,
	config: ConfigStore,
	ct: CancellationToken,
) -> Result<(), std::io::Error> {
	let app = App { config };
	let router = Router::new()
		.route("/{*path}", any(handle))
		.with_state(app);
	let listener = tokio::net::TcpListener::bind(addr).await?;
	info!("mcp endpoint listening on {addr}");
	axum::serve(listener, router)
		.with_graceful_shutdown(async move {
			ct.cancelled().await;
		})
		.await
}

async fn handle(State(app): State<App>, req: axum::extract::Request) -> Response {
	let snapshot = app.config.load();
	let Some(mcp) = snapshot.mcp.clone() else {
		return StatusCode::NOT_FOUND.into_response();
	};
	if req.uri().path() != mcp.path {
		return StatusCode::NOT_FOUND.into_response();
	}
	let (parts, body) = req.into_parts();
	match parts.method {
		Method::POST => {
			let Ok(bytes) = axum::body::to_bytes(body, MAX_BODY).await else {
				return StatusCode::PAYLOAD_TOO_LARGE.into_response();
			};
			handle_post(&mcp, &parts.headers, bytes).await
		},
		Method::GET => handle_get(&mcp, &parts.headers).await,
		Method::DELETE => handle_delete(&mcp, &parts.headers).await,
		_ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
	}
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
	headers
		.get(name)
		.and_then(|v| v.to_str().ok())
		.map(str::to_string)
}

fn jsonrpc_error_response(status: StatusCode, code: i64, message: &str) -> Response {
	let body = serde_json::to_vec(&jsonrpc::Response::error(None, code, message))
		.unwrap_or_default();
	(
		status,
		[(header::CONTENT_TYPE, "application/json")],
		body,
	)
		.into_response()
}

async fn handle_post(mcp: &Arc<McpConfig>, headers: &HeaderMap, body: Bytes) -> Response {
	let payload: jsonrpc::Payload = match serde_json::from_slice(&body) {
		Ok(p) => p,
		Err(e) => {
			return jsonrpc_error_response(
				StatusCode::BAD_REQUEST,
				jsonrpc::PARSE_ERROR,
				&e.to_string(),
			);
		},
	};
	let (batch, requests) = match payload {
		jsonrpc::Payload::Single(r) => (false, vec![r]),
		jsonrpc::Payload::Batch(rs) => (true, rs),
	};
	let scopes = scopes_from_bearer(header_str(headers, "authorization").as_deref());

	// The initialize request is the only message valid without a session;
	// it mints the composite session ID.
	if let [only] = requests.as_slice()
		&& only.method == "initialize"
		&& !only.is_notification()
	{
		let id = only.id.clone();
		return match mcp.relay.initialize(only.params.clone()).await {
			Ok((session, result)) => {
				let Ok(session_id) = session.encode(&mcp.crypto) else {
					return jsonrpc_error_response(
						StatusCode::INTERNAL_SERVER_ERROR,
						jsonrpc::INTERNAL_ERROR,
						"failed to encode session",
					);
				};
				let response = jsonrpc::Response::success(id, result);
				(
					StatusCode::OK,
					[
						(header::CONTENT_TYPE, "application/json".to_string()),
						(
							header::HeaderName::from_static(SESSION_HEADER),
							session_id,
						),
					],
					serde_json::to_vec(&response).unwrap_or_default(),
				)
					.into_response()
			},
			Err(e) => jsonrpc_error_response(
				StatusCode::BAD_GATEWAY,
				jsonrpc::INTERNAL_ERROR,
				&e.to_string(),
			),
		};
	}

	let Some(session) = decode_session(mcp, headers) else {
		// An unknown or forged session ID reads as an expired session.
		return jsonrpc_error_response(
			StatusCode::NOT_FOUND,
			jsonrpc::INVALID_REQUEST,
			"session not found",
		);
	};

	let mut responses = Vec::new();
	for req in requests {
		if req.is_notification() {
			mcp.relay.handle_notification(&session, req).await;
			continue;
		}
		responses.push(mcp.relay.handle_request(&session, req, &scopes).await);
	}
	if responses.is_empty() {
		return StatusCode::ACCEPTED.into_response();
	}
	let body = if batch {
		serde_json::to_vec(&responses)
	} else {
		serde_json::to_vec(&responses[0])
	};
	(
		StatusCode::OK,
		[(header::CONTENT_TYPE, "application/json")],
		body.unwrap_or_default(),
	)
		.into_response()
}

/// Establish the client's server-push stream: one upstream GET stream per
/// backend in the session, merged, with IDs re-encrypted and names
/// re-tagged. `Last-Event-ID` resumes only the backend that produced it.
async fn handle_get(mcp: &Arc<McpConfig>, headers: &HeaderMap) -> Response {
	let accepts_sse = header_str(headers, "accept")
		.map(|a| a.contains("text/event-stream"))
		.unwrap_or(false);
	if !accepts_sse {
		return StatusCode::NOT_ACCEPTABLE.into_response();
	}
	let Some(session) = decode_session(mcp, headers) else {
		return jsonrpc_error_response(
			StatusCode::NOT_FOUND,
			jsonrpc::INVALID_REQUEST,
			"session not found",
		);
	};
	let resume = header_str(headers, "last-event-id")
		.and_then(|id| EventId::decode(&id, &mcp.crypto).ok());

	let mut streams = Vec::new();
	for backend in mcp.relay.backends() {
		let Some(sess) = session.session_for(backend.name.as_str()) else {
			continue;
		};
		let last = resume
			.as_ref()
			.filter(|r| r.backend == backend.name.as_str())
			.map(|r| r.event_id.clone());
		match backend.open_stream(sess, last).await {
			Ok(stream) => {
				let name = backend.name.clone();
				streams.push(stream.map(move |ev| (name.clone(), ev)).boxed());
			},
			Err(e) => {
				warn!(backend = %backend.name, "failed to open upstream stream: {e}");
			},
		}
	}
	if streams.is_empty() {
		return StatusCode::BAD_GATEWAY.into_response();
	}

	let crypto = mcp.crypto.clone();
	let relay = mcp.relay.clone();
	let session = Arc::new(session);
	let merged = futures::stream::select_all(streams)
		.then(move |(backend_name, ev)| {
			let crypto = crypto.clone();
			let relay = relay.clone();
			let session = session.clone();
			async move {
				let is_list_changed = ev
					.data
					.as_deref()
					.and_then(|d| serde_json::from_str::<serde_json::Value>(d).ok())
					.and_then(|v| v.get("method").and_then(|m| m.as_str().map(str::to_string)))
					.is_some_and(|m| m == "notifications/tools/list_changed");
				if is_list_changed {
					let Some(backend) = relay.backend(backend_name.as_str()) else {
						return None;
					};
					// Only bother clients when the visible surface moved.
					if !relay.tools_surface_changed(&backend, &session).await {
						return None;
					}
				}
				Some(sse::rewrite_event(ev, backend_name.as_str(), &crypto))
			}
		})
		.filter_map(|ev| async move { ev })
		.map(|ev| {
			let mut buf = BytesMut::new();
			let _ = SseEncoder.encode(ev, &mut buf);
			Ok::<_, std::convert::Infallible>(buf.freeze())
		});

	(
		StatusCode::OK,
		[
			(header::CONTENT_TYPE, "text/event-stream"),
			(header::CACHE_CONTROL, "no-cache"),
		],
		Body::from_stream(merged),
	)
		.into_response()
}

async fn handle_delete(mcp: &Arc<McpConfig>, headers: &HeaderMap) -> Response {
	let Some(session) = decode_session(mcp, headers) else {
		return StatusCode::NOT_FOUND.into_response();
	};
	mcp.relay.shutdown(&session).await;
	StatusCode::OK.into_response()
}

fn decode_session(mcp: &Arc<McpConfig>, headers: &HeaderMap) -> Option<CompositeSession> {
	let id = header_str(headers, SESSION_HEADER)?;
	CompositeSession::decode(&id, &mcp.crypto).ok()
}
