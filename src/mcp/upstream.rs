//! One MCP backend as seen from the proxy: a streamable-HTTP JSON-RPC
//! endpoint with per-session `Mcp-Session-Id` headers and SSE streams.

use futures_util::StreamExt;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_stream::wrappers::ReceiverStream;

use crate::mcp::jsonrpc;
use crate::parse::Frames;
use crate::parse::sse::{SseDecoder, SseEvent};
use crate::*;

pub const SESSION_HEADER: &str = "mcp-session-id";
pub const LAST_EVENT_ID_HEADER: &str = "last-event-id";
const ACCEPT_BOTH: &str = "application/json, text/event-stream";

#[derive(thiserror::Error, Debug)]
pub enum UpstreamError {
	#[error("transport to {backend}: {source}")]
	Transport {
		backend: String,
		#[source]
		source: reqwest::Error,
	},
	#[error("backend {backend} returned status {status}")]
	Status { backend: String, status: u16 },
	#[error("backend {backend} protocol error: {reason}")]
	Protocol { backend: String, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpBackendConfig {
	pub name: Strng,
	pub url: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tool_filter: Option<ToolFilterConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolFilterConfig {
	/// Exact tool names to expose.
	#[serde(default)]
	pub names: Vec<String>,
	/// Regexes over tool names to expose.
	#[serde(default)]
	pub regex: Vec<String>,
}

/// Compiled allowlist; an absent filter exposes everything.
#[derive(Debug, Default)]
pub struct ToolFilter {
	names: std::collections::HashSet<String>,
	regex: Vec<Regex>,
	unrestricted: bool,
}

impl ToolFilter {
	pub fn compile(config: Option<&ToolFilterConfig>) -> anyhow::Result<Self> {
		let Some(config) = config else {
			return Ok(ToolFilter {
				unrestricted: true,
				..Default::default()
			});
		};
		Ok(ToolFilter {
			names: config.names.iter().cloned().collect(),
			regex: config
				.regex
				.iter()
				.map(|r| Regex::new(r))
				.collect::<Result<_, _>>()?,
			unrestricted: false,
		})
	}

	pub fn allows(&self, name: &str) -> bool {
		self.unrestricted || self.names.contains(name) || self.regex.iter().any(|r| r.is_match(name))
	}
}

/// The result of a successful backend initialize.
#[derive(Debug)]
pub struct InitializedBackend {
	pub session: String,
	pub result: Value,
}

#[derive(Debug)]
pub struct McpUpstream {
	pub name: Strng,
	url: String,
	client: reqwest::Client,
	pub filter: ToolFilter,
}

impl McpUpstream {
	pub fn new(config: &McpBackendConfig) -> anyhow::Result<Self> {
		Ok(Self {
			name: config.name.clone(),
			url: config.url.clone(),
			client: reqwest::Client::new(),
			filter: ToolFilter::compile(config.tool_filter.as_ref())?,
		})
	}

	fn transport(&self, source: reqwest::Error) -> UpstreamError {
		UpstreamError::Transport {
			backend: self.name.to_string(),
			source,
		}
	}

	fn protocol(&self, reason: impl Into<String>) -> UpstreamError {
		UpstreamError::Protocol {
			backend: self.name.to_string(),
			reason: reason.into(),
		}
	}

	/// Open a session: send `initialize`, record the session ID the backend
	/// hands out, and follow up with `notifications/initialized`.
	pub async fn initialize(&self, params: Option<Value>) -> Result<InitializedBackend, UpstreamError> {
		let req = jsonrpc::Request::new(0, "initialize", params);
		let resp = self
			.client
			.post(&self.url)
			.header("accept", ACCEPT_BOTH)
			.json(&req)
			.send()
			.await
			.map_err(|e| self.transport(e))?;
		if !resp.status().is_success() {
			return Err(UpstreamError::Status {
				backend: self.name.to_string(),
				status: resp.status().as_u16(),
			});
		}
		let session = resp
			.headers()
			.get(SESSION_HEADER)
			.and_then(|v| v.to_str().ok())
			.unwrap_or_default()
			.to_string();
		let response = self.read_response(resp, &jsonrpc::Id::Number(0)).await?;
		let result = response
			.result
			.ok_or_else(|| self.protocol("initialize returned no result"))?;

		self
			.notify(
				&session,
				jsonrpc::Request::notification("notifications/initialized", None),
			)
			.await?;
		Ok(InitializedBackend { session, result })
	}

	pub async fn request(
		&self,
		session: &str,
		req: &jsonrpc::Request,
	) -> Result<jsonrpc::Response, UpstreamError> {
		let id = req
			.id
			.clone()
			.ok_or_else(|| self.protocol("request requires an id"))?;
		let mut builder = self
			.client
			.post(&self.url)
			.header("accept", ACCEPT_BOTH)
			.json(req);
		if !session.is_empty() {
			builder = builder.header(SESSION_HEADER, session);
		}
		let resp = builder.send().await.map_err(|e| self.transport(e))?;
		if !resp.status().is_success() {
			return Err(UpstreamError::Status {
				backend: self.name.to_string(),
				status: resp.status().as_u16(),
			});
		}
		self.read_response(resp, &id).await
	}

	pub async fn notify(
		&self,
		session: &str,
		notification: jsonrpc::Request,
	) -> Result<(), UpstreamError> {
		let mut builder = self
			.client
			.post(&self.url)
			.header("accept", ACCEPT_BOTH)
			.json(&notification);
		if !session.is_empty() {
			builder = builder.header(SESSION_HEADER, session);
		}
		let resp = builder.send().await.map_err(|e| self.transport(e))?;
		if !resp.status().is_success() {
			return Err(UpstreamError::Status {
				backend: self.name.to_string(),
				status: resp.status().as_u16(),
			});
		}
		Ok(())
	}

	pub async fn delete_session(&self, session: &str) -> Result<(), UpstreamError> {
		if session.is_empty() {
			return Ok(());
		}
		self
			.client
			.delete(&self.url)
			.header(SESSION_HEADER, session)
			.send()
			.await
			.map_err(|e| self.transport(e))?;
		Ok(())
	}

	/// Establish the server-push SSE stream (HTTP GET), optionally resuming
	/// from an upstream event ID.
	pub async fn open_stream(
		&self,
		session: &str,
		last_event_id: Option<String>,
	) -> Result<ReceiverStream<SseEvent>, UpstreamError> {
		let mut builder = self
			.client
			.get(&self.url)
			.header("accept", "text/event-stream");
		if !session.is_empty() {
			builder = builder.header(SESSION_HEADER, session);
		}
		if let Some(last) = last_event_id {
			builder = builder.header(LAST_EVENT_ID_HEADER, last);
		}
		let resp = builder.send().await.map_err(|e| self.transport(e))?;
		if !resp.status().is_success() {
			return Err(UpstreamError::Status {
				backend: self.name.to_string(),
				status: resp.status().as_u16(),
			});
		}
		let (tx, rx) = tokio::sync::mpsc::channel(16);
		let backend = self.name.clone();
		tokio::spawn(async move {
			let mut frames = Frames::new(SseDecoder::new());
			let mut body = resp.bytes_stream();
			while let Some(chunk) = body.next().await {
				let chunk = match chunk {
					Ok(c) => c,
					Err(e) => {
						debug!(backend = %backend, "upstream SSE stream ended: {e}");
						return;
					},
				};
				let events = match frames.push(&chunk, false) {
					Ok(events) => events,
					Err(e) => {
						warn!(backend = %backend, "upstream SSE stream corrupt: {e}");
						return;
					},
				};
				for ev in events {
					if tx.send(ev).await.is_err() {
						// Client went away; dropping the response body
						// cancels the upstream request.
						return;
					}
				}
			}
		});
		Ok(ReceiverStream::new(rx))
	}

	/// A POST answer is a plain JSON response or a short SSE stream that
	/// eventually carries the response with our request ID.
	async fn read_response(
		&self,
		resp: reqwest::Response,
		id: &jsonrpc::Id,
	) -> Result<jsonrpc::Response, UpstreamError> {
		let content_type = resp
			.headers()
			.get("content-type")
			.and_then(|v| v.to_str().ok())
			.unwrap_or_default()
			.to_string();
		if content_type.starts_with("text/event-stream") {
			let mut frames = Frames::new(SseDecoder::new());
			let mut body = resp.bytes_stream();
			while let Some(chunk) = body.next().await {
				let chunk = chunk.map_err(|e| self.transport(e))?;
				for ev in frames
					.push(&chunk, false)
					.map_err(|e| self.protocol(e.to_string()))?
				{
					let Some(data) = ev.data else { continue };
					if let Ok(response) = serde_json::from_str::<jsonrpc::Response>(&data)
						&& response.id.as_ref() == Some(id)
					{
						return Ok(response);
					}
				}
			}
			return Err(self.protocol("stream ended before the response"));
		}
		let bytes = resp.bytes().await.map_err(|e| self.transport(e))?;
		serde_json::from_slice(&bytes).map_err(|e| self.protocol(e.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn absent_filter_allows_everything() {
		let f = ToolFilter::compile(None).unwrap();
		assert!(f.allows("anything"));
	}

	#[test]
	fn filter_matches_exact_names_and_regexes() {
		let f = ToolFilter::compile(Some(&ToolFilterConfig {
			names: vec!["add".to_string()],
			regex: vec!["^query_.*$".to_string()],
		}))
		.unwrap();
		assert!(f.allows("add"));
		assert!(f.allows("query_documents"));
		assert!(!f.allows("delete"));
	}

	#[test]
	fn empty_filter_blocks_everything() {
		let f = ToolFilter::compile(Some(&ToolFilterConfig::default())).unwrap();
		assert!(!f.allows("add"));
	}
}
