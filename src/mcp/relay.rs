//! The JSON-RPC session multiplexer: one client session fanned out over
//! every MCP backend on the route. List results are aggregated with
//! `<backend>__<tool>` names; addressed calls are routed back by prefix.

use serde_json::Value;
use tokio::task::JoinSet;

use crate::mcp::jsonrpc;
use crate::mcp::rbac::RuleSet;
use crate::mcp::session::{BackendSession, CompositeSession, SessionCrypto};
use crate::mcp::upstream::{InitializedBackend, McpUpstream, UpstreamError};
use crate::*;

/// Separator between the backend name and the upstream resource name in
/// aggregated listings.
pub const NAME_SEPARATOR: &str = "__";

#[derive(thiserror::Error, Debug)]
pub enum RelayError {
	#[error("all backends failed to initialize")]
	AllBackendsFailed,
	#[error(transparent)]
	Upstream(#[from] UpstreamError),
}

struct CachedList {
	result: Value,
	at: Instant,
}

pub struct Relay {
	backends: Vec<Arc<McpUpstream>>,
	authz: Arc<RuleSet>,
	list_cache: tokio::sync::Mutex<HashMap<&'static str, CachedList>>,
	/// Last observed (filtered) tool surface per backend, for deciding
	/// whether a `tools/list_changed` is worth propagating.
	tool_surface: tokio::sync::Mutex<HashMap<Strng, std::collections::HashSet<String>>>,
	cache_ttl: Duration,
}

impl Debug for Relay {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Relay")
			.field("backends", &self.backends.len())
			.finish()
	}
}

pub fn prefixed(backend: &str, name: &str) -> String {
	format!("{backend}{NAME_SEPARATOR}{name}")
}

pub fn split_prefixed(name: &str) -> Option<(&str, &str)> {
	name.split_once(NAME_SEPARATOR)
}

impl Relay {
	pub fn new(backends: Vec<Arc<McpUpstream>>, authz: Arc<RuleSet>, cache_ttl: Duration) -> Self {
		Self {
			backends,
			authz,
			list_cache: Default::default(),
			tool_surface: Default::default(),
			cache_ttl,
		}
	}

	pub fn backends(&self) -> &[Arc<McpUpstream>] {
		&self.backends
	}

	pub fn backend(&self, name: &str) -> Option<Arc<McpUpstream>> {
		self
			.backends
			.iter()
			.find(|b| b.name.as_str() == name)
			.cloned()
	}

	/// Open a session to every backend in parallel. Initialization
	/// succeeds as long as at least one backend succeeds; the composite
	/// session carries exactly the backends that answered.
	pub async fn initialize(
		&self,
		params: Option<Value>,
	) -> Result<(CompositeSession, Value), RelayError> {
		let mut tasks = JoinSet::new();
		for backend in &self.backends {
			let backend = backend.clone();
			let params = params.clone();
			tasks.spawn(async move {
				let res = backend.initialize(params).await;
				(backend.name.clone(), res)
			});
		}
		let mut sessions = Vec::new();
		let mut first_result: Option<Value> = None;
		while let Some(joined) = tasks.join_next().await {
			let Ok((name, result)) = joined else { continue };
			match result {
				Ok(InitializedBackend { session, result }) => {
					if first_result.is_none() {
						first_result = Some(result);
					}
					sessions.push(BackendSession {
						backend: name.to_string(),
						session,
					});
				},
				Err(e) => {
					warn!(backend = %name, "backend failed to initialize: {e}");
				},
			}
		}
		if sessions.is_empty() {
			return Err(RelayError::AllBackendsFailed);
		}
		// Keep a deterministic order regardless of join order.
		sessions.sort_by(|a, b| a.backend.cmp(&b.backend));

		let protocol_version = first_result
			.as_ref()
			.and_then(|r| r.get("protocolVersion").cloned())
			.unwrap_or_else(|| Value::String("2025-03-26".to_string()));
		let merged = serde_json::json!({
			"protocolVersion": protocol_version,
			"capabilities": {
				"tools": {"listChanged": true},
				"prompts": {"listChanged": true},
				"resources": {},
			},
			"serverInfo": {
				"name": "aigateway",
				"version": env!("CARGO_PKG_VERSION"),
			},
		});
		Ok((CompositeSession { sessions }, merged))
	}

	pub async fn shutdown(&self, session: &CompositeSession) {
		let mut tasks = JoinSet::new();
		for backend in &self.backends {
			let Some(sess) = session.session_for(backend.name.as_str()) else {
				continue;
			};
			let backend = backend.clone();
			let sess = sess.to_string();
			tasks.spawn(async move {
				let _ = backend.delete_session(&sess).await;
			});
		}
		while tasks.join_next().await.is_some() {}
	}

	pub async fn handle_request(
		&self,
		session: &CompositeSession,
		req: jsonrpc::Request,
		scopes: &[String],
	) -> jsonrpc::Response {
		let id = req.id.clone();
		match req.method.as_str() {
			"tools/list" => self.aggregate_list(session, id, "tools/list", "tools").await,
			"prompts/list" => {
				self
					.aggregate_list(session, id, "prompts/list", "prompts")
					.await
			},
			"resources/list" => {
				self
					.aggregate_list(session, id, "resources/list", "resources")
					.await
			},
			"tools/call" => self.call_named(session, req, scopes, true).await,
			"prompts/get" => self.call_named(session, req, scopes, false).await,
			"ping" => jsonrpc::Response::success(id, serde_json::json!({})),
			// Methods without a name to route on can only be forwarded when
			// the route has exactly one backend.
			_ => self.forward_single(session, req).await,
		}
	}

	/// Forward a client notification: to the addressed backend when the
	/// params name a `<backend>__` target, otherwise to every backend.
	pub async fn handle_notification(&self, session: &CompositeSession, req: jsonrpc::Request) {
		let addressed = req
			.params
			.as_ref()
			.and_then(|p| p.get("name"))
			.and_then(Value::as_str)
			.and_then(split_prefixed)
			.map(|(backend, _)| backend.to_string());
		match addressed {
			Some(backend_name) => {
				let Some(backend) = self.backend(&backend_name) else {
					return;
				};
				let mut req = req;
				if let Some(name) = req
					.params
					.as_mut()
					.and_then(|p| p.get_mut("name"))
				{
					let stripped = name
						.as_str()
						.and_then(split_prefixed)
						.map(|(_, n)| n.to_string());
					if let Some(stripped) = stripped {
						*name = Value::String(stripped);
					}
				}
				let sess = session.session_for(backend.name.as_str()).unwrap_or_default();
				if let Err(e) = backend.notify(sess, req).await {
					debug!("notification forward failed: {e}");
				}
			},
			None => {
				let mut tasks = JoinSet::new();
				for backend in &self.backends {
					let Some(sess) = session.session_for(backend.name.as_str()) else {
						continue;
					};
					let backend = backend.clone();
					let sess = sess.to_string();
					let req = req.clone();
					tasks.spawn(async move {
						if let Err(e) = backend.notify(&sess, req).await {
							debug!(backend = %backend.name, "notification broadcast failed: {e}");
						}
					});
				}
				while tasks.join_next().await.is_some() {}
			},
		}
	}

	/// Fan a list call out to every backend and merge the results, renaming
	/// entries `<backend>__<name>` to keep them addressable. Results are
	/// cached until the TTL passes or a backend reports a change.
	async fn aggregate_list(
		&self,
		session: &CompositeSession,
		id: Option<jsonrpc::Id>,
		method: &'static str,
		field: &'static str,
	) -> jsonrpc::Response {
		{
			let cache = self.list_cache.lock().await;
			if let Some(cached) = cache.get(method)
				&& cached.at.elapsed() < self.cache_ttl
			{
				return jsonrpc::Response::success(id, cached.result.clone());
			}
		}

		let mut tasks = JoinSet::new();
		for backend in &self.backends {
			let Some(sess) = session.session_for(backend.name.as_str()) else {
				continue;
			};
			let backend = backend.clone();
			let sess = sess.to_string();
			tasks.spawn(async move {
				let req = jsonrpc::Request::new(0, method, None);
				let res = backend.request(&sess, &req).await;
				(backend, res)
			});
		}
		let mut merged = Vec::new();
		while let Some(joined) = tasks.join_next().await {
			let Ok((backend, result)) = joined else {
				continue;
			};
			let result = match result {
				Ok(r) => r,
				Err(e) => {
					warn!(backend = %backend.name, "list call failed: {e}");
					continue;
				},
			};
			let Some(items) = result
				.result
				.as_ref()
				.and_then(|r| r.get(field))
				.and_then(Value::as_array)
			else {
				continue;
			};
			for item in items {
				let mut item = item.clone();
				if let Some(name) = item.get("name").and_then(Value::as_str) {
					// Tool filtering applies to the tool surface only.
					if field == "tools" && !backend.filter.allows(name) {
						continue;
					}
					let renamed = prefixed(backend.name.as_str(), name);
					item["name"] = Value::String(renamed);
				}
				merged.push(item);
			}
		}
		merged.sort_by(|a, b| {
			let an = a.get("name").and_then(Value::as_str).unwrap_or_default();
			let bn = b.get("name").and_then(Value::as_str).unwrap_or_default();
			an.cmp(bn)
		});
		let result = serde_json::json!({ field: merged });
		let mut cache = self.list_cache.lock().await;
		cache.insert(
			method,
			CachedList {
				result: result.clone(),
				at: Instant::now(),
			},
		);
		jsonrpc::Response::success(id, result)
	}

	/// Route a name-addressed call (`tools/call`, `prompts/get`) to its
	/// backend, enforcing authorization for tool calls.
	async fn call_named(
		&self,
		session: &CompositeSession,
		mut req: jsonrpc::Request,
		scopes: &[String],
		is_tool: bool,
	) -> jsonrpc::Response {
		let id = req.id.clone();
		let name = req
			.params
			.as_ref()
			.and_then(|p| p.get("name"))
			.and_then(Value::as_str)
			.unwrap_or_default()
			.to_string();
		let Some((backend_name, bare_name)) = split_prefixed(&name) else {
			return jsonrpc::Response::error(
				id,
				jsonrpc::INVALID_PARAMS,
				format!("unknown resource {name}"),
			);
		};
		let Some(backend) = self.backend(backend_name) else {
			return jsonrpc::Response::error(
				id,
				jsonrpc::INVALID_PARAMS,
				format!("unknown backend {backend_name}"),
			);
		};
		if is_tool {
			let arguments = req.params.as_ref().and_then(|p| p.get("arguments")).cloned();
			if !self
				.authz
				.authorize(scopes, backend_name, bare_name, arguments.as_ref())
			{
				return jsonrpc::Response::error(
					id,
					jsonrpc::INVALID_PARAMS,
					format!("access to tool {name} denied"),
				);
			}
			if !backend.filter.allows(bare_name) {
				return jsonrpc::Response::error(
					id,
					jsonrpc::INVALID_PARAMS,
					format!("unknown resource {name}"),
				);
			}
		}
		if let Some(params) = req.params.as_mut()
			&& let Some(n) = params.get_mut("name")
		{
			*n = Value::String(bare_name.to_string());
		}
		let sess = session
			.session_for(backend.name.as_str())
			.unwrap_or_default();
		match backend.request(sess, &req).await {
			Ok(resp) => resp,
			Err(e) => jsonrpc::Response::error(id, jsonrpc::INTERNAL_ERROR, e.to_string()),
		}
	}

	async fn forward_single(
		&self,
		session: &CompositeSession,
		req: jsonrpc::Request,
	) -> jsonrpc::Response {
		let id = req.id.clone();
		if self.backends.len() != 1 {
			return jsonrpc::Response::error(
				id,
				jsonrpc::INVALID_PARAMS,
				format!("method {} cannot be routed across multiple backends", req.method),
			);
		}
		let backend = &self.backends[0];
		let sess = session
			.session_for(backend.name.as_str())
			.unwrap_or_default();
		match backend.request(sess, &req).await {
			Ok(resp) => resp,
			Err(e) => jsonrpc::Response::error(id, jsonrpc::INTERNAL_ERROR, e.to_string()),
		}
	}

	/// A backend announced `notifications/tools/list_changed`. Re-fetch its
	/// tool list and decide (by unordered set comparison of the filtered
	/// surface) whether downstream clients need to hear about it.
	pub async fn tools_surface_changed(
		&self,
		backend: &Arc<McpUpstream>,
		session: &CompositeSession,
	) -> bool {
		self.list_cache.lock().await.remove("tools/list");
		let sess = session
			.session_for(backend.name.as_str())
			.unwrap_or_default();
		let req = jsonrpc::Request::new(0, "tools/list", None);
		let names: std::collections::HashSet<String> = match backend.request(sess, &req).await {
			Ok(resp) => resp
				.result
				.as_ref()
				.and_then(|r| r.get("tools"))
				.and_then(Value::as_array)
				.map(|tools| {
					tools
						.iter()
						.filter_map(|t| t.get("name").and_then(Value::as_str))
						.filter(|n| backend.filter.allows(n))
						.map(str::to_string)
						.collect()
				})
				.unwrap_or_default(),
			Err(e) => {
				debug!(backend = %backend.name, "tools/list after change notification failed: {e}");
				return true;
			},
		};
		let mut surface = self.tool_surface.lock().await;
		let changed = surface.get(&backend.name) != Some(&names);
		surface.insert(backend.name.clone(), names);
		changed
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn prefix_round_trip() {
		let name = prefixed("mathbackend", "add");
		assert_eq!(name, "mathbackend__add");
		assert_eq!(split_prefixed(&name), Some(("mathbackend", "add")));
		assert_eq!(split_prefixed("no-prefix"), None);
	}

	#[test]
	fn prefix_splits_at_first_separator() {
		// Tool names may themselves contain the separator.
		assert_eq!(
			split_prefixed("backend__tool__variant"),
			Some(("backend", "tool__variant"))
		);
	}
}
