//! Rewrites upstream SSE events before they reach the client: event IDs
//! are re-encrypted to self-describing `(backend, event)` pairs, tool
//! names in payloads are re-tagged with the backend prefix, and the
//! encoder normalizes all line endings to LF.

use serde_json::Value;

use crate::mcp::relay::prefixed;
use crate::mcp::session::{EventId, SessionCrypto};
use crate::parse::sse::SseEvent;

pub fn rewrite_event(mut ev: SseEvent, backend: &str, crypto: &SessionCrypto) -> SseEvent {
	if let Some(id) = ev.id.take() {
		let composite = EventId {
			backend: backend.to_string(),
			event_id: id,
		};
		// On encryption failure the event goes out unresumable rather than
		// dropped.
		ev.id = composite.encode(crypto).ok();
	}
	if let Some(data) = &ev.data
		&& let Ok(mut payload) = serde_json::from_str::<Value>(data)
	{
		rewrite_payload(&mut payload, backend);
		if let Ok(rewritten) = serde_json::to_string(&payload) {
			ev.data = Some(rewritten);
		}
	}
	ev
}

/// Re-tag the names a payload may surface: aggregated list results and
/// name-addressed notification params.
fn rewrite_payload(payload: &mut Value, backend: &str) {
	if let Some(result) = payload.get_mut("result") {
		for field in ["tools", "prompts"] {
			if let Some(items) = result.get_mut(field).and_then(Value::as_array_mut) {
				for item in items {
					prefix_name(item, backend);
				}
			}
		}
	}
	if let Some(params) = payload.get_mut("params") {
		prefix_name(params, backend);
	}
}

fn prefix_name(item: &mut Value, backend: &str) {
	if let Some(name) = item.get_mut("name")
		&& let Some(bare) = name.as_str()
	{
		*name = Value::String(prefixed(backend, bare));
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn event_id_is_reencrypted_and_routable() {
		let crypto = SessionCrypto::new("seed").unwrap();
		let ev = SseEvent {
			name: Some("message".to_string()),
			id: Some("17".to_string()),
			data: Some("{}".to_string()),
		};
		let out = rewrite_event(ev, "mathbackend", &crypto);
		let id = EventId::decode(out.id.as_deref().unwrap(), &crypto).unwrap();
		assert_eq!(id.backend, "mathbackend");
		assert_eq!(id.event_id, "17");
	}

	#[test]
	fn tool_names_in_results_are_prefixed() {
		let crypto = SessionCrypto::new("seed").unwrap();
		let ev = SseEvent::data(
			r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[{"name":"add"},{"name":"sub"}]}}"#,
		);
		let out = rewrite_event(ev, "mathbackend", &crypto);
		let v: Value = serde_json::from_str(out.data.as_deref().unwrap()).unwrap();
		assert_eq!(v["result"]["tools"][0]["name"], "mathbackend__add");
		assert_eq!(v["result"]["tools"][1]["name"], "mathbackend__sub");
	}

	#[test]
	fn notification_params_are_prefixed() {
		let crypto = SessionCrypto::new("seed").unwrap();
		let ev = SseEvent::data(
			r#"{"jsonrpc":"2.0","method":"notifications/progress","params":{"name":"query"}}"#,
		);
		let out = rewrite_event(ev, "searchbackend", &crypto);
		let v: Value = serde_json::from_str(out.data.as_deref().unwrap()).unwrap();
		assert_eq!(v["params"]["name"], "searchbackend__query");
	}

	#[test]
	fn non_json_data_is_left_alone() {
		let crypto = SessionCrypto::new("seed").unwrap();
		let ev = SseEvent::data("not json");
		let out = rewrite_event(ev, "b", &crypto);
		assert_eq!(out.data.as_deref(), Some("not json"));
	}
}
