//! Router-phase handling: classify the request by path, parse the body to
//! extract the model, annotate headers for the proxy's route match, and
//! answer `/v1/models` locally.

use crate::extproc::proto::ProcessingResponse;
use crate::extproc::{self, common_response};
use crate::llm::{RouteKind, universal};
use crate::processor::{ProcessorError, RequestProcessor};
use crate::*;

impl RequestProcessor {
	pub(super) fn router_headers(
		&mut self,
		headers: HashMap<String, String>,
		end_of_stream: bool,
	) -> Result<ProcessingResponse, ProcessorError> {
		let path = headers.get(":path").cloned().unwrap_or_default();
		let route = RouteKind::from_path(&path)
			.ok_or_else(|| ProcessorError::UnknownRoute(path.clone()))?;
		self.original_path = path;
		self.request_headers = headers;
		self.route = Some(route);
		trace!(route = ?route, "router phase selected processor");

		if route == RouteKind::Models {
			// Answered locally from the declared models; no backend involved.
			return Ok(extproc::immediate_response(200, self.models_response()));
		}
		if end_of_stream {
			// A bodyless request to a body endpoint cannot be routed.
			return Err(ProcessorError::InvalidBody("request body is required".to_string()));
		}
		Ok(extproc::headers_response(common_response(
			vec![],
			vec![],
			None,
			false,
		)))
	}

	/// The complete original body has arrived: extract the model, stash the
	/// bytes for the upstream attempts, and annotate for re-routing.
	pub(super) fn router_body(&mut self, raw: Bytes) -> Result<ProcessingResponse, ProcessorError> {
		if raw.is_empty() {
			return Err(ProcessorError::InvalidBody("empty request body".to_string()));
		}
		let route = self.route.expect("router_body requires routing");
		let model = self.extract_model(route, &raw)?;
		self.metrics.set_original_model(model.clone());
		self.original_body = Some(raw);

		// The proxy re-matches the route against these headers once the
		// route cache is cleared.
		let set = vec![
			(MODEL_NAME_HEADER.to_string(), model.to_string()),
			(ORIGINAL_PATH_HEADER.to_string(), self.original_path.clone()),
		];
		Ok(extproc::request_body_response(common_response(
			set,
			vec![],
			None,
			true,
		)))
	}

	fn extract_model(&self, route: RouteKind, raw: &Bytes) -> Result<Strng, ProcessorError> {
		if route == RouteKind::AudioTranscription {
			let content_type = self
				.request_headers
				.get("content-type")
				.map(String::as_str)
				.unwrap_or_default();
			if let Some(boundary) = multipart_boundary(content_type) {
				return multipart_field(raw, boundary, "model")
					.map(|m| strng::new(&m))
					.ok_or_else(|| {
						ProcessorError::InvalidBody("multipart body is missing the model field".to_string())
					});
			}
		}
		let parsed: universal::ModelOnly = serde_json::from_slice(raw)
			.map_err(|e| ProcessorError::InvalidBody(e.to_string()))?;
		Ok(strng::new(&parsed.model))
	}

	fn models_response(&self) -> Vec<u8> {
		let list = universal::ModelList {
			object: "list".to_string(),
			data: self
				.config
				.declared_models
				.iter()
				.map(|m| universal::Model {
					id: m.name.to_string(),
					object: "model".to_string(),
					created: m.created_at,
					owned_by: m.owned_by.to_string(),
				})
				.collect(),
		};
		serde_json::to_vec(&list).unwrap_or_else(|_| b"{\"object\":\"list\",\"data\":[]}".to_vec())
	}
}

fn multipart_boundary(content_type: &str) -> Option<&str> {
	if !content_type.starts_with("multipart/form-data") {
		return None;
	}
	content_type
		.split(';')
		.map(str::trim)
		.find_map(|p| p.strip_prefix("boundary="))
		.map(|b| b.trim_matches('"'))
}

/// Minimal multipart scan for a single text field; transcription bodies
/// are dominated by the audio part, which is never materialized.
fn multipart_field(raw: &[u8], boundary: &str, field: &str) -> Option<String> {
	let delimiter = format!("--{boundary}");
	let text = String::from_utf8_lossy(raw);
	for part in text.split(delimiter.as_str()) {
		let Some((head, body)) = part.split_once("\r\n\r\n").or_else(|| part.split_once("\n\n"))
		else {
			continue;
		};
		if head.contains(&format!("name=\"{field}\"")) {
			return Some(body.trim_end_matches(['\r', '\n', '-']).trim().to_string());
		}
	}
	None
}
