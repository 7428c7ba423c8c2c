//! Upstream-phase handling: schema translation, auth injection, response
//! decoding and token/cost accounting. One filter per attempt; a retry
//! replaces the whole filter, which is what keeps attempts independent.

use std::io::Read;

use bytes::BytesMut;

use crate::config::{Backend, RuntimeConfig};
use crate::costs::{self, RequestCost};
use crate::extproc::proto::ProcessingResponse;
use crate::extproc::{self, common_response};
use crate::http::auth::RequestContext;
use crate::llm::{LLMTokenUsage, RouteKind, Translator};
use crate::processor::ProcessorError;
use crate::*;

pub struct UpstreamFilter {
	backend: Arc<Backend>,
	translator: Translator,
	costs: Vec<RequestCost>,
	on_retry: bool,
	/// The model sent upstream (after any override).
	pub(crate) model: Strng,
	response_status: u16,
	response_gzip: bool,
	/// Buffers: the whole body when it is gzipped, or the error body when
	/// the backend failed.
	deferred_body: BytesMut,
	usage_snapshot: LLMTokenUsage,
}

impl UpstreamFilter {
	pub fn new(
		route: RouteKind,
		backend: Arc<Backend>,
		config: &RuntimeConfig,
		on_retry: bool,
	) -> Result<Self, ProcessorError> {
		let translator = Translator::new(
			route,
			&backend.schema,
			backend.model_name_override.clone(),
			backend.vertex.as_ref(),
		)?;
		Ok(Self {
			costs: config.costs_for(&backend),
			backend,
			translator,
			on_retry,
			model: Strng::default(),
			response_status: 0,
			response_gzip: false,
			deferred_body: BytesMut::new(),
			usage_snapshot: LLMTokenUsage::default(),
		})
	}

	/// Translate the stored original body for this backend and assemble the
	/// full request-side mutation: headers, path, auth, replacement body,
	/// and the content length via dynamic metadata.
	pub async fn translate_request(
		&mut self,
		original_body: &Bytes,
		authority: &str,
	) -> Result<ProcessingResponse, ProcessorError> {
		// Translation always starts from the immutable original bytes, so a
		// retry sees exactly what a first attempt would have seen.
		let transform = self.translator.request_body(original_body)?;
		self.model = transform.model.clone();

		let body = transform
			.body
			.unwrap_or_else(|| original_body.to_vec());
		let mut path = transform
			.path
			.unwrap_or_else(|| "/".to_string());

		let (mut set, mut remove) = self.backend.header_mutator.mutations(self.on_retry);
		set.extend(transform.headers);
		if let Some(auth) = &self.backend.auth {
			let ctx = RequestContext {
				method: "POST",
				authority,
				path: &path,
				body: &body,
			};
			let mutation = auth.apply(&ctx).await?;
			set.extend(mutation.headers);
			if let Some(rewritten) = mutation.path {
				path = rewritten;
			}
		}
		set.push((":path".to_string(), path));
		// content-length cannot ride a header mutation in this body mode;
		// the proxy reads it from dynamic metadata instead.
		remove.push("content-length".to_string());

		let metadata = costs::content_length_metadata(body.len());
		let mut response = extproc::headers_response(common_response(set, remove, Some(body), false));
		response.dynamic_metadata = Some(metadata);
		Ok(response)
	}

	pub fn response_headers(&mut self, headers: &HashMap<String, String>) -> ProcessingResponse {
		self.response_status = headers
			.get(":status")
			.and_then(|s| s.parse().ok())
			.unwrap_or(200);
		self.response_gzip = headers
			.get("content-encoding")
			.map(|e| e.eq_ignore_ascii_case("gzip"))
			.unwrap_or(false);
		// The body is re-written below, so its length and encoding no
		// longer hold.
		let mut remove = vec!["content-length".to_string()];
		if self.response_gzip {
			remove.push("content-encoding".to_string());
		}
		extproc::response_headers_response(common_response(vec![], remove, None, false))
	}

	pub fn response_body(
		&mut self,
		chunk: &[u8],
		end_of_stream: bool,
	) -> Result<ProcessingResponse, ProcessorError> {
		let out = if self.is_error() {
			// Backend returned a logical error: buffer it whole and
			// re-shape it into the client's error schema. Never retried
			// here; fallback decisions belong to the proxy.
			self.deferred_body.extend_from_slice(chunk);
			if end_of_stream {
				let body = self.decode_deferred()?;
				self.translator.response_error(self.response_status, &body)?
			} else {
				Vec::new()
			}
		} else if self.response_gzip {
			self.deferred_body.extend_from_slice(chunk);
			if end_of_stream {
				let body = self.decode_deferred()?;
				self.translator.response_body(&body, true)?
			} else {
				Vec::new()
			}
		} else {
			self.translator.response_body(chunk, end_of_stream)?
		};

		let mut response =
			extproc::response_body_response(common_response(vec![], vec![], Some(out), false));
		if end_of_stream && !self.is_error() {
			// Token usage is cumulative within the stream and emitted
			// exactly once, with the cost values derived from it.
			self.usage_snapshot = self.translator.usage();
			response.dynamic_metadata = Some(costs::response_metadata(
				&self.usage_snapshot,
				&self.costs,
				&self.backend.name,
				&self.effective_response_model(),
				self.backend.model_name_override.as_ref(),
			));
		}
		Ok(response)
	}

	fn decode_deferred(&mut self) -> Result<Vec<u8>, ProcessorError> {
		let raw = self.deferred_body.split().freeze();
		if !self.response_gzip {
			return Ok(raw.to_vec());
		}
		let mut decoder = flate2::read::GzDecoder::new(raw.as_ref());
		let mut out = Vec::new();
		decoder
			.read_to_end(&mut out)
			.map_err(|e| ProcessorError::Translation(crate::llm::AIError::Decoding(e)))?;
		Ok(out)
	}

	pub fn usage(&self) -> LLMTokenUsage {
		self.translator.usage()
	}

	pub fn is_error(&self) -> bool {
		self.response_status >= 400
	}

	/// The model reported back to the client: the backend's own report if
	/// present, else the effective request model.
	pub fn effective_response_model(&self) -> Strng {
		self
			.translator
			.response_model()
			.unwrap_or_else(|| self.model.clone())
	}
}
