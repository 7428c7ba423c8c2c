//! Per-request processing pipeline: a state machine driven by the proxy
//! over one ext-proc stream. The router phase classifies and annotates the
//! request; each upstream phase translates it for the backend the proxy
//! selected (fresh state per attempt, so retries are idempotent).

use bytes::BytesMut;

use crate::config::RuntimeConfig;
use crate::extproc::proto::processing_request::Request as RequestVariant;
use crate::extproc::proto::{HttpBody, HttpHeaders, ProcessingRequest, ProcessingResponse};
use crate::extproc::{self, common_response};
use crate::http::auth::AuthError;
use crate::llm::{AIError, RouteKind, universal};
use crate::telemetry::metrics::{Metrics, RequestMetrics};
use crate::*;

mod router;
#[cfg(test)]
mod tests;
mod upstream;

pub use upstream::UpstreamFilter;

#[derive(thiserror::Error, Debug)]
pub enum ProcessorError {
	#[error("invalid request body: {0}")]
	InvalidBody(String),
	#[error("no processor for path {0}")]
	UnknownRoute(String),
	#[error("selected backend {0} is not configured")]
	UnknownBackend(String),
	#[error("translation failed: {0}")]
	Translation(#[from] AIError),
	#[error("backend authentication failed: {0}")]
	Auth(#[from] AuthError),
	#[error("unexpected message for the current phase: {0}")]
	OutOfOrder(&'static str),
	#[error("empty processing message")]
	EmptyMessage,
}

impl ProcessorError {
	/// Errors the client should see become immediate JSON responses; the
	/// rest terminate the stream as internal failures.
	pub fn immediate_response(&self) -> Option<(u16, Vec<u8>)> {
		match self {
			ProcessorError::InvalidBody(msg) => Some((
				400,
				universal::ErrorResponse::invalid_request(msg.clone()).to_bytes(),
			)),
			ProcessorError::UnknownRoute(path) => Some((
				404,
				universal::ErrorResponse::invalid_request(format!("no handler for path {path}"))
					.to_bytes(),
			)),
			ProcessorError::Translation(AIError::RequestParsing(e)) => Some((
				400,
				universal::ErrorResponse::invalid_request(e.to_string()).to_bytes(),
			)),
			ProcessorError::Translation(AIError::GuidedDecodingConflict) => Some((
				400,
				universal::ErrorResponse::invalid_request(self.to_string()).to_bytes(),
			)),
			ProcessorError::Auth(e) => {
				Some((e.status(), universal::ErrorResponse::internal(e.to_string()).to_bytes()))
			},
			ProcessorError::Translation(_) | ProcessorError::UnknownBackend(_) => Some((
				500,
				universal::ErrorResponse::internal(self.to_string()).to_bytes(),
			)),
			ProcessorError::OutOfOrder(_) | ProcessorError::EmptyMessage => None,
		}
	}
}

/// One instance per ext-proc stream.
pub struct RequestProcessor {
	pub(crate) config: Arc<RuntimeConfig>,
	pub(crate) metrics: RequestMetrics,
	pub(crate) route: Option<RouteKind>,
	/// Request headers seen in the router phase, lowercase keys.
	pub(crate) request_headers: HashMap<String, String>,
	pub(crate) original_path: String,
	/// The original request body, owned by the router phase and shared
	/// read-only with every upstream attempt.
	pub(crate) original_body: Option<Bytes>,
	pub(crate) body_buffer: BytesMut,
	pub(crate) upstream: Option<UpstreamFilter>,
	pub(crate) upstream_filter_count: u32,
}

impl RequestProcessor {
	pub fn new(config: Arc<RuntimeConfig>, metrics: Arc<Metrics>) -> Self {
		Self {
			config,
			metrics: RequestMetrics::start_request(metrics),
			route: None,
			request_headers: HashMap::new(),
			original_path: String::new(),
			original_body: None,
			body_buffer: BytesMut::new(),
			upstream: None,
			upstream_filter_count: 0,
		}
	}

	pub async fn handle(
		&mut self,
		msg: ProcessingRequest,
	) -> Result<ProcessingResponse, ProcessorError> {
		let result = self.dispatch(msg).await;
		if result.is_err() {
			self.metrics.record_request_completion(false);
		}
		result
	}

	async fn dispatch(
		&mut self,
		msg: ProcessingRequest,
	) -> Result<ProcessingResponse, ProcessorError> {
		match msg.request {
			Some(RequestVariant::RequestHeaders(h)) => self.handle_request_headers(h).await,
			Some(RequestVariant::RequestBody(b)) => self.handle_request_body(b),
			Some(RequestVariant::ResponseHeaders(h)) => self.handle_response_headers(h),
			Some(RequestVariant::ResponseBody(b)) => self.handle_response_body(b),
			Some(RequestVariant::RequestTrailers(_)) => Ok(trailers_response(true)),
			Some(RequestVariant::ResponseTrailers(_)) => Ok(trailers_response(false)),
			None => Err(ProcessorError::EmptyMessage),
		}
	}

	async fn handle_request_headers(
		&mut self,
		headers: HttpHeaders,
	) -> Result<ProcessingResponse, ProcessorError> {
		let map = extproc::to_header_map(headers.headers.as_ref());
		// The first RequestHeaders enters the router phase. Any later one
		// is the proxy re-invoking us with a resolved backend, once per
		// attempt.
		if self.route.is_none() {
			return self.router_headers(map, headers.end_of_stream);
		}
		let backend = map
			.get(SELECTED_BACKEND_HEADER)
			.cloned()
			.ok_or(ProcessorError::OutOfOrder(
				"second RequestHeaders without a selected backend",
			))?;
		self.set_backend(&backend, &map).await
	}

	/// Create a fresh upstream filter for the selected backend and emit the
	/// translated request. `on_retry` is derived from the attempt count.
	async fn set_backend(
		&mut self,
		backend_name: &str,
		upstream_headers: &HashMap<String, String>,
	) -> Result<ProcessingResponse, ProcessorError> {
		let backend = self
			.config
			.backend(backend_name)
			.ok_or_else(|| ProcessorError::UnknownBackend(backend_name.to_string()))?;
		let route = self
			.route
			.ok_or(ProcessorError::OutOfOrder("backend selected before routing"))?;
		let body = self
			.original_body
			.clone()
			.ok_or(ProcessorError::OutOfOrder("backend selected before body"))?;

		self.upstream_filter_count += 1;
		let on_retry = self.upstream_filter_count > 1;
		if on_retry {
			debug!(backend = %backend.name, attempt = self.upstream_filter_count, "retrying with fallback backend");
		}

		let authority = upstream_headers
			.get(":authority")
			.or_else(|| upstream_headers.get("host"))
			.or_else(|| self.request_headers.get(":authority"))
			.cloned()
			.unwrap_or_else(|| backend_name.to_string());

		let mut filter = UpstreamFilter::new(route, backend.clone(), &self.config, on_retry)?;
		let response = filter.translate_request(&body, &authority).await?;
		self.metrics.set_backend(backend.name.clone());
		self.metrics.set_request_model(filter.model.clone());
		self.upstream = Some(filter);
		Ok(response)
	}

	fn handle_request_body(&mut self, body: HttpBody) -> Result<ProcessingResponse, ProcessorError> {
		if self.route.is_none() {
			return Err(ProcessorError::OutOfOrder("body before headers"));
		}
		self.body_buffer.extend_from_slice(&body.body);
		if !body.end_of_stream {
			return Ok(extproc::request_body_response(common_response(
				vec![],
				vec![],
				None,
				false,
			)));
		}
		let raw = self.body_buffer.split().freeze();
		self.router_body(raw)
	}

	fn handle_response_headers(
		&mut self,
		headers: HttpHeaders,
	) -> Result<ProcessingResponse, ProcessorError> {
		let map = extproc::to_header_map(headers.headers.as_ref());
		let upstream = self
			.upstream
			.as_mut()
			.ok_or(ProcessorError::OutOfOrder("response before backend selection"))?;
		Ok(upstream.response_headers(&map))
	}

	fn handle_response_body(&mut self, body: HttpBody) -> Result<ProcessingResponse, ProcessorError> {
		let upstream = self
			.upstream
			.as_mut()
			.ok_or(ProcessorError::OutOfOrder("response before backend selection"))?;
		let resp = upstream.response_body(&body.body, body.end_of_stream)?;
		if body.end_of_stream {
			let usage = upstream.usage();
			let model = upstream.effective_response_model();
			self.metrics.set_response_model(model);
			self.metrics.record_token_usage(&usage);
			self.metrics.record_request_completion(!upstream.is_error());
		}
		Ok(resp)
	}
}

fn trailers_response(request: bool) -> ProcessingResponse {
	use crate::extproc::proto::processing_response::Response as ResponseVariant;
	let tr = crate::extproc::proto::TrailersResponse {
		header_mutation: None,
	};
	ProcessingResponse {
		response: Some(if request {
			ResponseVariant::RequestTrailers(tr)
		} else {
			ResponseVariant::ResponseTrailers(tr)
		}),
		dynamic_metadata: None,
	}
}
