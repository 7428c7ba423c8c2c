//! The ext-proc streaming server. Each stream corresponds to one HTTP
//! request at the proxy; messages are dispatched to the per-stream
//! processor and its answers are written back in order.

use prost::bytes::Bytes as ProstBytes;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

use crate::config::ConfigStore;
use crate::processor::RequestProcessor;
use crate::telemetry::metrics::Metrics;
use crate::*;

#[allow(warnings)]
#[allow(clippy::derive_partial_eq_without_eq)]
pub mod proto {
	tonic::include_proto!("envoy.service.ext_proc.v3");
}

use proto::external_processor_server::{ExternalProcessor, ExternalProcessorServer};
use proto::processing_response::Response as ResponseVariant;
use proto::{
	BodyMutation, CommonResponse, HeaderMutation, HeaderValue, HeaderValueOption, HeadersResponse,
	HttpStatus, ImmediateResponse, ProcessingRequest, ProcessingResponse, body_mutation,
	common_response::ResponseStatus,
};

pub struct ExtProcService {
	config: ConfigStore,
	metrics: Arc<Metrics>,
}

impl ExtProcService {
	pub fn new(config: ConfigStore, metrics: Arc<Metrics>) -> Self {
		Self { config, metrics }
	}

	pub fn into_server(self) -> ExternalProcessorServer<ExtProcService> {
		ExternalProcessorServer::new(self)
	}
}

#[tonic::async_trait]
impl ExternalProcessor for ExtProcService {
	type ProcessStream = ReceiverStream<Result<ProcessingResponse, Status>>;

	async fn process(
		&self,
		request: Request<Streaming<ProcessingRequest>>,
	) -> Result<Response<Self::ProcessStream>, Status> {
		let mut stream = request.into_inner();
		let (tx, rx) = tokio::sync::mpsc::channel(16);
		// In-flight streams keep the snapshot they started on.
		let config = self.config.load();
		let mut processor = RequestProcessor::new(config, self.metrics.clone());

		tokio::spawn(async move {
			while let Some(msg) = stream.next().await {
				let msg = match msg {
					Ok(msg) => msg,
					Err(e) => {
						trace!("stream closed by proxy: {e}");
						return;
					},
				};
				let response = match processor.handle(msg).await {
					Ok(resp) => Ok(resp),
					Err(e) => match e.immediate_response() {
						Some((status, body)) => Ok(immediate_response(status, body)),
						None => {
							warn!("processor failure: {e}");
							Err(Status::internal(e.to_string()))
						},
					},
				};
				let failed = response.is_err();
				if tx.send(response).await.is_err() || failed {
					return;
				}
			}
		});

		Ok(Response::new(ReceiverStream::new(rx)))
	}
}

/// Instruct the proxy to answer the client directly with a JSON body.
pub fn immediate_response(status: u16, body: Vec<u8>) -> ProcessingResponse {
	ProcessingResponse {
		response: Some(ResponseVariant::ImmediateResponse(ImmediateResponse {
			status: Some(HttpStatus {
				code: status as u32,
			}),
			headers: Some(header_mutation(
				vec![("content-type".to_string(), "application/json".to_string())],
				vec![],
			)),
			body: ProstBytes::from(body),
			grpc_status: None,
			details: String::new(),
		})),
		dynamic_metadata: None,
	}
}

pub fn header_mutation(set: Vec<(String, String)>, remove: Vec<String>) -> HeaderMutation {
	HeaderMutation {
		set_headers: set
			.into_iter()
			.map(|(key, value)| HeaderValueOption {
				header: Some(HeaderValue {
					key,
					raw_value: ProstBytes::from(value.into_bytes()),
				}),
			})
			.collect(),
		remove_headers: remove,
	}
}

pub fn common_response(
	set: Vec<(String, String)>,
	remove: Vec<String>,
	body: Option<Vec<u8>>,
	clear_route_cache: bool,
) -> CommonResponse {
	let header_mutation = if set.is_empty() && remove.is_empty() {
		None
	} else {
		Some(header_mutation(set, remove))
	};
	let status = if body.is_some() {
		ResponseStatus::ContinueAndReplace
	} else {
		ResponseStatus::Continue
	};
	CommonResponse {
		status: status as i32,
		header_mutation,
		body_mutation: body.map(|b| BodyMutation {
			mutation: Some(body_mutation::Mutation::Body(ProstBytes::from(b))),
		}),
		clear_route_cache,
	}
}

pub fn headers_response(cr: CommonResponse) -> ProcessingResponse {
	ProcessingResponse {
		response: Some(ResponseVariant::RequestHeaders(HeadersResponse {
			response: Some(cr),
		})),
		dynamic_metadata: None,
	}
}

pub fn response_headers_response(cr: CommonResponse) -> ProcessingResponse {
	ProcessingResponse {
		response: Some(ResponseVariant::ResponseHeaders(HeadersResponse {
			response: Some(cr),
		})),
		dynamic_metadata: None,
	}
}

pub fn request_body_response(cr: CommonResponse) -> ProcessingResponse {
	ProcessingResponse {
		response: Some(ResponseVariant::RequestBody(proto::BodyResponse {
			response: Some(cr),
		})),
		dynamic_metadata: None,
	}
}

pub fn response_body_response(cr: CommonResponse) -> ProcessingResponse {
	ProcessingResponse {
		response: Some(ResponseVariant::ResponseBody(proto::BodyResponse {
			response: Some(cr),
		})),
		dynamic_metadata: None,
	}
}

/// Pull the headers out of a proto header map into a lowercase-keyed map.
pub fn to_header_map(headers: Option<&proto::HeaderMap>) -> HashMap<String, String> {
	headers
		.map(|h| {
			h.headers
				.iter()
				.map(|h| {
					(
						h.key.to_ascii_lowercase(),
						String::from_utf8_lossy(&h.raw_value).into_owned(),
					)
				})
				.collect()
		})
		.unwrap_or_default()
}
