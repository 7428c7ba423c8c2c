//! Passthrough translation for backends that already speak the OpenAI
//! dialect (OpenAI, Azure OpenAI deployments, SageMaker-hosted
//! OpenAI-compatible servers).

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Encoder;

use super::universal;
use crate::llm::{AIError, ApiSchemaName, LLMTokenUsage, RequestTransform, RouteKind, VersionedApiSchema};
use crate::parse::Frames;
use crate::parse::sse::{SseDecoder, SseEncoder, SseEvent};
use crate::*;

const DEFAULT_AZURE_API_VERSION: &str = "2025-01-01-preview";

pub struct Translator {
	route: RouteKind,
	schema: VersionedApiSchema,
	model_override: Option<Strng>,
	pub usage: LLMTokenUsage,
	pub response_model: Option<Strng>,
	streaming: bool,
	buffered: BytesMut,
	sse: Option<Frames<SseDecoder>>,
	saw_usage: bool,
	saw_done: bool,
	last_chunk_id: Option<(String, i64, String)>,
}

impl Translator {
	pub fn new(route: RouteKind, schema: VersionedApiSchema, model_override: Option<Strng>) -> Self {
		Self {
			route,
			schema,
			model_override,
			usage: Default::default(),
			response_model: None,
			streaming: false,
			buffered: BytesMut::new(),
			sse: None,
			saw_usage: false,
			saw_done: false,
			last_chunk_id: None,
		}
	}

	pub fn request_body(&mut self, raw: &Bytes) -> Result<RequestTransform, AIError> {
		if self.route == RouteKind::AudioTranscription && !raw.starts_with(b"{") {
			// Transcription bodies are multipart; the router already pulled
			// the model out, so this stays a pure passthrough.
			let model = self.model_override.clone().unwrap_or_default();
			return Ok(RequestTransform {
				path: Some(self.path_for(&model)),
				headers: vec![],
				body: None,
				model,
				streaming: false,
			});
		}
		let mut value: serde_json::Value =
			serde_json::from_slice(raw).map_err(AIError::RequestParsing)?;
		let obj = value.as_object_mut().ok_or(AIError::ModelNotFound)?;

		let request_model = obj
			.get("model")
			.and_then(|m| m.as_str())
			.map(strng::new)
			.ok_or(AIError::ModelNotFound)?;
		let model = self.model_override.clone().unwrap_or(request_model);

		let mut mutated = false;
		if self.model_override.is_some() {
			obj.insert("model".to_string(), serde_json::Value::String(model.to_string()));
			mutated = true;
		}
		self.streaming = obj.get("stream").and_then(|s| s.as_bool()).unwrap_or(false);
		// Streaming responses only carry usage when asked for it, and the
		// cost pipeline needs it. Force it on; the synthesized final event
		// is part of the contract either way.
		if self.route == RouteKind::ChatCompletions
			&& self.streaming
			&& obj.get("stream_options").is_none()
		{
			obj.insert(
				"stream_options".to_string(),
				serde_json::json!({"include_usage": true}),
			);
			mutated = true;
		}

		let body = if mutated {
			Some(serde_json::to_vec(&value).map_err(AIError::RequestMarshal)?)
		} else {
			None
		};
		Ok(RequestTransform {
			path: Some(self.path_for(&model)),
			headers: vec![],
			body,
			model,
			streaming: self.streaming,
		})
	}

	fn path_for(&self, model: &str) -> String {
		if self.schema.name == ApiSchemaName::AzureOpenAI {
			let version = self
				.schema
				.version
				.as_deref()
				.unwrap_or(DEFAULT_AZURE_API_VERSION);
			let op = match self.route {
				RouteKind::Embeddings => "embeddings",
				RouteKind::ImageGeneration => "images/generations",
				RouteKind::AudioTranscription => "audio/transcriptions",
				RouteKind::AudioSpeech => "audio/speech",
				_ => "chat/completions",
			};
			return format!("/openai/deployments/{model}/{op}?api-version={version}");
		}
		self.route.canonical_path().to_string()
	}

	pub fn response_body(&mut self, chunk: &[u8], end_of_stream: bool) -> Result<Vec<u8>, AIError> {
		if self.streaming {
			return self.streaming_response_body(chunk, end_of_stream);
		}
		self.buffered.extend_from_slice(chunk);
		if end_of_stream {
			self.extract_buffered_usage();
		}
		// Passthrough: the client sees the backend's bytes verbatim.
		Ok(chunk.to_vec())
	}

	fn extract_buffered_usage(&mut self) {
		match self.route {
			RouteKind::ChatCompletions => {
				if let Ok(resp) =
					serde_json::from_slice::<universal::ChatCompletionResponse>(&self.buffered)
				{
					if let Some(usage) = &resp.usage {
						self.usage.merge_response(usage);
					}
					self.response_model = Some(strng::new(&resp.model));
				}
			},
			RouteKind::Embeddings => {
				if let Ok(resp) =
					serde_json::from_slice::<universal::EmbeddingsResponseEnvelope>(&self.buffered)
				{
					if let Some(usage) = &resp.usage {
						self.usage.input_tokens = usage.prompt_tokens;
						self.usage.total_tokens = usage.total_tokens;
					}
					self.response_model = resp.model.as_deref().map(strng::new);
				}
			},
			// Image and audio responses carry no token usage.
			_ => {},
		}
	}

	fn streaming_response_body(
		&mut self,
		chunk: &[u8],
		end_of_stream: bool,
	) -> Result<Vec<u8>, AIError> {
		let frames = self.sse.get_or_insert_with(|| Frames::new(SseDecoder::new()));
		let events = frames
			.push(chunk, end_of_stream)
			.map_err(|e| AIError::StreamParsing(e.into()))?;
		let mut out = BytesMut::new();
		let mut encoder = SseEncoder;
		for ev in events {
			if ev.is_done() {
				// Hold the terminator so a synthesized usage event can still
				// go out in front of it.
				self.saw_done = true;
				continue;
			}
			if let Some(data) = &ev.data
				&& let Ok(resp) = serde_json::from_str::<universal::ChatCompletionStreamResponse>(data)
			{
				if self.response_model.is_none() && !resp.model.is_empty() {
					self.response_model = Some(strng::new(&resp.model));
				}
				if let Some(usage) = &resp.usage {
					self.usage.merge_response(usage);
					self.saw_usage = true;
				}
				self.last_chunk_id = Some((resp.id.clone(), resp.created, resp.model.clone()));
			}
			encoder
				.encode(ev, &mut out)
				.map_err(|e| AIError::StreamParsing(e.into()))?;
		}
		if end_of_stream {
			if !self.saw_usage {
				let (id, created, model) = self.last_chunk_id.clone().unwrap_or_else(|| {
					(
						String::new(),
						chrono::Utc::now().timestamp(),
						self
							.response_model
							.as_deref()
							.unwrap_or_default()
							.to_string(),
					)
				});
				let synthesized = universal::ChatCompletionStreamResponse {
					id,
					object: "chat.completion.chunk".to_string(),
					created,
					model,
					choices: vec![],
					usage: Some(universal::Usage {
						prompt_tokens: self.usage.input_tokens,
						completion_tokens: self.usage.output_tokens,
						total_tokens: self.usage.total_tokens,
						prompt_tokens_details: None,
					}),
				};
				let data = serde_json::to_string(&synthesized).map_err(AIError::ResponseMarshal)?;
				encoder
					.encode(SseEvent::data(data), &mut out)
					.map_err(|e| AIError::StreamParsing(e.into()))?;
			}
			if self.saw_done {
				encoder
					.encode(SseEvent::data("[DONE]"), &mut out)
					.map_err(|e| AIError::StreamParsing(e.into()))?;
			}
		}
		Ok(out.to_vec())
	}

	pub fn response_error(&mut self, _status: u16, body: &[u8]) -> Result<Vec<u8>, AIError> {
		// Already OpenAI shaped; keep it if it parses, otherwise wrap the
		// raw payload so the client still gets a well-formed error.
		if serde_json::from_slice::<universal::ErrorResponse>(body).is_ok() {
			return Ok(body.to_vec());
		}
		let err = universal::ErrorResponse::invalid_request(String::from_utf8_lossy(body));
		Ok(err.to_bytes())
	}
}

/// Set the `model` field on a raw JSON object body, leaving every other
/// field untouched.
pub(super) fn override_model(raw: &Bytes, model: &str) -> Result<Vec<u8>, AIError> {
	let mut value: serde_json::Value = serde_json::from_slice(raw).map_err(AIError::RequestParsing)?;
	if let Some(obj) = value.as_object_mut() {
		obj.insert("model".to_string(), serde_json::Value::String(model.to_string()));
	}
	serde_json::to_vec(&value).map_err(AIError::RequestMarshal)
}
