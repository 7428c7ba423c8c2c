use serde::{Deserialize, Serialize};

use crate::*;

pub mod anthropic;
pub mod bedrock;
pub mod gemini;
pub mod openai;
#[cfg(test)]
mod tests;
pub mod universal;

/// The API families a backend can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiSchemaName {
	OpenAI,
	AzureOpenAI,
	AWSBedrock,
	GCPGemini,
	GCPVertexAI,
	Anthropic,
	AWSSageMaker,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedApiSchema {
	pub name: ApiSchemaName,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub version: Option<String>,
}

/// The client-facing endpoint the request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
	ChatCompletions,
	Embeddings,
	ImageGeneration,
	AudioTranscription,
	AudioSpeech,
	AnthropicMessages,
	Models,
}

impl RouteKind {
	pub fn from_path(path: &str) -> Option<RouteKind> {
		// Match on the path without any query string.
		let path = path.split('?').next().unwrap_or(path);
		Some(match path {
			"/v1/chat/completions" => RouteKind::ChatCompletions,
			"/v1/embeddings" => RouteKind::Embeddings,
			"/v1/images/generations" => RouteKind::ImageGeneration,
			"/v1/audio/transcriptions" => RouteKind::AudioTranscription,
			"/v1/audio/speech" => RouteKind::AudioSpeech,
			"/v1/messages" => RouteKind::AnthropicMessages,
			"/v1/models" => RouteKind::Models,
			_ => return None,
		})
	}

	pub fn canonical_path(&self) -> &'static str {
		match self {
			RouteKind::ChatCompletions => "/v1/chat/completions",
			RouteKind::Embeddings => "/v1/embeddings",
			RouteKind::ImageGeneration => "/v1/images/generations",
			RouteKind::AudioTranscription => "/v1/audio/transcriptions",
			RouteKind::AudioSpeech => "/v1/audio/speech",
			RouteKind::AnthropicMessages => "/v1/messages",
			RouteKind::Models => "/v1/models",
		}
	}
}

/// Token accounting for one request, cumulative across stream chunks.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct LLMTokenUsage {
	pub input_tokens: u32,
	pub output_tokens: u32,
	pub total_tokens: u32,
	pub cached_tokens: Option<u32>,
}

impl LLMTokenUsage {
	pub fn merge_response(&mut self, usage: &universal::Usage) {
		self.input_tokens = usage.prompt_tokens;
		self.output_tokens = usage.completion_tokens;
		self.total_tokens = usage.total_tokens;
		if let Some(cached) = usage.cached_tokens() {
			self.cached_tokens = Some(cached);
		}
	}
}

#[derive(thiserror::Error, Debug)]
pub enum AIError {
	#[error("model not found")]
	ModelNotFound,
	#[error("unsupported schema {0:?} for this endpoint")]
	UnsupportedSchema(ApiSchemaName),
	#[error("response was missing fields")]
	IncompleteResponse,
	#[error("mutually exclusive guided decoding options set")]
	GuidedDecodingConflict,
	#[error("failed to parse request: {0}")]
	RequestParsing(serde_json::Error),
	#[error("failed to marshal request: {0}")]
	RequestMarshal(serde_json::Error),
	#[error("failed to parse response: {0}")]
	ResponseParsing(serde_json::Error),
	#[error("failed to marshal response: {0}")]
	ResponseMarshal(serde_json::Error),
	#[error("failed to parse stream: {0}")]
	StreamParsing(anyhow::Error),
	#[error("failed to decode response body: {0}")]
	Decoding(std::io::Error),
}

/// The output of translating a request body for a backend.
#[derive(Debug, Default, Clone)]
pub struct RequestTransform {
	/// `:path` rewrite, when the backend dialect needs one.
	pub path: Option<String>,
	/// Additional request headers the dialect requires.
	pub headers: Vec<(String, String)>,
	/// Replacement body; `None` forwards the original bytes untouched.
	pub body: Option<Vec<u8>>,
	/// The model sent upstream, after any override.
	pub model: Strng,
	pub streaming: bool,
}

/// A translator holds per-attempt state (streaming decoders, accumulated
/// usage). It is created fresh for every upstream attempt; request
/// translation always starts from the immutable original body, which is
/// what makes retries byte-identical.
pub enum Translator {
	OpenAI(openai::Translator),
	Bedrock(bedrock::Translator),
	Gemini(gemini::Translator),
	Anthropic(anthropic::ChatToMessages),
	MessagesToChat(anthropic::MessagesToChat),
	MessagesPassthrough(anthropic::MessagesPassthrough),
}

impl Translator {
	pub fn new(
		route: RouteKind,
		schema: &VersionedApiSchema,
		model_override: Option<Strng>,
		vertex: Option<&VertexParams>,
	) -> Result<Translator, AIError> {
		match route {
			RouteKind::ChatCompletions => Ok(match schema.name {
				ApiSchemaName::OpenAI | ApiSchemaName::AzureOpenAI | ApiSchemaName::AWSSageMaker => {
					Translator::OpenAI(openai::Translator::new(route, schema.clone(), model_override))
				},
				ApiSchemaName::AWSBedrock => Translator::Bedrock(bedrock::Translator::new(model_override)),
				ApiSchemaName::GCPGemini | ApiSchemaName::GCPVertexAI => Translator::Gemini(
					gemini::Translator::new(model_override, vertex.cloned()),
				),
				ApiSchemaName::Anthropic => {
					Translator::Anthropic(anthropic::ChatToMessages::new(model_override))
				},
			}),
			RouteKind::AnthropicMessages => Ok(match schema.name {
				ApiSchemaName::Anthropic => {
					Translator::MessagesPassthrough(anthropic::MessagesPassthrough::new(model_override))
				},
				ApiSchemaName::OpenAI | ApiSchemaName::AzureOpenAI | ApiSchemaName::AWSSageMaker => {
					Translator::MessagesToChat(anthropic::MessagesToChat::new(model_override))
				},
				other => return Err(AIError::UnsupportedSchema(other)),
			}),
			RouteKind::Embeddings
			| RouteKind::ImageGeneration
			| RouteKind::AudioTranscription
			| RouteKind::AudioSpeech => match schema.name {
				ApiSchemaName::OpenAI | ApiSchemaName::AzureOpenAI | ApiSchemaName::AWSSageMaker => Ok(
					Translator::OpenAI(openai::Translator::new(route, schema.clone(), model_override)),
				),
				other => Err(AIError::UnsupportedSchema(other)),
			},
			RouteKind::Models => Err(AIError::UnsupportedSchema(schema.name)),
		}
	}

	pub fn request_body(&mut self, raw: &Bytes) -> Result<RequestTransform, AIError> {
		match self {
			Translator::OpenAI(t) => t.request_body(raw),
			Translator::Bedrock(t) => t.request_body(raw),
			Translator::Gemini(t) => t.request_body(raw),
			Translator::Anthropic(t) => t.request_body(raw),
			Translator::MessagesToChat(t) => t.request_body(raw),
			Translator::MessagesPassthrough(t) => t.request_body(raw),
		}
	}

	/// Feed one chunk of the (decoded) response body; returns the bytes to
	/// forward to the client in its place.
	pub fn response_body(&mut self, chunk: &[u8], end_of_stream: bool) -> Result<Vec<u8>, AIError> {
		match self {
			Translator::OpenAI(t) => t.response_body(chunk, end_of_stream),
			Translator::Bedrock(t) => t.response_body(chunk, end_of_stream),
			Translator::Gemini(t) => t.response_body(chunk, end_of_stream),
			Translator::Anthropic(t) => t.response_body(chunk, end_of_stream),
			Translator::MessagesToChat(t) => t.response_body(chunk, end_of_stream),
			Translator::MessagesPassthrough(t) => t.response_body(chunk, end_of_stream),
		}
	}

	/// Translate a non-2xx backend body into the client's error schema.
	pub fn response_error(&mut self, status: u16, body: &[u8]) -> Result<Vec<u8>, AIError> {
		match self {
			Translator::OpenAI(t) => t.response_error(status, body),
			Translator::Bedrock(t) => t.response_error(status, body),
			Translator::Gemini(t) => t.response_error(status, body),
			Translator::Anthropic(t) => t.response_error(status, body),
			Translator::MessagesToChat(t) => t.response_error(status, body),
			Translator::MessagesPassthrough(t) => t.response_error(status, body),
		}
	}

	pub fn usage(&self) -> LLMTokenUsage {
		match self {
			Translator::OpenAI(t) => t.usage,
			Translator::Bedrock(t) => t.usage,
			Translator::Gemini(t) => t.usage,
			Translator::Anthropic(t) => t.usage,
			Translator::MessagesToChat(t) => t.usage,
			Translator::MessagesPassthrough(t) => t.usage,
		}
	}

	/// Model reported by the backend, when it reported one.
	pub fn response_model(&self) -> Option<Strng> {
		match self {
			Translator::OpenAI(t) => t.response_model.clone(),
			Translator::Bedrock(t) => t.response_model.clone(),
			Translator::Gemini(t) => t.response_model.clone(),
			Translator::Anthropic(t) => t.response_model.clone(),
			Translator::MessagesToChat(t) => t.response_model.clone(),
			Translator::MessagesPassthrough(t) => t.response_model.clone(),
		}
	}
}

/// Vertex AI publisher-endpoint coordinates, needed to build the request
/// path when the Gemini dialect is served through Vertex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VertexParams {
	pub project_id: Strng,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub region: Option<Strng>,
}

impl VertexParams {
	pub fn path_for_model(&self, model: &str, streaming: bool) -> String {
		let verb = if streaming {
			"streamGenerateContent?alt=sse"
		} else {
			"generateContent"
		};
		format!(
			"/v1/projects/{}/locations/{}/publishers/google/models/{model}:{verb}",
			self.project_id,
			self.region.as_deref().unwrap_or("global"),
		)
	}
}
