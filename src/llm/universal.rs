//! OpenAI-shaped wire types. This is the hub schema: every translator maps
//! between these types and its provider dialect.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEVELOPER_ROLE: &str = "developer";
pub const SYSTEM_ROLE: &str = "system";
pub const ASSISTANT_ROLE: &str = "assistant";
pub const TOOL_ROLE: &str = "tool";
pub const USER_ROLE: &str = "user";

#[derive(Copy, Clone, Deserialize, Serialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	Developer,
	System,
	#[default]
	User,
	Assistant,
	Tool,
}

impl Role {
	pub fn as_str(&self) -> &'static str {
		match self {
			Role::Developer => DEVELOPER_ROLE,
			Role::System => SYSTEM_ROLE,
			Role::User => USER_ROLE,
			Role::Assistant => ASSISTANT_ROLE,
			Role::Tool => TOOL_ROLE,
		}
	}
}

/// Message content is either a plain string or an array of typed parts.
#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
#[serde(untagged)]
pub enum Content {
	Text(String),
	Parts(Vec<ContentPart>),
}

impl Content {
	/// Collapse the content into plain text, dropping non-text parts.
	pub fn text(&self) -> String {
		match self {
			Content::Text(t) => t.clone(),
			Content::Parts(parts) => parts
				.iter()
				.filter_map(|p| p.text.as_deref())
				.collect::<Vec<_>>()
				.join("\n"),
		}
	}
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct ContentPart {
	pub r#type: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub text: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub image_url: Option<ImageUrl>,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct ImageUrl {
	pub url: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub detail: Option<String>,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct Message {
	pub role: Role,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub content: Option<Content>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_calls: Option<Vec<ToolCall>>,
	/// Set on `tool` role messages: which call this message answers.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_call_id: Option<String>,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct ToolCall {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	pub r#type: String,
	pub function: FunctionCall,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct FunctionCall {
	pub name: String,
	/// JSON-encoded argument object.
	pub arguments: String,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct Tool {
	pub r#type: String,
	pub function: FunctionDefinition,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct FunctionDefinition {
	pub name: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub parameters: Option<Value>,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
#[serde(untagged)]
pub enum ToolChoice {
	/// "auto" | "none" | "required"
	Mode(String),
	Named(NamedToolChoice),
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct NamedToolChoice {
	pub r#type: String,
	pub function: NamedFunction,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct NamedFunction {
	pub name: String,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
#[serde(untagged)]
pub enum Stop {
	Sequence(String),
	Sequences(Vec<String>),
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct StreamOptions {
	pub include_usage: bool,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct ResponseFormat {
	pub r#type: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub json_schema: Option<JsonSchemaFormat>,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct JsonSchemaFormat {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	pub schema: Value,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub strict: Option<bool>,
}

#[derive(Clone, Deserialize, Serialize, Debug, Default, PartialEq)]
pub struct ChatCompletionRequest {
	pub model: String,
	#[serde(default)]
	pub messages: Vec<Message>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stream: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stream_options: Option<StreamOptions>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub n: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_tokens: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_completion_tokens: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stop: Option<Stop>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub seed: Option<i64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub frequency_penalty: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub presence_penalty: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub user: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tools: Option<Vec<Tool>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_choice: Option<ToolChoice>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub parallel_tool_calls: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub response_format: Option<ResponseFormat>,
	/// Constrained-decoding extensions carried by OpenAI-compatible servers.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub guided_choice: Option<Vec<String>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub guided_regex: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub guided_json: Option<Value>,
}

impl ChatCompletionRequest {
	pub fn streaming(&self) -> bool {
		self.stream.unwrap_or_default()
	}

	pub fn max_tokens(&self) -> Option<u64> {
		self.max_completion_tokens.or(self.max_tokens)
	}

	pub fn stop_sequences(&self) -> Vec<String> {
		match &self.stop {
			Some(Stop::Sequence(s)) => vec![s.clone()],
			Some(Stop::Sequences(s)) => s.clone(),
			None => vec![],
		}
	}

	/// System (and developer) prompts joined into a single block; most
	/// non-OpenAI dialects keep the system prompt out of the message list.
	pub fn system_text(&self) -> String {
		self
			.messages
			.iter()
			.filter(|m| matches!(m.role, Role::System | Role::Developer))
			.filter_map(|m| m.content.as_ref().map(Content::text))
			.collect::<Vec<_>>()
			.join("\n")
	}
}

#[derive(Copy, Clone, Deserialize, Serialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
	Stop,
	Length,
	ToolCalls,
	ContentFilter,
}

#[derive(Clone, Deserialize, Serialize, Debug, Default, PartialEq)]
pub struct PromptTokensDetails {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub cached_tokens: Option<u32>,
}

#[derive(Clone, Deserialize, Serialize, Debug, Default, PartialEq)]
pub struct Usage {
	pub prompt_tokens: u32,
	pub completion_tokens: u32,
	pub total_tokens: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub prompt_tokens_details: Option<PromptTokensDetails>,
}

impl Usage {
	pub fn cached_tokens(&self) -> Option<u32> {
		self.prompt_tokens_details.as_ref().and_then(|d| d.cached_tokens)
	}
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct ResponseMessage {
	pub role: Role,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub content: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct Choice {
	pub index: u32,
	pub message: ResponseMessage,
	pub finish_reason: Option<FinishReason>,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct ChatCompletionResponse {
	pub id: String,
	pub object: String,
	pub created: i64,
	pub model: String,
	pub choices: Vec<Choice>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub usage: Option<Usage>,
}

#[derive(Clone, Deserialize, Serialize, Debug, Default, PartialEq)]
pub struct StreamDelta {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub role: Option<Role>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub content: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct StreamToolCall {
	pub index: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub r#type: Option<String>,
	pub function: FunctionCallDelta,
}

#[derive(Clone, Deserialize, Serialize, Debug, Default, PartialEq)]
pub struct FunctionCallDelta {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub arguments: Option<String>,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct StreamChoice {
	pub index: u32,
	pub delta: StreamDelta,
	pub finish_reason: Option<FinishReason>,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct ChatCompletionStreamResponse {
	pub id: String,
	pub object: String,
	pub created: i64,
	pub model: String,
	pub choices: Vec<StreamChoice>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ErrorResponse {
	pub error: ErrorBody,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ErrorBody {
	pub r#type: String,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub param: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub code: Option<String>,
}

impl ErrorResponse {
	pub fn invalid_request(message: impl Into<String>) -> Self {
		ErrorResponse {
			error: ErrorBody {
				r#type: "invalid_request_error".to_string(),
				message: message.into(),
				param: None,
				code: None,
			},
		}
	}

	pub fn internal(message: impl Into<String>) -> Self {
		ErrorResponse {
			error: ErrorBody {
				r#type: "internal_error".to_string(),
				message: message.into(),
				param: None,
				code: None,
			},
		}
	}

	pub fn to_bytes(&self) -> Vec<u8> {
		serde_json::to_vec(self).unwrap_or_else(|_| br#"{"error":{"type":"internal_error","message":"error encoding error"}}"#.to_vec())
	}
}

/// Embeddings only need the model on the way in and token usage on the way
/// out; everything else passes through untouched.
#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct EmbeddingsUsage {
	pub prompt_tokens: u32,
	pub total_tokens: u32,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct EmbeddingsResponseEnvelope {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub model: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub usage: Option<EmbeddingsUsage>,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct ModelList {
	pub object: String,
	pub data: Vec<Model>,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct Model {
	pub id: String,
	pub object: String,
	pub created: i64,
	pub owned_by: String,
}

/// Minimal view of any request body that carries a `model` field. Used by
/// the router phase, which must not reject fields it does not understand.
#[derive(Clone, Deserialize, Debug)]
pub struct ModelOnly {
	pub model: String,
	#[serde(default)]
	pub stream: bool,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn request_decodes_string_and_part_content() {
		let req: ChatCompletionRequest = serde_json::from_str(
			r#"{"model":"gpt-4.1-nano","messages":[
				{"role":"user","content":"hi"},
				{"role":"user","content":[{"type":"text","text":"a"},{"type":"text","text":"b"}]}
			]}"#,
		)
		.unwrap();
		assert_eq!(req.messages[0].content.as_ref().unwrap().text(), "hi");
		assert_eq!(req.messages[1].content.as_ref().unwrap().text(), "a\nb");
	}

	#[test]
	fn max_tokens_prefers_completion_field() {
		let req: ChatCompletionRequest =
			serde_json::from_str(r#"{"model":"m","max_tokens":10,"max_completion_tokens":20}"#).unwrap();
		assert_eq!(req.max_tokens(), Some(20));
	}

	#[test]
	fn stop_accepts_both_shapes() {
		let one: ChatCompletionRequest =
			serde_json::from_str(r#"{"model":"m","stop":"end"}"#).unwrap();
		let many: ChatCompletionRequest =
			serde_json::from_str(r#"{"model":"m","stop":["a","b"]}"#).unwrap();
		assert_eq!(one.stop_sequences(), vec!["end"]);
		assert_eq!(many.stop_sequences(), vec!["a", "b"]);
	}

	#[test]
	fn error_shape_is_openai() {
		let e = ErrorResponse::invalid_request("bad body");
		let v: serde_json::Value = serde_json::from_slice(&e.to_bytes()).unwrap();
		assert_eq!(v["error"]["type"], "invalid_request_error");
		assert_eq!(v["error"]["message"], "bad body");
	}
}
