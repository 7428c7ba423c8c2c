//! AWS Bedrock translation: OpenAI chat completions in, `Converse` /
//! `ConverseStream` out. Streaming responses arrive as AWS EventStream
//! frames and leave as OpenAI SSE chunks.

use bytes::{Bytes, BytesMut};
use itertools::Itertools;
use rand::Rng;
use tokio_util::codec::Encoder;

use super::universal;
use crate::llm::bedrock::types::{
	ContentBlock, ContentBlockDelta, ConverseErrorResponse, ConverseRequest, ConverseResponse,
	ConverseStreamOutput, StopReason,
};
use crate::llm::{AIError, LLMTokenUsage, RequestTransform};
use crate::parse::Frames;
use crate::parse::aws_sse::EventStreamDecoder;
use crate::parse::sse::{SseEncoder, SseEvent};
use crate::*;

pub struct Translator {
	model_override: Option<Strng>,
	pub usage: LLMTokenUsage,
	pub response_model: Option<Strng>,
	streaming: bool,
	request_model: Strng,
	buffered: BytesMut,
	frames: Option<Frames<EventStreamDecoder>>,
	message_id: String,
	created: i64,
}

impl Translator {
	pub fn new(model_override: Option<Strng>) -> Self {
		Self {
			model_override,
			usage: Default::default(),
			response_model: None,
			streaming: false,
			request_model: Strng::default(),
			buffered: BytesMut::new(),
			frames: None,
			// Bedrock does not return a message ID, so mint one up front.
			message_id: format!("chatcmpl-{:016x}", rand::rng().random::<u64>()),
			created: chrono::Utc::now().timestamp(),
		}
	}

	pub fn request_body(&mut self, raw: &Bytes) -> Result<RequestTransform, AIError> {
		let mut req: universal::ChatCompletionRequest =
			serde_json::from_slice(raw).map_err(AIError::RequestParsing)?;
		if let Some(model) = &self.model_override {
			req.model = model.to_string();
		}
		let model = strng::new(&req.model);
		self.request_model = model.clone();
		self.streaming = req.streaming();
		let translated = translate_request(&req);
		let body = serde_json::to_vec(&translated).map_err(AIError::RequestMarshal)?;
		let verb = if self.streaming {
			"converse-stream"
		} else {
			"converse"
		};
		Ok(RequestTransform {
			path: Some(format!("/model/{model}/{verb}")),
			headers: vec![],
			body: Some(body),
			model,
			streaming: self.streaming,
		})
	}

	pub fn response_body(&mut self, chunk: &[u8], end_of_stream: bool) -> Result<Vec<u8>, AIError> {
		if self.streaming {
			return self.streaming_response_body(chunk, end_of_stream);
		}
		self.buffered.extend_from_slice(chunk);
		if !end_of_stream {
			return Ok(Vec::new());
		}
		let resp = serde_json::from_slice::<ConverseResponse>(&self.buffered)
			.map_err(AIError::ResponseParsing)?;
		if let Some(usage) = &resp.usage {
			self.usage.input_tokens = usage.input_tokens;
			self.usage.output_tokens = usage.output_tokens;
			self.usage.total_tokens = usage.total_tokens;
			self.usage.cached_tokens = usage.cache_read_input_tokens;
		}
		// Bedrock responses don't carry the model; report the request model.
		let openai = translate_response(resp, self.request_model.as_str())?;
		serde_json::to_vec(&openai).map_err(AIError::ResponseMarshal)
	}

	fn streaming_response_body(
		&mut self,
		chunk: &[u8],
		end_of_stream: bool,
	) -> Result<Vec<u8>, AIError> {
		let frames = self
			.frames
			.get_or_insert_with(|| Frames::new(EventStreamDecoder));
		let messages = frames
			.push(chunk, end_of_stream)
			.map_err(|e| AIError::StreamParsing(e.into()))?;
		let mut out = BytesMut::new();
		let mut encoder = SseEncoder;
		for message in messages {
			let Ok(event) = ConverseStreamOutput::deserialize(&message) else {
				debug!("skipping unrecognized event stream frame");
				continue;
			};
			if let Some(chunk) = self.translate_stream_event(event) {
				let data = serde_json::to_string(&chunk).map_err(AIError::ResponseMarshal)?;
				encoder
					.encode(SseEvent::data(data), &mut out)
					.map_err(|e| AIError::StreamParsing(e.into()))?;
			}
		}
		if end_of_stream {
			encoder
				.encode(SseEvent::data("[DONE]"), &mut out)
				.map_err(|e| AIError::StreamParsing(e.into()))?;
		}
		Ok(out.to_vec())
	}

	fn translate_stream_event(
		&mut self,
		event: ConverseStreamOutput,
	) -> Option<universal::ChatCompletionStreamResponse> {
		let mk = |id: &str, created: i64, model: &str, choices, usage| {
			Some(universal::ChatCompletionStreamResponse {
				id: id.to_string(),
				object: "chat.completion.chunk".to_string(),
				created,
				model: model.to_string(),
				choices,
				usage,
			})
		};
		let (id, created, model) = (
			self.message_id.clone(),
			self.created,
			self.request_model.to_string(),
		);
		match event {
			ConverseStreamOutput::MessageStart(start) => {
				let choice = universal::StreamChoice {
					index: 0,
					delta: universal::StreamDelta {
						role: Some(match start.role {
							types::Role::Assistant => universal::Role::Assistant,
							types::Role::User => universal::Role::User,
						}),
						..Default::default()
					},
					finish_reason: None,
				};
				mk(&id, created, &model, vec![choice], None)
			},
			ConverseStreamOutput::ContentBlockStart(start) => {
				// Tool invocations open with the callee's identity.
				let types::ContentBlockStart::ToolUse(tool) = start.start?;
				let choice = universal::StreamChoice {
					index: 0,
					delta: universal::StreamDelta {
						tool_calls: Some(vec![universal::StreamToolCall {
							index: start.content_block_index as u32,
							id: Some(tool.tool_use_id),
							r#type: Some("function".to_string()),
							function: universal::FunctionCallDelta {
								name: Some(tool.name),
								arguments: Some(String::new()),
							},
						}]),
						..Default::default()
					},
					finish_reason: None,
				};
				mk(&id, created, &model, vec![choice], None)
			},
			ConverseStreamOutput::ContentBlockDelta(d) => {
				match d.delta? {
					ContentBlockDelta::Text(s) => {
						let choice = universal::StreamChoice {
							index: 0,
							delta: universal::StreamDelta {
								content: Some(s),
								..Default::default()
							},
							finish_reason: None,
						};
						mk(&id, created, &model, vec![choice], None)
					},
					ContentBlockDelta::ToolUse(tool) => {
						let choice = universal::StreamChoice {
							index: 0,
							delta: universal::StreamDelta {
								tool_calls: Some(vec![universal::StreamToolCall {
									index: d.content_block_index as u32,
									id: None,
									r#type: None,
									function: universal::FunctionCallDelta {
										name: None,
										arguments: Some(tool.input),
									},
								}]),
								..Default::default()
							},
							finish_reason: None,
						};
						mk(&id, created, &model, vec![choice], None)
					},
				}
			},
			ConverseStreamOutput::ContentBlockStop(_) => None,
			ConverseStreamOutput::MessageStop(stop) => {
				let choice = universal::StreamChoice {
					index: 0,
					delta: Default::default(),
					finish_reason: Some(translate_stop_reason(&stop.stop_reason)),
				};
				mk(&id, created, &model, vec![choice], None)
			},
			ConverseStreamOutput::Metadata(metadata) => {
				let usage = metadata.usage?;
				self.usage.input_tokens = usage.input_tokens;
				self.usage.output_tokens = usage.output_tokens;
				self.usage.total_tokens = usage.total_tokens;
				self.usage.cached_tokens = usage.cache_read_input_tokens;
				mk(
					&id,
					created,
					&model,
					vec![],
					Some(universal::Usage {
						prompt_tokens: usage.input_tokens,
						completion_tokens: usage.output_tokens,
						total_tokens: usage.total_tokens,
						prompt_tokens_details: usage.cache_read_input_tokens.map(|cached| {
							universal::PromptTokensDetails {
								cached_tokens: Some(cached),
							}
						}),
					}),
				)
			},
		}
	}

	pub fn response_error(&mut self, status: u16, body: &[u8]) -> Result<Vec<u8>, AIError> {
		let message = serde_json::from_slice::<ConverseErrorResponse>(body)
			.map(|e| e.message)
			.unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned());
		let err = universal::ErrorResponse {
			error: universal::ErrorBody {
				r#type: if (400..500).contains(&status) {
					"invalid_request_error".to_string()
				} else {
					"api_error".to_string()
				},
				message,
				param: None,
				code: None,
			},
		};
		Ok(err.to_bytes())
	}
}

pub(super) fn translate_response(
	resp: ConverseResponse,
	model: &str,
) -> Result<universal::ChatCompletionResponse, AIError> {
	let output = resp.output.ok_or(AIError::IncompleteResponse)?;
	let message = match output {
		types::ConverseOutput::Message(msg) => msg,
		types::ConverseOutput::Unknown => return Err(AIError::IncompleteResponse),
	};
	// Bedrock has a vec of content entries, while openai allows one text
	// content and many tool calls.
	let mut tool_calls: Vec<universal::ToolCall> = Vec::new();
	let mut content = None;
	for block in &message.content {
		match block {
			ContentBlock::Text(text) => {
				content = Some(text.clone());
			},
			ContentBlock::ToolUse(tu) => {
				let Ok(args) = serde_json::to_string(&tu.input) else {
					continue;
				};
				tool_calls.push(universal::ToolCall {
					id: Some(tu.tool_use_id.clone()),
					r#type: "function".to_string(),
					function: universal::FunctionCall {
						name: tu.name.clone(),
						arguments: args,
					},
				});
			},
			// Tool results only appear in requests.
			ContentBlock::ToolResult(_) => continue,
		};
	}

	let message = universal::ResponseMessage {
		role: universal::Role::Assistant,
		content,
		tool_calls: if tool_calls.is_empty() {
			None
		} else {
			Some(tool_calls)
		},
	};
	let finish_reason = Some(translate_stop_reason(&resp.stop_reason));
	// Only one choice for Bedrock.
	let choice = universal::Choice {
		index: 0,
		message,
		finish_reason,
	};

	let usage = resp
		.usage
		.map(|token_usage| universal::Usage {
			prompt_tokens: token_usage.input_tokens,
			completion_tokens: token_usage.output_tokens,
			total_tokens: token_usage.total_tokens,
			prompt_tokens_details: token_usage.cache_read_input_tokens.map(|cached| {
				universal::PromptTokensDetails {
					cached_tokens: Some(cached),
				}
			}),
		})
		.unwrap_or_default();

	Ok(universal::ChatCompletionResponse {
		id: format!("bedrock-{}", chrono::Utc::now().timestamp_millis()),
		object: "chat.completion".to_string(),
		created: chrono::Utc::now().timestamp(),
		model: model.to_string(),
		choices: vec![choice],
		usage: Some(usage),
	})
}

fn translate_stop_reason(resp: &StopReason) -> universal::FinishReason {
	match resp {
		StopReason::EndTurn => universal::FinishReason::Stop,
		StopReason::MaxTokens => universal::FinishReason::Length,
		StopReason::StopSequence => universal::FinishReason::Stop,
		StopReason::ContentFiltered => universal::FinishReason::ContentFilter,
		StopReason::GuardrailIntervened => universal::FinishReason::ContentFilter,
		StopReason::ToolUse => universal::FinishReason::ToolCalls,
	}
}

pub(super) fn translate_request(req: &universal::ChatCompletionRequest) -> ConverseRequest {
	// Bedrock has system prompts in a separate field. Join them.
	let system = req.system_text();

	let messages = req
		.messages
		.iter()
		.filter(|msg| !matches!(msg.role, universal::Role::System | universal::Role::Developer))
		.filter_map(|msg| {
			let role = match msg.role {
				universal::Role::Assistant => types::Role::Assistant,
				// Default to user for other roles.
				_ => types::Role::User,
			};
			let mut content = Vec::new();
			if msg.role == universal::Role::Tool {
				content.push(ContentBlock::ToolResult(types::ToolResultBlock {
					tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
					content: vec![types::ToolResultContentBlock::Text(
						msg.content.as_ref().map(|c| c.text()).unwrap_or_default(),
					)],
					status: None,
				}));
			} else {
				if let Some(c) = &msg.content {
					let text = c.text();
					if !text.is_empty() {
						content.push(ContentBlock::Text(text));
					}
				}
				for call in msg.tool_calls.iter().flatten() {
					content.push(ContentBlock::ToolUse(types::ToolUseBlock {
						tool_use_id: call.id.clone().unwrap_or_default(),
						name: call.function.name.clone(),
						input: serde_json::from_str(&call.function.arguments)
							.unwrap_or(serde_json::Value::Object(Default::default())),
					}));
				}
			}
			if content.is_empty() {
				return None;
			}
			Some(types::Message { role, content })
		})
		.collect();

	let inference_config = types::InferenceConfiguration {
		max_tokens: req.max_tokens().unwrap_or(4096),
		temperature: req.temperature,
		top_p: req.top_p,
		stop_sequences: req.stop_sequences(),
	};

	let metadata = req
		.user
		.as_ref()
		.map(|user| HashMap::from([("user_id".to_string(), user.clone())]));

	let tool_choice = match &req.tool_choice {
		Some(universal::ToolChoice::Named(named)) => Some(types::ToolChoice::Tool {
			name: named.function.name.clone(),
		}),
		Some(universal::ToolChoice::Mode(m)) => match m.as_str() {
			"auto" => Some(types::ToolChoice::Auto),
			"required" => Some(types::ToolChoice::Any),
			_ => None,
		},
		None => None,
	};
	let tools = req.tools.as_ref().map(|tools| {
		tools
			.iter()
			.map(|tool| {
				types::Tool::ToolSpec(types::ToolSpecification {
					name: tool.function.name.clone(),
					description: tool.function.description.clone(),
					input_schema: tool
						.function
						.parameters
						.clone()
						.map(types::ToolInputSchema::Json),
				})
			})
			.collect_vec()
	});
	let tool_config = tools.map(|tools| types::ToolConfiguration { tools, tool_choice });

	ConverseRequest {
		messages,
		system: if system.is_empty() {
			None
		} else {
			Some(vec![types::SystemContentBlock::Text { text: system }])
		},
		inference_config: Some(inference_config),
		tool_config,
		request_metadata: metadata,
	}
}

pub(super) mod types {
	use std::collections::HashMap;

	use serde::{Deserialize, Serialize};

	use crate::parse::aws_sse;

	#[derive(Copy, Clone, Deserialize, Serialize, Debug, Default, PartialEq, Eq)]
	#[serde(rename_all = "camelCase")]
	pub enum Role {
		#[default]
		User,
		Assistant,
	}

	#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
	#[serde(rename_all = "camelCase")]
	pub enum ContentBlock {
		Text(String),
		ToolResult(ToolResultBlock),
		ToolUse(ToolUseBlock),
	}

	#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
	#[serde(rename_all = "camelCase")]
	pub struct ToolResultBlock {
		/// The ID of the tool request that this is the result for.
		pub tool_use_id: String,
		/// The content for the tool result content block.
		pub content: Vec<ToolResultContentBlock>,
		/// The status for the tool result content block.
		#[serde(skip_serializing_if = "Option::is_none")]
		pub status: Option<ToolResultStatus>,
	}

	#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
	#[serde(rename_all = "camelCase")]
	pub enum ToolResultStatus {
		Error,
		Success,
	}

	#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
	#[serde(rename_all = "camelCase")]
	pub struct ToolUseBlock {
		/// The ID for the tool request.
		pub tool_use_id: String,
		/// The name of the tool that the model wants to use.
		pub name: String,
		/// The input to pass to the tool.
		pub input: serde_json::Value,
	}

	#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
	#[serde(rename_all = "camelCase")]
	pub enum ToolResultContentBlock {
		/// A tool result that is text.
		Text(String),
	}

	#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
	#[serde(rename_all = "camelCase")]
	#[serde(untagged)]
	pub enum SystemContentBlock {
		Text { text: String },
	}

	#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
	#[serde(rename_all = "camelCase")]
	pub struct Message {
		pub role: Role,
		pub content: Vec<ContentBlock>,
	}

	#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
	#[serde(rename_all = "camelCase")]
	pub struct InferenceConfiguration {
		/// The maximum number of tokens to generate before stopping.
		pub max_tokens: u64,
		/// Amount of randomness injected into the response.
		#[serde(skip_serializing_if = "Option::is_none")]
		pub temperature: Option<f64>,
		/// Use nucleus sampling.
		#[serde(skip_serializing_if = "Option::is_none")]
		pub top_p: Option<f64>,
		/// The stop sequences to use.
		#[serde(skip_serializing_if = "Vec::is_empty", default)]
		pub stop_sequences: Vec<String>,
	}

	/// Request body for `/model/{id}/converse`; the model travels in the
	/// path, not the body.
	#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
	#[serde(rename_all = "camelCase")]
	pub struct ConverseRequest {
		/// The messages to send to the model.
		pub messages: Vec<Message>,
		/// A prompt that provides instructions or context to the model.
		#[serde(skip_serializing_if = "Option::is_none")]
		pub system: Option<Vec<SystemContentBlock>>,
		/// Inference parameters to pass to the model.
		#[serde(skip_serializing_if = "Option::is_none")]
		pub inference_config: Option<InferenceConfiguration>,
		/// Configuration information for the tools the model can use.
		#[serde(skip_serializing_if = "Option::is_none")]
		pub tool_config: Option<ToolConfiguration>,
		/// Request metadata.
		#[serde(skip_serializing_if = "Option::is_none")]
		pub request_metadata: Option<HashMap<String, String>>,
	}

	#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
	#[serde(rename_all = "camelCase")]
	pub struct ToolConfiguration {
		/// An array of tools to pass to the model.
		pub tools: Vec<Tool>,
		/// If supported by the model, forces it to request a tool.
		#[serde(skip_serializing_if = "Option::is_none")]
		pub tool_choice: Option<ToolChoice>,
	}

	#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
	#[serde(rename_all = "camelCase")]
	pub enum Tool {
		/// The specification for the tool.
		ToolSpec(ToolSpecification),
	}

	#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
	#[serde(rename_all = "camelCase")]
	pub struct ToolSpecification {
		/// The name for the tool.
		pub name: String,
		/// The description for the tool.
		#[serde(skip_serializing_if = "Option::is_none")]
		pub description: Option<String>,
		/// The input schema for the tool in JSON format.
		#[serde(skip_serializing_if = "Option::is_none")]
		pub input_schema: Option<ToolInputSchema>,
	}

	#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
	#[serde(rename_all = "camelCase")]
	pub enum ToolInputSchema {
		Json(serde_json::Value),
	}

	#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
	#[serde(rename_all = "camelCase")]
	pub enum ToolChoice {
		/// The model must request at least one tool (no text is generated).
		Any,
		/// (Default) the model decides whether to call a tool.
		Auto,
		/// The model must request the specified tool.
		Tool { name: String },
	}

	/// The response from the Bedrock Converse API.
	#[derive(Debug, Deserialize, Clone)]
	#[serde(rename_all = "camelCase")]
	pub struct ConverseResponse {
		/// The result of the call.
		pub output: Option<ConverseOutput>,
		/// The reason why the model stopped generating output.
		pub stop_reason: StopReason,
		/// The total number of tokens used in the call.
		pub usage: Option<TokenUsage>,
	}

	#[derive(Debug, Deserialize, Clone)]
	pub struct ConverseErrorResponse {
		pub message: String,
	}

	#[derive(Debug, Deserialize, Clone)]
	#[serde(rename_all = "camelCase")]
	pub enum ConverseOutput {
		Message(Message),
		#[serde(other)]
		Unknown,
	}

	#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
	#[serde(rename_all = "camelCase")]
	pub struct TokenUsage {
		pub input_tokens: u32,
		pub output_tokens: u32,
		pub total_tokens: u32,
		/// Tokens read from the prompt cache, when enabled.
		#[serde(skip_serializing_if = "Option::is_none")]
		pub cache_read_input_tokens: Option<u32>,
	}

	/// Reason for stopping the response generation.
	#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
	#[serde(rename_all = "snake_case")]
	pub enum StopReason {
		ContentFiltered,
		EndTurn,
		GuardrailIntervened,
		MaxTokens,
		StopSequence,
		ToolUse,
	}

	// This is not deserialized directly, see the associated method.
	#[derive(Clone, Debug)]
	pub enum ConverseStreamOutput {
		ContentBlockDelta(ContentBlockDeltaEvent),
		ContentBlockStart(ContentBlockStartEvent),
		ContentBlockStop(ContentBlockStopEvent),
		MessageStart(MessageStartEvent),
		MessageStop(MessageStopEvent),
		Metadata(ConverseStreamMetadataEvent),
	}

	impl ConverseStreamOutput {
		pub fn deserialize(m: &aws_sse::Message) -> anyhow::Result<Self> {
			let Some(event_type) = m.event_type() else {
				anyhow::bail!("no event type header")
			};
			Ok(match event_type {
				"contentBlockDelta" => ConverseStreamOutput::ContentBlockDelta(serde_json::from_slice(
					&m.payload,
				)?),
				"contentBlockStart" => ConverseStreamOutput::ContentBlockStart(serde_json::from_slice(
					&m.payload,
				)?),
				"contentBlockStop" => {
					ConverseStreamOutput::ContentBlockStop(serde_json::from_slice(&m.payload)?)
				},
				"messageStart" => ConverseStreamOutput::MessageStart(serde_json::from_slice(&m.payload)?),
				"messageStop" => ConverseStreamOutput::MessageStop(serde_json::from_slice(&m.payload)?),
				"metadata" => ConverseStreamOutput::Metadata(serde_json::from_slice(&m.payload)?),
				other => anyhow::bail!("unexpected event type: {other}"),
			})
		}
	}

	#[derive(Clone, Debug, Deserialize)]
	#[serde(rename_all = "camelCase")]
	pub struct ContentBlockDeltaEvent {
		/// The delta for a content block delta event.
		pub delta: Option<ContentBlockDelta>,
		/// The block index for a content block delta event.
		#[serde(default)]
		pub content_block_index: i32,
	}

	#[derive(Clone, Debug, Deserialize)]
	#[serde(rename_all = "camelCase")]
	pub struct ContentBlockStartEvent {
		/// Start information about a content block start event.
		pub start: Option<ContentBlockStart>,
		/// The index for a content block start event.
		#[serde(default)]
		pub content_block_index: i32,
	}

	#[derive(Clone, Debug, Deserialize)]
	#[serde(rename_all = "camelCase")]
	pub struct ContentBlockStopEvent {
		/// The index for a content block.
		#[serde(default)]
		pub content_block_index: i32,
	}

	#[derive(Clone, Debug, Deserialize)]
	#[serde(rename_all = "camelCase")]
	pub struct MessageStartEvent {
		/// The role for the message.
		pub role: Role,
	}

	#[derive(Clone, Debug, Deserialize)]
	#[serde(rename_all = "camelCase")]
	pub struct MessageStopEvent {
		/// The reason why the model stopped generating output.
		pub stop_reason: StopReason,
	}

	#[derive(Clone, Debug, Deserialize)]
	#[serde(rename_all = "camelCase")]
	pub struct ConverseStreamMetadataEvent {
		/// Usage information for the stream.
		pub usage: Option<TokenUsage>,
	}

	#[derive(Clone, Debug, Deserialize)]
	#[serde(rename_all = "camelCase")]
	pub enum ContentBlockDelta {
		/// The content text.
		Text(String),
		/// A fragment of tool-call input JSON.
		ToolUse(ToolUseBlockDelta),
	}

	#[derive(Clone, Debug, Deserialize)]
	#[serde(rename_all = "camelCase")]
	pub struct ToolUseBlockDelta {
		/// A fragment of the JSON-encoded tool input.
		pub input: String,
	}

	#[derive(Clone, Debug, Deserialize)]
	#[serde(rename_all = "camelCase")]
	pub enum ContentBlockStart {
		/// Information about a tool that the model is requesting to use.
		ToolUse(ToolUseBlockStart),
	}

	#[derive(Clone, Debug, Deserialize)]
	#[serde(rename_all = "camelCase")]
	pub struct ToolUseBlockStart {
		/// The ID for the tool request.
		pub tool_use_id: String,
		/// The name of the tool that the model is requesting to use.
		pub name: String,
	}
}
