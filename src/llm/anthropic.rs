//! Anthropic Messages translation, in both directions: OpenAI clients
//! talking to Anthropic backends, and `/v1/messages` clients talking to
//! OpenAI-shaped backends.

use bytes::{Bytes, BytesMut};
use itertools::Itertools;
use tokio_util::codec::Encoder;

use super::universal;
use crate::llm::openai::override_model;
use crate::llm::{AIError, LLMTokenUsage, RequestTransform};
use crate::parse::Frames;
use crate::parse::sse::{SseDecoder, SseEncoder, SseEvent};
use crate::*;

pub const MESSAGES_PATH: &str = "/v1/messages";
// https://docs.anthropic.com/en/api/versioning
pub const VERSION_HEADER: (&str, &str) = ("anthropic-version", "2023-06-01");

const DEFAULT_MAX_TOKENS: u64 = 4096;

/// OpenAI chat-completions client, Anthropic backend.
pub struct ChatToMessages {
	model_override: Option<Strng>,
	pub usage: LLMTokenUsage,
	pub response_model: Option<Strng>,
	streaming: bool,
	buffered: BytesMut,
	sse: Option<Frames<SseDecoder>>,
	stream: StreamToChatState,
}

/// Carry-over between streamed Anthropic events while rebuilding OpenAI
/// chunks.
#[derive(Default)]
struct StreamToChatState {
	message_id: Option<String>,
	model: String,
	created: i64,
	input_tokens: u32,
	// tool_use block index -> OpenAI tool_call index
	tool_indexes: HashMap<usize, u32>,
}

impl ChatToMessages {
	pub fn new(model_override: Option<Strng>) -> Self {
		Self {
			model_override,
			usage: Default::default(),
			response_model: None,
			streaming: false,
			buffered: BytesMut::new(),
			sse: None,
			stream: Default::default(),
		}
	}

	pub fn request_body(&mut self, raw: &Bytes) -> Result<RequestTransform, AIError> {
		let mut req: universal::ChatCompletionRequest =
			serde_json::from_slice(raw).map_err(AIError::RequestParsing)?;
		if let Some(model) = &self.model_override {
			req.model = model.to_string();
		}
		let model = strng::new(&req.model);
		self.streaming = req.streaming();
		let translated = translate_request(&req);
		let body = serde_json::to_vec(&translated).map_err(AIError::RequestMarshal)?;
		Ok(RequestTransform {
			path: Some(MESSAGES_PATH.to_string()),
			headers: vec![(VERSION_HEADER.0.to_string(), VERSION_HEADER.1.to_string())],
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
		let resp = serde_json::from_slice::<types::MessagesResponse>(&self.buffered)
			.map_err(AIError::ResponseParsing)?;
		self.usage.input_tokens = resp.usage.input_tokens;
		self.usage.output_tokens = resp.usage.output_tokens;
		self.usage.total_tokens = resp.usage.input_tokens + resp.usage.output_tokens;
		self.usage.cached_tokens = resp.usage.cache_read_input_tokens;
		self.response_model = Some(strng::new(&resp.model));
		let openai = translate_response(resp);
		serde_json::to_vec(&openai).map_err(AIError::ResponseMarshal)
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
			let Some(data) = &ev.data else { continue };
			let Ok(event) = serde_json::from_str::<types::MessagesStreamEvent>(data) else {
				debug!("ignoring unparseable stream event");
				continue;
			};
			for chunk in self.translate_stream_event(event) {
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
		event: types::MessagesStreamEvent,
	) -> Vec<universal::ChatCompletionStreamResponse> {
		let st = &mut self.stream;
		let mk = |st: &StreamToChatState,
		          choices: Vec<universal::StreamChoice>,
		          usage: Option<universal::Usage>| {
			universal::ChatCompletionStreamResponse {
				id: st.message_id.clone().unwrap_or_default(),
				object: "chat.completion.chunk".to_string(),
				created: st.created,
				model: st.model.clone(),
				choices,
				usage,
			}
		};
		match event {
			types::MessagesStreamEvent::MessageStart { message } => {
				st.message_id = Some(message.id);
				st.model = message.model.clone();
				st.created = chrono::Utc::now().timestamp();
				st.input_tokens = message.usage.input_tokens;
				self.usage.input_tokens = message.usage.input_tokens;
				self.usage.cached_tokens = message.usage.cache_read_input_tokens;
				self.response_model = Some(strng::new(&message.model));
				let choice = universal::StreamChoice {
					index: 0,
					delta: universal::StreamDelta {
						role: Some(universal::Role::Assistant),
						..Default::default()
					},
					finish_reason: None,
				};
				vec![mk(st, vec![choice], None)]
			},
			types::MessagesStreamEvent::ContentBlockStart {
				index,
				content_block,
			} => match content_block {
				types::ContentBlock::ToolUse { id, name, .. } => {
					let tool_index = st.tool_indexes.len() as u32;
					st.tool_indexes.insert(index, tool_index);
					let choice = universal::StreamChoice {
						index: 0,
						delta: universal::StreamDelta {
							tool_calls: Some(vec![universal::StreamToolCall {
								index: tool_index,
								id: Some(id),
								r#type: Some("function".to_string()),
								function: universal::FunctionCallDelta {
									name: Some(name),
									arguments: Some(String::new()),
								},
							}]),
							..Default::default()
						},
						finish_reason: None,
					};
					vec![mk(st, vec![choice], None)]
				},
				_ => vec![],
			},
			types::MessagesStreamEvent::ContentBlockDelta { index, delta } => match delta {
				types::ContentBlockDelta::TextDelta { text } => {
					let choice = universal::StreamChoice {
						index: 0,
						delta: universal::StreamDelta {
							content: Some(text),
							..Default::default()
						},
						finish_reason: None,
					};
					vec![mk(st, vec![choice], None)]
				},
				types::ContentBlockDelta::InputJsonDelta { partial_json } => {
					let Some(tool_index) = st.tool_indexes.get(&index).copied() else {
						return vec![];
					};
					let choice = universal::StreamChoice {
						index: 0,
						delta: universal::StreamDelta {
							tool_calls: Some(vec![universal::StreamToolCall {
								index: tool_index,
								id: None,
								r#type: None,
								function: universal::FunctionCallDelta {
									name: None,
									arguments: Some(partial_json),
								},
							}]),
							..Default::default()
						},
						finish_reason: None,
					};
					vec![mk(st, vec![choice], None)]
				},
			},
			types::MessagesStreamEvent::MessageDelta { delta, usage } => {
				self.usage.output_tokens = usage.output_tokens;
				self.usage.total_tokens = self.usage.input_tokens + usage.output_tokens;
				let finish_reason = delta.stop_reason.map(translate_stop_reason);
				let choice = universal::StreamChoice {
					index: 0,
					delta: Default::default(),
					finish_reason,
				};
				let usage = universal::Usage {
					prompt_tokens: st.input_tokens,
					completion_tokens: usage.output_tokens,
					total_tokens: st.input_tokens + usage.output_tokens,
					prompt_tokens_details: None,
				};
				vec![mk(st, vec![choice], Some(usage))]
			},
			types::MessagesStreamEvent::ContentBlockStop { .. }
			| types::MessagesStreamEvent::MessageStop
			| types::MessagesStreamEvent::Ping => vec![],
		}
	}

	pub fn response_error(&mut self, _status: u16, body: &[u8]) -> Result<Vec<u8>, AIError> {
		let resp = serde_json::from_slice::<types::MessagesErrorResponse>(body);
		let err = match resp {
			Ok(resp) => universal::ErrorResponse {
				error: universal::ErrorBody {
					r#type: resp.error.r#type,
					message: resp.error.message,
					param: None,
					code: None,
				},
			},
			Err(_) => universal::ErrorResponse::invalid_request(String::from_utf8_lossy(body)),
		};
		Ok(err.to_bytes())
	}
}

/// `/v1/messages` client, OpenAI-shaped backend.
pub struct MessagesToChat {
	model_override: Option<Strng>,
	pub usage: LLMTokenUsage,
	pub response_model: Option<Strng>,
	streaming: bool,
	buffered: BytesMut,
	sse: Option<Frames<SseDecoder>>,
	stream: ChatToStreamState,
}

#[derive(Default)]
struct ChatToStreamState {
	started: bool,
	text_block_open: bool,
	finish_reason: Option<universal::FinishReason>,
	output_tokens: u32,
}

impl MessagesToChat {
	pub fn new(model_override: Option<Strng>) -> Self {
		Self {
			model_override,
			usage: Default::default(),
			response_model: None,
			streaming: false,
			buffered: BytesMut::new(),
			sse: None,
			stream: Default::default(),
		}
	}

	pub fn request_body(&mut self, raw: &Bytes) -> Result<RequestTransform, AIError> {
		let mut req: types::MessagesRequest =
			serde_json::from_slice(raw).map_err(AIError::RequestParsing)?;
		if let Some(model) = &self.model_override {
			req.model = model.to_string();
		}
		let model = strng::new(&req.model);
		self.streaming = req.stream;
		let translated = translate_messages_to_chat(&req);
		let body = serde_json::to_vec(&translated).map_err(AIError::RequestMarshal)?;
		Ok(RequestTransform {
			path: Some("/v1/chat/completions".to_string()),
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
		let resp = serde_json::from_slice::<universal::ChatCompletionResponse>(&self.buffered)
			.map_err(AIError::ResponseParsing)?;
		if let Some(usage) = &resp.usage {
			self.usage.merge_response(usage);
		}
		self.response_model = Some(strng::new(&resp.model));
		let anthropic = translate_chat_response(resp);
		serde_json::to_vec(&anthropic).map_err(AIError::ResponseMarshal)
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
		for ev in events {
			if ev.is_done() {
				self.emit_stream_tail(&mut out)?;
				continue;
			}
			let Some(data) = &ev.data else { continue };
			let Ok(resp) = serde_json::from_str::<universal::ChatCompletionStreamResponse>(data) else {
				continue;
			};
			if self.response_model.is_none() && !resp.model.is_empty() {
				self.response_model = Some(strng::new(&resp.model));
			}
			if !self.stream.started {
				self.stream.started = true;
				let start = types::MessagesStreamEvent::MessageStart {
					message: types::MessagesResponse {
						id: resp.id.clone(),
						r#type: "message".to_string(),
						role: types::Role::Assistant,
						content: vec![],
						model: resp.model.clone(),
						stop_reason: None,
						stop_sequence: None,
						usage: types::Usage {
							input_tokens: 0,
							output_tokens: 0,
							cache_read_input_tokens: None,
						},
					},
				};
				emit_event(&mut out, "message_start", &start)?;
			}
			if let Some(usage) = &resp.usage {
				self.usage.merge_response(usage);
				self.stream.output_tokens = usage.completion_tokens;
			}
			for choice in &resp.choices {
				if let Some(text) = &choice.delta.content {
					if !self.stream.text_block_open {
						self.stream.text_block_open = true;
						emit_event(
							&mut out,
							"content_block_start",
							&types::MessagesStreamEvent::ContentBlockStart {
								index: 0,
								content_block: types::ContentBlock::Text { text: String::new() },
							},
						)?;
					}
					emit_event(
						&mut out,
						"content_block_delta",
						&types::MessagesStreamEvent::ContentBlockDelta {
							index: 0,
							delta: types::ContentBlockDelta::TextDelta { text: text.clone() },
						},
					)?;
				}
				if let Some(reason) = choice.finish_reason {
					self.stream.finish_reason = Some(reason);
				}
			}
		}
		if end_of_stream && self.stream.started {
			// A backend that never sent [DONE] still terminates the
			// Anthropic stream cleanly.
			self.emit_stream_tail(&mut out)?;
		}
		Ok(out.to_vec())
	}

	fn emit_stream_tail(&mut self, out: &mut BytesMut) -> Result<(), AIError> {
		if !self.stream.started {
			return Ok(());
		}
		self.stream.started = false;
		if self.stream.text_block_open {
			self.stream.text_block_open = false;
			emit_event(
				out,
				"content_block_stop",
				&types::MessagesStreamEvent::ContentBlockStop { index: 0 },
			)?;
		}
		let stop_reason = self
			.stream
			.finish_reason
			.map(reverse_stop_reason)
			.unwrap_or(types::StopReason::EndTurn);
		emit_event(
			out,
			"message_delta",
			&types::MessagesStreamEvent::MessageDelta {
				delta: types::MessageDelta {
					stop_reason: Some(stop_reason),
					stop_sequence: None,
				},
				usage: types::MessageDeltaUsage {
					output_tokens: self.stream.output_tokens,
				},
			},
		)?;
		emit_event(out, "message_stop", &types::MessagesStreamEvent::MessageStop)?;
		Ok(())
	}

	pub fn response_error(&mut self, status: u16, body: &[u8]) -> Result<Vec<u8>, AIError> {
		let message = serde_json::from_slice::<universal::ErrorResponse>(body)
			.map(|e| e.error.message)
			.unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned());
		let err = types::MessagesErrorResponse {
			r#type: "error".to_string(),
			error: types::MessagesError {
				r#type: error_type_for_status(status).to_string(),
				message,
			},
		};
		serde_json::to_vec(&err).map_err(AIError::ResponseMarshal)
	}
}

/// `/v1/messages` client, Anthropic backend: only the model override and
/// usage accounting apply.
pub struct MessagesPassthrough {
	model_override: Option<Strng>,
	pub usage: LLMTokenUsage,
	pub response_model: Option<Strng>,
	streaming: bool,
	buffered: BytesMut,
	sse: Option<Frames<SseDecoder>>,
}

impl MessagesPassthrough {
	pub fn new(model_override: Option<Strng>) -> Self {
		Self {
			model_override,
			usage: Default::default(),
			response_model: None,
			streaming: false,
			buffered: BytesMut::new(),
			sse: None,
		}
	}

	pub fn request_body(&mut self, raw: &Bytes) -> Result<RequestTransform, AIError> {
		let parsed: universal::ModelOnly = serde_json::from_slice(raw).map_err(AIError::RequestParsing)?;
		self.streaming = parsed.stream;
		let model = self
			.model_override
			.clone()
			.unwrap_or_else(|| strng::new(&parsed.model));
		let body = if self.model_override.is_some() {
			Some(override_model(raw, &model)?)
		} else {
			None
		};
		Ok(RequestTransform {
			path: Some(MESSAGES_PATH.to_string()),
			headers: vec![(VERSION_HEADER.0.to_string(), VERSION_HEADER.1.to_string())],
			body,
			model,
			streaming: self.streaming,
		})
	}

	pub fn response_body(&mut self, chunk: &[u8], end_of_stream: bool) -> Result<Vec<u8>, AIError> {
		if self.streaming {
			let frames = self.sse.get_or_insert_with(|| Frames::new(SseDecoder::new()));
			let events = frames
				.push(chunk, end_of_stream)
				.map_err(|e| AIError::StreamParsing(e.into()))?;
			let mut out = BytesMut::new();
			let mut encoder = SseEncoder;
			for ev in events {
				if let Some(data) = &ev.data
					&& let Ok(event) = serde_json::from_str::<types::MessagesStreamEvent>(data)
				{
					self.observe_stream_event(&event);
				}
				encoder
					.encode(ev, &mut out)
					.map_err(|e| AIError::StreamParsing(e.into()))?;
			}
			return Ok(out.to_vec());
		}
		self.buffered.extend_from_slice(chunk);
		if end_of_stream
			&& let Ok(resp) = serde_json::from_slice::<types::MessagesResponse>(&self.buffered)
		{
			self.usage.input_tokens = resp.usage.input_tokens;
			self.usage.output_tokens = resp.usage.output_tokens;
			self.usage.total_tokens = resp.usage.input_tokens + resp.usage.output_tokens;
			self.usage.cached_tokens = resp.usage.cache_read_input_tokens;
			self.response_model = Some(strng::new(&resp.model));
		}
		Ok(chunk.to_vec())
	}

	fn observe_stream_event(&mut self, event: &types::MessagesStreamEvent) {
		match event {
			types::MessagesStreamEvent::MessageStart { message } => {
				self.usage.input_tokens = message.usage.input_tokens;
				self.usage.cached_tokens = message.usage.cache_read_input_tokens;
				self.response_model = Some(strng::new(&message.model));
			},
			types::MessagesStreamEvent::MessageDelta { usage, .. } => {
				self.usage.output_tokens = usage.output_tokens;
				self.usage.total_tokens = self.usage.input_tokens + usage.output_tokens;
			},
			_ => {},
		}
	}

	pub fn response_error(&mut self, _status: u16, body: &[u8]) -> Result<Vec<u8>, AIError> {
		Ok(body.to_vec())
	}
}

fn emit_event<T: serde::Serialize>(
	out: &mut BytesMut,
	name: &str,
	event: &T,
) -> Result<(), AIError> {
	let data = serde_json::to_string(event).map_err(AIError::ResponseMarshal)?;
	SseEncoder
		.encode(
			SseEvent {
				name: Some(name.to_string()),
				id: None,
				data: Some(data),
			},
			out,
		)
		.map_err(|e| AIError::StreamParsing(e.into()))
}

/// https://docs.anthropic.com/en/api/errors
pub(super) fn error_type_for_status(status: u16) -> &'static str {
	match status {
		400 => "invalid_request_error",
		401 => "authentication_error",
		403 => "permission_error",
		404 => "not_found_error",
		413 => "request_too_large",
		429 => "rate_limit_error",
		529 => "overloaded_error",
		_ => "api_error",
	}
}

fn translate_stop_reason(reason: types::StopReason) -> universal::FinishReason {
	match reason {
		types::StopReason::EndTurn => universal::FinishReason::Stop,
		types::StopReason::MaxTokens => universal::FinishReason::Length,
		types::StopReason::StopSequence => universal::FinishReason::Stop,
		types::StopReason::ToolUse => universal::FinishReason::ToolCalls,
		types::StopReason::Refusal => universal::FinishReason::ContentFilter,
	}
}

fn reverse_stop_reason(reason: universal::FinishReason) -> types::StopReason {
	match reason {
		universal::FinishReason::Stop => types::StopReason::EndTurn,
		universal::FinishReason::Length => types::StopReason::MaxTokens,
		universal::FinishReason::ToolCalls => types::StopReason::ToolUse,
		universal::FinishReason::ContentFilter => types::StopReason::Refusal,
	}
}

pub(super) fn translate_request(req: &universal::ChatCompletionRequest) -> types::MessagesRequest {
	// Anthropic has all system prompts in a single field. Join them.
	let system = req.system_text();

	let messages = req
		.messages
		.iter()
		.filter(|msg| !matches!(msg.role, universal::Role::System | universal::Role::Developer))
		.filter_map(|msg| {
			let (role, content) = match msg.role {
				universal::Role::Tool => {
					// Tool results travel as user-role tool_result blocks.
					let block = types::ContentBlock::ToolResult {
						tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
						content: serde_json::Value::String(
							msg.content.as_ref().map(|c| c.text()).unwrap_or_default(),
						),
						is_error: None,
					};
					(types::Role::User, vec![block])
				},
				universal::Role::Assistant => {
					let mut blocks = Vec::new();
					if let Some(content) = &msg.content {
						let text = content.text();
						if !text.is_empty() {
							blocks.push(types::ContentBlock::Text { text });
						}
					}
					for call in msg.tool_calls.iter().flatten() {
						blocks.push(types::ContentBlock::ToolUse {
							id: call.id.clone().unwrap_or_default(),
							name: call.function.name.clone(),
							input: serde_json::from_str(&call.function.arguments)
								.unwrap_or(serde_json::Value::Object(Default::default())),
						});
					}
					if blocks.is_empty() {
						return None;
					}
					(types::Role::Assistant, blocks)
				},
				_ => {
					let text = msg.content.as_ref().map(|c| c.text()).unwrap_or_default();
					(types::Role::User, vec![types::ContentBlock::Text { text }])
				},
			};
			Some(types::Message {
				role,
				content: types::MessageContent::Blocks(content),
			})
		})
		.collect();

	let tools = req.tools.as_ref().map(|tools| {
		tools
			.iter()
			.map(|t| types::ToolDefinition {
				name: t.function.name.clone(),
				description: t.function.description.clone(),
				input_schema: t
					.function
					.parameters
					.clone()
					.unwrap_or(serde_json::json!({"type": "object"})),
			})
			.collect_vec()
	});
	let tool_choice = req.tool_choice.as_ref().and_then(|tc| match tc {
		universal::ToolChoice::Mode(m) => match m.as_str() {
			"auto" => Some(types::ToolChoice::Auto),
			"required" => Some(types::ToolChoice::Any),
			_ => None,
		},
		universal::ToolChoice::Named(n) => Some(types::ToolChoice::Tool {
			name: n.function.name.clone(),
		}),
	});

	types::MessagesRequest {
		messages,
		system: if system.is_empty() {
			None
		} else {
			Some(types::SystemPrompt::Text(system))
		},
		model: req.model.clone(),
		max_tokens: req.max_tokens().unwrap_or(DEFAULT_MAX_TOKENS),
		stop_sequences: req.stop_sequences(),
		stream: req.streaming(),
		temperature: req.temperature,
		top_p: req.top_p,
		top_k: None,
		tools,
		tool_choice,
	}
}

pub(super) fn translate_response(resp: types::MessagesResponse) -> universal::ChatCompletionResponse {
	let mut content: Option<String> = None;
	let mut tool_calls = Vec::new();
	for block in &resp.content {
		match block {
			types::ContentBlock::Text { text } => match &mut content {
				Some(c) => c.push_str(text),
				None => content = Some(text.clone()),
			},
			types::ContentBlock::ToolUse { id, name, input } => {
				tool_calls.push(universal::ToolCall {
					id: Some(id.clone()),
					r#type: "function".to_string(),
					function: universal::FunctionCall {
						name: name.clone(),
						arguments: serde_json::to_string(input).unwrap_or_else(|_| "{}".to_string()),
					},
				});
			},
			_ => {},
		}
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
	let finish_reason = resp.stop_reason.map(translate_stop_reason);
	// Anthropic always returns exactly one message.
	let choice = universal::Choice {
		index: 0,
		message,
		finish_reason,
	};

	let usage = universal::Usage {
		prompt_tokens: resp.usage.input_tokens,
		completion_tokens: resp.usage.output_tokens,
		total_tokens: resp.usage.input_tokens + resp.usage.output_tokens,
		prompt_tokens_details: resp.usage.cache_read_input_tokens.map(|cached| {
			universal::PromptTokensDetails {
				cached_tokens: Some(cached),
			}
		}),
	};

	universal::ChatCompletionResponse {
		id: resp.id,
		object: "chat.completion".to_string(),
		// No date in the anthropic response so just call it "now".
		created: chrono::Utc::now().timestamp(),
		model: resp.model,
		choices: vec![choice],
		usage: Some(usage),
	}
}

pub(super) fn translate_messages_to_chat(
	req: &types::MessagesRequest,
) -> universal::ChatCompletionRequest {
	let mut messages = Vec::new();
	if let Some(system) = &req.system {
		let text = system.text();
		if !text.is_empty() {
			messages.push(universal::Message {
				role: universal::Role::System,
				content: Some(universal::Content::Text(text)),
				name: None,
				tool_calls: None,
				tool_call_id: None,
			});
		}
	}
	for msg in &req.messages {
		match &msg.content {
			types::MessageContent::Text(t) => messages.push(universal::Message {
				role: role_to_universal(msg.role),
				content: Some(universal::Content::Text(t.clone())),
				name: None,
				tool_calls: None,
				tool_call_id: None,
			}),
			types::MessageContent::Blocks(blocks) => {
				let mut text = String::new();
				let mut tool_calls = Vec::new();
				for block in blocks {
					match block {
						types::ContentBlock::Text { text: t } => text.push_str(t),
						types::ContentBlock::ToolUse { id, name, input } => {
							tool_calls.push(universal::ToolCall {
								id: Some(id.clone()),
								r#type: "function".to_string(),
								function: universal::FunctionCall {
									name: name.clone(),
									arguments: serde_json::to_string(input)
										.unwrap_or_else(|_| "{}".to_string()),
								},
							});
						},
						types::ContentBlock::ToolResult {
							tool_use_id,
							content,
							..
						} => {
							let content = match content {
								serde_json::Value::String(s) => s.clone(),
								other => other.to_string(),
							};
							messages.push(universal::Message {
								role: universal::Role::Tool,
								content: Some(universal::Content::Text(content)),
								name: None,
								tool_calls: None,
								tool_call_id: Some(tool_use_id.clone()),
							});
						},
						types::ContentBlock::Image { .. } => {},
					}
				}
				if !text.is_empty() || !tool_calls.is_empty() {
					messages.push(universal::Message {
						role: role_to_universal(msg.role),
						content: if text.is_empty() {
							None
						} else {
							Some(universal::Content::Text(text))
						},
						name: None,
						tool_calls: if tool_calls.is_empty() {
							None
						} else {
							Some(tool_calls)
						},
						tool_call_id: None,
					});
				}
			},
		}
	}

	let tools = req.tools.as_ref().map(|tools| {
		tools
			.iter()
			.map(|t| universal::Tool {
				r#type: "function".to_string(),
				function: universal::FunctionDefinition {
					name: t.name.clone(),
					description: t.description.clone(),
					parameters: Some(t.input_schema.clone()),
				},
			})
			.collect_vec()
	});
	let tool_choice = req.tool_choice.as_ref().map(|tc| match tc {
		types::ToolChoice::Auto => universal::ToolChoice::Mode("auto".to_string()),
		types::ToolChoice::Any => universal::ToolChoice::Mode("required".to_string()),
		types::ToolChoice::None => universal::ToolChoice::Mode("none".to_string()),
		types::ToolChoice::Tool { name } => universal::ToolChoice::Named(universal::NamedToolChoice {
			r#type: "function".to_string(),
			function: universal::NamedFunction { name: name.clone() },
		}),
	});

	universal::ChatCompletionRequest {
		model: req.model.clone(),
		messages,
		stream: Some(req.stream),
		stream_options: if req.stream {
			Some(universal::StreamOptions {
				include_usage: true,
			})
		} else {
			None
		},
		temperature: req.temperature,
		top_p: req.top_p,
		max_completion_tokens: Some(req.max_tokens),
		stop: if req.stop_sequences.is_empty() {
			None
		} else {
			Some(universal::Stop::Sequences(req.stop_sequences.clone()))
		},
		tools,
		tool_choice,
		..Default::default()
	}
}

pub(super) fn translate_chat_response(
	resp: universal::ChatCompletionResponse,
) -> types::MessagesResponse {
	let mut content = Vec::new();
	let mut stop_reason = None;
	for choice in &resp.choices {
		if let Some(text) = &choice.message.content
			&& !text.is_empty()
		{
			content.push(types::ContentBlock::Text { text: text.clone() });
		}
		for call in choice.message.tool_calls.iter().flatten() {
			content.push(types::ContentBlock::ToolUse {
				id: call.id.clone().unwrap_or_default(),
				name: call.function.name.clone(),
				input: serde_json::from_str(&call.function.arguments)
					.unwrap_or(serde_json::Value::Object(Default::default())),
			});
		}
		if stop_reason.is_none() {
			stop_reason = choice.finish_reason.map(reverse_stop_reason);
		}
	}
	let usage = resp.usage.unwrap_or_default();
	types::MessagesResponse {
		id: resp.id,
		r#type: "message".to_string(),
		role: types::Role::Assistant,
		content,
		model: resp.model,
		stop_reason: Some(stop_reason.unwrap_or(types::StopReason::EndTurn)),
		stop_sequence: None,
		usage: types::Usage {
			input_tokens: usage.prompt_tokens,
			output_tokens: usage.completion_tokens,
			cache_read_input_tokens: usage.cached_tokens(),
		},
	}
}

fn role_to_universal(role: types::Role) -> universal::Role {
	match role {
		types::Role::User => universal::Role::User,
		types::Role::Assistant => universal::Role::Assistant,
	}
}

pub(super) mod types {
	use serde::{Deserialize, Serialize};

	use crate::serdes::is_default;

	#[derive(Copy, Clone, Deserialize, Serialize, Debug, PartialEq, Eq, Default)]
	#[serde(rename_all = "snake_case")]
	pub enum Role {
		#[default]
		User,
		Assistant,
	}

	#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
	#[serde(rename_all = "snake_case", tag = "type")]
	pub enum ContentBlock {
		Text {
			text: String,
		},
		Image {
			source: serde_json::Value,
		},
		ToolUse {
			id: String,
			name: String,
			input: serde_json::Value,
		},
		ToolResult {
			tool_use_id: String,
			content: serde_json::Value,
			#[serde(skip_serializing_if = "Option::is_none")]
			is_error: Option<bool>,
		},
	}

	#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
	#[serde(untagged)]
	pub enum MessageContent {
		Text(String),
		Blocks(Vec<ContentBlock>),
	}

	#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
	pub struct Message {
		pub role: Role,
		pub content: MessageContent,
	}

	/// The system prompt is either a plain string or a list of text blocks.
	#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
	#[serde(untagged)]
	pub enum SystemPrompt {
		Text(String),
		Blocks(Vec<SystemBlock>),
	}

	impl SystemPrompt {
		pub fn text(&self) -> String {
			match self {
				SystemPrompt::Text(t) => t.clone(),
				SystemPrompt::Blocks(blocks) => blocks
					.iter()
					.map(|b| b.text.as_str())
					.collect::<Vec<_>>()
					.join("\n"),
			}
		}
	}

	#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
	pub struct SystemBlock {
		pub r#type: String,
		pub text: String,
	}

	#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
	pub struct ToolDefinition {
		pub name: String,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub description: Option<String>,
		pub input_schema: serde_json::Value,
	}

	#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
	#[serde(rename_all = "snake_case", tag = "type")]
	pub enum ToolChoice {
		Auto,
		Any,
		None,
		Tool { name: String },
	}

	#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
	pub struct MessagesRequest {
		/// The user/assistant turns.
		pub messages: Vec<Message>,
		/// The system prompt.
		#[serde(skip_serializing_if = "Option::is_none")]
		pub system: Option<SystemPrompt>,
		pub model: String,
		/// The maximum number of tokens to generate before stopping.
		pub max_tokens: u64,
		#[serde(default, skip_serializing_if = "Vec::is_empty")]
		pub stop_sequences: Vec<String>,
		/// Whether to incrementally stream the response.
		#[serde(default, skip_serializing_if = "is_default")]
		pub stream: bool,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub temperature: Option<f64>,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub top_p: Option<f64>,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub top_k: Option<u32>,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub tools: Option<Vec<ToolDefinition>>,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub tool_choice: Option<ToolChoice>,
	}

	/// Response body for the Messages API.
	#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
	pub struct MessagesResponse {
		/// Unique object identifier.
		pub id: String,
		/// Always "message".
		pub r#type: String,
		/// Always "assistant".
		pub role: Role,
		/// Content generated by the model, as an array of typed blocks.
		pub content: Vec<ContentBlock>,
		/// The model that handled the request.
		pub model: String,
		/// Non-null in non-streaming mode; in streaming mode null in the
		/// message_start event and non-null in message_delta.
		pub stop_reason: Option<StopReason>,
		/// Which custom stop sequence was generated, if any.
		pub stop_sequence: Option<String>,
		/// Billing and rate-limit usage.
		pub usage: Usage,
	}

	#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
	#[serde(rename_all = "snake_case", tag = "type")]
	pub enum MessagesStreamEvent {
		MessageStart {
			message: MessagesResponse,
		},
		ContentBlockStart {
			index: usize,
			content_block: ContentBlock,
		},
		ContentBlockDelta {
			index: usize,
			delta: ContentBlockDelta,
		},
		ContentBlockStop {
			index: usize,
		},
		MessageDelta {
			delta: MessageDelta,
			usage: MessageDeltaUsage,
		},
		MessageStop,
		Ping,
	}

	#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
	#[serde(rename_all = "snake_case", tag = "type")]
	pub enum ContentBlockDelta {
		TextDelta { text: String },
		InputJsonDelta { partial_json: String },
	}

	#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
	pub struct MessageDeltaUsage {
		pub output_tokens: u32,
	}

	#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
	pub struct MessageDelta {
		pub stop_reason: Option<StopReason>,
		pub stop_sequence: Option<String>,
	}

	#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
	pub struct MessagesErrorResponse {
		pub r#type: String,
		pub error: MessagesError,
	}

	#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
	pub struct MessagesError {
		pub r#type: String,
		pub message: String,
	}

	/// Reason the model stopped generating.
	#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
	#[serde(rename_all = "snake_case")]
	pub enum StopReason {
		/// The model reached a natural stopping point.
		EndTurn,
		/// The requested max_tokens or the model's maximum was exceeded.
		MaxTokens,
		/// One of the provided custom stop_sequences was generated.
		StopSequence,
		/// The model invoked one or more tools.
		ToolUse,
		/// The model refused to answer.
		Refusal,
	}

	#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
	pub struct Usage {
		/// The number of input tokens which were used.
		pub input_tokens: u32,
		/// The number of output tokens which were used.
		pub output_tokens: u32,
		/// Tokens served from the prompt cache, when the backend reports it.
		#[serde(skip_serializing_if = "Option::is_none")]
		pub cache_read_input_tokens: Option<u32>,
	}
}
