//! Gemini / Vertex AI translation: OpenAI chat completions in,
//! `generateContent` / `streamGenerateContent` out.

use bytes::{Bytes, BytesMut};
use itertools::Itertools;
use tokio_util::codec::Encoder;

use super::universal;
use crate::llm::gemini::types::{
	Candidate, GenerateContentRequest, GenerateContentResponse, GeminiErrorResponse,
};
use crate::llm::{AIError, LLMTokenUsage, RequestTransform, VertexParams};
use crate::parse::Frames;
use crate::parse::sse::{SseDecoder, SseEncoder, SseEvent};
use crate::*;

pub struct Translator {
	model_override: Option<Strng>,
	vertex: Option<VertexParams>,
	pub usage: LLMTokenUsage,
	pub response_model: Option<Strng>,
	streaming: bool,
	request_model: Strng,
	buffered: BytesMut,
	sse: Option<Frames<SseDecoder>>,
	message_id: String,
	created: i64,
	// Gemini re-sends complete tool calls on several chunks; remember what
	// was already forwarded so the client sees each call exactly once.
	emitted_tool_calls: std::collections::HashSet<(String, u32)>,
	saw_finish: bool,
}

impl Translator {
	pub fn new(model_override: Option<Strng>, vertex: Option<VertexParams>) -> Self {
		Self {
			model_override,
			vertex,
			usage: Default::default(),
			response_model: None,
			streaming: false,
			request_model: Strng::default(),
			buffered: BytesMut::new(),
			sse: None,
			message_id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
			created: chrono::Utc::now().timestamp(),
			emitted_tool_calls: Default::default(),
			saw_finish: false,
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
		let translated = translate_request(&req)?;
		let body = serde_json::to_vec(&translated).map_err(AIError::RequestMarshal)?;
		let path = match &self.vertex {
			Some(vertex) => vertex.path_for_model(&model, self.streaming),
			None => {
				let verb = if self.streaming {
					"streamGenerateContent?alt=sse"
				} else {
					"generateContent"
				};
				format!("/v1beta/models/{model}:{verb}")
			},
		};
		Ok(RequestTransform {
			path: Some(path),
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
		let resp = serde_json::from_slice::<GenerateContentResponse>(&self.buffered)
			.map_err(AIError::ResponseParsing)?;
		self.observe(&resp);
		let openai = translate_response(&resp, &self.message_id, self.created, self.model_name());
		serde_json::to_vec(&openai).map_err(AIError::ResponseMarshal)
	}

	fn model_name(&self) -> String {
		self
			.response_model
			.as_deref()
			.unwrap_or(self.request_model.as_str())
			.to_string()
	}

	fn observe(&mut self, resp: &GenerateContentResponse) {
		if let Some(model) = &resp.model_version {
			self.response_model = Some(strng::new(model));
		}
		if let Some(usage) = &resp.usage_metadata {
			self.usage.input_tokens = usage.prompt_token_count;
			self.usage.output_tokens = usage.candidates_token_count.unwrap_or_default();
			self.usage.total_tokens = usage.total_token_count;
			if let Some(cached) = usage.cached_content_token_count {
				self.usage.cached_tokens = Some(cached);
			}
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
			let Some(data) = &ev.data else { continue };
			let Ok(resp) = serde_json::from_str::<GenerateContentResponse>(data) else {
				debug!("ignoring unparseable gemini stream chunk");
				continue;
			};
			self.observe(&resp);
			for chunk in self.translate_stream_chunk(&resp) {
				let data = serde_json::to_string(&chunk).map_err(AIError::ResponseMarshal)?;
				encoder
					.encode(SseEvent::data(data), &mut out)
					.map_err(|e| AIError::StreamParsing(e.into()))?;
			}
		}
		if end_of_stream {
			// The final usage chunk mirrors what OpenAI emits under
			// stream_options.include_usage.
			let usage_chunk = universal::ChatCompletionStreamResponse {
				id: self.message_id.clone(),
				object: "chat.completion.chunk".to_string(),
				created: self.created,
				model: self.model_name(),
				choices: vec![],
				usage: Some(universal::Usage {
					prompt_tokens: self.usage.input_tokens,
					completion_tokens: self.usage.output_tokens,
					total_tokens: self.usage.total_tokens,
					prompt_tokens_details: self.usage.cached_tokens.map(|cached| {
						universal::PromptTokensDetails {
							cached_tokens: Some(cached),
						}
					}),
				}),
			};
			let data = serde_json::to_string(&usage_chunk).map_err(AIError::ResponseMarshal)?;
			encoder
				.encode(SseEvent::data(data), &mut out)
				.map_err(|e| AIError::StreamParsing(e.into()))?;
			encoder
				.encode(SseEvent::data("[DONE]"), &mut out)
				.map_err(|e| AIError::StreamParsing(e.into()))?;
		}
		Ok(out.to_vec())
	}

	/// Demultiplex one streamed GenerateContentResponse into OpenAI chunks.
	fn translate_stream_chunk(
		&mut self,
		resp: &GenerateContentResponse,
	) -> Vec<universal::ChatCompletionStreamResponse> {
		let mut chunks = Vec::new();
		let model = self.model_name();
		for candidate in &resp.candidates {
			let index = candidate.index.unwrap_or(0);
			let mut delta = universal::StreamDelta {
				role: Some(universal::Role::Assistant),
				..Default::default()
			};
			let mut tool_calls = Vec::new();
			// Position among the chunk's function-call parts, counted over
			// every call seen (duplicate or not). Gemini re-sends the full
			// accumulated call list each chunk, so this position is stable
			// across chunks and keys the dedup set together with the name.
			let mut call_position = 0u32;
			if let Some(content) = &candidate.content {
				for part in &content.parts {
					if let Some(text) = &part.text {
						match &mut delta.content {
							Some(existing) => existing.push_str(text),
							None => delta.content = Some(text.clone()),
						}
					}
					if let Some(call) = &part.function_call {
						let tool_index = call_position;
						call_position += 1;
						if !self
							.emitted_tool_calls
							.insert((call.name.clone(), tool_index))
						{
							continue;
						}
						tool_calls.push(universal::StreamToolCall {
							index: tool_index,
							id: Some(format!("call-{}", uuid::Uuid::new_v4())),
							r#type: Some("function".to_string()),
							function: universal::FunctionCallDelta {
								name: Some(call.name.clone()),
								arguments: Some(sanitize_tool_arguments(&call.args)),
							},
						});
					}
				}
			}
			if !tool_calls.is_empty() {
				delta.tool_calls = Some(tool_calls);
			}
			let finish_reason = candidate
				.finish_reason
				.as_deref()
				.map(translate_finish_reason);
			if delta.content.is_none() && delta.tool_calls.is_none() && finish_reason.is_none() {
				continue;
			}
			if finish_reason.is_some() {
				if self.saw_finish {
					continue;
				}
				self.saw_finish = true;
			}
			chunks.push(universal::ChatCompletionStreamResponse {
				id: self.message_id.clone(),
				object: "chat.completion.chunk".to_string(),
				created: self.created,
				model: model.clone(),
				choices: vec![universal::StreamChoice {
					index,
					delta,
					finish_reason,
				}],
				usage: None,
			});
		}
		chunks
	}

	pub fn response_error(&mut self, status: u16, body: &[u8]) -> Result<Vec<u8>, AIError> {
		let err = match serde_json::from_slice::<GeminiErrorResponse>(body) {
			Ok(resp) => universal::ErrorResponse {
				error: universal::ErrorBody {
					r#type: if (400..500).contains(&status) {
						"invalid_request_error".to_string()
					} else {
						"api_error".to_string()
					},
					message: resp.error.message,
					param: None,
					code: resp.error.status,
				},
			},
			Err(_) => universal::ErrorResponse::invalid_request(String::from_utf8_lossy(body)),
		};
		Ok(err.to_bytes())
	}
}

fn translate_finish_reason(reason: &str) -> universal::FinishReason {
	match reason {
		"STOP" => universal::FinishReason::Stop,
		"MAX_TOKENS" => universal::FinishReason::Length,
		"SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
			universal::FinishReason::ContentFilter
		},
		_ => universal::FinishReason::Stop,
	}
}

pub(super) fn translate_request(
	req: &universal::ChatCompletionRequest,
) -> Result<GenerateContentRequest, AIError> {
	let system = req.system_text();

	// OpenAI tool messages reference calls by ID, Gemini by function name.
	let id_to_name: HashMap<&str, &str> = req
		.messages
		.iter()
		.flat_map(|m| m.tool_calls.iter().flatten())
		.filter_map(|c| c.id.as_deref().map(|id| (id, c.function.name.as_str())))
		.collect();

	let contents = req
		.messages
		.iter()
		.filter(|msg| !matches!(msg.role, universal::Role::System | universal::Role::Developer))
		.filter_map(|msg| {
			let mut parts = Vec::new();
			match msg.role {
				universal::Role::Tool => {
					let name = msg
						.tool_call_id
						.as_deref()
						.and_then(|id| id_to_name.get(id).copied())
						.or(msg.tool_call_id.as_deref())
						.unwrap_or_default()
						.to_string();
					let text = msg.content.as_ref().map(|c| c.text()).unwrap_or_default();
					let response = serde_json::from_str(&text)
						.unwrap_or(serde_json::json!({ "result": text }));
					parts.push(types::Part {
						function_response: Some(types::FunctionResponse { name, response }),
						..Default::default()
					});
				},
				_ => {
					if let Some(content) = &msg.content {
						let text = content.text();
						if !text.is_empty() {
							parts.push(types::Part {
								text: Some(text),
								..Default::default()
							});
						}
					}
					for call in msg.tool_calls.iter().flatten() {
						parts.push(types::Part {
							function_call: Some(types::FunctionCall {
								name: call.function.name.clone(),
								args: serde_json::from_str(&call.function.arguments)
									.unwrap_or(serde_json::Value::Object(Default::default())),
							}),
							..Default::default()
						});
					}
				},
			}
			if parts.is_empty() {
				return None;
			}
			// Gemini only knows "user" and "model" roles.
			let role = match msg.role {
				universal::Role::Assistant => "model",
				_ => "user",
			};
			Some(types::Content {
				role: Some(role.to_string()),
				parts,
			})
		})
		.collect_vec();

	let tools = req.tools.as_ref().map(|tools| {
		vec![types::Tool {
			function_declarations: tools
				.iter()
				.map(|t| types::FunctionDeclaration {
					name: t.function.name.clone(),
					description: t.function.description.clone(),
					parameters: t.function.parameters.clone().map(downgrade_schema),
				})
				.collect_vec(),
		}]
	});

	let tool_config = req.tool_choice.as_ref().map(|tc| {
		let config = match tc {
			universal::ToolChoice::Mode(m) => match m.as_str() {
				"none" => types::FunctionCallingConfig {
					mode: "NONE".to_string(),
					allowed_function_names: None,
				},
				"required" => types::FunctionCallingConfig {
					mode: "ANY".to_string(),
					allowed_function_names: None,
				},
				_ => types::FunctionCallingConfig {
					mode: "AUTO".to_string(),
					allowed_function_names: None,
				},
			},
			universal::ToolChoice::Named(named) => types::FunctionCallingConfig {
				mode: "ANY".to_string(),
				allowed_function_names: Some(vec![named.function.name.clone()]),
			},
		};
		types::ToolConfig {
			function_calling_config: config,
		}
	});

	let generation_config = build_generation_config(req)?;

	Ok(GenerateContentRequest {
		contents,
		system_instruction: if system.is_empty() {
			None
		} else {
			Some(types::Content {
				role: None,
				parts: vec![types::Part {
					text: Some(system),
					..Default::default()
				}],
			})
		},
		tools,
		tool_config,
		generation_config,
	})
}

/// Structured-output options are mutually exclusive; exactly one of
/// response_format / guided_choice / guided_regex / guided_json may drive
/// the response schema.
fn build_generation_config(
	req: &universal::ChatCompletionRequest,
) -> Result<Option<types::GenerationConfig>, AIError> {
	let mut config = types::GenerationConfig {
		temperature: req.temperature,
		top_p: req.top_p,
		max_output_tokens: req.max_tokens(),
		candidate_count: req.n,
		seed: req.seed,
		frequency_penalty: req.frequency_penalty,
		presence_penalty: req.presence_penalty,
		stop_sequences: req.stop_sequences(),
		response_mime_type: None,
		response_schema: None,
		response_json_schema: None,
	};

	let guided = [
		req.guided_choice.is_some(),
		req.guided_regex.is_some(),
		req.guided_json.is_some(),
		matches!(&req.response_format, Some(f) if f.r#type == "json_schema"),
	];
	if guided.iter().filter(|g| **g).count() > 1 {
		return Err(AIError::GuidedDecodingConflict);
	}

	if let Some(choices) = &req.guided_choice {
		config.response_mime_type = Some("text/x.enum".to_string());
		config.response_schema = Some(serde_json::json!({
			"type": "STRING",
			"enum": choices,
		}));
	} else if let Some(regex) = &req.guided_regex {
		config.response_mime_type = Some("text/plain".to_string());
		config.response_schema = Some(serde_json::json!({
			"type": "STRING",
			"pattern": regex,
		}));
	} else if let Some(schema) = &req.guided_json {
		config.response_mime_type = Some("application/json".to_string());
		config.response_schema = Some(downgrade_schema(schema.clone()));
	} else if let Some(format) = &req.response_format {
		match format.r#type.as_str() {
			"json_object" => {
				config.response_mime_type = Some("application/json".to_string());
			},
			"json_schema" => {
				let schema = format
					.json_schema
					.as_ref()
					.map(|s| s.schema.clone())
					.unwrap_or(serde_json::json!({}));
				config.response_mime_type = Some("application/json".to_string());
				// Only the 2.5 generation accepts raw JSON schema; earlier
				// models get the Gemini schema dialect.
				if req.model.starts_with("gemini-2.5") {
					config.response_json_schema = Some(schema);
				} else {
					config.response_schema = Some(downgrade_schema(schema));
				}
			},
			_ => {},
		}
	}

	let empty = config.temperature.is_none()
		&& config.top_p.is_none()
		&& config.max_output_tokens.is_none()
		&& config.candidate_count.is_none()
		&& config.seed.is_none()
		&& config.frequency_penalty.is_none()
		&& config.presence_penalty.is_none()
		&& config.stop_sequences.is_empty()
		&& config.response_mime_type.is_none()
		&& config.response_schema.is_none()
		&& config.response_json_schema.is_none();
	Ok(if empty { None } else { Some(config) })
}

/// Downgrade a JSON schema to the Gemini schema dialect: drop keywords the
/// dialect rejects and keep the structural core.
pub(super) fn downgrade_schema(mut schema: serde_json::Value) -> serde_json::Value {
	fn walk(value: &mut serde_json::Value) {
		let Some(obj) = value.as_object_mut() else {
			return;
		};
		for key in [
			"$schema",
			"$id",
			"$defs",
			"definitions",
			"additionalProperties",
			"unevaluatedProperties",
			"exclusiveMaximum",
			"exclusiveMinimum",
			"patternProperties",
			"strict",
		] {
			obj.remove(key);
		}
		for (_, v) in obj.iter_mut() {
			match v {
				serde_json::Value::Object(_) => walk(v),
				serde_json::Value::Array(items) => {
					for item in items {
						walk(item);
					}
				},
				_ => {},
			}
		}
	}
	walk(&mut schema);
	schema
}

pub(super) fn translate_response(
	resp: &GenerateContentResponse,
	id: &str,
	created: i64,
	model: String,
) -> universal::ChatCompletionResponse {
	let choices = resp
		.candidates
		.iter()
		.enumerate()
		.map(|(i, candidate)| translate_candidate(candidate, i as u32))
		.collect_vec();

	let usage = resp.usage_metadata.as_ref().map(|u| universal::Usage {
		prompt_tokens: u.prompt_token_count,
		completion_tokens: u.candidates_token_count.unwrap_or_default(),
		total_tokens: u.total_token_count,
		prompt_tokens_details: u.cached_content_token_count.map(|cached| {
			universal::PromptTokensDetails {
				cached_tokens: Some(cached),
			}
		}),
	});

	universal::ChatCompletionResponse {
		id: id.to_string(),
		object: "chat.completion".to_string(),
		created,
		model,
		choices,
		usage,
	}
}

fn translate_candidate(candidate: &Candidate, default_index: u32) -> universal::Choice {
	let mut content: Option<String> = None;
	let mut tool_calls = Vec::new();
	if let Some(c) = &candidate.content {
		for part in &c.parts {
			if let Some(text) = &part.text {
				match &mut content {
					Some(existing) => existing.push_str(text),
					None => content = Some(text.clone()),
				}
			}
			if let Some(call) = &part.function_call {
				tool_calls.push(universal::ToolCall {
					id: Some(format!("call-{}", uuid::Uuid::new_v4())),
					r#type: "function".to_string(),
					function: universal::FunctionCall {
						name: call.name.clone(),
						arguments: sanitize_tool_arguments(&call.args),
					},
				});
			}
		}
	}
	universal::Choice {
		index: candidate.index.unwrap_or(default_index),
		message: universal::ResponseMessage {
			role: universal::Role::Assistant,
			content,
			tool_calls: if tool_calls.is_empty() {
				None
			} else {
				Some(tool_calls)
			},
		},
		finish_reason: candidate
			.finish_reason
			.as_deref()
			.map(translate_finish_reason),
	}
}

/// Gemini tool-call arguments come back with two recurring defects: a
/// duplicated object (`{...}{...}`) and string values that were quoted
/// twice (`"\"x\""`). Both are repaired before the call reaches the client.
pub(super) fn sanitize_tool_arguments(args: &serde_json::Value) -> String {
	let repaired = match args {
		serde_json::Value::String(s) => {
			let first = first_json_object(s);
			match serde_json::from_str::<serde_json::Value>(first) {
				Ok(v) => v,
				Err(_) => return s.clone(),
			}
		},
		other => other.clone(),
	};
	let unwrapped = unwrap_overquoted(repaired);
	serde_json::to_string(&unwrapped).unwrap_or_else(|_| "{}".to_string())
}

/// Truncate concatenated JSON objects to the first complete one.
fn first_json_object(s: &str) -> &str {
	let mut depth = 0usize;
	let mut in_string = false;
	let mut escaped = false;
	for (i, c) in s.char_indices() {
		if in_string {
			match c {
				'\\' if !escaped => escaped = true,
				'"' if !escaped => in_string = false,
				_ => escaped = false,
			}
			if c != '\\' {
				escaped = false;
			}
			continue;
		}
		match c {
			'"' => in_string = true,
			'{' => depth += 1,
			'}' => {
				depth = depth.saturating_sub(1);
				if depth == 0 {
					return &s[..=i];
				}
			},
			_ => {},
		}
	}
	s
}

fn unwrap_overquoted(value: serde_json::Value) -> serde_json::Value {
	match value {
		serde_json::Value::String(s) => {
			if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
				if let Ok(inner) = serde_json::from_str::<String>(&s) {
					return serde_json::Value::String(inner);
				}
			}
			serde_json::Value::String(s)
		},
		serde_json::Value::Object(map) => serde_json::Value::Object(
			map
				.into_iter()
				.map(|(k, v)| (k, unwrap_overquoted(v)))
				.collect(),
		),
		serde_json::Value::Array(items) => {
			serde_json::Value::Array(items.into_iter().map(unwrap_overquoted).collect())
		},
		other => other,
	}
}

pub(super) mod types {
	use serde::{Deserialize, Serialize};

	#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
	#[serde(rename_all = "camelCase")]
	pub struct GenerateContentRequest {
		pub contents: Vec<Content>,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub system_instruction: Option<Content>,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub tools: Option<Vec<Tool>>,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub tool_config: Option<ToolConfig>,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub generation_config: Option<GenerationConfig>,
	}

	#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
	pub struct Content {
		#[serde(skip_serializing_if = "Option::is_none")]
		pub role: Option<String>,
		pub parts: Vec<Part>,
	}

	#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
	#[serde(rename_all = "camelCase")]
	pub struct Part {
		#[serde(skip_serializing_if = "Option::is_none")]
		pub text: Option<String>,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub function_call: Option<FunctionCall>,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub function_response: Option<FunctionResponse>,
	}

	#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
	pub struct FunctionCall {
		pub name: String,
		#[serde(default)]
		pub args: serde_json::Value,
	}

	#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
	pub struct FunctionResponse {
		pub name: String,
		pub response: serde_json::Value,
	}

	#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
	#[serde(rename_all = "camelCase")]
	pub struct Tool {
		pub function_declarations: Vec<FunctionDeclaration>,
	}

	#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
	pub struct FunctionDeclaration {
		pub name: String,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub description: Option<String>,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub parameters: Option<serde_json::Value>,
	}

	#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
	#[serde(rename_all = "camelCase")]
	pub struct ToolConfig {
		pub function_calling_config: FunctionCallingConfig,
	}

	#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
	#[serde(rename_all = "camelCase")]
	pub struct FunctionCallingConfig {
		pub mode: String,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub allowed_function_names: Option<Vec<String>>,
	}

	#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
	#[serde(rename_all = "camelCase")]
	pub struct GenerationConfig {
		#[serde(skip_serializing_if = "Option::is_none")]
		pub temperature: Option<f64>,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub top_p: Option<f64>,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub max_output_tokens: Option<u64>,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub candidate_count: Option<u32>,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub seed: Option<i64>,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub frequency_penalty: Option<f64>,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub presence_penalty: Option<f64>,
		#[serde(skip_serializing_if = "Vec::is_empty", default)]
		pub stop_sequences: Vec<String>,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub response_mime_type: Option<String>,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub response_schema: Option<serde_json::Value>,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub response_json_schema: Option<serde_json::Value>,
	}

	#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
	#[serde(rename_all = "camelCase")]
	pub struct GenerateContentResponse {
		#[serde(default)]
		pub candidates: Vec<Candidate>,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub usage_metadata: Option<UsageMetadata>,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub model_version: Option<String>,
	}

	#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
	#[serde(rename_all = "camelCase")]
	pub struct Candidate {
		#[serde(skip_serializing_if = "Option::is_none")]
		pub content: Option<Content>,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub finish_reason: Option<String>,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub index: Option<u32>,
	}

	#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
	#[serde(rename_all = "camelCase")]
	pub struct UsageMetadata {
		#[serde(default)]
		pub prompt_token_count: u32,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub candidates_token_count: Option<u32>,
		#[serde(default)]
		pub total_token_count: u32,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub cached_content_token_count: Option<u32>,
	}

	#[derive(Clone, Deserialize, Debug)]
	pub struct GeminiErrorResponse {
		pub error: GeminiError,
	}

	#[derive(Clone, Deserialize, Debug)]
	pub struct GeminiError {
		pub message: String,
		#[serde(default)]
		pub status: Option<String>,
	}
}
