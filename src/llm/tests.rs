use bytes::{Bytes, BytesMut};
use serde_json::{Value, json};
use tokio_util::codec::Encoder;

use super::*;
use crate::parse::Frames;
use crate::strng;
use crate::parse::aws_sse::{EventStreamEncoder, event_message};
use crate::parse::sse::SseDecoder;

fn openai_schema() -> VersionedApiSchema {
	VersionedApiSchema {
		name: ApiSchemaName::OpenAI,
		version: None,
	}
}

fn chat_request() -> Bytes {
	Bytes::from_static(
		br#"{"model":"gpt-4.1-nano","messages":[{"role":"user","content":"Which ocean has Bouvet Island?"}]}"#,
	)
}

fn sse_events(raw: &[u8]) -> Vec<Value> {
	Frames::new(SseDecoder::new())
		.push(raw, true)
		.unwrap()
		.into_iter()
		.filter_map(|ev| ev.data)
		.filter(|d| d != "[DONE]")
		.map(|d| serde_json::from_str(&d).unwrap())
		.collect()
}

#[test]
fn chat_passthrough_round_trip() {
	let mut t = Translator::new(
		RouteKind::ChatCompletions,
		&openai_schema(),
		None,
		None,
	)
	.unwrap();
	let transform = t.request_body(&chat_request()).unwrap();
	assert_eq!(transform.path.as_deref(), Some("/v1/chat/completions"));
	assert!(transform.body.is_none(), "passthrough must not rewrite the body");
	assert_eq!(transform.model.as_str(), "gpt-4.1-nano");
	assert!(!transform.streaming);

	let backend_reply = json!({
		"id": "chatcmpl-1",
		"object": "chat.completion",
		"created": 1732000000,
		"model": "gpt-4.1-nano",
		"choices": [{
			"index": 0,
			"message": {"role": "assistant", "content": "Southern Ocean"},
			"finish_reason": "stop"
		}],
		"usage": {"prompt_tokens": 22, "completion_tokens": 2, "total_tokens": 24}
	});
	let reply = serde_json::to_vec(&backend_reply).unwrap();
	let out = t.response_body(&reply, true).unwrap();
	// The client sees the backend bytes verbatim.
	assert_eq!(out, reply);
	assert_eq!(
		t.usage(),
		LLMTokenUsage {
			input_tokens: 22,
			output_tokens: 2,
			total_tokens: 24,
			cached_tokens: None,
		}
	);
	assert_eq!(t.response_model().as_deref(), Some("gpt-4.1-nano"));
}

#[test]
fn passthrough_applies_model_override_only() {
	let mut t = Translator::new(
		RouteKind::ChatCompletions,
		&openai_schema(),
		Some(strng::new("gpt-4.1-mini")),
		None,
	)
	.unwrap();
	let transform = t.request_body(&chat_request()).unwrap();
	let body: Value = serde_json::from_slice(&transform.body.unwrap()).unwrap();
	assert_eq!(body["model"], "gpt-4.1-mini");
	assert_eq!(
		body["messages"][0]["content"],
		"Which ocean has Bouvet Island?"
	);
	assert_eq!(transform.model.as_str(), "gpt-4.1-mini");
}

#[test]
fn retry_translation_is_byte_identical() {
	// An upstream attempt for backend B2 after a failed B1 attempt must
	// produce exactly the bytes a first attempt for B2 would have.
	let transform = |raw: &Bytes| {
		let mut t = Translator::new(
			RouteKind::ChatCompletions,
			&VersionedApiSchema {
				name: ApiSchemaName::AWSBedrock,
				version: None,
			},
			None,
			None,
		)
		.unwrap();
		t.request_body(raw).unwrap()
	};
	let raw = chat_request();
	let first = transform(&raw);
	let retried = transform(&raw);
	assert_eq!(first.body, retried.body);
	assert_eq!(first.path, retried.path);
}

#[test]
fn streaming_passthrough_synthesizes_usage() {
	let mut t = Translator::new(
		RouteKind::ChatCompletions,
		&openai_schema(),
		None,
		None,
	)
	.unwrap();
	let req = Bytes::from_static(
		br#"{"model":"gpt-4.1-nano","stream":true,"messages":[{"role":"user","content":"hi"}]}"#,
	);
	let transform = t.request_body(&req).unwrap();
	// Usage is forced on for upstream streams.
	let body: Value = serde_json::from_slice(&transform.body.unwrap()).unwrap();
	assert_eq!(body["stream_options"]["include_usage"], true);

	let chunk = |text: &str| {
		format!(
			r#"data: {{"id":"c1","object":"chat.completion.chunk","created":1,"model":"gpt-4.1-nano","choices":[{{"index":0,"delta":{{"content":"{text}"}},"finish_reason":null}}]}}"#
		)
	};
	let mut stream = String::new();
	for i in 0..5 {
		stream.push_str(&chunk(&format!("t{i}")));
		stream.push_str("\n\n");
	}
	stream.push_str("data: [DONE]\n\n");

	let out = t.response_body(stream.as_bytes(), true).unwrap();
	let events = sse_events(&out);
	// 5 content chunks plus a synthesized usage chunk.
	assert_eq!(events.len(), 6);
	let last = events.last().unwrap();
	assert!(last["usage"].is_object());
	assert_eq!(last["choices"].as_array().unwrap().len(), 0);
	// [DONE] still terminates the stream.
	assert!(String::from_utf8_lossy(&out).contains("data: [DONE]"));
}

#[test]
fn streaming_passthrough_forwards_backend_usage() {
	let mut t = Translator::new(
		RouteKind::ChatCompletions,
		&openai_schema(),
		None,
		None,
	)
	.unwrap();
	let req = Bytes::from_static(br#"{"model":"m","stream":true,"messages":[]}"#);
	t.request_body(&req).unwrap();
	let stream = concat!(
		r#"data: {"id":"c1","object":"chat.completion.chunk","created":1,"model":"m","choices":[{"index":0,"delta":{"content":"x"},"finish_reason":null}]}"#,
		"\n\n",
		r#"data: {"id":"c1","object":"chat.completion.chunk","created":1,"model":"m","choices":[],"usage":{"prompt_tokens":5,"completion_tokens":7,"total_tokens":12}}"#,
		"\n\n",
		"data: [DONE]\n\n",
	);
	let out = t.response_body(stream.as_bytes(), true).unwrap();
	let events = sse_events(&out);
	assert_eq!(events.len(), 2, "no extra usage chunk is synthesized");
	assert_eq!(t.usage().total_tokens, 12);
}

#[test]
fn bedrock_request_translation() {
	let mut t = Translator::new(
		RouteKind::ChatCompletions,
		&VersionedApiSchema {
			name: ApiSchemaName::AWSBedrock,
			version: None,
		},
		Some(strng::new("anthropic.claude-3-haiku-20240307-v1:0")),
		None,
	)
	.unwrap();
	let raw = Bytes::from_static(
		br#"{"model":"claude","messages":[
			{"role":"system","content":"Be terse."},
			{"role":"user","content":"Which ocean has Bouvet Island?"}
		],"max_tokens":100,"temperature":0.5,"stop":["END"]}"#,
	);
	let transform = t.request_body(&raw).unwrap();
	assert_eq!(
		transform.path.as_deref(),
		Some("/model/anthropic.claude-3-haiku-20240307-v1:0/converse")
	);
	let body: Value = serde_json::from_slice(&transform.body.unwrap()).unwrap();
	assert_eq!(body["system"][0]["text"], "Be terse.");
	assert_eq!(body["messages"][0]["role"], "user");
	assert_eq!(
		body["messages"][0]["content"][0]["text"],
		"Which ocean has Bouvet Island?"
	);
	assert_eq!(body["inferenceConfig"]["maxTokens"], 100);
	assert_eq!(body["inferenceConfig"]["stopSequences"][0], "END");
	// The model travels in the path, not the body.
	assert!(body.get("modelId").is_none());
}

#[test]
fn bedrock_streaming_request_uses_stream_path() {
	let mut t = Translator::new(
		RouteKind::ChatCompletions,
		&VersionedApiSchema {
			name: ApiSchemaName::AWSBedrock,
			version: None,
		},
		None,
		None,
	)
	.unwrap();
	let raw = Bytes::from_static(br#"{"model":"amazon.nova-lite-v1:0","stream":true,"messages":[]}"#);
	let transform = t.request_body(&raw).unwrap();
	assert_eq!(
		transform.path.as_deref(),
		Some("/model/amazon.nova-lite-v1:0/converse-stream")
	);
}

#[test]
fn bedrock_response_translation() {
	let mut t = Translator::new(
		RouteKind::ChatCompletions,
		&VersionedApiSchema {
			name: ApiSchemaName::AWSBedrock,
			version: None,
		},
		None,
		None,
	)
	.unwrap();
	let raw = chat_request();
	t.request_body(&raw).unwrap();
	let reply = json!({
		"output": {"message": {"role": "assistant", "content": [{"text": "Southern Ocean"}]}},
		"stopReason": "end_turn",
		"usage": {"inputTokens": 22, "outputTokens": 2, "totalTokens": 24}
	});
	let out = t
		.response_body(&serde_json::to_vec(&reply).unwrap(), true)
		.unwrap();
	let resp: Value = serde_json::from_slice(&out).unwrap();
	assert_eq!(resp["object"], "chat.completion");
	assert_eq!(resp["choices"][0]["message"]["content"], "Southern Ocean");
	assert_eq!(resp["choices"][0]["finish_reason"], "stop");
	assert_eq!(resp["usage"]["prompt_tokens"], 22);
	// Bedrock reports no model; the request model is echoed.
	assert_eq!(resp["model"], "gpt-4.1-nano");
	assert_eq!(t.usage().total_tokens, 24);
}

#[test]
fn bedrock_event_stream_becomes_openai_sse() {
	let mut t = Translator::new(
		RouteKind::ChatCompletions,
		&VersionedApiSchema {
			name: ApiSchemaName::AWSBedrock,
			version: None,
		},
		None,
		None,
	)
	.unwrap();
	let raw = Bytes::from_static(br#"{"model":"m","stream":true,"messages":[]}"#);
	t.request_body(&raw).unwrap();

	let mut frames = BytesMut::new();
	let mut enc = EventStreamEncoder;
	for msg in [
		event_message("messageStart", &br#"{"role":"assistant"}"#[..]),
		event_message(
			"contentBlockDelta",
			&br#"{"delta":{"text":"Southern Ocean"},"contentBlockIndex":0}"#[..],
		),
		event_message("messageStop", &br#"{"stopReason":"end_turn"}"#[..]),
		event_message(
			"metadata",
			&br#"{"usage":{"inputTokens":22,"outputTokens":2,"totalTokens":24}}"#[..],
		),
	] {
		enc.encode(msg, &mut frames).unwrap();
	}

	// Split the binary frames at an arbitrary offset to prove buffering.
	let mid = frames.len() / 3;
	let mut out = t.response_body(&frames[..mid], false).unwrap();
	out.extend(t.response_body(&frames[mid..], true).unwrap());

	let events = sse_events(&out);
	assert_eq!(events.len(), 4);
	assert_eq!(events[0]["choices"][0]["delta"]["role"], "assistant");
	assert_eq!(events[1]["choices"][0]["delta"]["content"], "Southern Ocean");
	assert_eq!(events[2]["choices"][0]["finish_reason"], "stop");
	assert_eq!(events[3]["usage"]["total_tokens"], 24);
	assert!(String::from_utf8_lossy(&out).ends_with("data: [DONE]\n\n"));
	assert_eq!(t.usage().input_tokens, 22);
}

#[test]
fn openai_to_anthropic_request() {
	let mut t = Translator::new(
		RouteKind::ChatCompletions,
		&VersionedApiSchema {
			name: ApiSchemaName::Anthropic,
			version: None,
		},
		None,
		None,
	)
	.unwrap();
	let raw = Bytes::from_static(
		br#"{"model":"claude-3-haiku","messages":[
			{"role":"system","content":"Be terse."},
			{"role":"user","content":"Hi"}
		],"max_tokens":100}"#,
	);
	let transform = t.request_body(&raw).unwrap();
	assert_eq!(transform.path.as_deref(), Some("/v1/messages"));
	assert!(
		transform
			.headers
			.iter()
			.any(|(k, v)| k == "anthropic-version" && v == "2023-06-01")
	);
	let body: Value = serde_json::from_slice(&transform.body.unwrap()).unwrap();
	assert_eq!(body["system"], "Be terse.");
	assert_eq!(body["max_tokens"], 100);
	assert_eq!(body["messages"][0]["content"][0]["text"], "Hi");
}

#[test]
fn anthropic_response_to_openai() {
	let mut t = Translator::new(
		RouteKind::ChatCompletions,
		&VersionedApiSchema {
			name: ApiSchemaName::Anthropic,
			version: None,
		},
		None,
		None,
	)
	.unwrap();
	t.request_body(&chat_request()).unwrap();
	let reply = json!({
		"id": "msg_1",
		"type": "message",
		"role": "assistant",
		"content": [{"type": "text", "text": "Southern Ocean"}],
		"model": "claude-3-haiku-20240307",
		"stop_reason": "end_turn",
		"stop_sequence": null,
		"usage": {"input_tokens": 22, "output_tokens": 2}
	});
	let out = t
		.response_body(&serde_json::to_vec(&reply).unwrap(), true)
		.unwrap();
	let resp: Value = serde_json::from_slice(&out).unwrap();
	assert_eq!(resp["choices"][0]["message"]["content"], "Southern Ocean");
	assert_eq!(resp["choices"][0]["finish_reason"], "stop");
	assert_eq!(resp["usage"]["total_tokens"], 24);
	assert_eq!(t.response_model().as_deref(), Some("claude-3-haiku-20240307"));
}

#[test]
fn messages_client_against_openai_backend() {
	// An Anthropic /v1/messages client talking to an OpenAI backend.
	let mut t = Translator::new(
		RouteKind::AnthropicMessages,
		&openai_schema(),
		None,
		None,
	)
	.unwrap();
	let raw = Bytes::from_static(
		br#"{"model":"claude-3-haiku","max_tokens":100,"messages":[{"role":"user","content":"Hi"}]}"#,
	);
	let transform = t.request_body(&raw).unwrap();
	assert_eq!(transform.path.as_deref(), Some("/v1/chat/completions"));
	let body: Value = serde_json::from_slice(&transform.body.unwrap()).unwrap();
	assert_eq!(body["model"], "claude-3-haiku");
	assert_eq!(body["max_completion_tokens"], 100);
	assert_eq!(body["messages"][0]["content"], "Hi");

	let reply = json!({
		"id": "chatcmpl-9",
		"object": "chat.completion",
		"created": 1,
		"model": "gpt-4o",
		"choices": [{
			"index": 0,
			"message": {"role": "assistant", "content": "Hello from OpenAI!"},
			"finish_reason": "stop"
		}],
		"usage": {"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30}
	});
	let out = t
		.response_body(&serde_json::to_vec(&reply).unwrap(), true)
		.unwrap();
	let resp: Value = serde_json::from_slice(&out).unwrap();
	assert_eq!(resp["type"], "message");
	assert_eq!(resp["content"][0]["type"], "text");
	assert_eq!(resp["content"][0]["text"], "Hello from OpenAI!");
	assert_eq!(resp["stop_reason"], "end_turn");
	assert_eq!(resp["usage"]["input_tokens"], 10);
	assert_eq!(resp["usage"]["output_tokens"], 20);
}

#[test]
fn openai_error_maps_to_anthropic_status_types() {
	let cases = [
		(400, "invalid_request_error"),
		(401, "authentication_error"),
		(403, "permission_error"),
		(404, "not_found_error"),
		(413, "request_too_large"),
		(429, "rate_limit_error"),
		(500, "api_error"),
		(529, "overloaded_error"),
	];
	for (status, expected) in cases {
		let mut t = Translator::new(
			RouteKind::AnthropicMessages,
			&openai_schema(),
			None,
			None,
		)
		.unwrap();
		let out = t
			.response_error(
				status,
				br#"{"error":{"type":"some_error","message":"boom"}}"#,
			)
			.unwrap();
		let v: Value = serde_json::from_slice(&out).unwrap();
		assert_eq!(v["type"], "error");
		assert_eq!(v["error"]["type"], expected, "status {status}");
		assert_eq!(v["error"]["message"], "boom");
	}
}

#[test]
fn anthropic_stream_to_openai_chunks() {
	let mut t = Translator::new(
		RouteKind::ChatCompletions,
		&VersionedApiSchema {
			name: ApiSchemaName::Anthropic,
			version: None,
		},
		None,
		None,
	)
	.unwrap();
	let raw = Bytes::from_static(br#"{"model":"claude-3-haiku","stream":true,"messages":[]}"#);
	t.request_body(&raw).unwrap();

	let stream = concat!(
		"event: message_start\n",
		r#"data: {"type":"message_start","message":{"id":"msg_1","type":"message","role":"assistant","content":[],"model":"claude-3-haiku","stop_reason":null,"stop_sequence":null,"usage":{"input_tokens":22,"output_tokens":1}}}"#,
		"\n\n",
		"event: content_block_delta\n",
		r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Southern Ocean"}}"#,
		"\n\n",
		"event: message_delta\n",
		r#"data: {"type":"message_delta","delta":{"stop_reason":"end_turn","stop_sequence":null},"usage":{"output_tokens":2}}"#,
		"\n\n",
		"event: message_stop\n",
		r#"data: {"type":"message_stop"}"#,
		"\n\n",
	);
	let out = t.response_body(stream.as_bytes(), true).unwrap();
	let events = sse_events(&out);
	assert_eq!(events[0]["choices"][0]["delta"]["role"], "assistant");
	assert_eq!(events[1]["choices"][0]["delta"]["content"], "Southern Ocean");
	let finish = events
		.iter()
		.find(|e| !e["choices"][0]["finish_reason"].is_null())
		.unwrap();
	assert_eq!(finish["choices"][0]["finish_reason"], "stop");
	assert_eq!(t.usage().input_tokens, 22);
	assert_eq!(t.usage().output_tokens, 2);
	assert_eq!(t.usage().total_tokens, 24);
	assert!(String::from_utf8_lossy(&out).contains("data: [DONE]"));
}

#[test]
fn gemini_request_translation() {
	let mut t = Translator::new(
		RouteKind::ChatCompletions,
		&VersionedApiSchema {
			name: ApiSchemaName::GCPGemini,
			version: None,
		},
		None,
		None,
	)
	.unwrap();
	let raw = Bytes::from_static(
		br#"{"model":"gemini-2.0-flash","messages":[
			{"role":"system","content":"Be terse."},
			{"role":"user","content":"Hi"},
			{"role":"assistant","content":"Hello"}
		],"tools":[{"type":"function","function":{"name":"get_time","description":"time","parameters":{"type":"object"}}}],
		"tool_choice":"required","max_tokens":64}"#,
	);
	let transform = t.request_body(&raw).unwrap();
	assert_eq!(
		transform.path.as_deref(),
		Some("/v1beta/models/gemini-2.0-flash:generateContent")
	);
	let body: Value = serde_json::from_slice(&transform.body.unwrap()).unwrap();
	assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be terse.");
	assert_eq!(body["contents"][0]["role"], "user");
	// Assistant turns become the "model" role.
	assert_eq!(body["contents"][1]["role"], "model");
	assert_eq!(
		body["tools"][0]["functionDeclarations"][0]["name"],
		"get_time"
	);
	assert_eq!(body["toolConfig"]["functionCallingConfig"]["mode"], "ANY");
	assert_eq!(body["generationConfig"]["maxOutputTokens"], 64);
}

#[test]
fn vertex_paths_use_publisher_endpoints() {
	let mut t = Translator::new(
		RouteKind::ChatCompletions,
		&VersionedApiSchema {
			name: ApiSchemaName::GCPVertexAI,
			version: None,
		},
		None,
		Some(&VertexParams {
			project_id: strng::new("my-project"),
			region: Some(strng::new("us-central1")),
		}),
	)
	.unwrap();
	let raw = Bytes::from_static(br#"{"model":"gemini-2.0-flash","messages":[]}"#);
	let transform = t.request_body(&raw).unwrap();
	assert_eq!(
		transform.path.as_deref(),
		Some("/v1/projects/my-project/locations/us-central1/publishers/google/models/gemini-2.0-flash:generateContent")
	);
}

#[test]
fn gemini_guided_options_are_mutually_exclusive() {
	let mut t = Translator::new(
		RouteKind::ChatCompletions,
		&VersionedApiSchema {
			name: ApiSchemaName::GCPGemini,
			version: None,
		},
		None,
		None,
	)
	.unwrap();
	let raw = Bytes::from_static(
		br#"{"model":"gemini-2.0-flash","messages":[],"guided_choice":["a"],"guided_regex":"x"}"#,
	);
	assert!(matches!(
		t.request_body(&raw),
		Err(AIError::GuidedDecodingConflict)
	));
}

#[test]
fn gemini_response_translation() {
	let mut t = Translator::new(
		RouteKind::ChatCompletions,
		&VersionedApiSchema {
			name: ApiSchemaName::GCPGemini,
			version: None,
		},
		None,
		None,
	)
	.unwrap();
	t.request_body(&Bytes::from_static(br#"{"model":"gemini-2.0-flash","messages":[]}"#))
		.unwrap();
	let reply = json!({
		"candidates": [{
			"content": {"role": "model", "parts": [{"text": "Southern Ocean"}]},
			"finishReason": "STOP",
			"index": 0
		}],
		"usageMetadata": {
			"promptTokenCount": 22,
			"candidatesTokenCount": 2,
			"totalTokenCount": 24,
			"cachedContentTokenCount": 5
		},
		"modelVersion": "gemini-2.0-flash-001"
	});
	let out = t
		.response_body(&serde_json::to_vec(&reply).unwrap(), true)
		.unwrap();
	let resp: Value = serde_json::from_slice(&out).unwrap();
	assert_eq!(resp["choices"][0]["message"]["content"], "Southern Ocean");
	assert_eq!(resp["choices"][0]["finish_reason"], "stop");
	assert_eq!(resp["usage"]["prompt_tokens"], 22);
	assert_eq!(
		t.usage(),
		LLMTokenUsage {
			input_tokens: 22,
			output_tokens: 2,
			total_tokens: 24,
			cached_tokens: Some(5),
		}
	);
	assert_eq!(t.response_model().as_deref(), Some("gemini-2.0-flash-001"));
}

#[test]
fn gemini_stream_dedupes_repeated_tool_calls() {
	let mut t = Translator::new(
		RouteKind::ChatCompletions,
		&VersionedApiSchema {
			name: ApiSchemaName::GCPGemini,
			version: None,
		},
		None,
		None,
	)
	.unwrap();
	t.request_body(&Bytes::from_static(
		br#"{"model":"gemini-2.0-flash","stream":true,"messages":[]}"#,
	))
	.unwrap();

	let call_chunk = r#"data: {"candidates":[{"content":{"role":"model","parts":[{"functionCall":{"name":"get_time","args":{"tz":"UTC"}}}]},"index":0}]}"#;
	// Gemini re-sends the complete tool call on a later chunk.
	let stream = format!("{call_chunk}\n\n{call_chunk}\n\n");
	let out = t.response_body(stream.as_bytes(), true).unwrap();
	let events = sse_events(&out);
	let with_tools: Vec<_> = events
		.iter()
		.filter(|e| {
			e["choices"]
				.as_array()
				.is_some_and(|c| c.iter().any(|ch| ch["delta"]["tool_calls"].is_array()))
		})
		.collect();
	assert_eq!(with_tools.len(), 1, "duplicate tool call must be dropped");
}

#[test]
fn gemini_stream_dedupes_multiple_resent_tool_calls() {
	let mut t = Translator::new(
		RouteKind::ChatCompletions,
		&VersionedApiSchema {
			name: ApiSchemaName::GCPGemini,
			version: None,
		},
		None,
		None,
	)
	.unwrap();
	t.request_body(&Bytes::from_static(
		br#"{"model":"gemini-2.0-flash","stream":true,"messages":[]}"#,
	))
	.unwrap();

	// Two distinct calls arrive together, and the later chunk re-sends the
	// full accumulated list. Each call must reach the client exactly once.
	let call_chunk = concat!(
		r#"data: {"candidates":[{"content":{"role":"model","parts":["#,
		r#"{"functionCall":{"name":"get_time","args":{"tz":"UTC"}}},"#,
		r#"{"functionCall":{"name":"get_weather","args":{"city":"Oslo"}}}"#,
		r#"]},"index":0}]}"#,
	);
	let stream = format!("{call_chunk}\n\n{call_chunk}\n\n");
	let out = t.response_body(stream.as_bytes(), true).unwrap();
	let events = sse_events(&out);
	let emitted: Vec<(String, u64)> = events
		.iter()
		.filter_map(|e| e["choices"][0]["delta"]["tool_calls"].as_array())
		.flatten()
		.map(|c| {
			(
				c["function"]["name"].as_str().unwrap().to_string(),
				c["index"].as_u64().unwrap(),
			)
		})
		.collect();
	assert_eq!(
		emitted,
		vec![
			("get_time".to_string(), 0),
			("get_weather".to_string(), 1),
		]
	);
}

#[test]
fn gemini_sanitizes_malformed_tool_arguments() {
	use super::gemini::sanitize_tool_arguments;

	// Concatenated duplicate objects are truncated to the first.
	let args = Value::String(r#"{"tz":"UTC"}{"tz":"UTC"}"#.to_string());
	assert_eq!(sanitize_tool_arguments(&args), r#"{"tz":"UTC"}"#);

	// Over-quoted string values are unwrapped.
	let args = json!({"tz": "\"UTC\""});
	assert_eq!(sanitize_tool_arguments(&args), r#"{"tz":"UTC"}"#);

	// Well-formed arguments pass through.
	let args = json!({"tz": "UTC", "n": 3});
	let parsed: Value = serde_json::from_str(&sanitize_tool_arguments(&args)).unwrap();
	assert_eq!(parsed, args);
}

#[test]
fn azure_paths_use_deployments() {
	let mut t = Translator::new(
		RouteKind::ChatCompletions,
		&VersionedApiSchema {
			name: ApiSchemaName::AzureOpenAI,
			version: Some("2024-10-21".to_string()),
		},
		None,
		None,
	)
	.unwrap();
	let transform = t.request_body(&chat_request()).unwrap();
	assert_eq!(
		transform.path.as_deref(),
		Some("/openai/deployments/gpt-4.1-nano/chat/completions?api-version=2024-10-21")
	);
}

#[test]
fn embeddings_usage_extraction() {
	let mut t = Translator::new(
		RouteKind::Embeddings,
		&openai_schema(),
		None,
		None,
	)
	.unwrap();
	let raw = Bytes::from_static(br#"{"model":"text-embedding-3-small","input":"hello"}"#);
	let transform = t.request_body(&raw).unwrap();
	assert_eq!(transform.path.as_deref(), Some("/v1/embeddings"));

	let reply = json!({
		"object": "list",
		"data": [{"object": "embedding", "index": 0, "embedding": [0.1, 0.2]}],
		"model": "text-embedding-3-small",
		"usage": {"prompt_tokens": 8, "total_tokens": 8}
	});
	let reply = serde_json::to_vec(&reply).unwrap();
	let out = t.response_body(&reply, true).unwrap();
	assert_eq!(out, reply);
	assert_eq!(t.usage().input_tokens, 8);
	assert_eq!(t.usage().total_tokens, 8);
}

#[test]
fn backend_error_shapes_are_openai() {
	let mut t = Translator::new(
		RouteKind::ChatCompletions,
		&VersionedApiSchema {
			name: ApiSchemaName::AWSBedrock,
			version: None,
		},
		None,
		None,
	)
	.unwrap();
	let out = t
		.response_error(400, br#"{"message":"model is busted"}"#)
		.unwrap();
	let v: Value = serde_json::from_slice(&out).unwrap();
	assert_eq!(v["error"]["type"], "invalid_request_error");
	assert_eq!(v["error"]["message"], "model is busted");

	let out = t.response_error(503, b"raw text failure").unwrap();
	let v: Value = serde_json::from_slice(&out).unwrap();
	assert_eq!(v["error"]["type"], "api_error");
}

#[test]
fn empty_body_is_a_parse_error() {
	let mut t = Translator::new(
		RouteKind::ChatCompletions,
		&openai_schema(),
		None,
		None,
	)
	.unwrap();
	assert!(matches!(
		t.request_body(&Bytes::new()),
		Err(AIError::RequestParsing(_))
	));
}
