use prost::bytes::Bytes as ProstBytes;
use serde_json::{Value, json};

use super::*;
use crate::config::{self, ConfigStore};
use crate::*;
use crate::extproc::proto::processing_response::Response as ResponseVariant;
use crate::extproc::proto::{
	HeaderMap, HeaderValue, HttpBody, HttpHeaders, ProcessingRequest, ProcessingResponse,
	body_mutation, common_response::ResponseStatus, processing_request::Request as RequestVariant,
};
use crate::serdes::yamlviajson;
use crate::telemetry::metrics::Metrics;

const CONFIG: &str = r#"
uuid: test-config
declaredModels:
- name: gpt-4.1-nano
  ownedBy: openai
  createdAt: 1732000000
requestCosts:
- metadataKey: llm_total
  kind: TotalToken
backends:
- name: openai
  schema:
    name: OpenAI
- name: bedrock
  schema:
    name: AWSBedrock
  modelNameOverride: anthropic.claude-3-haiku-20240307-v1:0
"#;

fn processor() -> RequestProcessor {
	let file = yamlviajson::from_str(CONFIG).unwrap();
	let store = ConfigStore::new(config::compile(file).unwrap());
	let mut registry = prometheus_client::registry::Registry::default();
	let metrics = Arc::new(Metrics::new(&mut registry));
	RequestProcessor::new(store.load(), metrics)
}

fn headers_msg(pairs: &[(&str, &str)], end_of_stream: bool) -> ProcessingRequest {
	ProcessingRequest {
		request: Some(RequestVariant::RequestHeaders(HttpHeaders {
			headers: Some(HeaderMap {
				headers: pairs
					.iter()
					.map(|(k, v)| HeaderValue {
						key: k.to_string(),
						raw_value: ProstBytes::from(v.as_bytes().to_vec()),
					})
					.collect(),
			}),
			end_of_stream,
		})),
		attributes: Default::default(),
		observability_mode: false,
	}
}

fn body_msg(body: &[u8], end_of_stream: bool) -> ProcessingRequest {
	ProcessingRequest {
		request: Some(RequestVariant::RequestBody(HttpBody {
			body: ProstBytes::from(body.to_vec()),
			end_of_stream,
		})),
		attributes: Default::default(),
		observability_mode: false,
	}
}

fn response_headers_msg(status: &str) -> ProcessingRequest {
	ProcessingRequest {
		request: Some(RequestVariant::ResponseHeaders(HttpHeaders {
			headers: Some(HeaderMap {
				headers: vec![HeaderValue {
					key: ":status".to_string(),
					raw_value: ProstBytes::from(status.as_bytes().to_vec()),
				}],
			}),
			end_of_stream: false,
		})),
		attributes: Default::default(),
		observability_mode: false,
	}
}

fn response_body_msg(body: &[u8], end_of_stream: bool) -> ProcessingRequest {
	ProcessingRequest {
		request: Some(RequestVariant::ResponseBody(HttpBody {
			body: ProstBytes::from(body.to_vec()),
			end_of_stream,
		})),
		attributes: Default::default(),
		observability_mode: false,
	}
}

fn set_headers(resp: &ProcessingResponse) -> HashMap<String, String> {
	let cr = match resp.response.as_ref().unwrap() {
		ResponseVariant::RequestHeaders(h) => h.response.as_ref().unwrap(),
		ResponseVariant::RequestBody(b) => b.response.as_ref().unwrap(),
		ResponseVariant::ResponseHeaders(h) => h.response.as_ref().unwrap(),
		ResponseVariant::ResponseBody(b) => b.response.as_ref().unwrap(),
		other => panic!("unexpected response {other:?}"),
	};
	cr.header_mutation
		.as_ref()
		.map(|m| {
			m.set_headers
				.iter()
				.filter_map(|h| h.header.as_ref())
				.map(|h| {
					(
						h.key.clone(),
						String::from_utf8_lossy(&h.raw_value).into_owned(),
					)
				})
				.collect()
		})
		.unwrap_or_default()
}

fn replaced_body(resp: &ProcessingResponse) -> Option<Vec<u8>> {
	let cr = match resp.response.as_ref().unwrap() {
		ResponseVariant::RequestHeaders(h) => h.response.as_ref().unwrap(),
		ResponseVariant::RequestBody(b) => b.response.as_ref().unwrap(),
		ResponseVariant::ResponseBody(b) => b.response.as_ref().unwrap(),
		other => panic!("unexpected response {other:?}"),
	};
	match cr.body_mutation.as_ref()?.mutation.as_ref()? {
		body_mutation::Mutation::Body(b) => Some(b.to_vec()),
		_ => None,
	}
}

fn metadata_field(resp: &ProcessingResponse, key: &str) -> Option<f64> {
	let md = resp.dynamic_metadata.as_ref()?;
	let ns = md.fields.get(crate::DYNAMIC_METADATA_NAMESPACE)?;
	let Some(pbjson_types::value::Kind::StructValue(inner)) = ns.kind.as_ref() else {
		return None;
	};
	match inner.fields.get(key)?.kind.as_ref()? {
		pbjson_types::value::Kind::NumberValue(v) => Some(*v),
		_ => None,
	}
}

fn metadata_string(resp: &ProcessingResponse, key: &str) -> Option<String> {
	let md = resp.dynamic_metadata.as_ref()?;
	let ns = md.fields.get(crate::DYNAMIC_METADATA_NAMESPACE)?;
	let Some(pbjson_types::value::Kind::StructValue(inner)) = ns.kind.as_ref() else {
		return None;
	};
	match inner.fields.get(key)?.kind.as_ref()? {
		pbjson_types::value::Kind::StringValue(v) => Some(v.clone()),
		_ => None,
	}
}

const CHAT_BODY: &[u8] =
	br#"{"model":"gpt-4.1-nano","messages":[{"role":"user","content":"Which ocean has Bouvet Island?"}]}"#;

#[tokio::test]
async fn chat_passthrough_end_to_end() {
	let mut p = processor();

	// Router phase: headers then the body.
	let resp = p
		.handle(headers_msg(&[(":path", "/v1/chat/completions")], false))
		.await
		.unwrap();
	assert!(matches!(
		resp.response,
		Some(ResponseVariant::RequestHeaders(_))
	));

	// Split the body across two chunks.
	let resp = p.handle(body_msg(&CHAT_BODY[..20], false)).await.unwrap();
	assert!(set_headers(&resp).is_empty());
	let resp = p.handle(body_msg(&CHAT_BODY[20..], true)).await.unwrap();
	let set = set_headers(&resp);
	assert_eq!(set.get(crate::MODEL_NAME_HEADER).unwrap(), "gpt-4.1-nano");
	assert_eq!(
		set.get(crate::ORIGINAL_PATH_HEADER).unwrap(),
		"/v1/chat/completions"
	);
	let cr = match resp.response.as_ref().unwrap() {
		ResponseVariant::RequestBody(b) => b.response.as_ref().unwrap(),
		other => panic!("unexpected {other:?}"),
	};
	assert!(cr.clear_route_cache, "the proxy must re-match the route");

	// Upstream phase: the proxy re-enters with the selected backend.
	let resp = p
		.handle(headers_msg(
			&[
				(crate::SELECTED_BACKEND_HEADER, "openai"),
				(":authority", "api.openai.com"),
			],
			false,
		))
		.await
		.unwrap();
	let set = set_headers(&resp);
	assert_eq!(set.get(":path").unwrap(), "/v1/chat/completions");
	// Passthrough still replaces the body (with the original bytes).
	assert_eq!(replaced_body(&resp).unwrap(), CHAT_BODY);
	assert_eq!(
		metadata_field(&resp, "content_length").unwrap() as usize,
		CHAT_BODY.len()
	);

	// Response flows back.
	let resp = p.handle(response_headers_msg("200")).await.unwrap();
	assert!(matches!(
		resp.response,
		Some(ResponseVariant::ResponseHeaders(_))
	));
	let backend_reply = serde_json::to_vec(&json!({
		"id": "chatcmpl-1",
		"object": "chat.completion",
		"created": 1732000000,
		"model": "gpt-4.1-nano",
		"choices": [{"index": 0, "message": {"role": "assistant", "content": "Southern Ocean"}, "finish_reason": "stop"}],
		"usage": {"prompt_tokens": 22, "completion_tokens": 2, "total_tokens": 24}
	}))
	.unwrap();
	let resp = p.handle(response_body_msg(&backend_reply, true)).await.unwrap();
	assert_eq!(replaced_body(&resp).unwrap(), backend_reply);
	assert_eq!(metadata_field(&resp, "input_token_usage"), Some(22.0));
	assert_eq!(metadata_field(&resp, "output_token_usage"), Some(2.0));
	assert_eq!(metadata_field(&resp, "total_token_usage"), Some(24.0));
	assert_eq!(metadata_field(&resp, "llm_total"), Some(24.0));
	assert_eq!(
		metadata_string(&resp, "backend_name").as_deref(),
		Some("openai")
	);
}

#[tokio::test]
async fn retry_reuses_the_original_body() {
	let mut p = processor();
	p.handle(headers_msg(&[(":path", "/v1/chat/completions")], false))
		.await
		.unwrap();
	p.handle(body_msg(CHAT_BODY, true)).await.unwrap();

	// First attempt goes to openai.
	let first = p
		.handle(headers_msg(&[(crate::SELECTED_BACKEND_HEADER, "openai")], false))
		.await
		.unwrap();
	assert_eq!(replaced_body(&first).unwrap(), CHAT_BODY);

	// The attempt fails and the proxy retries against bedrock. The bytes
	// sent must match what a first-attempt translation would produce.
	let retried = p
		.handle(headers_msg(&[(crate::SELECTED_BACKEND_HEADER, "bedrock")], false))
		.await
		.unwrap();
	let retried_body = replaced_body(&retried).unwrap();

	let mut fresh = processor();
	fresh
		.handle(headers_msg(&[(":path", "/v1/chat/completions")], false))
		.await
		.unwrap();
	fresh.handle(body_msg(CHAT_BODY, true)).await.unwrap();
	let direct = fresh
		.handle(headers_msg(&[(crate::SELECTED_BACKEND_HEADER, "bedrock")], false))
		.await
		.unwrap();
	assert_eq!(replaced_body(&direct).unwrap(), retried_body);

	// The override backend rewrites the path to the Converse API.
	let set = set_headers(&retried);
	assert_eq!(
		set.get(":path").unwrap(),
		"/model/anthropic.claude-3-haiku-20240307-v1:0/converse"
	);

	// A failed first attempt leaves no usage behind: the fresh filter
	// starts from zero.
	assert_eq!(p.upstream.as_ref().unwrap().usage(), Default::default());
	assert_eq!(p.upstream_filter_count, 2);
}

#[tokio::test]
async fn models_endpoint_is_answered_locally() {
	let mut p = processor();
	let resp = p
		.handle(headers_msg(&[(":path", "/v1/models")], true))
		.await
		.unwrap();
	let Some(ResponseVariant::ImmediateResponse(imm)) = resp.response else {
		panic!("expected an immediate response");
	};
	assert_eq!(imm.status.unwrap().code, 200);
	let body: Value = serde_json::from_slice(&imm.body).unwrap();
	assert_eq!(body["object"], "list");
	assert_eq!(body["data"][0]["id"], "gpt-4.1-nano");
	assert_eq!(body["data"][0]["owned_by"], "openai");
}

#[tokio::test]
async fn empty_body_is_an_invalid_body_error() {
	let mut p = processor();
	p.handle(headers_msg(&[(":path", "/v1/chat/completions")], false))
		.await
		.unwrap();
	let err = p.handle(body_msg(b"", true)).await.unwrap_err();
	let (status, body) = err.immediate_response().unwrap();
	assert_eq!(status, 400);
	let v: Value = serde_json::from_slice(&body).unwrap();
	assert_eq!(v["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn unknown_path_is_a_404() {
	let mut p = processor();
	let err = p
		.handle(headers_msg(&[(":path", "/v2/surprise")], false))
		.await
		.unwrap_err();
	let (status, _) = err.immediate_response().unwrap();
	assert_eq!(status, 404);
}

#[tokio::test]
async fn unparseable_json_is_a_400() {
	let mut p = processor();
	p.handle(headers_msg(&[(":path", "/v1/chat/completions")], false))
		.await
		.unwrap();
	let err = p.handle(body_msg(b"{not json", true)).await.unwrap_err();
	let (status, _) = err.immediate_response().unwrap();
	assert_eq!(status, 400);
}

#[tokio::test]
async fn backend_error_is_reshaped_not_forwarded_raw() {
	let mut p = processor();
	p.handle(headers_msg(&[(":path", "/v1/chat/completions")], false))
		.await
		.unwrap();
	p.handle(body_msg(CHAT_BODY, true)).await.unwrap();
	p.handle(headers_msg(&[(crate::SELECTED_BACKEND_HEADER, "bedrock")], false))
		.await
		.unwrap();
	p.handle(response_headers_msg("429")).await.unwrap();
	let resp = p
		.handle(response_body_msg(br#"{"message":"throttled"}"#, true))
		.await
		.unwrap();
	let body = replaced_body(&resp).unwrap();
	let v: Value = serde_json::from_slice(&body).unwrap();
	assert_eq!(v["error"]["type"], "invalid_request_error");
	assert_eq!(v["error"]["message"], "throttled");
	// Failed requests emit no cost metadata.
	assert!(resp.dynamic_metadata.is_none());
}

#[tokio::test]
async fn upstream_body_replacement_uses_continue_and_replace() {
	let mut p = processor();
	p.handle(headers_msg(&[(":path", "/v1/chat/completions")], false))
		.await
		.unwrap();
	p.handle(body_msg(CHAT_BODY, true)).await.unwrap();
	let resp = p
		.handle(headers_msg(&[(crate::SELECTED_BACKEND_HEADER, "openai")], false))
		.await
		.unwrap();
	let Some(ResponseVariant::RequestHeaders(h)) = resp.response.as_ref() else {
		panic!("expected a request headers response");
	};
	assert_eq!(
		h.response.as_ref().unwrap().status,
		ResponseStatus::ContinueAndReplace as i32
	);
}
