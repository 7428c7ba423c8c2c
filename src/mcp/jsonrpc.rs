//! JSON-RPC 2.0 envelope types for the MCP proxy. The multiplexer mostly
//! forwards payloads verbatim, so params and results stay as raw values.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
	Number(i64),
	String(String),
}

/// A request when `id` is present, a notification otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
	pub jsonrpc: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<Id>,
	pub method: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub params: Option<Value>,
}

impl Request {
	pub fn new(id: impl Into<Id>, method: impl Into<String>, params: Option<Value>) -> Self {
		Request {
			jsonrpc: VERSION.to_string(),
			id: Some(id.into()),
			method: method.into(),
			params,
		}
	}

	pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
		Request {
			jsonrpc: VERSION.to_string(),
			id: None,
			method: method.into(),
			params,
		}
	}

	pub fn is_notification(&self) -> bool {
		self.id.is_none()
	}
}

impl From<i64> for Id {
	fn from(value: i64) -> Self {
		Id::Number(value)
	}
}

impl From<&str> for Id {
	fn from(value: &str) -> Self {
		Id::String(value.to_string())
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
	pub jsonrpc: String,
	pub id: Option<Id>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorObject>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorObject {
	pub code: i64,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
}

impl Response {
	pub fn success(id: Option<Id>, result: Value) -> Self {
		Response {
			jsonrpc: VERSION.to_string(),
			id,
			result: Some(result),
			error: None,
		}
	}

	pub fn error(id: Option<Id>, code: i64, message: impl Into<String>) -> Self {
		Response {
			jsonrpc: VERSION.to_string(),
			id,
			result: None,
			error: Some(ErrorObject {
				code,
				message: message.into(),
				data: None,
			}),
		}
	}
}

/// A POST body is a single message or a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
	Single(Request),
	Batch(Vec<Request>),
}
