//! Request-cost rules and the dynamic metadata handed back to the proxy
//! for rate limiting.

use serde::{Deserialize, Serialize};

use crate::cel::{CostContext, Expression};
use crate::llm::LLMTokenUsage;
use crate::*;

/// A single cost rule from the filter config, with its CEL program already
/// compiled.
#[derive(Debug, Clone)]
pub struct RequestCost {
	pub metadata_key: String,
	pub kind: CostKind,
}

#[derive(Debug, Clone)]
pub enum CostKind {
	InputToken,
	OutputToken,
	TotalToken,
	Cel(Arc<Expression>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequestCostConfig {
	pub metadata_key: String,
	pub kind: CostKindConfig,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cel_program: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CostKindConfig {
	InputToken,
	OutputToken,
	TotalToken,
	#[serde(rename = "CEL")]
	Cel,
}

impl RequestCost {
	pub fn compute(&self, ctx: &CostContext) -> Option<u64> {
		match &self.kind {
			CostKind::InputToken => Some(ctx.usage.input_tokens as u64),
			CostKind::OutputToken => Some(ctx.usage.output_tokens as u64),
			CostKind::TotalToken => Some(ctx.usage.total_tokens as u64),
			CostKind::Cel(expr) => match expr.eval_cost(ctx) {
				Ok(v) => Some(v),
				Err(e) => {
					// The request is not penalized; surface the failure.
					warn!(
						key = %self.metadata_key,
						expression = %expr.expression(),
						"cost expression failed: {e}"
					);
					None
				},
			},
		}
	}
}

fn number(v: u64) -> pbjson_types::Value {
	pbjson_types::Value {
		kind: Some(pbjson_types::value::Kind::NumberValue(v as f64)),
	}
}

fn string(v: &str) -> pbjson_types::Value {
	pbjson_types::Value {
		kind: Some(pbjson_types::value::Kind::StringValue(v.to_string())),
	}
}

fn namespaced(fields: Vec<(String, pbjson_types::Value)>) -> pbjson_types::Struct {
	let inner = pbjson_types::Struct {
		fields: fields.into_iter().collect(),
	};
	pbjson_types::Struct {
		fields: [(
			DYNAMIC_METADATA_NAMESPACE.to_string(),
			pbjson_types::Value {
				kind: Some(pbjson_types::value::Kind::StructValue(inner)),
			},
		)]
		.into_iter()
		.collect(),
	}
}

/// The metadata struct emitted when the response completes: the three token
/// counters, every configured cost key, and the backend identity.
pub fn response_metadata(
	usage: &LLMTokenUsage,
	costs: &[RequestCost],
	backend: &Strng,
	model: &Strng,
	model_name_override: Option<&Strng>,
) -> pbjson_types::Struct {
	let mut fields = vec![
		(
			"input_token_usage".to_string(),
			number(usage.input_tokens as u64),
		),
		(
			"output_token_usage".to_string(),
			number(usage.output_tokens as u64),
		),
		(
			"total_token_usage".to_string(),
			number(usage.total_tokens as u64),
		),
		("backend_name".to_string(), string(backend)),
		(
			"model_name_override".to_string(),
			string(model_name_override.map(|m| m.as_str()).unwrap_or_default()),
		),
	];
	let ctx = CostContext {
		model: model.clone(),
		backend: backend.clone(),
		usage: *usage,
	};
	for cost in costs {
		if let Some(v) = cost.compute(&ctx) {
			fields.push((cost.metadata_key.clone(), number(v)));
		}
	}
	namespaced(fields)
}

/// Body mutations run in a mode where a content-length header mutation
/// would conflict with the proxy's own accounting, so the length rides in
/// dynamic metadata instead.
pub fn content_length_metadata(len: usize) -> pbjson_types::Struct {
	namespaced(vec![("content_length".to_string(), number(len as u64))])
}
