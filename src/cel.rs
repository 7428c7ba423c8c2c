//! Compiled CEL expressions for request-cost rules. Programs are compiled
//! once at config load; evaluation is pure and thread-safe.

use std::fmt::{Debug, Formatter};

use cel_interpreter::{Context, Program, Value};
use serde::{Serialize, Serializer};

use crate::llm::LLMTokenUsage;
use crate::*;

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("parse: {0}")]
	Parse(String),
	#[error("execution: {0}")]
	Resolve(String),
	#[error("expression produced a non-uint result: {0:?}")]
	NonUintResult(String),
	#[error("variable: {0}")]
	Variable(String),
}

pub struct Expression {
	program: Program,
	original_expression: String,
}

impl Serialize for Expression {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.original_expression)
	}
}

impl Debug for Expression {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Expression")
			.field("expression", &self.original_expression)
			.finish()
	}
}

/// The fixed variable environment cost programs run against.
#[derive(Debug, Clone, Default)]
pub struct CostContext {
	pub model: Strng,
	pub backend: Strng,
	pub usage: LLMTokenUsage,
}

impl Expression {
	pub fn new(original_expression: impl Into<String>) -> Result<Self, Error> {
		let original_expression = original_expression.into();
		let program =
			Program::compile(&original_expression).map_err(|e| Error::Parse(e.to_string()))?;
		Ok(Self {
			program,
			original_expression,
		})
	}

	pub fn expression(&self) -> &str {
		&self.original_expression
	}

	/// Evaluate to an unsigned cost. A result that does not coerce to uint
	/// is an error; the caller logs it and applies no cost.
	pub fn eval_cost(&self, ctx: &CostContext) -> Result<u64, Error> {
		let mut cel = Context::default();
		let var = |cel: &mut Context, name: &'static str, v: Value| {
			cel.add_variable_from_value(name, v);
		};
		var(&mut cel, "model", Value::String(Arc::new(ctx.model.to_string())));
		var(
			&mut cel,
			"backend",
			Value::String(Arc::new(ctx.backend.to_string())),
		);
		var(&mut cel, "input_tokens", Value::UInt(ctx.usage.input_tokens as u64));
		var(
			&mut cel,
			"output_tokens",
			Value::UInt(ctx.usage.output_tokens as u64),
		);
		var(
			&mut cel,
			"total_tokens",
			Value::UInt(ctx.usage.total_tokens as u64),
		);
		var(
			&mut cel,
			"cached_tokens",
			Value::UInt(ctx.usage.cached_tokens.unwrap_or_default() as u64),
		);
		let value = self
			.program
			.execute(&cel)
			.map_err(|e| Error::Resolve(e.to_string()))?;
		match value {
			Value::UInt(u) => Ok(u),
			Value::Int(i) if i >= 0 => Ok(i as u64),
			Value::Float(f) if f >= 0.0 && f.fract() == 0.0 => Ok(f as u64),
			other => Err(Error::NonUintResult(format!("{other:?}"))),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn ctx() -> CostContext {
		CostContext {
			model: strng::new("gpt-4.1-nano"),
			backend: strng::new("openai"),
			usage: LLMTokenUsage {
				input_tokens: 22,
				output_tokens: 2,
				total_tokens: 24,
				cached_tokens: None,
			},
		}
	}

	#[test]
	fn token_arithmetic() {
		let expr = Expression::new("input_tokens + output_tokens * 10u").unwrap();
		assert_eq!(expr.eval_cost(&ctx()).unwrap(), 42);
	}

	#[test]
	fn model_conditional() {
		let expr =
			Expression::new(r#"model == "gpt-4.1-nano" ? total_tokens * 2u : total_tokens"#).unwrap();
		assert_eq!(expr.eval_cost(&ctx()).unwrap(), 48);
	}

	#[test]
	fn backend_variable_is_visible() {
		let expr = Expression::new(r#"backend == "openai" ? 1u : 0u"#).unwrap();
		assert_eq!(expr.eval_cost(&ctx()).unwrap(), 1);
	}

	#[test]
	fn non_uint_result_is_an_error() {
		let expr = Expression::new(r#""not a number""#).unwrap();
		assert!(matches!(
			expr.eval_cost(&ctx()),
			Err(Error::NonUintResult(_))
		));
	}

	#[test]
	fn compile_failure_is_reported() {
		assert!(Expression::new("this is not CEL ((").is_err());
	}
}
