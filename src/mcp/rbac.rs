//! Tool-call authorization for the MCP proxy. Rules match on JWT scopes,
//! the target `(backend, tool)` and tool arguments; the first matching
//! rule decides, otherwise the default action applies.
//!
//! The bearer token's signature was already verified by the proxy's JWT
//! filter, so the payload is parsed here without re-verification.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::*;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
	#[default]
	Allow,
	Deny,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpAuthorizationConfig {
	#[serde(default)]
	pub default_action: Action,
	#[serde(default)]
	pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfig {
	#[serde(default)]
	pub source: SourceMatch,
	#[serde(default)]
	pub target: TargetMatch,
	pub action: Action,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMatch {
	/// Scopes the token must carry (subset match).
	#[serde(default)]
	pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetMatch {
	/// Tools the rule applies to; empty matches every tool.
	#[serde(default)]
	pub tools: Vec<ToolMatchConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolMatchConfig {
	pub backend: String,
	pub tool: String,
	/// Argument name to regex; every named argument must match.
	#[serde(default)]
	pub arguments: HashMap<String, String>,
}

/// Compiled rule set.
#[derive(Debug, Default)]
pub struct RuleSet {
	default_action: Action,
	rules: Vec<Rule>,
}

#[derive(Debug)]
struct Rule {
	scopes: Vec<String>,
	tools: Vec<ToolMatcher>,
	action: Action,
}

#[derive(Debug)]
struct ToolMatcher {
	backend: String,
	tool: String,
	arguments: Vec<(String, Regex)>,
}

impl RuleSet {
	pub fn compile(config: &McpAuthorizationConfig) -> anyhow::Result<Self> {
		let rules = config
			.rules
			.iter()
			.map(|r| {
				let tools = r
					.target
					.tools
					.iter()
					.map(|t| {
						let arguments = t
							.arguments
							.iter()
							.map(|(k, v)| Ok((k.clone(), Regex::new(v)?)))
							.collect::<anyhow::Result<Vec<_>>>()?;
						Ok(ToolMatcher {
							backend: t.backend.clone(),
							tool: t.tool.clone(),
							arguments,
						})
					})
					.collect::<anyhow::Result<Vec<_>>>()?;
				Ok(Rule {
					scopes: r.source.scopes.clone(),
					tools,
					action: r.action,
				})
			})
			.collect::<anyhow::Result<Vec<_>>>()?;
		Ok(RuleSet {
			default_action: config.default_action,
			rules,
		})
	}

	pub fn authorize(
		&self,
		scopes: &[String],
		backend: &str,
		tool: &str,
		arguments: Option<&Value>,
	) -> bool {
		for rule in &self.rules {
			if !rule.matches_target(backend, tool, arguments) {
				continue;
			}
			if !rule.scopes.iter().all(|s| scopes.contains(s)) {
				continue;
			}
			return rule.action == Action::Allow;
		}
		self.default_action == Action::Allow
	}
}

impl Rule {
	fn matches_target(&self, backend: &str, tool: &str, arguments: Option<&Value>) -> bool {
		if self.tools.is_empty() {
			return true;
		}
		self
			.tools
			.iter()
			.any(|t| t.matches(backend, tool, arguments))
	}
}

impl ToolMatcher {
	fn matches(&self, backend: &str, tool: &str, arguments: Option<&Value>) -> bool {
		if self.backend != backend || self.tool != tool {
			return false;
		}
		self.arguments.iter().all(|(name, regex)| {
			let Some(value) = arguments.and_then(|a| a.get(name)) else {
				return false;
			};
			// String arguments match the raw string; everything else is
			// matched against its JSON encoding.
			match value {
				Value::String(s) => regex.is_match(s),
				other => regex.is_match(&other.to_string()),
			}
		})
	}
}

/// Extract the `scope` claim from a bearer token. Accepts the three shapes
/// seen in the wild: a space-separated string, an array of strings, and an
/// array of arbitrary values.
pub fn scopes_from_bearer(authorization: Option<&str>) -> Vec<String> {
	let Some(token) = authorization
		.and_then(|a| a.strip_prefix("Bearer ").or_else(|| a.strip_prefix("bearer ")))
	else {
		return vec![];
	};
	let Some(claims) = decode_claims(token) else {
		return vec![];
	};
	match claims.get("scope") {
		Some(Value::String(s)) => s.split_whitespace().map(str::to_string).collect(),
		Some(Value::Array(items)) => items
			.iter()
			.map(|v| match v {
				Value::String(s) => s.clone(),
				other => other.to_string(),
			})
			.collect(),
		_ => vec![],
	}
}

fn decode_claims(token: &str) -> Option<Value> {
	let payload = token.split('.').nth(1)?;
	let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
	serde_json::from_slice(&bytes).ok()
}
