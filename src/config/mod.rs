//! The filter configuration: on-disk bundle format, the YAML document it
//! carries, and the compiled runtime view shared by all streams.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::cel::Expression;
use crate::costs::{CostKind, CostKindConfig, RequestCost, RequestCostConfig};
use crate::http::auth::{AuthHandler, BackendAuthConfig};
use crate::http::mutation::{HeaderMutationConfig, HeaderMutator};
use crate::llm::{VersionedApiSchema, VertexParams};
use crate::*;

pub mod bundle;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
	#[error("bundle checksum mismatch: expected {expected}, computed {computed}")]
	BundleChecksumMismatch { expected: String, computed: String },
	#[error("bundle part missing: {0}")]
	MissingPart(String),
	#[error("failed to read bundle: {0}")]
	Io(#[from] std::io::Error),
	#[error("failed to parse config: {0}")]
	Parse(anyhow::Error),
	#[error("cost expression for key {key} failed to compile: {source}")]
	Cel {
		key: String,
		#[source]
		source: cel::Error,
	},
	#[error("cost metadata key {0} is declared more than once")]
	DuplicateCostKey(String),
	#[error("backend {0} is declared more than once")]
	DuplicateBackend(String),
	#[error("auth configuration for backend {backend} rejected: {reason}")]
	Auth { backend: String, reason: String },
	#[error("mcp configuration rejected: {0}")]
	Mcp(anyhow::Error),
}

/// The YAML `Config` document carried by the bundle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigFile {
	#[serde(default)]
	pub uuid: String,
	#[serde(default)]
	pub declared_models: Vec<DeclaredModel>,
	#[serde(default)]
	pub request_costs: Vec<RequestCostConfig>,
	#[serde(default)]
	pub backends: Vec<BackendConfig>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub mcp: Option<mcp::McpConfigFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeclaredModel {
	pub name: Strng,
	#[serde(default = "default_owned_by")]
	pub owned_by: Strng,
	#[serde(default)]
	pub created_at: i64,
}

fn default_owned_by() -> Strng {
	strng::literal!("aigateway")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
	pub name: Strng,
	pub schema: VersionedApiSchema,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub model_name_override: Option<Strng>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub header_mutation: Option<HeaderMutationConfig>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub auth: Option<BackendAuthConfig>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub backend_costs: Vec<RequestCostConfig>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub vertex: Option<VertexParams>,
}

/// Compiled, immutable view of one backend.
#[derive(Debug)]
pub struct Backend {
	pub name: Strng,
	pub schema: VersionedApiSchema,
	pub model_name_override: Option<Strng>,
	pub header_mutator: HeaderMutator,
	pub auth: Option<AuthHandler>,
	pub backend_costs: Vec<RequestCost>,
	pub vertex: Option<VertexParams>,
}

/// Process-wide runtime configuration, rebuilt atomically on reload.
/// In-flight streams keep the snapshot they started with.
#[derive(Debug)]
pub struct RuntimeConfig {
	pub uuid: Strng,
	pub declared_models: Vec<DeclaredModel>,
	pub request_costs: Vec<RequestCost>,
	pub backends: HashMap<Strng, Arc<Backend>>,
	pub mcp: Option<Arc<mcp::McpConfig>>,
}

impl RuntimeConfig {
	pub fn backend(&self, name: &str) -> Option<Arc<Backend>> {
		self.backends.get(name).cloned()
	}

	/// Every cost rule that applies to a request through `backend`:
	/// the global rules plus the backend's own.
	pub fn costs_for<'a>(&'a self, backend: &'a Backend) -> Vec<RequestCost> {
		self
			.request_costs
			.iter()
			.chain(backend.backend_costs.iter())
			.cloned()
			.collect()
	}
}

fn compile_costs(
	configs: &[RequestCostConfig],
	seen: &mut std::collections::HashSet<String>,
) -> Result<Vec<RequestCost>, ConfigError> {
	configs
		.iter()
		.map(|c| {
			if !seen.insert(c.metadata_key.clone()) {
				return Err(ConfigError::DuplicateCostKey(c.metadata_key.clone()));
			}
			let kind = match c.kind {
				CostKindConfig::InputToken => CostKind::InputToken,
				CostKindConfig::OutputToken => CostKind::OutputToken,
				CostKindConfig::TotalToken => CostKind::TotalToken,
				CostKindConfig::Cel => {
					let program = c.cel_program.as_deref().unwrap_or_default();
					let expr = Expression::new(program).map_err(|e| ConfigError::Cel {
						key: c.metadata_key.clone(),
						source: e,
					})?;
					CostKind::Cel(Arc::new(expr))
				},
			};
			Ok(RequestCost {
				metadata_key: c.metadata_key.clone(),
				kind,
			})
		})
		.collect()
}

/// Compile a parsed config file. All CEL programs must compile and cost
/// keys must be unique across the global and backend lists, or the whole
/// config is rejected.
pub fn compile(file: ConfigFile) -> Result<RuntimeConfig, ConfigError> {
	let mut cost_keys = std::collections::HashSet::new();
	let request_costs = compile_costs(&file.request_costs, &mut cost_keys)?;

	let mut backends = HashMap::new();
	for b in &file.backends {
		let auth = b
			.auth
			.as_ref()
			.map(AuthHandler::new)
			.transpose()
			.map_err(|e| ConfigError::Auth {
				backend: b.name.to_string(),
				reason: e.to_string(),
			})?;
		// Duplicate keys between global and backend-level rules would make
		// the emitted metadata ambiguous; reject them at load time.
		let backend_costs = compile_costs(&b.backend_costs, &mut cost_keys)?;
		let backend = Backend {
			name: b.name.clone(),
			schema: b.schema.clone(),
			model_name_override: b.model_name_override.clone(),
			header_mutator: b
				.header_mutation
				.as_ref()
				.map(HeaderMutator::new)
				.unwrap_or_default(),
			auth,
			backend_costs,
			vertex: b.vertex.clone(),
		};
		if backends.insert(b.name.clone(), Arc::new(backend)).is_some() {
			return Err(ConfigError::DuplicateBackend(b.name.to_string()));
		}
	}

	let mcp = file
		.mcp
		.map(|m| mcp::McpConfig::compile(m).map(Arc::new))
		.transpose()
		.map_err(ConfigError::Mcp)?;

	Ok(RuntimeConfig {
		uuid: strng::new(&file.uuid),
		declared_models: file.declared_models,
		request_costs,
		backends,
		mcp,
	})
}

/// Shared handle to the current config snapshot.
#[derive(Clone)]
pub struct ConfigStore {
	current: Arc<ArcSwap<RuntimeConfig>>,
}

impl ConfigStore {
	pub fn new(config: RuntimeConfig) -> Self {
		Self {
			current: Arc::new(ArcSwap::from_pointee(config)),
		}
	}

	pub fn load(&self) -> Arc<RuntimeConfig> {
		self.current.load_full()
	}

	pub fn publish(&self, config: RuntimeConfig) {
		let config = Arc::new(config);
		info!(uuid = %config.uuid, "published new configuration");
		self.current.store(config);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::serdes::yamlviajson;

	fn parse(yaml: &str) -> ConfigFile {
		yamlviajson::from_str(yaml).unwrap()
	}

	#[test]
	fn minimal_config_compiles() {
		let file = parse(
			r#"
uuid: abc
backends:
- name: openai
  schema:
    name: OpenAI
"#,
		);
		let rc = compile(file).unwrap();
		assert_eq!(rc.uuid.as_str(), "abc");
		assert!(rc.backend("openai").is_some());
		assert!(rc.backend("missing").is_none());
	}

	#[test]
	fn bad_cel_rejects_whole_config() {
		let file = parse(
			r#"
uuid: abc
requestCosts:
- metadataKey: cost
  kind: CEL
  celProgram: "((broken"
"#,
		);
		assert!(matches!(compile(file), Err(ConfigError::Cel { .. })));
	}

	#[test]
	fn duplicate_cost_key_across_levels_rejected() {
		let file = parse(
			r#"
uuid: abc
requestCosts:
- metadataKey: cost
  kind: TotalToken
backends:
- name: openai
  schema:
    name: OpenAI
  backendCosts:
  - metadataKey: cost
    kind: InputToken
"#,
		);
		assert!(matches!(
			compile(file),
			Err(ConfigError::DuplicateCostKey(k)) if k == "cost"
		));
	}

	#[test]
	fn costs_for_merges_global_and_backend_rules() {
		let file = parse(
			r#"
uuid: abc
requestCosts:
- metadataKey: global
  kind: TotalToken
backends:
- name: openai
  schema:
    name: OpenAI
  backendCosts:
  - metadataKey: local
    kind: InputToken
"#,
		);
		let rc = compile(file).unwrap();
		let backend = rc.backend("openai").unwrap();
		let keys: Vec<_> = rc
			.costs_for(&backend)
			.iter()
			.map(|c| c.metadata_key.clone())
			.collect();
		assert_eq!(keys, vec!["global", "local"]);
	}

	#[test]
	fn snapshot_swap_is_visible_to_new_loads() {
		let store = ConfigStore::new(compile(parse("uuid: one")).unwrap());
		let before = store.load();
		store.publish(compile(parse("uuid: two")).unwrap());
		assert_eq!(before.uuid.as_str(), "one");
		assert_eq!(store.load().uuid.as_str(), "two");
	}
}
