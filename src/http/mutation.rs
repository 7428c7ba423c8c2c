//! Per-backend header mutation rules from the filter config.

use serde::{Deserialize, Serialize};

use crate::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HeaderMutationConfig {
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub set: Vec<HeaderSet>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub remove: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeaderSet {
	pub key: String,
	pub value: String,
}

/// Compiled view of a mutation rule set. `content-length` is never mutated
/// through headers; the proxy gets it via dynamic metadata.
#[derive(Debug, Clone, Default)]
pub struct HeaderMutator {
	set: Vec<(String, String)>,
	remove: Vec<String>,
}

impl HeaderMutator {
	pub fn new(config: &HeaderMutationConfig) -> Self {
		Self {
			set: config
				.set
				.iter()
				.filter(|s| !s.key.eq_ignore_ascii_case("content-length"))
				.map(|s| (s.key.to_ascii_lowercase(), s.value.clone()))
				.collect(),
			remove: config
				.remove
				.iter()
				.map(|k| k.to_ascii_lowercase())
				.collect(),
		}
	}

	/// Header mutations for one attempt. On retry, headers added by the
	/// previous attempt are removed before this attempt's sets re-apply.
	pub fn mutations(&self, on_retry: bool) -> (Vec<(String, String)>, Vec<String>) {
		let mut remove = Vec::new();
		if on_retry {
			remove.extend(self.set.iter().map(|(k, _)| k.clone()));
		}
		remove.extend(self.remove.iter().cloned());
		(self.set.clone(), remove)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config() -> HeaderMutationConfig {
		HeaderMutationConfig {
			set: vec![
				HeaderSet {
					key: "X-Custom".to_string(),
					value: "1".to_string(),
				},
				HeaderSet {
					key: "Content-Length".to_string(),
					value: "999".to_string(),
				},
			],
			remove: vec!["x-drop-me".to_string()],
		}
	}

	#[test]
	fn content_length_is_never_set() {
		let m = HeaderMutator::new(&config());
		let (set, _) = m.mutations(false);
		assert_eq!(set, vec![("x-custom".to_string(), "1".to_string())]);
	}

	#[test]
	fn retry_removes_previous_sets_first() {
		let m = HeaderMutator::new(&config());
		let (_, remove) = m.mutations(true);
		assert_eq!(remove, vec!["x-custom".to_string(), "x-drop-me".to_string()]);
		let (_, remove_first) = m.mutations(false);
		assert_eq!(remove_first, vec!["x-drop-me".to_string()]);
	}
}
