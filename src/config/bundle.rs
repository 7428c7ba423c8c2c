//! The on-disk filter config bundle: an `index.yaml` naming ordered parts
//! whose concatenation is the YAML config document, integrity-checked with
//! a SHA-256 checksum.

use std::path::{Path, PathBuf};

use aws_lc_rs::digest;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, ConfigFile, ConfigStore, compile};
use crate::serdes::yamlviajson;
use crate::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleIndex {
	pub version: String,
	pub uuid: String,
	/// SHA-256 hex digest of the concatenated parts.
	pub checksum: String,
	pub parts: Vec<BundlePart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundlePart {
	pub name: String,
	pub path: String,
	#[serde(default)]
	pub size_bytes: u64,
}

/// Read and verify a bundle directory, returning the parsed config file.
pub fn read_bundle(dir: &Path) -> Result<ConfigFile, ConfigError> {
	let index_path = dir.join("index.yaml");
	let index_raw = std::fs::read_to_string(&index_path)?;
	let index: BundleIndex = yamlviajson::from_str(&index_raw).map_err(ConfigError::Parse)?;

	let mut contents = Vec::new();
	for part in &index.parts {
		let path = resolve_part(dir, &part.path);
		let bytes = std::fs::read(&path).map_err(|_| ConfigError::MissingPart(part.path.clone()))?;
		contents.extend_from_slice(&bytes);
	}

	let computed = hex::encode(digest::digest(&digest::SHA256, &contents));
	if !computed.eq_ignore_ascii_case(&index.checksum) {
		return Err(ConfigError::BundleChecksumMismatch {
			expected: index.checksum,
			computed,
		});
	}

	let text = String::from_utf8_lossy(&contents);
	yamlviajson::from_str(&text).map_err(ConfigError::Parse)
}

fn resolve_part(dir: &Path, part: &str) -> PathBuf {
	let p = Path::new(part);
	if p.is_absolute() {
		p.to_path_buf()
	} else {
		dir.join(p)
	}
}

/// Load a bundle and compile it in one step.
pub fn load(dir: &Path) -> Result<crate::config::RuntimeConfig, ConfigError> {
	compile(read_bundle(dir)?)
}

/// Reload the bundle on SIGHUP. A bad bundle (checksum mismatch, parse or
/// compile failure) keeps the last good snapshot.
pub async fn watch_reload(store: ConfigStore, dir: PathBuf) {
	let Ok(mut hangup) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
	else {
		warn!("failed to install SIGHUP handler; config reload disabled");
		return;
	};
	while hangup.recv().await.is_some() {
		match load(&dir) {
			Ok(config) => store.publish(config),
			Err(e) => {
				warn!("config reload failed, keeping last good config: {e}");
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn write_bundle(dir: &Path, doc: &str, corrupt_checksum: bool) {
		std::fs::create_dir_all(dir.join("parts")).unwrap();
		// Split the document into two parts to exercise concatenation.
		let mid = doc.len() / 2;
		let (a, b) = doc.split_at(mid);
		std::fs::write(dir.join("parts/000"), a).unwrap();
		std::fs::write(dir.join("parts/001"), b).unwrap();
		let checksum = if corrupt_checksum {
			"0".repeat(64)
		} else {
			hex::encode(digest::digest(&digest::SHA256, doc.as_bytes()))
		};
		let index = format!(
			r#"
version: v1
uuid: test-uuid
checksum: {checksum}
parts:
- name: part0
  path: parts/000
  sizeBytes: {}
- name: part1
  path: parts/001
  sizeBytes: {}
"#,
			a.len(),
			b.len()
		);
		std::fs::write(dir.join("index.yaml"), index).unwrap();
	}

	const DOC: &str = r#"
uuid: abc
backends:
- name: openai
  schema:
    name: OpenAI
"#;

	#[test]
	fn bundle_round_trips() {
		let dir = std::env::temp_dir().join(format!("aigw-bundle-{}", uuid::Uuid::new_v4()));
		write_bundle(&dir, DOC, false);
		let config = read_bundle(&dir).unwrap();
		assert_eq!(config.uuid, "abc");
		assert_eq!(config.backends.len(), 1);
	}

	#[test]
	fn checksum_mismatch_is_rejected() {
		let dir = std::env::temp_dir().join(format!("aigw-bundle-{}", uuid::Uuid::new_v4()));
		write_bundle(&dir, DOC, true);
		assert!(matches!(
			read_bundle(&dir),
			Err(ConfigError::BundleChecksumMismatch { .. })
		));
	}

	#[test]
	fn missing_part_is_rejected() {
		let dir = std::env::temp_dir().join(format!("aigw-bundle-{}", uuid::Uuid::new_v4()));
		write_bundle(&dir, DOC, false);
		std::fs::remove_file(dir.join("parts/001")).unwrap();
		assert!(matches!(
			read_bundle(&dir),
			Err(ConfigError::MissingPart(p)) if p == "parts/001"
		));
	}
}
