use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serializer};

/// Serde yaml represents things differently than just "JSON in YAML format".
/// We don't want this. Instead, we transcode YAML via the JSON data model.
pub mod yamlviajson {
	use serde::{de, ser};

	pub fn from_str<T>(s: &str) -> anyhow::Result<T>
	where
		T: for<'de> de::Deserialize<'de>,
	{
		let value: serde_json::Value = serde_yaml::from_str(s)?;
		Ok(serde_json::from_value(value)?)
	}

	pub fn to_string<T>(value: &T) -> anyhow::Result<String>
	where
		T: ?Sized + ser::Serialize,
	{
		let json = serde_json::to_value(value)?;
		Ok(serde_yaml::to_string(&json)?)
	}
}

pub fn is_default<T: Default + PartialEq>(t: &T) -> bool {
	*t == Default::default()
}

/// Secrets are serialized as a fixed placeholder so config dumps never leak
/// key material.
pub fn ser_redact<S: Serializer>(_: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
	serializer.serialize_str("<redacted>")
}

pub fn deser_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
	D: Deserializer<'de>,
{
	let raw = String::deserialize(deserializer)?;
	Ok(SecretString::from(raw))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn yaml_decodes_through_json() {
		#[derive(serde::Deserialize, Debug, PartialEq)]
		#[serde(rename_all = "camelCase")]
		struct Conf {
			name: String,
			max_items: u32,
		}
		let c: Conf = yamlviajson::from_str("name: a\nmaxItems: 3\n").unwrap();
		assert_eq!(
			c,
			Conf {
				name: "a".to_string(),
				max_items: 3
			}
		);
	}

	#[test]
	fn secrets_are_redacted() {
		#[derive(serde::Serialize)]
		struct S {
			#[serde(serialize_with = "ser_redact")]
			key: SecretString,
		}
		let s = S {
			key: SecretString::from("super-secret"),
		};
		assert_eq!(
			serde_json::to_string(&s).unwrap(),
			r#"{"key":"<redacted>"}"#
		);
	}
}
