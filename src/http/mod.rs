pub mod auth;
pub mod mutation;

/// Merge a query parameter into a path that may or may not already carry a
/// query string.
pub fn append_query(path: &str, key: &str, value: &str) -> String {
	if path.contains('?') {
		format!("{path}&{key}={value}")
	} else {
		format!("{path}?{key}={value}")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn append_query_merges() {
		assert_eq!(append_query("/v1beta/models/m:generateContent", "key", "K"),
			"/v1beta/models/m:generateContent?key=K");
		assert_eq!(
			append_query("/v1beta/models/m:streamGenerateContent?alt=sse", "key", "K"),
			"/v1beta/models/m:streamGenerateContent?alt=sse&key=K"
		);
	}
}
