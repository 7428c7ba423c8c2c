//! Backend authentication handlers. One handler per backend, invoked once
//! per upstream attempt after translation.

use std::time::SystemTime;

use aws_credential_types::Credentials;
use aws_sigv4::http_request::{SignableBody, SignableRequest, SigningSettings, sign};
use aws_sigv4::sign::v4::SigningParams;
use azure_core::credentials::TokenCredential;
use azure_identity::DefaultAzureCredential;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::http::append_query;
use crate::serdes::{deser_secret, ser_redact};
use crate::*;

/// How long before expiry a cached Azure token is refreshed.
const AZURE_REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);
const AZURE_SCOPE: &str = "https://cognitiveservices.azure.com/.default";

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
	/// Transient: the token source could not be reached. Surfaced as 503.
	#[error("credentials unavailable: {0}")]
	Unavailable(String),
	/// Fatal: the configured material is unusable. Surfaced as 401.
	#[error("credentials invalid: {0}")]
	Invalid(String),
}

impl AuthError {
	pub fn status(&self) -> u16 {
		match self {
			AuthError::Unavailable(_) => 503,
			AuthError::Invalid(_) => 401,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackendAuthConfig {
	/// `Authorization: Bearer <key>`.
	ApiKey {
		#[serde(serialize_with = "ser_redact", deserialize_with = "deser_secret")]
		key: SecretString,
	},
	/// Key appended to the request path as `?key=<key>`.
	GeminiKey {
		#[serde(serialize_with = "ser_redact", deserialize_with = "deser_secret")]
		key: SecretString,
	},
	/// Anthropic's native `x-api-key` header.
	AnthropicKey {
		#[serde(serialize_with = "ser_redact", deserialize_with = "deser_secret")]
		key: SecretString,
	},
	Azure(AzureAuthConfig),
	Aws(AwsAuthConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AzureAuthConfig {
	/// Azure's native key header.
	ApiKey {
		#[serde(serialize_with = "ser_redact", deserialize_with = "deser_secret")]
		key: SecretString,
	},
	/// An access token issued out-of-band and rotated by the controller.
	AccessToken {
		#[serde(serialize_with = "ser_redact", deserialize_with = "deser_secret")]
		token: SecretString,
	},
	/// Obtain tokens through the Azure credential chain (workload identity,
	/// then managed identity, then environment).
	Identity {},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsAuthConfig {
	#[serde(serialize_with = "ser_redact", deserialize_with = "deser_secret")]
	pub access_key_id: SecretString,
	#[serde(serialize_with = "ser_redact", deserialize_with = "deser_secret")]
	pub secret_access_key: SecretString,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub session_token: Option<String>,
	pub region: String,
	#[serde(default = "default_aws_service")]
	pub service: String,
}

fn default_aws_service() -> String {
	"bedrock".to_string()
}

/// A compiled handler; the Azure identity variant is the only one carrying
/// process-wide mutable state (its token cache).
pub enum AuthHandler {
	ApiKey(SecretString),
	GeminiKey(SecretString),
	AnthropicKey(SecretString),
	AzureApiKey(SecretString),
	AzureAccessToken(SecretString),
	AzureIdentity(Arc<AzureTokenSource>),
	Aws(AwsAuthConfig),
}

impl Debug for AuthHandler {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let name = match self {
			AuthHandler::ApiKey(_) => "ApiKey",
			AuthHandler::GeminiKey(_) => "GeminiKey",
			AuthHandler::AnthropicKey(_) => "AnthropicKey",
			AuthHandler::AzureApiKey(_) => "AzureApiKey",
			AuthHandler::AzureAccessToken(_) => "AzureAccessToken",
			AuthHandler::AzureIdentity(_) => "AzureIdentity",
			AuthHandler::Aws(_) => "Aws",
		};
		f.debug_tuple(name).finish()
	}
}

/// Everything signing needs to know about the outgoing request.
pub struct RequestContext<'a> {
	pub method: &'a str,
	pub authority: &'a str,
	pub path: &'a str,
	pub body: &'a [u8],
}

/// Ordered header sets plus an optional path rewrite to apply upstream.
#[derive(Debug, Default)]
pub struct AuthMutation {
	pub headers: Vec<(String, String)>,
	pub path: Option<String>,
}

impl AuthHandler {
	pub fn new(config: &BackendAuthConfig) -> Result<AuthHandler, AuthError> {
		Ok(match config {
			BackendAuthConfig::ApiKey { key } => AuthHandler::ApiKey(key.clone()),
			BackendAuthConfig::GeminiKey { key } => AuthHandler::GeminiKey(key.clone()),
			BackendAuthConfig::AnthropicKey { key } => AuthHandler::AnthropicKey(key.clone()),
			BackendAuthConfig::Azure(AzureAuthConfig::ApiKey { key }) => {
				AuthHandler::AzureApiKey(key.clone())
			},
			BackendAuthConfig::Azure(AzureAuthConfig::AccessToken { token }) => {
				AuthHandler::AzureAccessToken(token.clone())
			},
			BackendAuthConfig::Azure(AzureAuthConfig::Identity {}) => {
				AuthHandler::AzureIdentity(Arc::new(AzureTokenSource::new()?))
			},
			BackendAuthConfig::Aws(aws) => AuthHandler::Aws(aws.clone()),
		})
	}

	pub async fn apply(&self, req: &RequestContext<'_>) -> Result<AuthMutation, AuthError> {
		match self {
			AuthHandler::ApiKey(key) => Ok(AuthMutation {
				headers: vec![(
					"authorization".to_string(),
					format!("Bearer {}", key.expose_secret()),
				)],
				path: None,
			}),
			AuthHandler::GeminiKey(key) => Ok(AuthMutation {
				headers: vec![],
				path: Some(append_query(req.path, "key", key.expose_secret())),
			}),
			AuthHandler::AnthropicKey(key) => Ok(AuthMutation {
				headers: vec![("x-api-key".to_string(), key.expose_secret().to_string())],
				path: None,
			}),
			AuthHandler::AzureApiKey(key) => Ok(AuthMutation {
				headers: vec![("api-key".to_string(), key.expose_secret().to_string())],
				path: None,
			}),
			AuthHandler::AzureAccessToken(token) => Ok(AuthMutation {
				headers: vec![(
					"authorization".to_string(),
					format!("Bearer {}", token.expose_secret()),
				)],
				path: None,
			}),
			AuthHandler::AzureIdentity(source) => {
				let token = source.token().await?;
				Ok(AuthMutation {
					headers: vec![(
						"authorization".to_string(),
						format!("Bearer {}", token.expose_secret()),
					)],
					path: None,
				})
			},
			AuthHandler::Aws(aws) => sign_aws(aws, req),
		}
	}
}

/// SigV4 over the translated body, using pre-derived credentials.
fn sign_aws(aws: &AwsAuthConfig, req: &RequestContext<'_>) -> Result<AuthMutation, AuthError> {
	let creds = Credentials::new(
		aws.access_key_id.expose_secret(),
		aws.secret_access_key.expose_secret(),
		aws.session_token.clone(),
		None,
		"aigateway",
	);
	let identity = creds.into();
	let signing_params: aws_sigv4::http_request::SigningParams = SigningParams::builder()
		.identity(&identity)
		.region(&aws.region)
		.name(&aws.service)
		.time(SystemTime::now())
		.settings(SigningSettings::default())
		.build()
		.map_err(|e| AuthError::Invalid(e.to_string()))?
		.into();

	let uri = format!("https://{}{}", req.authority, req.path);
	let headers = [("host", req.authority)];
	let signable = SignableRequest::new(
		req.method,
		&uri,
		headers.into_iter(),
		SignableBody::Bytes(req.body),
	)
	.map_err(|e| AuthError::Invalid(e.to_string()))?;

	let (signature, _sig) = sign(signable, &signing_params)
		.map_err(|e| AuthError::Invalid(e.to_string()))?
		.into_parts();

	// Collect the signature headers without constructing a real request.
	let mut tmp = ::http::Request::builder()
		.method(req.method)
		.uri(&uri)
		.body(())
		.map_err(|e| AuthError::Invalid(e.to_string()))?;
	tmp.headers_mut().insert(
		::http::header::HOST,
		::http::HeaderValue::from_str(req.authority).map_err(|e| AuthError::Invalid(e.to_string()))?,
	);
	signature.apply_to_request_http1x(&mut tmp);
	let headers = tmp
		.headers()
		.iter()
		.filter(|(k, _)| *k != ::http::header::HOST)
		.filter_map(|(k, v)| {
			v.to_str()
				.ok()
				.map(|v| (k.as_str().to_string(), v.to_string()))
		})
		.collect();
	Ok(AuthMutation {
		headers,
		path: None,
	})
}

/// Azure access tokens fetched via the credential chain, cached with a
/// pre-expiry refresh window behind a read/write lock.
pub struct AzureTokenSource {
	credential: Arc<dyn TokenCredential>,
	cache: TokenCache,
}

impl AzureTokenSource {
	fn new() -> Result<Self, AuthError> {
		let credential =
			DefaultAzureCredential::new().map_err(|e| AuthError::Invalid(e.to_string()))?;
		Ok(Self {
			credential,
			cache: TokenCache::new(AZURE_REFRESH_MARGIN),
		})
	}

	async fn token(&self) -> Result<SecretString, AuthError> {
		let credential = self.credential.clone();
		self
			.cache
			.get_or_fetch(|| async move {
				let token = credential
					.get_token(&[AZURE_SCOPE], None)
					.await
					.map_err(|e| AuthError::Unavailable(e.to_string()))?;
				let now = time::OffsetDateTime::now_utc();
				let remaining = token.expires_on - now;
				let ttl = Duration::try_from(remaining).unwrap_or(Duration::ZERO);
				Ok((
					SecretString::from(token.token.secret().to_string()),
					Instant::now() + ttl,
				))
			})
			.await
	}
}

struct CachedToken {
	token: SecretString,
	expires_at: Instant,
}

/// Read-mostly token cache. Readers share the lock; a refresh takes the
/// write lock and double-checks that no concurrent refresh got there first.
pub struct TokenCache {
	inner: tokio::sync::RwLock<Option<CachedToken>>,
	refresh_margin: Duration,
}

impl TokenCache {
	pub fn new(refresh_margin: Duration) -> Self {
		Self {
			inner: tokio::sync::RwLock::new(None),
			refresh_margin,
		}
	}

	fn fresh(&self, cached: &CachedToken, now: Instant) -> bool {
		cached.expires_at.checked_duration_since(now).unwrap_or(Duration::ZERO) > self.refresh_margin
	}

	pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<SecretString, AuthError>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<(SecretString, Instant), AuthError>>,
	{
		let now = Instant::now();
		{
			let read = self.inner.read().await;
			if let Some(cached) = read.as_ref()
				&& self.fresh(cached, now)
			{
				return Ok(cached.token.clone());
			}
		}
		let mut write = self.inner.write().await;
		// Double-check under the write lock: another task may have
		// refreshed while we waited.
		if let Some(cached) = write.as_ref()
			&& self.fresh(cached, Instant::now())
		{
			return Ok(cached.token.clone());
		}
		let (token, expires_at) = fetch().await?;
		*write = Some(CachedToken {
			token: token.clone(),
			expires_at,
		});
		Ok(token)
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	#[tokio::test]
	async fn api_key_sets_bearer() {
		let handler = AuthHandler::ApiKey(SecretString::from("K"));
		let req = RequestContext {
			method: "POST",
			authority: "api.openai.com",
			path: "/v1/chat/completions",
			body: b"{}",
		};
		let m = handler.apply(&req).await.unwrap();
		assert_eq!(
			m.headers,
			vec![("authorization".to_string(), "Bearer K".to_string())]
		);
		assert!(m.path.is_none());
	}

	#[tokio::test]
	async fn gemini_key_rides_the_path() {
		let handler = AuthHandler::GeminiKey(SecretString::from("K"));
		let req = RequestContext {
			method: "POST",
			authority: "generativelanguage.googleapis.com",
			path: "/v1beta/models/gemini-2.0-flash:generateContent",
			body: b"{}",
		};
		let m = handler.apply(&req).await.unwrap();
		assert_eq!(
			m.path.as_deref(),
			Some("/v1beta/models/gemini-2.0-flash:generateContent?key=K")
		);

		let req = RequestContext {
			path: "/v1beta/models/gemini-2.0-flash:streamGenerateContent?alt=sse",
			..req
		};
		let m = handler.apply(&req).await.unwrap();
		assert!(m.path.unwrap().ends_with("?alt=sse&key=K"));
	}

	#[tokio::test]
	async fn azure_api_key_uses_native_header() {
		let handler = AuthHandler::AzureApiKey(SecretString::from("AZ"));
		let req = RequestContext {
			method: "POST",
			authority: "example.openai.azure.com",
			path: "/openai/deployments/d/chat/completions?api-version=x",
			body: b"{}",
		};
		let m = handler.apply(&req).await.unwrap();
		assert_eq!(m.headers, vec![("api-key".to_string(), "AZ".to_string())]);
	}

	#[tokio::test]
	async fn aws_signing_adds_sigv4_headers() {
		let handler = AuthHandler::Aws(AwsAuthConfig {
			access_key_id: SecretString::from("AKID"),
			secret_access_key: SecretString::from("SECRET"),
			session_token: None,
			region: "us-east-1".to_string(),
			service: "bedrock".to_string(),
		});
		let req = RequestContext {
			method: "POST",
			authority: "bedrock-runtime.us-east-1.amazonaws.com",
			path: "/model/anthropic.claude-3-haiku/converse",
			body: b"{\"messages\":[]}",
		};
		let m = handler.apply(&req).await.unwrap();
		let keys: Vec<&str> = m.headers.iter().map(|(k, _)| k.as_str()).collect();
		assert!(keys.contains(&"authorization"), "{keys:?}");
		assert!(keys.contains(&"x-amz-date"), "{keys:?}");
		let auth = &m.headers.iter().find(|(k, _)| k == "authorization").unwrap().1;
		assert!(auth.starts_with("AWS4-HMAC-SHA256"));
	}

	#[tokio::test]
	async fn token_cache_serves_fresh_token_without_refetch() {
		let cache = TokenCache::new(Duration::from_secs(300));
		let calls = AtomicUsize::new(0);
		for _ in 0..3 {
			let token = cache
				.get_or_fetch(|| async {
					calls.fetch_add(1, Ordering::SeqCst);
					Ok((
						SecretString::from("tok"),
						Instant::now() + Duration::from_secs(3600),
					))
				})
				.await
				.unwrap();
			assert_eq!(token.expose_secret(), "tok");
		}
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn token_cache_refreshes_inside_expiry_margin() {
		let cache = TokenCache::new(Duration::from_secs(300));
		let calls = AtomicUsize::new(0);
		let fetch = |ttl: u64, value: &'static str| {
			let calls = &calls;
			move || {
				calls.fetch_add(1, Ordering::SeqCst);
				async move {
					Ok((
						SecretString::from(value),
						Instant::now() + Duration::from_secs(ttl),
					))
				}
			}
		};
		// First token expires within the margin, so the next get refreshes.
		let t1 = cache.get_or_fetch(fetch(10, "short")).await.unwrap();
		assert_eq!(t1.expose_secret(), "short");
		let t2 = cache.get_or_fetch(fetch(3600, "long")).await.unwrap();
		assert_eq!(t2.expose_secret(), "long");
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn concurrent_readers_never_see_an_empty_token() {
		let cache = Arc::new(TokenCache::new(Duration::from_secs(300)));
		let mut tasks = tokio::task::JoinSet::new();
		for i in 0..16 {
			let cache = cache.clone();
			tasks.spawn(async move {
				cache
					.get_or_fetch(|| async move {
						tokio::time::sleep(Duration::from_millis(i % 3)).await;
						Ok((
							SecretString::from("tok"),
							Instant::now() + Duration::from_secs(3600),
						))
					})
					.await
					.unwrap()
			});
		}
		while let Some(res) = tasks.join_next().await {
			assert_eq!(res.unwrap().expose_secret(), "tok");
		}
	}
}
