//! Stateless session identity: the composite client session ID is an
//! encrypted blob of every upstream `(backend, session)` pair, and SSE
//! event IDs are encrypted `(backend, upstream event)` pairs. The
//! ciphertext is the state; no server-side table is required to resume.

use std::num::NonZeroU32;

use aws_lc_rs::aead::{AES_256_GCM, Aad, Nonce, RandomizedNonceKey};
use aws_lc_rs::pbkdf2;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::*;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const PBKDF2_ITERATIONS: u32 = 100_000;
const PBKDF2_SALT: &[u8] = b"aigateway-mcp-session-v1";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SessionError {
	#[error("session id is invalid")]
	Invalid,
	#[error("encryption failed")]
	EncryptionFailed,
}

/// AES-256-GCM sealer with a PBKDF2-derived key. Every gateway replica
/// configured with the same seed can decrypt any replica's IDs.
pub struct SessionCrypto {
	key: RandomizedNonceKey,
}

impl Debug for SessionCrypto {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SessionCrypto").finish()
	}
}

impl SessionCrypto {
	pub fn new(seed: &str) -> Result<Self, SessionError> {
		let mut key = [0u8; KEY_LEN];
		pbkdf2::derive(
			pbkdf2::PBKDF2_HMAC_SHA256,
			NonZeroU32::new(PBKDF2_ITERATIONS).expect("nonzero"),
			PBKDF2_SALT,
			seed.as_bytes(),
			&mut key,
		);
		let key = RandomizedNonceKey::new(&AES_256_GCM, &key).map_err(|_| SessionError::Invalid)?;
		Ok(Self { key })
	}

	pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, SessionError> {
		let mut in_out = plaintext.to_vec();
		let nonce = self
			.key
			.seal_in_place_append_tag(Aad::empty(), &mut in_out)
			.map_err(|_| SessionError::EncryptionFailed)?;
		// Format: nonce || ciphertext+tag.
		let mut result = nonce.as_ref().to_vec();
		result.extend_from_slice(&in_out);
		Ok(URL_SAFE_NO_PAD.encode(&result))
	}

	pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>, SessionError> {
		let data = URL_SAFE_NO_PAD
			.decode(encoded)
			.map_err(|_| SessionError::Invalid)?;
		if data.len() < NONCE_LEN {
			return Err(SessionError::Invalid);
		}
		let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
		let nonce =
			Nonce::try_assume_unique_for_key(nonce_bytes).map_err(|_| SessionError::Invalid)?;
		let mut in_out = ciphertext.to_vec();
		let plaintext = self
			.key
			.open_in_place(nonce, Aad::empty(), &mut in_out)
			.map_err(|_| SessionError::Invalid)?;
		Ok(plaintext.to_vec())
	}
}

/// The tuple of upstream sessions behind one client session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeSession {
	#[serde(rename = "s")]
	pub sessions: Vec<BackendSession>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSession {
	#[serde(rename = "b")]
	pub backend: String,
	/// The upstream `Mcp-Session-Id`; empty when the backend is stateless.
	#[serde(rename = "s", default, skip_serializing_if = "String::is_empty")]
	pub session: String,
}

impl CompositeSession {
	pub fn encode(&self, crypto: &SessionCrypto) -> Result<String, SessionError> {
		let json = serde_json::to_vec(self).map_err(|_| SessionError::EncryptionFailed)?;
		crypto.encrypt(&json)
	}

	pub fn decode(encoded: &str, crypto: &SessionCrypto) -> Result<Self, SessionError> {
		let plaintext = crypto.decrypt(encoded)?;
		serde_json::from_slice(&plaintext).map_err(|_| SessionError::Invalid)
	}

	pub fn session_for(&self, backend: &str) -> Option<&str> {
		self
			.sessions
			.iter()
			.find(|s| s.backend == backend)
			.map(|s| s.session.as_str())
	}
}

/// An SSE event ID, self-describing so `Last-Event-ID` resumption can be
/// routed back to the backend that produced the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventId {
	#[serde(rename = "b")]
	pub backend: String,
	#[serde(rename = "e")]
	pub event_id: String,
}

impl EventId {
	pub fn encode(&self, crypto: &SessionCrypto) -> Result<String, SessionError> {
		let json = serde_json::to_vec(self).map_err(|_| SessionError::EncryptionFailed)?;
		crypto.encrypt(&json)
	}

	pub fn decode(encoded: &str, crypto: &SessionCrypto) -> Result<Self, SessionError> {
		let plaintext = crypto.decrypt(encoded)?;
		serde_json::from_slice(&plaintext).map_err(|_| SessionError::Invalid)
	}
}
