//! Connection codes and signal codes for PeerLink.
//!
//! This module provides:
//! - A reversible printable encoding for small objects (base64 JSON)
//! - [`ConnectionCode`], the human-shareable token identifying an endpoint
//! - Signal codes, the same encoding applied to [`SignalMessage`]
//! - Short display codes (8 characters, `A-Z0-9`)
//!
//! Decoding never yields a partially-populated object: any base64, UTF-8,
//! JSON or version problem is reported as a [`CodeError`].

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use peer_types::{PeerId, SignalMessage};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Current connection code format version.
pub const CODE_VERSION: u32 = 1;

/// Length of a short display code.
pub const SHORT_CODE_LEN: usize = 8;

const SHORT_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Error type for code operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeError {
    /// The code is not valid base64 or does not contain the expected JSON.
    #[error("invalid connection data: {0}")]
    InvalidPayload(String),
    /// The value could not be serialized.
    #[error("cannot encode connection data: {0}")]
    Serialization(String),
    /// The short code format is invalid.
    #[error("invalid short code: {0}")]
    InvalidShortCode(String),
    /// Version mismatch.
    #[error("unsupported code version: {0}")]
    UnsupportedVersion(u32),
}

/// Encode any serializable value as printable text.
///
/// Format: `BASE64URL(JSON(value))`, no padding.
pub fn encode<T: Serialize>(value: &T) -> Result<String, CodeError> {
    let json = serde_json::to_vec(value).map_err(|e| CodeError::Serialization(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Decode a value produced by [`encode`].
///
/// Surrounding whitespace is ignored so pasted codes decode cleanly.
pub fn decode<T: DeserializeOwned>(code: &str) -> Result<T, CodeError> {
    let json_bytes = URL_SAFE_NO_PAD
        .decode(code.trim())
        .map_err(|e| CodeError::InvalidPayload(format!("base64 decode: {}", e)))?;

    serde_json::from_slice(&json_bytes)
        .map_err(|e| CodeError::InvalidPayload(format!("json parse: {}", e)))
}

/// Encode a descriptor or fragment for the out-of-band channel.
pub fn encode_signal(message: &SignalMessage) -> Result<String, CodeError> {
    encode(message)
}

/// Decode a descriptor or fragment received out-of-band.
pub fn decode_signal(code: &str) -> Result<SignalMessage, CodeError> {
    decode(code)
}

/// A human-shareable token identifying one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionCode {
    /// Code format version.
    pub version: u32,
    /// Identity of the endpoint that issued the code.
    pub peer_id: PeerId,
    /// Display name of the user behind the endpoint.
    pub display_name: String,
    /// Short code shown in the UI.
    pub short_code: String,
    /// Unix timestamp when the code was created.
    pub created_at: u64,
}

impl ConnectionCode {
    /// Create a new connection code with a fresh short code.
    pub fn new(peer_id: PeerId, display_name: &str) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            version: CODE_VERSION,
            peer_id,
            display_name: display_name.to_string(),
            short_code: generate_short_code(),
            created_at,
        }
    }

    /// Encode as a shareable token.
    pub fn to_token(&self) -> Result<String, CodeError> {
        encode(self)
    }

    /// Decode a shareable token.
    ///
    /// Only the current version is accepted, and the embedded short code
    /// must be well-formed.
    pub fn from_token(token: &str) -> Result<Self, CodeError> {
        let code: Self = decode(token)?;

        if code.version != CODE_VERSION {
            return Err(CodeError::UnsupportedVersion(code.version));
        }
        validate_short_code(&code.short_code)?;

        Ok(code)
    }
}

/// Generate a random 8-character short code.
pub fn generate_short_code() -> String {
    let entropy = uuid::Uuid::new_v4();
    entropy.as_bytes()[..SHORT_CODE_LEN]
        .iter()
        .map(|b| SHORT_CODE_ALPHABET[*b as usize % SHORT_CODE_ALPHABET.len()] as char)
        .collect()
}

/// Validate a short code (8 characters, `A-Z` or `0-9`).
pub fn validate_short_code(code: &str) -> Result<(), CodeError> {
    if code.len() != SHORT_CODE_LEN {
        return Err(CodeError::InvalidShortCode(format!(
            "expected {} characters, got {}",
            SHORT_CODE_LEN,
            code.len()
        )));
    }

    if !code.chars().all(|c| matches!(c, 'A'..='Z' | '0'..='9')) {
        return Err(CodeError::InvalidShortCode(
            "invalid characters (must be A-Z or 0-9)".into(),
        ));
    }

    Ok(())
}
