//! Envelope - the wire format wrapper for all routed messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::WireError;

/// Message kinds used by the chat feature.
///
/// The router accepts any kind string; these are the ones the bundled
/// application layer publishes and subscribes to.
pub mod kinds {
    /// A chat message with `{id, text, sender, timestamp}`.
    pub const CHAT_MESSAGE: &str = "chat_message";
    /// The remote user started typing.
    pub const TYPING_START: &str = "typing_start";
    /// The remote user stopped typing.
    pub const TYPING_STOP: &str = "typing_stop";
    /// Profile information exchanged after connecting.
    pub const USER_INFO: &str = "user_info";
}

/// A routed message unit.
///
/// On the wire this is a JSON object with exactly two top-level fields,
/// `kind` and `payload`. There is no version field; receivers drop kinds
/// they do not know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    /// Routing tag, e.g. `"chat_message"`.
    pub kind: String,
    /// Arbitrary structured payload.
    pub payload: Value,
}

impl Envelope {
    /// Create a new envelope.
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(self).map_err(WireError::Serialization)
    }

    /// Deserialize from JSON bytes.
    ///
    /// Fails on anything that is not an object with a non-empty string
    /// `kind` and a `payload`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let envelope: Self = serde_json::from_slice(bytes).map_err(WireError::Deserialization)?;
        if envelope.kind.is_empty() {
            return Err(WireError::InvalidData("envelope kind is empty".into()));
        }
        Ok(envelope)
    }

    /// Deserialize from a JSON text frame.
    pub fn from_text(text: &str) -> Result<Self, WireError> {
        Self::from_bytes(text.as_bytes())
    }
}
