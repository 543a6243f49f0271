//! Handshake artifacts exchanged out-of-band between two engines.
//!
//! Both descriptors and fragments are opaque to everything above the
//! transport. They are carried as raw bytes and serialized as URL-safe
//! base64 text so they survive copy/paste and JSON relays.

use serde::{Deserialize, Serialize};

/// Which side of the negotiation produced a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeRole {
    /// Produced by the initiator.
    Offer,
    /// Produced by the responder in reply to an offer.
    Answer,
}

impl std::fmt::Display for HandshakeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandshakeRole::Offer => write!(f, "offer"),
            HandshakeRole::Answer => write!(f, "answer"),
        }
    }
}

/// An opaque negotiation descriptor produced by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeDescriptor {
    /// Offer or answer.
    pub role: HandshakeRole,
    /// Transport-specific bytes.
    #[serde(with = "base64_bytes")]
    pub blob: Vec<u8>,
}

impl HandshakeDescriptor {
    /// Create an offer descriptor.
    pub fn offer(blob: Vec<u8>) -> Self {
        Self {
            role: HandshakeRole::Offer,
            blob,
        }
    }

    /// Create an answer descriptor.
    pub fn answer(blob: Vec<u8>) -> Self {
        Self {
            role: HandshakeRole::Answer,
            blob,
        }
    }
}

/// Incremental connectivity data produced after the initial descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// Transport-specific bytes.
    #[serde(with = "base64_bytes")]
    pub blob: Vec<u8>,
}

impl Fragment {
    /// Create a fragment from raw bytes.
    pub fn new(blob: Vec<u8>) -> Self {
        Self { blob }
    }
}

/// Everything that has to cross the out-of-band signaling channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalMessage {
    /// An offer or answer.
    Descriptor(HandshakeDescriptor),
    /// A connectivity fragment.
    Fragment(Fragment),
}

impl From<HandshakeDescriptor> for SignalMessage {
    fn from(descriptor: HandshakeDescriptor) -> Self {
        SignalMessage::Descriptor(descriptor)
    }
}

impl From<Fragment> for SignalMessage {
    fn from(fragment: Fragment) -> Self {
        SignalMessage::Fragment(fragment)
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        URL_SAFE_NO_PAD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
