//! Error types for PeerLink wire formats.

use thiserror::Error;

/// Errors that can occur while encoding or decoding wire values.
#[derive(Debug, Error)]
pub enum WireError {
    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// JSON deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// Payload is not valid UTF-8 text
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Invalid data format
    #[error("invalid data: {0}")]
    InvalidData(String),
}
