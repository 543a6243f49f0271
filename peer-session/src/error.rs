//! Error types for peer sessions.

use crate::store::StoreError;
use crate::transport::TransportError;
use peer_core::{CodeError, InvalidTransition};
use peer_types::WireError;
use thiserror::Error;

/// Errors that can occur in a peer session.
///
/// Only [`SessionError::Initialization`], [`SessionError::Handshake`] and
/// the collaborator errors are ever returned to callers. The remaining
/// variants describe failures the session absorbs and logs.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The transport could not be allocated.
    #[error("initialization failed: {0}")]
    Initialization(String),

    /// A handshake call was made out of sequence or rejected by the transport.
    #[error("handshake error: {0}")]
    Handshake(String),

    /// A handshake fragment could not be applied.
    #[error("fragment error: {0}")]
    Fragment(String),

    /// Send attempted while the channel is not open.
    #[error("send rejected: channel not open")]
    SendRejected,

    /// An inbound payload could not be parsed.
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] WireError),

    /// A message handler failed.
    #[error("handler for {kind:?} failed: {reason}")]
    HandlerFailure {
        /// Kind of the message being dispatched.
        kind: String,
        /// What went wrong.
        reason: String,
    },

    /// Transport error outside the handshake.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Connection code could not be encoded or decoded.
    #[error("connection code error: {0}")]
    Code(#[from] CodeError),

    /// The key-value store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<InvalidTransition> for SessionError {
    fn from(err: InvalidTransition) -> Self {
        SessionError::Handshake(err.to_string())
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
