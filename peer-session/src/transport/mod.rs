//! Transport abstraction for PeerLink.
//!
//! This module provides a pluggable transport layer that abstracts the
//! underlying peer connection (a WebRTC-style connection with one data
//! channel, an in-process network, or a mock for testing).
//!
//! # Design
//!
//! A [`TransportFactory`] allocates one [`Transport`] per connection cycle
//! and hands it the sending half of an event queue. The transport pushes
//! [`TransportEvent`]s (channel open/close/error, inbound messages, locally
//! generated fragments) into that queue from wherever its I/O runs; the
//! engine drains the queue on its own task so event handling is never
//! concurrent with other event handling.
//!
//! The negotiation methods are async and connection-oriented:
//! - `open_channel()` + `create_offer()` on the initiator
//! - `accept_offer()` on the responder
//! - `accept_answer()` back on the initiator
//! - `add_fragment()` on either side as fragments arrive
//! - `send()` / `close()` once negotiated

mod memory;
mod mock;

pub use memory::{MemoryNetwork, MemoryTransport};
pub use mock::{MockFactory, MockTransport};

use async_trait::async_trait;
use peer_types::{Fragment, HandshakeDescriptor};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::TransportConfig;

/// Sending half of the engine's event queue.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiving half of the engine's event queue.
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport could not be allocated.
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// The transport configuration was refused.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),

    /// The transport refused a negotiation step.
    #[error("negotiation rejected: {0}")]
    NegotiationRejected(String),

    /// A remote descriptor could not be parsed or applied.
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// A remote fragment could not be parsed or applied.
    #[error("invalid fragment: {0}")]
    InvalidFragment(String),

    /// The message channel is not open.
    #[error("channel not open")]
    ChannelNotOpen,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The transport has been closed.
    #[error("transport closed")]
    Closed,
}

/// Events a transport reports asynchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The message channel is open.
    ChannelOpen,
    /// The message channel closed.
    ChannelClosed {
        /// Reason for the close.
        reason: String,
    },
    /// The message channel failed.
    ChannelError {
        /// Error message describing the failure.
        error: String,
    },
    /// Raw bytes arrived on the message channel.
    Message(Vec<u8>),
    /// A local fragment is ready to be sent out-of-band.
    FragmentGenerated(Fragment),
}

/// Allocates transports.
///
/// Allocation is where platform capability is checked; a factory that
/// cannot produce a transport returns [`TransportError::Unavailable`].
pub trait TransportFactory: Send + Sync {
    /// The transport type this factory produces.
    type Transport: Transport;

    /// Allocate a transport that reports its events on `events`.
    fn allocate(
        &self,
        config: &TransportConfig,
        events: EventSender,
    ) -> Result<Self::Transport, TransportError>;
}

/// One peer connection with a single ordered message channel.
///
/// Implementations handle the underlying connection mechanism
/// (WebRTC, in-memory, mock, etc).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Create the outbound message channel (initiator only).
    async fn open_channel(&self, label: &str, ordered: bool) -> Result<(), TransportError>;

    /// Produce the local offer and start negotiation.
    async fn create_offer(&self) -> Result<HandshakeDescriptor, TransportError>;

    /// Apply a remote offer and produce the local answer.
    async fn accept_offer(
        &self,
        offer: &HandshakeDescriptor,
    ) -> Result<HandshakeDescriptor, TransportError>;

    /// Apply the remote answer.
    async fn accept_answer(&self, answer: &HandshakeDescriptor) -> Result<(), TransportError>;

    /// Apply an incremental remote fragment.
    async fn add_fragment(&self, fragment: &Fragment) -> Result<(), TransportError>;

    /// Write bytes to the message channel.
    async fn send(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Close the channel and the connection. Must be idempotent.
    async fn close(&self) -> Result<(), TransportError>;
}
