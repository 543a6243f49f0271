//! # peer-session
//!
//! Peer session layer for PeerLink.
//!
//! This crate turns the pure state machine from `peer-core` into a working
//! session:
//! - [`ConnectionEngine`] - owns the transport, the handshake artifacts and
//!   the channel state
//! - [`MessageRouter`] - per-kind handler lists over the engine's channel
//! - [`PeerSession`] - both of the above plus the injected store
//! - [`Transport`] / [`TransportFactory`] - the pluggable connection seam,
//!   with [`MemoryNetwork`] for in-process peers and [`MockTransport`] for
//!   tests
//!
//! How descriptors and fragments reach the other peer is left to the
//! application; the session only produces and consumes them.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod notify;
pub mod router;
pub mod session;
pub mod store;
pub mod transport;

pub use config::{ConfigError, SessionConfig, SessionSettings, TransportConfig};
pub use engine::ConnectionEngine;
pub use error::{Result, SessionError};
pub use notify::{NotificationSink, Severity};
pub use router::{DispatchReport, HandlerError, MessageRouter};
pub use session::{load_or_create_connection_code, PeerSession};
pub use store::{keys, FileStore, KeyValueStore, KeyValueStoreExt, MemoryStore, StoreError};
pub use transport::{
    EventReceiver, EventSender, MemoryNetwork, MemoryTransport, MockFactory, MockTransport,
    Transport, TransportError, TransportEvent, TransportFactory,
};

// Re-export the types callers need for the handshake and messaging API
pub use peer_core::{ConnectionCode, ConnectionState, Role};
pub use peer_types::{kinds, Envelope, Fragment, HandshakeDescriptor, HandshakeRole, SignalMessage};
