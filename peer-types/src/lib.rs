//! # peer-types
//!
//! Wire format types for the PeerLink peer session layer.
//!
//! This crate provides the foundational types shared by all PeerLink crates:
//! - [`Envelope`] - The `{kind, payload}` unit routed over the channel
//! - [`HandshakeDescriptor`], [`Fragment`] - Opaque negotiation artifacts
//! - [`SignalMessage`] - What an out-of-band signaling channel must carry
//! - [`PeerId`] - Identity of one endpoint
//! - [`WireError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod descriptor;
mod envelope;
mod error;
mod ids;

pub use descriptor::{Fragment, HandshakeDescriptor, HandshakeRole, SignalMessage};
pub use envelope::{kinds, Envelope};
pub use error::WireError;
pub use ids::PeerId;
