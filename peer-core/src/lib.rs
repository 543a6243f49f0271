//! # peer-core
//!
//! Pure logic for PeerLink (no I/O, instant tests).
//!
//! This crate implements the connection state machine and the connection
//! code codec without any network or disk I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (transport, callbacks, storage) is performed by
//! `peer-session`, which interprets the actions produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod code;
pub mod state;

pub use code::{
    decode, decode_signal, encode, encode_signal, generate_short_code, validate_short_code,
    CodeError, ConnectionCode, CODE_VERSION, SHORT_CODE_LEN,
};
pub use state::{Action, ConnectionState, Event, HandshakeStep, InvalidTransition, Notice, Role};
