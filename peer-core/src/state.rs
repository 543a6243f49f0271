//! Connection state machine for PeerLink.
//!
//! This module provides a pure, side-effect-free state machine for one peer
//! relationship. The state machine takes events as input and produces a new
//! state plus a list of actions to execute.
//!
//! The actual I/O (closing the transport, invoking observers) is performed by
//! peer-session, not by this module.
//!
//! ```text
//! Idle ──offer/accept──► Negotiating ──channel open──► Connected
//!   ▲                         │                            │
//!   │                         └──close/error/disconnect────┤
//!   └──────── initialize ◄──────────── Disconnected ◄──────┘
//! ```

/// Which side of the handshake this endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Created the local offer.
    Initiator,
    /// Accepted a remote offer and produced the answer.
    Responder,
}

/// Connection state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport allocated (or about to be), no negotiation started.
    Idle,
    /// Handshake in progress.
    Negotiating {
        /// Which side of the handshake we are.
        role: Role,
        /// Both the local and the counterpart descriptor have been applied.
        descriptors_applied: bool,
    },
    /// Channel open; sends are accepted.
    Connected {
        /// Which side of the handshake we were.
        role: Role,
    },
    /// Channel and transport closed. Recoverable via `Initialized`.
    Disconnected,
}

impl ConnectionState {
    /// Create a new state machine in the Idle state.
    pub fn new() -> Self {
        Self::Idle
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (peer-session)
    /// is responsible for executing the returned actions in order.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        match (self, event) {
            // Re-initialization after a finished cycle
            (Self::Idle | Self::Disconnected, Event::Initialized) => (Self::Idle, vec![]),

            // From Idle
            (Self::Idle, Event::LocalOfferCreated) => (
                Self::Negotiating {
                    role: Role::Initiator,
                    descriptors_applied: false,
                },
                vec![],
            ),
            (Self::Idle, Event::RemoteOfferAccepted) => (
                // Remote offer and local answer are both applied at this point
                Self::Negotiating {
                    role: Role::Responder,
                    descriptors_applied: true,
                },
                vec![],
            ),

            // From Negotiating
            (
                Self::Negotiating {
                    role: Role::Initiator,
                    descriptors_applied: false,
                },
                Event::RemoteAnswerApplied,
            ) => (
                Self::Negotiating {
                    role: Role::Initiator,
                    descriptors_applied: true,
                },
                vec![],
            ),
            (
                Self::Negotiating {
                    role,
                    descriptors_applied: true,
                },
                Event::ChannelOpened,
            ) => (
                Self::Connected { role },
                vec![
                    Action::NotifyObservers(true),
                    Action::EmitNotice(Notice::Connected),
                ],
            ),

            // Channel lost while negotiating or connected
            (Self::Negotiating { .. } | Self::Connected { .. }, Event::ChannelClosed { reason }) => (
                Self::Disconnected,
                vec![
                    Action::CloseTransport,
                    Action::NotifyObservers(false),
                    Action::EmitNotice(Notice::ConnectionLost { reason }),
                ],
            ),
            (Self::Negotiating { .. } | Self::Connected { .. }, Event::ChannelFailed { error }) => (
                Self::Disconnected,
                vec![
                    Action::CloseTransport,
                    Action::NotifyObservers(false),
                    Action::EmitNotice(Notice::ConnectionLost { reason: error }),
                ],
            ),

            // Local disconnect is always legal
            (Self::Disconnected, Event::DisconnectRequested) => {
                (Self::Disconnected, vec![Action::CloseTransport])
            }
            (_, Event::DisconnectRequested) => (
                Self::Disconnected,
                vec![
                    Action::CloseTransport,
                    Action::NotifyObservers(false),
                    Action::EmitNotice(Notice::Disconnected),
                ],
            ),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check whether a handshake step is legal from the current state.
    pub fn check(&self, step: HandshakeStep) -> Result<(), InvalidTransition> {
        let allowed = match step {
            HandshakeStep::CreateOffer | HandshakeStep::AcceptOffer => {
                matches!(self, Self::Idle)
            }
            HandshakeStep::ApplyAnswer => matches!(
                self,
                Self::Negotiating {
                    role: Role::Initiator,
                    descriptors_applied: false,
                }
            ),
            HandshakeStep::ApplyFragment => {
                matches!(self, Self::Negotiating { .. } | Self::Connected { .. })
            }
        };

        if allowed {
            Ok(())
        } else {
            Err(InvalidTransition {
                state: self.name(),
                step,
            })
        }
    }

    /// Check if the channel is open.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Check if a handshake is in progress.
    pub fn is_negotiating(&self) -> bool {
        matches!(self, Self::Negotiating { .. })
    }

    /// Check if the connection has been torn down.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// The handshake role, once negotiation has started.
    pub fn role(&self) -> Option<Role> {
        match self {
            Self::Negotiating { role, .. } | Self::Connected { role } => Some(*role),
            Self::Idle | Self::Disconnected => None,
        }
    }

    /// Short uppercase name of the state, for logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Negotiating { .. } => "NEGOTIATING",
            Self::Connected { .. } => "CONNECTED",
            Self::Disconnected => "DISCONNECTED",
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Events that can occur in the connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A fresh transport was allocated.
    Initialized,
    /// The local offer was produced (initiator path).
    LocalOfferCreated,
    /// A remote offer was applied and the local answer produced (responder path).
    RemoteOfferAccepted,
    /// The remote answer was applied (initiator path).
    RemoteAnswerApplied,
    /// The transport reported the message channel open.
    ChannelOpened,
    /// The transport reported the message channel closed.
    ChannelClosed {
        /// Reason for the close.
        reason: String,
    },
    /// The transport reported a channel error.
    ChannelFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// The application asked to disconnect.
    DisconnectRequested,
}

/// Handshake operations that are only legal in some states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    /// Produce the local offer.
    CreateOffer,
    /// Consume a remote offer and produce an answer.
    AcceptOffer,
    /// Consume the remote answer.
    ApplyAnswer,
    /// Apply an incremental fragment.
    ApplyFragment,
}

impl std::fmt::Display for HandshakeStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HandshakeStep::CreateOffer => "create local handshake",
            HandshakeStep::AcceptOffer => "accept remote handshake",
            HandshakeStep::ApplyAnswer => "finalize handshake",
            HandshakeStep::ApplyFragment => "apply remote fragment",
        };
        f.write_str(name)
    }
}

/// A handshake step attempted from a state that does not allow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot {step} while {state}")]
pub struct InvalidTransition {
    /// Name of the state the machine was in.
    pub state: &'static str,
    /// The rejected step.
    pub step: HandshakeStep,
}

/// Actions to be executed by peer-session.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Invoke every connection observer with this value.
    NotifyObservers(bool),
    /// Close the channel and release the transport.
    CloseTransport,
    /// Forward a notice to the notification sink.
    EmitNotice(Notice),
}

/// Lifecycle notices surfaced to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Channel is open.
    Connected,
    /// Channel closed or failed underneath us.
    ConnectionLost {
        /// Transport-provided reason.
        reason: String,
    },
    /// Local disconnect completed.
    Disconnected,
}
