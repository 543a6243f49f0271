//! ConnectionEngine - owns the transport lifecycle for one peer relationship.
//!
//! The engine drives the pure [`ConnectionState`] machine from peer-core and
//! interprets the actions it returns against a [`Transport`]:
//!
//! ```text
//! caller ──handshake calls──► ConnectionEngine ──► Transport ──► network
//!                                   ▲    │
//!              TransportEvent queue ┘    └─► observers / notification sink
//! ```
//!
//! Transport events are queued by the transport and handled one at a time
//! through [`ConnectionEngine::handle_event`]; nothing in the engine is
//! shared, so all mutation happens on whichever task owns it.

use std::panic::{catch_unwind, AssertUnwindSafe};

use peer_core::{Action, ConnectionState, Event, HandshakeStep, Notice, Role};
use peer_types::{Envelope, Fragment, HandshakeDescriptor, HandshakeRole};
use tokio::sync::mpsc;

use crate::config::TransportConfig;
use crate::error::{Result, SessionError};
use crate::notify::{NotificationSink, Severity};
use crate::transport::{EventReceiver, Transport, TransportEvent, TransportFactory};

type Observer = Box<dyn FnMut(bool) + Send + Sync>;
type FragmentSink = Box<dyn FnMut(&Fragment) + Send + Sync>;

/// Manages the transport, its handshake artifacts and the channel state.
pub struct ConnectionEngine<F: TransportFactory> {
    factory: F,
    config: TransportConfig,
    transport: Option<F::Transport>,
    events: Option<EventReceiver>,
    state: ConnectionState,
    local_handshake: Option<HandshakeDescriptor>,
    remote_handshake: Option<HandshakeDescriptor>,
    observers: Vec<Observer>,
    fragment_sink: Option<FragmentSink>,
    notifier: NotificationSink,
}

impl<F: TransportFactory> ConnectionEngine<F> {
    /// Create an engine. No transport is allocated until [`initialize`].
    ///
    /// [`initialize`]: ConnectionEngine::initialize
    pub fn new(factory: F, config: TransportConfig) -> Self {
        Self {
            factory,
            config,
            transport: None,
            events: None,
            state: ConnectionState::new(),
            local_handshake: None,
            remote_handshake: None,
            observers: Vec::new(),
            fragment_sink: None,
            notifier: NotificationSink::default(),
        }
    }

    // ===========================================
    // Lifecycle
    // ===========================================

    /// Allocate a transport. Returns false if it cannot be allocated.
    pub async fn initialize(&mut self) -> bool {
        match self.try_initialize().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("{}", e);
                false
            }
        }
    }

    /// Allocate a transport and start a fresh cycle in `IDLE`.
    ///
    /// An active negotiation or connection is torn down first. If the new
    /// transport cannot be allocated, the engine is left exactly as it was.
    pub async fn try_initialize(&mut self) -> Result<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = match self.factory.allocate(&self.config, tx) {
            Ok(transport) => transport,
            Err(e) => {
                self.notifier
                    .notify("Failed to initialize connection", Severity::Error);
                return Err(SessionError::Initialization(e.to_string()));
            }
        };

        if self.state.is_negotiating() || self.state.is_connected() {
            self.disconnect().await;
        }
        if let Some(old) = self.transport.take() {
            if let Err(e) = old.close().await {
                tracing::debug!("Closing previous transport: {}", e);
            }
        }

        self.transport = Some(transport);
        self.events = Some(rx);
        self.local_handshake = None;
        self.remote_handshake = None;
        self.transition(Event::Initialized).await;

        tracing::debug!("Transport initialized");
        Ok(())
    }

    /// Create the message channel and produce the local offer (initiator).
    pub async fn create_local_handshake(&mut self) -> Result<HandshakeDescriptor> {
        self.state.check(HandshakeStep::CreateOffer)?;
        let transport = self.transport()?;

        transport
            .open_channel(&self.config.channel_label, self.config.ordered)
            .await
            .map_err(|e| SessionError::Handshake(e.to_string()))?;
        let offer = transport
            .create_offer()
            .await
            .map_err(|e| SessionError::Handshake(e.to_string()))?;

        self.local_handshake = Some(offer.clone());
        self.transition(Event::LocalOfferCreated).await;
        tracing::info!("Created local offer");
        Ok(offer)
    }

    /// Apply the peer's offer and produce the answer (responder).
    pub async fn accept_remote_handshake(
        &mut self,
        offer: &HandshakeDescriptor,
    ) -> Result<HandshakeDescriptor> {
        self.state.check(HandshakeStep::AcceptOffer)?;
        expect_role(offer, HandshakeRole::Offer)?;

        let answer = self
            .transport()?
            .accept_offer(offer)
            .await
            .map_err(|e| SessionError::Handshake(e.to_string()))?;

        self.remote_handshake = Some(offer.clone());
        self.local_handshake = Some(answer.clone());
        self.transition(Event::RemoteOfferAccepted).await;
        tracing::info!("Accepted remote offer");
        Ok(answer)
    }

    /// Apply the peer's answer (initiator).
    ///
    /// Completion is reported later by the channel-open event.
    pub async fn finalize_handshake(&mut self, answer: &HandshakeDescriptor) -> Result<()> {
        self.state.check(HandshakeStep::ApplyAnswer)?;
        expect_role(answer, HandshakeRole::Answer)?;

        self.transport()?
            .accept_answer(answer)
            .await
            .map_err(|e| SessionError::Handshake(e.to_string()))?;

        self.remote_handshake = Some(answer.clone());
        self.transition(Event::RemoteAnswerApplied).await;
        tracing::info!("Applied remote answer");
        Ok(())
    }

    /// Apply a fragment from the peer. Failures are logged and swallowed.
    pub async fn supply_remote_fragment(&mut self, fragment: &Fragment) {
        if let Err(e) = self.try_apply_fragment(fragment).await {
            tracing::warn!("Ignoring fragment: {}", e);
        }
    }

    async fn try_apply_fragment(&self, fragment: &Fragment) -> Result<()> {
        self.state
            .check(HandshakeStep::ApplyFragment)
            .map_err(|e| SessionError::Fragment(e.to_string()))?;
        self.transport()
            .map_err(|e| SessionError::Fragment(e.to_string()))?
            .add_fragment(fragment)
            .await
            .map_err(|e| SessionError::Fragment(e.to_string()))
    }

    /// Send an envelope. True iff the channel is open and the write succeeded.
    pub async fn send(&self, envelope: &Envelope) -> bool {
        let transport = match (&self.transport, self.state.is_connected()) {
            (Some(transport), true) => transport,
            _ => {
                tracing::debug!(
                    kind = %envelope.kind,
                    "{} while {}",
                    SessionError::SendRejected,
                    self.state
                );
                return false;
            }
        };

        let bytes = match envelope.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Cannot encode {:?} message: {}", envelope.kind, e);
                return false;
            }
        };

        match transport.send(&bytes).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Send failed: {}", e);
                self.notifier
                    .notify("Failed to send message", Severity::Error);
                false
            }
        }
    }

    /// Close the channel and transport. Safe to call in any state.
    pub async fn disconnect(&mut self) {
        self.transition(Event::DisconnectRequested).await;
    }

    // ===========================================
    // Callbacks
    // ===========================================

    /// Register a callback for connected (`true`) / disconnected (`false`).
    pub fn observe_state_changes<C>(&mut self, callback: C)
    where
        C: FnMut(bool) + Send + Sync + 'static,
    {
        self.observers.push(Box::new(callback));
    }

    /// Route locally generated fragments to the signaling collaborator.
    pub fn set_fragment_sink<C>(&mut self, sink: C)
    where
        C: FnMut(&Fragment) + Send + Sync + 'static,
    {
        self.fragment_sink = Some(Box::new(sink));
    }

    /// Replace the notification sink.
    pub fn set_notification_sink(&mut self, sink: NotificationSink) {
        self.notifier = sink;
    }

    // ===========================================
    // Transport events
    // ===========================================

    /// Take the next queued transport event without waiting.
    pub fn try_next_event(&mut self) -> Option<TransportEvent> {
        self.events.as_mut()?.try_recv().ok()
    }

    /// Wait for the next transport event.
    ///
    /// Returns `None` if no transport was ever allocated or the transport
    /// dropped its end of the queue.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        match self.events.as_mut() {
            Some(events) => events.recv().await,
            None => None,
        }
    }

    /// Handle one transport event.
    ///
    /// Returns the decoded envelope for inbound messages so the caller can
    /// hand it to the router.
    pub async fn handle_event(&mut self, event: TransportEvent) -> Option<Envelope> {
        match event {
            TransportEvent::ChannelOpen => {
                let before = self.state.name();
                self.transition(Event::ChannelOpened).await;
                if !self.state.is_connected() {
                    tracing::debug!("Ignoring channel open while {}", before);
                }
                None
            }
            TransportEvent::ChannelClosed { reason } => {
                self.transition(Event::ChannelClosed { reason }).await;
                None
            }
            TransportEvent::ChannelError { error } => {
                self.transition(Event::ChannelFailed { error }).await;
                None
            }
            TransportEvent::Message(bytes) => self.decode_message(&bytes),
            TransportEvent::FragmentGenerated(fragment) => {
                match self.fragment_sink.as_mut() {
                    Some(sink) => {
                        if catch_unwind(AssertUnwindSafe(|| sink(&fragment))).is_err() {
                            tracing::warn!("Fragment sink panicked");
                        }
                    }
                    None => tracing::debug!("Local fragment generated ({} bytes)", fragment.blob.len()),
                }
                None
            }
        }
    }

    fn decode_message(&self, bytes: &[u8]) -> Option<Envelope> {
        if !self.state.is_connected() {
            tracing::debug!("Dropping message received while {}", self.state);
            return None;
        }

        match Envelope::from_bytes(bytes) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                tracing::warn!("Dropping inbound message: {}", SessionError::from(e));
                None
            }
        }
    }

    // ===========================================
    // Accessors
    // ===========================================

    /// Current connection state.
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Whether the message channel is open.
    pub fn is_channel_open(&self) -> bool {
        self.state.is_connected()
    }

    /// Our descriptor for the current cycle, once produced.
    pub fn local_handshake(&self) -> Option<&HandshakeDescriptor> {
        self.local_handshake.as_ref()
    }

    /// The peer's descriptor for the current cycle, once applied.
    pub fn remote_handshake(&self) -> Option<&HandshakeDescriptor> {
        self.remote_handshake.as_ref()
    }

    /// Our side of the handshake, once negotiation has started.
    pub fn role(&self) -> Option<Role> {
        self.state.role()
    }

    /// Transport configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    // ===========================================
    // Internals
    // ===========================================

    fn transport(&self) -> Result<&F::Transport> {
        self.transport
            .as_ref()
            .ok_or_else(|| SessionError::Handshake("transport not initialized".into()))
    }

    async fn transition(&mut self, event: Event) {
        let state = std::mem::take(&mut self.state);
        let before = state.name();
        let (next, actions) = state.on_event(event);
        if next.name() != before {
            tracing::debug!("Connection state {} -> {}", before, next);
        }
        self.state = next;

        for action in actions {
            self.execute(action).await;
        }
    }

    async fn execute(&mut self, action: Action) {
        match action {
            Action::CloseTransport => {
                if let Some(transport) = &self.transport {
                    if let Err(e) = transport.close().await {
                        tracing::debug!("Transport close failed: {}", e);
                    }
                }
            }
            Action::NotifyObservers(open) => {
                for (index, observer) in self.observers.iter_mut().enumerate() {
                    if catch_unwind(AssertUnwindSafe(|| observer(open))).is_err() {
                        tracing::warn!("Connection observer {} panicked", index);
                    }
                }
            }
            Action::EmitNotice(notice) => match notice {
                Notice::Connected => {
                    tracing::info!("Channel open");
                    self.notifier.notify("Connected!", Severity::Success);
                }
                Notice::ConnectionLost { reason } => {
                    tracing::info!("Connection lost: {}", reason);
                    self.notifier.notify("Connection lost", Severity::Error);
                }
                Notice::Disconnected => {
                    tracing::info!("Disconnected");
                    self.notifier.notify("Disconnected", Severity::Info);
                }
            },
        }
    }
}

fn expect_role(descriptor: &HandshakeDescriptor, expected: HandshakeRole) -> Result<()> {
    if descriptor.role == expected {
        Ok(())
    } else {
        Err(SessionError::Handshake(format!(
            "expected {} descriptor, got {}",
            expected, descriptor.role
        )))
    }
}

impl<F: TransportFactory> std::fmt::Debug for ConnectionEngine<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionEngine")
            .field("state", &self.state)
            .field("config", &self.config)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}
