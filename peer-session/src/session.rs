//! PeerSession - the engine and router wired together.
//!
//! A session owns one [`ConnectionEngine`] and one [`MessageRouter`] and is
//! the single owner of both: handshake calls, sends and event processing
//! all go through `&mut self`, so transport events and handler execution
//! are serialized on whatever task drives the session.
//!
//! # Example
//!
//! ```ignore
//! use peer_session::{MemoryNetwork, MemoryStore, PeerSession, SessionConfig};
//!
//! let network = MemoryNetwork::new();
//! let mut session = PeerSession::new(network, SessionConfig::default(), Arc::new(MemoryStore::new()));
//!
//! session.on_message("chat_message", |payload| {
//!     println!("{}", payload["text"]);
//!     Ok(())
//! });
//! session.initialize().await;
//! let offer = session.create_local_handshake().await?;
//! // ... carry the offer to the peer, bring back its answer ...
//! session.finalize_handshake(&answer).await?;
//! session.run_until_disconnected().await;
//! ```

use std::sync::Arc;

use peer_core::{ConnectionCode, ConnectionState};
use peer_types::{Envelope, Fragment, HandshakeDescriptor, PeerId};
use serde_json::Value;

use crate::config::{SessionConfig, SessionSettings};
use crate::engine::ConnectionEngine;
use crate::error::Result;
use crate::notify::NotificationSink;
use crate::router::{DispatchReport, HandlerError, MessageRouter};
use crate::store::{keys, KeyValueStore};
use crate::transport::{TransportEvent, TransportFactory};

/// One peer relationship: connection engine, message router and store.
pub struct PeerSession<F: TransportFactory> {
    engine: ConnectionEngine<F>,
    router: MessageRouter,
    settings: SessionSettings,
    store: Arc<dyn KeyValueStore>,
}

impl<F: TransportFactory> PeerSession<F> {
    /// Create a session. Call [`initialize`](Self::initialize) before
    /// negotiating.
    pub fn new(factory: F, config: SessionConfig, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            engine: ConnectionEngine::new(factory, config.transport),
            router: MessageRouter::new(),
            settings: config.session,
            store,
        }
    }

    /// Allocate the transport. Returns false if it cannot be allocated.
    pub async fn initialize(&mut self) -> bool {
        self.engine.initialize().await
    }

    /// Allocate the transport, reporting why it failed.
    pub async fn try_initialize(&mut self) -> Result<()> {
        self.engine.try_initialize().await
    }

    /// See [`ConnectionEngine::create_local_handshake`].
    pub async fn create_local_handshake(&mut self) -> Result<HandshakeDescriptor> {
        self.engine.create_local_handshake().await
    }

    /// See [`ConnectionEngine::accept_remote_handshake`].
    pub async fn accept_remote_handshake(
        &mut self,
        offer: &HandshakeDescriptor,
    ) -> Result<HandshakeDescriptor> {
        self.engine.accept_remote_handshake(offer).await
    }

    /// See [`ConnectionEngine::finalize_handshake`].
    pub async fn finalize_handshake(&mut self, answer: &HandshakeDescriptor) -> Result<()> {
        self.engine.finalize_handshake(answer).await
    }

    /// See [`ConnectionEngine::supply_remote_fragment`].
    pub async fn supply_remote_fragment(&mut self, fragment: &Fragment) {
        self.engine.supply_remote_fragment(fragment).await
    }

    /// Close the connection. Safe to call in any state.
    pub async fn disconnect(&mut self) {
        self.engine.disconnect().await
    }

    /// Register a connected/disconnected observer.
    pub fn observe_state_changes<C>(&mut self, callback: C)
    where
        C: FnMut(bool) + Send + Sync + 'static,
    {
        self.engine.observe_state_changes(callback);
    }

    /// Route locally generated fragments to the signaling collaborator.
    pub fn set_fragment_sink<C>(&mut self, sink: C)
    where
        C: FnMut(&Fragment) + Send + Sync + 'static,
    {
        self.engine.set_fragment_sink(sink);
    }

    /// Replace the notification sink.
    pub fn set_notification_sink(&mut self, sink: NotificationSink) {
        self.engine.set_notification_sink(sink);
    }

    /// Register a handler for a message kind.
    pub fn on_message<H>(&mut self, kind: impl Into<String>, handler: H)
    where
        H: FnMut(&Value) -> std::result::Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.router.on_message(kind, handler);
    }

    /// Send a `kind` message. False if the channel is not open or the write
    /// failed.
    pub async fn publish(&self, kind: &str, payload: Value) -> bool {
        self.router.publish(&self.engine, kind, payload).await
    }

    /// Send a prepared envelope.
    pub async fn send(&self, envelope: &Envelope) -> bool {
        self.engine.send(envelope).await
    }

    // ===========================================
    // Event processing
    // ===========================================

    /// Handle queued transport events without waiting.
    ///
    /// At most `max_events_per_drain` events are handled per call. Returns
    /// how many were handled.
    pub async fn process_pending(&mut self) -> usize {
        let limit = self.settings.max_events_per_drain.max(1);
        let mut handled = 0;

        while handled < limit {
            let Some(event) = self.engine.try_next_event() else {
                break;
            };
            self.handle(event).await;
            handled += 1;
        }

        handled
    }

    /// Wait for one transport event and handle it.
    ///
    /// Returns false once the transport's event queue is closed.
    pub async fn next(&mut self) -> bool {
        match self.engine.next_event().await {
            Some(event) => {
                self.handle(event).await;
                true
            }
            None => false,
        }
    }

    /// Handle events until the connection is torn down.
    pub async fn run_until_disconnected(&mut self) {
        while !self.engine.state().is_disconnected() {
            if !self.next().await {
                break;
            }
        }
    }

    async fn handle(&mut self, event: TransportEvent) -> Option<DispatchReport> {
        let envelope = self.engine.handle_event(event).await?;
        let report = self.router.dispatch(&envelope);
        tracing::debug!(
            kind = %envelope.kind,
            delivered = report.delivered,
            failed = report.failed,
            "Dispatched message"
        );
        Some(report)
    }

    // ===========================================
    // Connection code
    // ===========================================

    /// The local connection code, created and persisted on first use.
    pub fn connection_code(&self) -> Result<ConnectionCode> {
        load_or_create_connection_code(self.store.as_ref(), &self.settings.display_name)
    }

    // ===========================================
    // Accessors
    // ===========================================

    /// Current connection state.
    pub fn state(&self) -> &ConnectionState {
        self.engine.state()
    }

    /// Whether the message channel is open.
    pub fn is_channel_open(&self) -> bool {
        self.engine.is_channel_open()
    }

    /// The connection engine.
    pub fn engine(&self) -> &ConnectionEngine<F> {
        &self.engine
    }

    /// The message router.
    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    /// The injected key-value store.
    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }
}

/// Read the connection code persisted in `store`, creating one if absent.
///
/// A stored code that no longer decodes is replaced.
pub fn load_or_create_connection_code(
    store: &dyn KeyValueStore,
    display_name: &str,
) -> Result<ConnectionCode> {
    if let Some(token) = store.get(keys::CONNECTION_CODE)? {
        match ConnectionCode::from_token(&token) {
            Ok(code) => return Ok(code),
            Err(e) => tracing::warn!("Replacing stored connection code: {}", e),
        }
    }

    let code = ConnectionCode::new(PeerId::random(), display_name);
    store.set(keys::CONNECTION_CODE, &code.to_token()?)?;
    tracing::info!("Created connection code {}", code.short_code);
    Ok(code)
}

impl<F: TransportFactory> std::fmt::Debug for PeerSession<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSession")
            .field("engine", &self.engine)
            .field("router", &self.router)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::transport::{MockFactory, MockTransport};
    use peer_types::kinds;
    use serde_json::json;
    use std::sync::Mutex;

    async fn connected_session() -> (PeerSession<MockFactory>, MockTransport) {
        let factory = MockFactory::default();
        let mut session = PeerSession::new(
            factory.clone(),
            SessionConfig::default(),
            Arc::new(MemoryStore::new()),
        );
        assert!(session.initialize().await);
        session
            .accept_remote_handshake(&HandshakeDescriptor::offer(b"remote".to_vec()))
            .await
            .unwrap();

        let mock = factory.transport();
        mock.open();
        session.process_pending().await;
        assert!(session.is_channel_open());
        (session, mock)
    }

    #[tokio::test]
    async fn inbound_messages_reach_handlers() {
        let (mut session, mock) = connected_session().await;
        let texts = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&texts);
        session.on_message(kinds::CHAT_MESSAGE, move |payload| {
            sink.lock().unwrap().push(payload["text"].clone());
            Ok(())
        });

        for text in ["one", "two", "three"] {
            let envelope = Envelope::new(kinds::CHAT_MESSAGE, json!({ "text": text }));
            mock.deliver(&envelope.to_bytes().unwrap());
        }
        assert_eq!(session.process_pending().await, 3);

        assert_eq!(
            *texts.lock().unwrap(),
            vec![json!("one"), json!("two"), json!("three")]
        );
    }

    #[tokio::test]
    async fn process_pending_respects_drain_limit() {
        let factory = MockFactory::default();
        let mut config = SessionConfig::default();
        config.session.max_events_per_drain = 2;
        let mut session = PeerSession::new(factory.clone(), config, Arc::new(MemoryStore::new()));
        assert!(session.initialize().await);

        let mock = factory.transport();
        for _ in 0..5 {
            mock.emit(TransportEvent::FragmentGenerated(Fragment::new(vec![1])));
        }

        assert_eq!(session.process_pending().await, 2);
        assert_eq!(session.process_pending().await, 2);
        assert_eq!(session.process_pending().await, 1);
        assert_eq!(session.process_pending().await, 0);
    }

    #[tokio::test]
    async fn publish_while_connected_sends() {
        let (session, mock) = connected_session().await;

        assert!(session.publish(kinds::TYPING_START, json!({})).await);

        let sent = Envelope::from_bytes(&mock.last_sent().unwrap()).unwrap();
        assert_eq!(sent.kind, kinds::TYPING_START);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn publish_from_spawned_task() {
        let (mut session, mock) = connected_session().await;
        session.on_message(kinds::CHAT_MESSAGE, |_| Ok(()));
        session.observe_state_changes(|_| {});

        let sent = tokio::spawn(async move { session.publish(kinds::CHAT_MESSAGE, json!({})).await })
            .await
            .unwrap();

        assert!(sent);
        assert_eq!(mock.sent_messages().len(), 1);
    }

    #[tokio::test]
    async fn run_until_disconnected_stops_on_remote_close() {
        let (mut session, mock) = connected_session().await;
        mock.deliver(&Envelope::new(kinds::USER_INFO, json!({})).to_bytes().unwrap());
        mock.close_from_remote("bye");

        session.run_until_disconnected().await;

        assert!(session.state().is_disconnected());
        assert!(!session.publish(kinds::CHAT_MESSAGE, json!({})).await);
    }

    #[test]
    fn connection_code_is_created_once() {
        let store = Arc::new(MemoryStore::new());
        let mut config = SessionConfig::default();
        config.session.display_name = "Alice".into();
        let session = PeerSession::new(MockFactory::default(), config, store.clone());

        let first = session.connection_code().unwrap();
        let second = session.connection_code().unwrap();

        assert_eq!(first, second);
        assert_eq!(first.display_name, "Alice");
        assert!(store.get(keys::CONNECTION_CODE).unwrap().is_some());
    }

    #[test]
    fn corrupt_connection_code_is_replaced() {
        let store = Arc::new(MemoryStore::new());
        store.set(keys::CONNECTION_CODE, "%%%garbage").unwrap();
        let session = PeerSession::new(MockFactory::default(), SessionConfig::default(), store.clone());

        let code = session.connection_code().unwrap();

        let stored = store.get(keys::CONNECTION_CODE).unwrap().unwrap();
        assert_eq!(ConnectionCode::from_token(&stored).unwrap(), code);
    }
}
