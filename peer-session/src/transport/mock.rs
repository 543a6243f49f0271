//! Mock transport for testing.
//!
//! Records every negotiation call, lets tests force failures, and lets
//! tests inject transport events as if they came from the network.

use super::{EventSender, Transport, TransportError, TransportEvent, TransportFactory};
use crate::config::TransportConfig;
use async_trait::async_trait;
use peer_types::{Fragment, HandshakeDescriptor};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Offer blob produced by [`MockTransport::create_offer`].
pub const MOCK_OFFER: &[u8] = b"mock-offer";

/// Answer blob produced by [`MockTransport::accept_offer`].
pub const MOCK_ANSWER: &[u8] = b"mock-answer";

/// Mock transport for testing.
///
/// Clones share state, so a test can keep one handle while the engine owns
/// another.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    events: Option<EventSender>,
    channel_label: Option<String>,
    channel_ordered: Option<bool>,
    channel_open: bool,
    closed: bool,
    close_calls: usize,
    remote_descriptors: Vec<HandshakeDescriptor>,
    applied_fragments: Vec<Fragment>,
    sent_messages: Vec<Vec<u8>>,
    fail_next_offer: Option<String>,
    fail_next_accept: Option<String>,
    fail_next_answer: Option<String>,
    fail_next_fragment: Option<String>,
    fail_next_send: Option<String>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, MockTransportInner> {
        lock(&self.inner)
    }

    /// Inject an event as if the transport produced it.
    ///
    /// Returns false if no engine is listening.
    pub fn emit(&self, event: TransportEvent) -> bool {
        let inner = self.inner();
        match &inner.events {
            Some(events) => events.send(event).is_ok(),
            None => false,
        }
    }

    /// Mark the channel open and emit [`TransportEvent::ChannelOpen`].
    pub fn open(&self) -> bool {
        self.inner().channel_open = true;
        self.emit(TransportEvent::ChannelOpen)
    }

    /// Simulate the remote side closing the channel.
    pub fn close_from_remote(&self, reason: &str) -> bool {
        self.inner().channel_open = false;
        self.emit(TransportEvent::ChannelClosed {
            reason: reason.to_string(),
        })
    }

    /// Deliver raw bytes as an inbound channel message.
    pub fn deliver(&self, data: &[u8]) -> bool {
        self.emit(TransportEvent::Message(data.to_vec()))
    }

    /// Get all messages that were sent.
    pub fn sent_messages(&self) -> Vec<Vec<u8>> {
        self.inner().sent_messages.clone()
    }

    /// Get the last message that was sent.
    pub fn last_sent(&self) -> Option<Vec<u8>> {
        self.inner().sent_messages.last().cloned()
    }

    /// Remote descriptors applied so far, in order.
    pub fn remote_descriptors(&self) -> Vec<HandshakeDescriptor> {
        self.inner().remote_descriptors.clone()
    }

    /// Fragments applied so far, in order.
    pub fn applied_fragments(&self) -> Vec<Fragment> {
        self.inner().applied_fragments.clone()
    }

    /// Label of the channel opened by the initiator, if any.
    pub fn channel_label(&self) -> Option<String> {
        self.inner().channel_label.clone()
    }

    /// Whether the initiator asked for an ordered channel, if it opened one.
    pub fn channel_ordered(&self) -> Option<bool> {
        self.inner().channel_ordered
    }

    /// Check if the channel is open.
    pub fn is_channel_open(&self) -> bool {
        self.inner().channel_open
    }

    /// Check if close() has been called.
    pub fn is_closed(&self) -> bool {
        self.inner().closed
    }

    /// Number of times close() has been called.
    pub fn close_calls(&self) -> usize {
        self.inner().close_calls
    }

    /// Cause the next create_offer() to fail with the given error.
    pub fn fail_next_offer(&self, error: &str) {
        self.inner().fail_next_offer = Some(error.to_string());
    }

    /// Cause the next accept_offer() to fail with the given error.
    pub fn fail_next_accept(&self, error: &str) {
        self.inner().fail_next_accept = Some(error.to_string());
    }

    /// Cause the next accept_answer() to fail with the given error.
    pub fn fail_next_answer(&self, error: &str) {
        self.inner().fail_next_answer = Some(error.to_string());
    }

    /// Cause the next add_fragment() to fail with the given error.
    pub fn fail_next_fragment(&self, error: &str) {
        self.inner().fail_next_fragment = Some(error.to_string());
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        self.inner().fail_next_send = Some(error.to_string());
    }

    fn with_events(events: EventSender) -> Self {
        let transport = Self::new();
        transport.inner().events = Some(events);
        transport
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open_channel(&self, label: &str, ordered: bool) -> Result<(), TransportError> {
        let mut inner = self.inner();
        if inner.closed {
            return Err(TransportError::Closed);
        }
        inner.channel_label = Some(label.to_string());
        inner.channel_ordered = Some(ordered);
        Ok(())
    }

    async fn create_offer(&self) -> Result<HandshakeDescriptor, TransportError> {
        let mut inner = self.inner();

        // Check for forced failure
        if let Some(error) = inner.fail_next_offer.take() {
            return Err(TransportError::NegotiationRejected(error));
        }
        if inner.closed {
            return Err(TransportError::Closed);
        }

        Ok(HandshakeDescriptor::offer(MOCK_OFFER.to_vec()))
    }

    async fn accept_offer(
        &self,
        offer: &HandshakeDescriptor,
    ) -> Result<HandshakeDescriptor, TransportError> {
        let mut inner = self.inner();

        if let Some(error) = inner.fail_next_accept.take() {
            return Err(TransportError::InvalidDescriptor(error));
        }
        if inner.closed {
            return Err(TransportError::Closed);
        }

        inner.remote_descriptors.push(offer.clone());
        Ok(HandshakeDescriptor::answer(MOCK_ANSWER.to_vec()))
    }

    async fn accept_answer(&self, answer: &HandshakeDescriptor) -> Result<(), TransportError> {
        let mut inner = self.inner();

        if let Some(error) = inner.fail_next_answer.take() {
            return Err(TransportError::InvalidDescriptor(error));
        }
        if inner.closed {
            return Err(TransportError::Closed);
        }

        inner.remote_descriptors.push(answer.clone());
        Ok(())
    }

    async fn add_fragment(&self, fragment: &Fragment) -> Result<(), TransportError> {
        let mut inner = self.inner();

        if let Some(error) = inner.fail_next_fragment.take() {
            return Err(TransportError::InvalidFragment(error));
        }

        inner.applied_fragments.push(fragment.clone());
        Ok(())
    }

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.inner();

        if !inner.channel_open {
            return Err(TransportError::ChannelNotOpen);
        }

        // Check for forced failure
        if let Some(error) = inner.fail_next_send.take() {
            return Err(TransportError::SendFailed(error));
        }

        inner.sent_messages.push(data.to_vec());
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut inner = self.inner();
        inner.channel_open = false;
        inner.closed = true;
        inner.close_calls += 1;
        Ok(())
    }
}

/// Factory handing out [`MockTransport`]s.
///
/// Every allocation produces a fresh mock attached to the new event queue.
/// Clones share state, so a test can keep a handle to the factory after
/// moving it into an engine and reach the current mock through
/// [`MockFactory::transport`].
#[derive(Debug, Clone, Default)]
pub struct MockFactory {
    current: Arc<Mutex<MockTransport>>,
    allocations: Arc<Mutex<usize>>,
    unavailable: Arc<Mutex<Option<String>>>,
}

impl MockFactory {
    /// Create a new factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent allocations fail with the given reason.
    pub fn set_unavailable(&self, reason: Option<&str>) {
        *lock(&self.unavailable) = reason.map(str::to_string);
    }

    /// Handle to the most recently allocated mock.
    pub fn transport(&self) -> MockTransport {
        lock(&self.current).clone()
    }

    /// Number of successful allocations.
    pub fn allocations(&self) -> usize {
        *lock(&self.allocations)
    }
}

impl TransportFactory for MockFactory {
    type Transport = MockTransport;

    fn allocate(
        &self,
        config: &TransportConfig,
        events: EventSender,
    ) -> Result<MockTransport, TransportError> {
        if let Some(reason) = lock(&self.unavailable).clone() {
            return Err(TransportError::Unavailable(reason));
        }
        config
            .validate()
            .map_err(|e| TransportError::InvalidConfig(e.to_string()))?;

        let transport = MockTransport::with_events(events);
        *lock(&self.current) = transport.clone();
        *lock(&self.allocations) += 1;
        Ok(transport)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn allocated() -> (MockTransport, mpsc::UnboundedReceiver<TransportEvent>) {
        let factory = MockFactory::default();
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = factory.allocate(&TransportConfig::default(), tx).unwrap();
        (transport, rx)
    }

    // ===========================================
    // MockTransport Basic Tests
    // ===========================================

    #[tokio::test]
    async fn mock_transport_creates_offer() {
        let (transport, _rx) = allocated();

        transport.open_channel("messaging", true).await.unwrap();
        let offer = transport.create_offer().await.unwrap();

        assert_eq!(offer, HandshakeDescriptor::offer(MOCK_OFFER.to_vec()));
        assert_eq!(transport.channel_label(), Some("messaging".to_string()));
        assert_eq!(transport.channel_ordered(), Some(true));
    }

    #[test]
    fn factory_refuses_invalid_config() {
        let factory = MockFactory::default();
        let config = TransportConfig {
            stun_servers: vec!["stun.example.org".into()],
            ..TransportConfig::default()
        };

        let (tx, _rx) = mpsc::unbounded_channel();
        let result = factory.allocate(&config, tx);
        assert!(matches!(result, Err(TransportError::InvalidConfig(_))));
        assert_eq!(factory.allocations(), 0);
    }

    #[tokio::test]
    async fn mock_transport_records_remote_descriptors() {
        let (transport, _rx) = allocated();

        let offer = HandshakeDescriptor::offer(b"remote".to_vec());
        let answer = transport.accept_offer(&offer).await.unwrap();

        assert_eq!(answer.blob, MOCK_ANSWER);
        assert_eq!(transport.remote_descriptors(), vec![offer]);
    }

    #[tokio::test]
    async fn mock_transport_sends_when_open() {
        let (transport, mut rx) = allocated();
        assert!(transport.open());
        assert_eq!(rx.recv().await, Some(TransportEvent::ChannelOpen));

        transport.send(b"message 1").await.unwrap();
        transport.send(b"message 2").await.unwrap();

        let sent = transport.sent_messages();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], b"message 1");
        assert_eq!(sent[1], b"message 2");
    }

    #[tokio::test]
    async fn mock_transport_emits_events_in_order() {
        let (transport, mut rx) = allocated();

        transport.deliver(b"one");
        transport.deliver(b"two");
        transport.close_from_remote("bye");

        assert_eq!(rx.recv().await, Some(TransportEvent::Message(b"one".to_vec())));
        assert_eq!(rx.recv().await, Some(TransportEvent::Message(b"two".to_vec())));
        assert_eq!(
            rx.recv().await,
            Some(TransportEvent::ChannelClosed {
                reason: "bye".into()
            })
        );
    }

    #[tokio::test]
    async fn mock_transport_closes() {
        let (transport, _rx) = allocated();
        transport.open();

        transport.close().await.unwrap();
        transport.close().await.unwrap();

        assert!(!transport.is_channel_open());
        assert!(transport.is_closed());
        assert_eq!(transport.close_calls(), 2);
    }

    // ===========================================
    // Error Condition Tests
    // ===========================================

    #[tokio::test]
    async fn send_without_open_fails() {
        let (transport, _rx) = allocated();

        let result = transport.send(b"data").await;
        assert!(matches!(result, Err(TransportError::ChannelNotOpen)));
    }

    #[tokio::test]
    async fn forced_send_failure() {
        let (transport, _rx) = allocated();
        transport.open();
        transport.fail_next_send("buffer full");

        let result = transport.send(b"data").await;
        assert!(matches!(result, Err(TransportError::SendFailed(_))));

        // Next send should work
        transport.send(b"data").await.unwrap();
    }

    #[tokio::test]
    async fn forced_negotiation_failures() {
        let (transport, _rx) = allocated();
        transport.fail_next_offer("no codecs");
        transport.fail_next_accept("bad sdp");
        transport.fail_next_answer("bad sdp");
        transport.fail_next_fragment("bad candidate");

        let offer = HandshakeDescriptor::offer(vec![1]);
        assert!(matches!(
            transport.create_offer().await,
            Err(TransportError::NegotiationRejected(_))
        ));
        assert!(matches!(
            transport.accept_offer(&offer).await,
            Err(TransportError::InvalidDescriptor(_))
        ));
        assert!(matches!(
            transport
                .accept_answer(&HandshakeDescriptor::answer(vec![2]))
                .await,
            Err(TransportError::InvalidDescriptor(_))
        ));
        assert!(matches!(
            transport.add_fragment(&Fragment::new(vec![3])).await,
            Err(TransportError::InvalidFragment(_))
        ));

        // Failures are one-shot
        assert!(transport.create_offer().await.is_ok());
    }

    #[test]
    fn unavailable_factory_fails_allocation() {
        let factory = MockFactory::default();
        factory.set_unavailable(Some("no data channel support"));

        let (tx, _rx) = mpsc::unbounded_channel();
        let result = factory.allocate(&TransportConfig::default(), tx);
        assert!(matches!(result, Err(TransportError::Unavailable(_))));
    }

    #[test]
    fn emit_without_listener_returns_false() {
        let transport = MockTransport::new();
        assert!(!transport.emit(TransportEvent::ChannelOpen));
    }

    // ===========================================
    // Clone and Shared State Tests
    // ===========================================

    #[tokio::test]
    async fn mock_transport_clone_shares_state() {
        let (transport1, _rx) = allocated();
        let transport2 = transport1.clone();

        transport1.open();
        assert!(transport2.is_channel_open());

        transport1.send(b"from t1").await.unwrap();
        transport2.send(b"from t2").await.unwrap();

        assert_eq!(transport1.sent_messages().len(), 2);
    }

    #[tokio::test]
    async fn reallocation_yields_fresh_mock() {
        let factory = MockFactory::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let first = factory.allocate(&TransportConfig::default(), tx).unwrap();
        first.open();
        first.close().await.unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        factory.allocate(&TransportConfig::default(), tx).unwrap();

        let current = factory.transport();
        assert!(!current.is_closed());
        assert!(!current.is_channel_open());
        assert!(current.last_sent().is_none());
        assert!(first.is_closed());
        assert_eq!(factory.allocations(), 2);
    }
}
