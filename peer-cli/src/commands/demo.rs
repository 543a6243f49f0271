//! Run two peers in one process and let them talk.
//!
//! Alice and Bob each get their own session on a shared in-process
//! network. Every handshake artifact is turned into a printable signal
//! code and decoded on the other side, the same way a user would copy and
//! paste it between two machines.

use anyhow::{Context, Result};
use peer_core::{decode_signal, encode_signal};
use peer_session::{
    kinds, MemoryNetwork, MemoryStore, NotificationSink, PeerSession, SessionConfig,
};
use peer_types::{Fragment, HandshakeDescriptor, SignalMessage};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

type Shared<T> = Arc<Mutex<T>>;

/// What each side saw during the demo.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Transcript {
    /// Chat texts Bob received, in order.
    pub bob_received: Vec<String>,
    /// Chat texts Alice received, in order.
    pub alice_received: Vec<String>,
    /// Typing indicators Bob received.
    pub typing_events: usize,
    /// Connected/disconnected transitions seen by Alice.
    pub alice_transitions: Vec<bool>,
    /// Connected/disconnected transitions seen by Bob.
    pub bob_transitions: Vec<bool>,
    /// Publishes that were not accepted, on either side.
    pub failed_sends: usize,
}

struct DemoPeer {
    name: &'static str,
    session: PeerSession<MemoryNetwork>,
    outbox: Shared<Vec<Fragment>>,
    failed_sends: AtomicUsize,
}

/// Run the demo command.
pub async fn run(config: &SessionConfig, messages: usize) -> Result<()> {
    let transcript = exchange(config, messages).await?;

    println!();
    println!("=== demo complete ===");
    println!("  Bob received:   {} chat messages", transcript.bob_received.len());
    println!("  Alice received: {} chat messages", transcript.alice_received.len());
    println!("  Typing events:  {}", transcript.typing_events);
    if transcript.failed_sends > 0 {
        println!("  Failed sends:   {}", transcript.failed_sends);
    }

    Ok(())
}

/// Connect Alice and Bob, exchange `messages` chat messages, disconnect.
pub async fn exchange(config: &SessionConfig, messages: usize) -> Result<Transcript> {
    let network = MemoryNetwork::new();
    let mut alice = DemoPeer::new(&network, config, "Alice");
    let mut bob = DemoPeer::new(&network, config, "Bob");

    let bob_inbox = subscribe_chat(&mut bob);
    let alice_inbox = subscribe_chat(&mut alice);
    let typing = subscribe_typing(&mut bob);
    subscribe_user_info(&mut alice);
    subscribe_user_info(&mut bob);
    let alice_transitions = observe(&mut alice);
    let bob_transitions = observe(&mut bob);

    // Handshake
    alice
        .session
        .try_initialize()
        .await
        .context("Alice could not initialize")?;
    bob.session
        .try_initialize()
        .await
        .context("Bob could not initialize")?;

    let offer = alice.session.create_local_handshake().await?;
    let offer_code = alice.signal(offer.into())?;

    let answer = bob
        .session
        .accept_remote_handshake(&expect_descriptor(&offer_code)?)
        .await?;
    let answer_code = bob.signal(answer.into())?;

    alice
        .session
        .finalize_handshake(&expect_descriptor(&answer_code)?)
        .await?;

    alice.session.process_pending().await;
    bob.session.process_pending().await;
    trade_fragments(&mut alice, &mut bob).await?;
    trade_fragments(&mut bob, &mut alice).await?;

    if !alice.session.is_channel_open() || !bob.session.is_channel_open() {
        anyhow::bail!("Handshake did not complete");
    }

    // Conversation
    alice.announce().await;
    bob.announce().await;

    alice.publish(kinds::TYPING_START, json!({})).await;
    for n in 1..=messages {
        alice.say(&format!("Message {} from Alice", n)).await;
    }
    alice.publish(kinds::TYPING_STOP, json!({})).await;

    bob.session.process_pending().await;
    let heard = lock(&bob_inbox).len();
    bob.say(&format!("Got {} messages, thanks!", heard)).await;
    alice.session.process_pending().await;

    // Teardown
    alice.session.disconnect().await;
    bob.session.run_until_disconnected().await;

    let transcript = Transcript {
        bob_received: lock(&bob_inbox).clone(),
        alice_received: lock(&alice_inbox).clone(),
        typing_events: *lock(&typing),
        alice_transitions: lock(&alice_transitions).clone(),
        bob_transitions: lock(&bob_transitions).clone(),
        failed_sends: alice.failed_sends() + bob.failed_sends(),
    };
    Ok(transcript)
}

impl DemoPeer {
    fn new(network: &MemoryNetwork, config: &SessionConfig, name: &'static str) -> Self {
        let mut config = config.clone();
        config.session.display_name = name.to_string();

        let mut session = PeerSession::new(network.clone(), config, Arc::new(MemoryStore::new()));
        session.set_notification_sink(NotificationSink::new(move |message, severity| {
            println!("[{}] ({}) {}", name, severity, message);
        }));

        let outbox: Shared<Vec<Fragment>> = Arc::default();
        let sink = Arc::clone(&outbox);
        session.set_fragment_sink(move |fragment| lock(&sink).push(fragment.clone()));

        Self {
            name,
            session,
            outbox,
            failed_sends: AtomicUsize::new(0),
        }
    }

    /// Publish a message, reporting it if the channel refused it.
    async fn publish(&self, kind: &str, payload: Value) -> bool {
        let sent = self.session.publish(kind, payload).await;
        if !sent {
            self.failed_sends.fetch_add(1, Ordering::Relaxed);
            println!("[{}] could not send {}", self.name, kind);
        }
        sent
    }

    fn failed_sends(&self) -> usize {
        self.failed_sends.load(Ordering::Relaxed)
    }

    /// Encode an artifact for the out-of-band channel and show it.
    fn signal(&self, message: SignalMessage) -> Result<String> {
        let code = encode_signal(&message).context("Failed to encode signal")?;
        println!("[{}] signal code: {}", self.name, abbreviate(&code));
        Ok(code)
    }

    async fn announce(&self) {
        self.publish(kinds::USER_INFO, json!({ "name": self.name, "status": "online" }))
            .await;
    }

    async fn say(&self, text: &str) {
        let payload = json!({
            "id": uuid::Uuid::new_v4().to_string(),
            "text": text,
            "sender": self.name,
            "timestamp": now_millis(),
        });
        if self.publish(kinds::CHAT_MESSAGE, payload).await {
            println!("[{}] -> {}", self.name, text);
        }
    }
}

/// Carry every fragment `from` generated over to `to` as signal codes.
async fn trade_fragments(from: &mut DemoPeer, to: &mut DemoPeer) -> Result<()> {
    let fragments: Vec<Fragment> = lock(&from.outbox).drain(..).collect();
    for fragment in fragments {
        let code = from.signal(fragment.into())?;
        match decode_signal(&code)? {
            SignalMessage::Fragment(fragment) => to.session.supply_remote_fragment(&fragment).await,
            SignalMessage::Descriptor(_) => anyhow::bail!("Expected a fragment"),
        }
    }
    Ok(())
}

fn expect_descriptor(code: &str) -> Result<HandshakeDescriptor> {
    match decode_signal(code).context("Failed to decode signal")? {
        SignalMessage::Descriptor(descriptor) => Ok(descriptor),
        SignalMessage::Fragment(_) => anyhow::bail!("Expected a handshake descriptor"),
    }
}

fn subscribe_chat(peer: &mut DemoPeer) -> Shared<Vec<String>> {
    let inbox: Shared<Vec<String>> = Arc::default();
    let sink = Arc::clone(&inbox);
    let name = peer.name;
    peer.session.on_message(kinds::CHAT_MESSAGE, move |payload: &Value| {
        let text = payload["text"]
            .as_str()
            .ok_or("chat message without text")?;
        let sender = payload["sender"].as_str().unwrap_or("?");
        println!("[{}] <- {}: {}", name, sender, text);
        lock(&sink).push(text.to_string());
        Ok(())
    });
    inbox
}

fn subscribe_typing(peer: &mut DemoPeer) -> Shared<usize> {
    let count: Shared<usize> = Arc::default();
    let name = peer.name;
    for (kind, label) in [
        (kinds::TYPING_START, "is typing..."),
        (kinds::TYPING_STOP, "stopped typing"),
    ] {
        let count = Arc::clone(&count);
        peer.session.on_message(kind, move |_: &Value| {
            println!("[{}] peer {}", name, label);
            *lock(&count) += 1;
            Ok(())
        });
    }
    count
}

fn subscribe_user_info(peer: &mut DemoPeer) {
    let name = peer.name;
    peer.session.on_message(kinds::USER_INFO, move |payload: &Value| {
        println!(
            "[{}] peer is {} ({})",
            name,
            payload["name"].as_str().unwrap_or("?"),
            payload["status"].as_str().unwrap_or("unknown")
        );
        Ok(())
    });
}

fn observe(peer: &mut DemoPeer) -> Shared<Vec<bool>> {
    let transitions: Shared<Vec<bool>> = Arc::default();
    let sink = Arc::clone(&transitions);
    peer.session
        .observe_state_changes(move |open| lock(&sink).push(open));
    transitions
}

fn abbreviate(code: &str) -> String {
    const SHOWN: usize = 32;
    match code.get(..SHOWN) {
        Some(head) if code.len() > SHOWN => format!("{}... ({} chars)", head, code.len()),
        _ => code.to_string(),
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn demo_exchanges_messages() {
        let transcript = exchange(&SessionConfig::default(), 3).await.unwrap();

        assert_eq!(
            transcript.bob_received,
            vec![
                "Message 1 from Alice",
                "Message 2 from Alice",
                "Message 3 from Alice"
            ]
        );
        assert_eq!(transcript.alice_received, vec!["Got 3 messages, thanks!"]);
        assert_eq!(transcript.typing_events, 2);
        assert_eq!(transcript.alice_transitions, vec![true, false]);
        assert_eq!(transcript.bob_transitions, vec![true, false]);
        assert_eq!(transcript.failed_sends, 0);
    }

    #[tokio::test]
    async fn refused_publish_is_counted() {
        let network = MemoryNetwork::new();
        let peer = DemoPeer::new(&network, &SessionConfig::default(), "Alice");

        assert!(!peer.publish(kinds::TYPING_START, json!({})).await);
        peer.announce().await;
        peer.say("nobody is listening").await;

        assert_eq!(peer.failed_sends(), 3);
    }

    #[tokio::test]
    async fn demo_with_no_messages() {
        let transcript = exchange(&SessionConfig::default(), 0).await.unwrap();

        assert!(transcript.bob_received.is_empty());
        assert_eq!(transcript.alice_received, vec!["Got 0 messages, thanks!"]);
    }

    #[tokio::test]
    async fn demo_honors_channel_label() {
        let mut config = SessionConfig::default();
        config.transport.channel_label = "chat".into();

        assert!(exchange(&config, 1).await.is_ok());
    }

    #[test]
    fn abbreviate_long_codes() {
        let code = "A".repeat(100);
        assert_eq!(abbreviate(&code), format!("{}... (100 chars)", "A".repeat(32)));
        assert_eq!(abbreviate("short"), "short");
    }
}
