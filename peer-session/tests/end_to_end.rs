//! Two sessions on one in-process network, driven through the full
//! offer/answer exchange.

use std::sync::{Arc, Mutex};

use peer_core::{decode_signal, encode_signal};
use peer_session::{
    kinds, ConnectionState, Fragment, MemoryNetwork, MemoryStore, PeerSession, SessionConfig,
    SignalMessage,
};
use serde_json::{json, Value};

type Log<T> = Arc<Mutex<Vec<T>>>;

struct Peer {
    session: PeerSession<MemoryNetwork>,
    observed: Log<bool>,
    fragments: Log<Fragment>,
}

fn peer(network: &MemoryNetwork) -> Peer {
    let mut session = PeerSession::new(
        network.clone(),
        SessionConfig::default(),
        Arc::new(MemoryStore::new()),
    );

    let observed: Log<bool> = Arc::default();
    let sink = Arc::clone(&observed);
    session.observe_state_changes(move |open| sink.lock().unwrap().push(open));

    let fragments: Log<Fragment> = Arc::default();
    let sink = Arc::clone(&fragments);
    session.set_fragment_sink(move |fragment| sink.lock().unwrap().push(fragment.clone()));

    Peer {
        session,
        observed,
        fragments,
    }
}

fn record(session: &mut PeerSession<MemoryNetwork>, kind: &str) -> Log<Value> {
    let log: Log<Value> = Arc::default();
    let sink = Arc::clone(&log);
    session.on_message(kind, move |payload| {
        sink.lock().unwrap().push(payload.clone());
        Ok(())
    });
    log
}

/// Run the three-step handshake, passing every artifact through its
/// printable signal code as an out-of-band channel would.
async fn handshake(a: &mut Peer, b: &mut Peer) {
    assert!(a.session.initialize().await);
    assert!(b.session.initialize().await);

    let d1 = a.session.create_local_handshake().await.unwrap();
    let d1 = carry(d1.into());
    let SignalMessage::Descriptor(d1) = d1 else {
        panic!("expected descriptor");
    };

    let d2 = b.session.accept_remote_handshake(&d1).await.unwrap();
    let SignalMessage::Descriptor(d2) = carry(d2.into()) else {
        panic!("expected descriptor");
    };

    a.session.finalize_handshake(&d2).await.unwrap();

    a.session.process_pending().await;
    b.session.process_pending().await;

    // Trade the fragments each side generated
    let from_a: Vec<Fragment> = a.fragments.lock().unwrap().drain(..).collect();
    let from_b: Vec<Fragment> = b.fragments.lock().unwrap().drain(..).collect();
    assert!(!from_a.is_empty() && !from_b.is_empty());

    for fragment in from_a {
        if let SignalMessage::Fragment(f) = carry(fragment.into()) {
            b.session.supply_remote_fragment(&f).await;
        }
    }
    for fragment in from_b {
        if let SignalMessage::Fragment(f) = carry(fragment.into()) {
            a.session.supply_remote_fragment(&f).await;
        }
    }
}

fn carry(message: SignalMessage) -> SignalMessage {
    let code = encode_signal(&message).unwrap();
    decode_signal(&code).unwrap()
}

#[tokio::test]
async fn scenario_a_handshake_then_messages_both_ways() {
    let network = MemoryNetwork::new();
    let mut a = peer(&network);
    let mut b = peer(&network);
    let a_inbox = record(&mut a.session, kinds::CHAT_MESSAGE);
    let b_inbox = record(&mut b.session, kinds::CHAT_MESSAGE);

    handshake(&mut a, &mut b).await;

    assert_eq!(*a.observed.lock().unwrap(), vec![true]);
    assert_eq!(*b.observed.lock().unwrap(), vec![true]);
    assert!(a.session.is_channel_open());
    assert!(b.session.is_channel_open());

    assert!(a.session.publish(kinds::CHAT_MESSAGE, json!({"text": "hello b"})).await);
    assert!(b.session.publish(kinds::CHAT_MESSAGE, json!({"text": "hello a"})).await);
    b.session.process_pending().await;
    a.session.process_pending().await;

    assert_eq!(*b_inbox.lock().unwrap(), vec![json!({"text": "hello b"})]);
    assert_eq!(*a_inbox.lock().unwrap(), vec![json!({"text": "hello a"})]);
}

#[tokio::test]
async fn scenario_b_two_handlers_run_in_order() {
    let network = MemoryNetwork::new();
    let mut a = peer(&network);
    let mut b = peer(&network);

    let calls: Log<(&'static str, Value)> = Arc::default();
    for name in ["h1", "h2"] {
        let sink = Arc::clone(&calls);
        b.session.on_message(kinds::CHAT_MESSAGE, move |payload| {
            sink.lock().unwrap().push((name, payload.clone()));
            Ok(())
        });
    }

    handshake(&mut a, &mut b).await;
    assert!(a.session.publish(kinds::CHAT_MESSAGE, json!({"text": "hi"})).await);
    b.session.process_pending().await;

    assert_eq!(
        *calls.lock().unwrap(),
        vec![("h1", json!({"text": "hi"})), ("h2", json!({"text": "hi"}))]
    );
}

#[tokio::test]
async fn scenario_c_unknown_kind_has_no_effect() {
    let network = MemoryNetwork::new();
    let mut a = peer(&network);
    let mut b = peer(&network);
    let chat = record(&mut b.session, kinds::CHAT_MESSAGE);

    handshake(&mut a, &mut b).await;
    assert!(a.session.publish("unknown_future_kind", json!({})).await);
    b.session.process_pending().await;

    assert!(chat.lock().unwrap().is_empty());
    assert!(b.session.is_channel_open());
    assert_eq!(*b.observed.lock().unwrap(), vec![true]);
}

#[tokio::test]
async fn sends_while_closed_never_reach_the_router() {
    let network = MemoryNetwork::new();
    let mut a = peer(&network);
    let mut b = peer(&network);
    let inbox = record(&mut b.session, kinds::CHAT_MESSAGE);

    assert!(a.session.initialize().await);
    assert!(b.session.initialize().await);
    for i in 0..3 {
        assert!(!a.session.publish(kinds::CHAT_MESSAGE, json!({ "n": i })).await);
    }

    let offer = a.session.create_local_handshake().await.unwrap();
    assert!(!a.session.publish(kinds::CHAT_MESSAGE, json!({})).await);
    let answer = b.session.accept_remote_handshake(&offer).await.unwrap();
    a.session.finalize_handshake(&answer).await.unwrap();
    // Channel-open event not yet processed
    assert!(!a.session.publish(kinds::CHAT_MESSAGE, json!({})).await);

    a.session.process_pending().await;
    b.session.process_pending().await;

    assert!(inbox.lock().unwrap().is_empty());
}

#[tokio::test]
async fn messages_arrive_in_send_order() {
    let network = MemoryNetwork::new();
    let mut a = peer(&network);
    let mut b = peer(&network);
    let inbox = record(&mut b.session, kinds::CHAT_MESSAGE);

    handshake(&mut a, &mut b).await;
    for n in 0..50 {
        assert!(a.session.publish(kinds::CHAT_MESSAGE, json!({ "n": n })).await);
    }
    b.session.process_pending().await;

    let received: Vec<Value> = inbox.lock().unwrap().clone();
    let expected: Vec<Value> = (0..50).map(|n| json!({ "n": n })).collect();
    assert_eq!(received, expected);
}

#[tokio::test]
async fn disconnect_propagates_to_peer() {
    let network = MemoryNetwork::new();
    let mut a = peer(&network);
    let mut b = peer(&network);
    handshake(&mut a, &mut b).await;

    a.session.disconnect().await;
    a.session.disconnect().await;
    b.session.run_until_disconnected().await;

    assert_eq!(*a.session.state(), ConnectionState::Disconnected);
    assert_eq!(*b.session.state(), ConnectionState::Disconnected);
    assert!(!a.session.is_channel_open());
    assert!(!b.session.is_channel_open());
    assert_eq!(*a.observed.lock().unwrap(), vec![true, false]);
    assert_eq!(*b.observed.lock().unwrap(), vec![true, false]);
    assert!(!b.session.publish(kinds::CHAT_MESSAGE, json!({})).await);
}

#[tokio::test]
async fn disconnect_before_negotiation_is_safe() {
    let network = MemoryNetwork::new();
    let mut a = peer(&network);

    a.session.disconnect().await;
    assert!(a.session.initialize().await);
    a.session.disconnect().await;
    a.session.disconnect().await;

    assert!(a.session.state().is_disconnected());
    assert!(!a.session.is_channel_open());
}

#[tokio::test]
async fn reconnect_after_disconnect() {
    let network = MemoryNetwork::new();
    let mut a = peer(&network);
    let mut b = peer(&network);
    handshake(&mut a, &mut b).await;

    b.session.disconnect().await;
    a.session.process_pending().await;
    assert!(a.session.state().is_disconnected());

    handshake(&mut a, &mut b).await;
    assert!(a.session.is_channel_open());
    assert!(b.session.is_channel_open());
    assert_eq!(*a.observed.lock().unwrap(), vec![true, false, true]);
}

#[tokio::test]
async fn unavailable_transport_fails_initialize() {
    let network = MemoryNetwork::new();
    network.set_unavailable(Some("no data channels"));
    let mut a = peer(&network);

    assert!(!a.session.initialize().await);
    assert_eq!(*a.session.state(), ConnectionState::Idle);
    assert!(a.session.create_local_handshake().await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn session_runs_as_spawned_actor() {
    let network = MemoryNetwork::new();
    let mut a = peer(&network);
    let mut b = peer(&network);
    let a_inbox = record(&mut a.session, kinds::CHAT_MESSAGE);
    let b_inbox = record(&mut b.session, kinds::CHAT_MESSAGE);
    handshake(&mut a, &mut b).await;

    let mut session = b.session;
    let actor = tokio::spawn(async move {
        let sent = session
            .publish(kinds::CHAT_MESSAGE, json!({"text": "from task"}))
            .await;
        session.run_until_disconnected().await;
        (session, sent)
    });

    while a_inbox.lock().unwrap().is_empty() {
        assert!(a.session.next().await);
    }
    assert!(a.session.publish(kinds::CHAT_MESSAGE, json!({"text": "to task"})).await);
    a.session.disconnect().await;

    let (session, sent) = actor.await.unwrap();
    assert!(sent);
    assert!(session.state().is_disconnected());
    assert_eq!(*a_inbox.lock().unwrap(), vec![json!({"text": "from task"})]);
    assert_eq!(*b_inbox.lock().unwrap(), vec![json!({"text": "to task"})]);
}
