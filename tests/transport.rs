//! Connection manager behavior against an in-memory socket.

mod common;

use std::sync::atomic::Ordering;

use common::*;
use murmur::api::events::{ClientEvent, ServerEvent};
use murmur::api::models::{ConversationId, UserId};
use murmur::error::TransportError;
use murmur::transport::{ConnectionState, EventKind, Transport, TransportConfig, TransportEvent};
use tokio::runtime::Handle;

fn id(raw: &str) -> ConversationId {
    ConversationId::from(raw)
}

#[tokio::test]
async fn connect_is_idempotent() {
    let (dialer, mut peers, dials) = FakeDialer::new();
    let transport = Transport::new(dialer, fast_reconnect(), Handle::current());
    let mut events = transport.on(&[EventKind::Connection]);

    transport.connect(credential());
    transport.connect(credential());
    let _peer = next_peer(&mut peers).await;
    wait_for_state(&mut events, ConnectionState::Connected).await;
    transport.connect(credential());

    assert_eq!(transport.state(), ConnectionState::Connected);
    assert_eq!(dials.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn join_twice_leave_once_and_leave_unknown() {
    let (dialer, mut peers, _) = FakeDialer::new();
    let transport = Transport::new(dialer, fast_reconnect(), Handle::current());
    let mut events = transport.on(&[EventKind::Connection]);
    transport.connect(credential());
    let mut peer = next_peer(&mut peers).await;
    wait_for_state(&mut events, ConnectionState::Connected).await;

    transport.join_conversation(&id("x"));
    transport.join_conversation(&id("x"));
    transport.leave_conversation(&id("x"));
    transport.leave_conversation(&id("y"));
    transport.join_conversation(&id("z"));

    // Frames are FIFO, so a duplicate join or a stray leave would show up
    // before the final join.
    assert_eq!(peer.next_frame().await, ClientEvent::JoinConversations(vec![id("x")]));
    assert_eq!(peer.next_frame().await, ClientEvent::LeaveConversation(id("x")));
    assert_eq!(peer.next_frame().await, ClientEvent::JoinConversations(vec![id("z")]));
    assert!(!transport.is_joined(&id("x")));
    assert_eq!(transport.joined_conversations(), vec![id("z")]);
}

#[tokio::test]
async fn joins_made_offline_are_flushed_in_one_frame() {
    let (dialer, mut peers, _) = FakeDialer::new();
    let transport = Transport::new(dialer, fast_reconnect(), Handle::current());

    transport.join_conversation(&id("b"));
    transport.join_conversation(&id("a"));
    transport.join_conversation(&id("b"));
    transport.connect(credential());

    let mut peer = next_peer(&mut peers).await;
    assert_eq!(peer.next_frame().await, ClientEvent::JoinConversations(vec![id("a"), id("b")]));
}

#[tokio::test]
async fn every_subscriber_gets_pushes_until_it_unsubscribes() {
    let (dialer, mut peers, _) = FakeDialer::new();
    let transport = Transport::new(dialer, fast_reconnect(), Handle::current());
    let mut directory = transport.on(&[EventKind::NewMessage]);
    let mut session = transport.on(&[EventKind::NewMessage, EventKind::OnlineUsers]);
    let mut connection = transport.on(&[EventKind::Connection]);
    transport.connect(credential());
    let mut peer = next_peer(&mut peers).await;
    wait_for_state(&mut connection, ConnectionState::Connected).await;

    let pushed = message("c1", "m1", "u2", "hi", 1);
    peer.push(ServerEvent::NewMessage(pushed.clone())).await;
    assert_eq!(next_event(&mut directory).await, TransportEvent::NewMessage(pushed.clone()));
    assert_eq!(next_event(&mut session).await, TransportEvent::NewMessage(pushed));

    assert!(transport.off(directory.id()));
    assert_eq!(transport.subscriber_count(EventKind::NewMessage), 1);
    peer.push(ServerEvent::OnlineUsers(vec![UserId::from("u2")])).await;
    assert_eq!(
        next_event(&mut session).await,
        TransportEvent::OnlineUsers(vec![UserId::from("u2")])
    );
    assert!(directory.try_recv().is_none());

    drop(session);
    assert_eq!(transport.subscriber_count(EventKind::OnlineUsers), 0);
}

#[tokio::test]
async fn dropped_link_reconnects_and_forgets_joins() {
    let (dialer, mut peers, dials) = FakeDialer::new();
    let transport = Transport::new(dialer, fast_reconnect(), Handle::current());
    let mut events = transport.on(&[EventKind::Connection]);
    transport.connect(credential());
    let mut peer = next_peer(&mut peers).await;
    wait_for_state(&mut events, ConnectionState::Connected).await;

    transport.join_conversation(&id("c1"));
    assert_eq!(peer.next_frame().await, ClientEvent::JoinConversations(vec![id("c1")]));

    peer.hang_up();
    wait_for_state(&mut events, ConnectionState::Disconnected).await;
    assert!(transport.joined_conversations().is_empty());
    assert!(matches!(
        transport.send_message(&message("c1", "m1", "me", "x", 1)),
        Err(TransportError::Disconnected)
    ));

    let _second = next_peer(&mut peers).await;
    wait_for_state(&mut events, ConnectionState::Connected).await;
    assert_eq!(dials.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_dials_are_retried() {
    let (dialer, mut peers, dials) = FakeDialer::new();
    let transport = Transport::new(dialer.refuse_next(2), fast_reconnect(), Handle::current());
    let mut events = transport.on(&[EventKind::Connection]);
    transport.connect(credential());

    let _peer = next_peer(&mut peers).await;
    wait_for_state(&mut events, ConnectionState::Connected).await;
    assert_eq!(dials.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn gives_up_after_max_attempts_and_can_connect_again() {
    let (dialer, _peers, dials) = FakeDialer::new();
    let config = TransportConfig { max_attempts: 2, ..fast_reconnect() };
    let transport = Transport::new(dialer.refusing(), config, Handle::current());
    let mut events = transport.on(&[EventKind::Connection]);
    transport.connect(credential());

    // The worker exits after the initial dial plus two retries.
    tokio::time::timeout(WAIT, async {
        while dials.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    wait_for_state(&mut events, ConnectionState::Disconnected).await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(dials.load(Ordering::SeqCst), 3);
    assert_eq!(transport.state(), ConnectionState::Disconnected);

    // A finished worker does not block a fresh connect.
    transport.connect(credential());
    assert_eq!(transport.state(), ConnectionState::Connecting);
    tokio::time::timeout(WAIT, async {
        while dials.load(Ordering::SeqCst) < 4 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn disconnect_closes_the_link_and_clears_joins() {
    let (dialer, mut peers, dials) = FakeDialer::new();
    let transport = Transport::new(dialer, fast_reconnect(), Handle::current());
    let mut events = transport.on(&[EventKind::Connection]);
    transport.connect(credential());
    let mut peer = next_peer(&mut peers).await;
    wait_for_state(&mut events, ConnectionState::Connected).await;
    transport.join_conversation(&id("c1"));
    assert_eq!(peer.next_frame().await, ClientEvent::JoinConversations(vec![id("c1")]));

    transport.disconnect();
    assert_eq!(transport.state(), ConnectionState::Disconnected);
    assert!(transport.joined_conversations().is_empty());

    // The worker closes its sink; the peer sees the end of the stream.
    let closed = tokio::time::timeout(WAIT, futures::StreamExt::next(&mut peer.from_client)).await;
    assert!(matches!(closed, Ok(None)));
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(dials.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn sent_messages_are_fanned_out() {
    let (dialer, mut peers, _) = FakeDialer::new();
    let transport = Transport::new(dialer, fast_reconnect(), Handle::current());
    let mut events = transport.on(&[EventKind::Connection]);
    transport.connect(credential());
    let mut peer = next_peer(&mut peers).await;
    wait_for_state(&mut events, ConnectionState::Connected).await;

    let sent = message("c1", "m7", "me", "hello", 7);
    transport.send_message(&sent).unwrap();
    assert_eq!(peer.next_frame().await, ClientEvent::SendMessage(sent));
}
