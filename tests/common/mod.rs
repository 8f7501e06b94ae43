//! In-memory stand-ins for the REST server and the push socket.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::channel::mpsc as fmpsc;
use futures::{SinkExt, StreamExt};
use murmur::api::events::{ClientEvent, ServerEvent};
use murmur::api::models::{
    Conversation, ConversationId, Message, MessageId, MessageStatus, Sender, UserId,
};
use murmur::api::{ChatApi, OutgoingMessage};
use murmur::credential::Credential;
use murmur::error::{ApiError, TransportError};
use murmur::transport::{
    ConnectionState, Dialer, Link, Subscription, TransportConfig, TransportEvent,
};
use serde_json::json;
use tokio::sync::mpsc;

pub const WAIT: Duration = Duration::from_secs(2);

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn conversation(id: &str, unread: u32) -> Conversation {
    serde_json::from_value(json!({
        "_id": id,
        "participants": [{ "_id": "me" }, { "_id": format!("{id}-peer"), "fullName": "Peer" }],
        "unreadCount": unread
    }))
    .unwrap()
}

pub fn message(conversation: &str, id: &str, sender: &str, text: &str, secs: i64) -> Message {
    Message {
        id: MessageId::from(id),
        conversation_id: ConversationId::from(conversation),
        sender: Sender::Id(UserId::from(sender)),
        text: Some(text.to_string()),
        media: Vec::new(),
        call: None,
        created_at: at(secs),
        status: MessageStatus::Sent,
    }
}

pub fn fast_reconnect() -> TransportConfig {
    TransportConfig {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
        max_attempts: 0,
    }
}

/// REST server double. Conversations listed in `history` can be opened.
pub struct FakeApi {
    me: UserId,
    pub listing: Mutex<Vec<Conversation>>,
    pub history: Mutex<HashMap<ConversationId, Vec<Message>>>,
    pub sent: Mutex<Vec<OutgoingMessage>>,
    pub read_marks: Mutex<Vec<ConversationId>>,
    pub deleted: Mutex<Vec<ConversationId>>,
    pub fail_sends: AtomicBool,
    pub fail_deletes: AtomicBool,
    next_id: AtomicUsize,
}

impl FakeApi {
    pub fn new(me: &str) -> Self {
        Self {
            me: UserId::from(me),
            listing: Mutex::new(Vec::new()),
            history: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            read_marks: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            next_id: AtomicUsize::new(0),
        }
    }

    pub fn with_conversation(self, conversation: Conversation, messages: Vec<Message>) -> Self {
        self.history.lock().unwrap().insert(conversation.id.clone(), messages);
        self.listing.lock().unwrap().push(conversation);
        self
    }

    fn server_error() -> ApiError {
        ApiError::Status { status: 500, message: Some("boom".into()) }
    }

    fn not_found() -> ApiError {
        ApiError::Status { status: 404, message: Some("Conversation not found".into()) }
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        Ok(self.listing.lock().unwrap().clone())
    }

    async fn conversation(&self, id: &ConversationId) -> Result<Conversation, ApiError> {
        self.listing
            .lock()
            .unwrap()
            .iter()
            .find(|c| &c.id == id)
            .cloned()
            .ok_or_else(Self::not_found)
    }

    async fn messages(&self, id: &ConversationId) -> Result<Vec<Message>, ApiError> {
        // Yield so concurrent fetches genuinely interleave.
        tokio::task::yield_now().await;
        self.history.lock().unwrap().get(id).cloned().ok_or_else(Self::not_found)
    }

    async fn send_message(&self, outgoing: &OutgoingMessage) -> Result<Message, ApiError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Self::server_error());
        }
        self.sent.lock().unwrap().push(outgoing.clone());
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(Message {
            id: MessageId::from(format!("sent-{n}")),
            conversation_id: outgoing.conversation_id.clone(),
            sender: Sender::Id(self.me.clone()),
            text: Some(outgoing.text.clone()),
            media: Vec::new(),
            call: None,
            created_at: at(1_000 + n as i64),
            status: MessageStatus::Sent,
        })
    }

    async fn delete_conversation(&self, id: &ConversationId) -> Result<(), ApiError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Self::server_error());
        }
        self.deleted.lock().unwrap().push(id.clone());
        self.listing.lock().unwrap().retain(|c| &c.id != id);
        Ok(())
    }

    async fn mark_read(&self, id: &ConversationId) -> Result<(), ApiError> {
        self.read_marks.lock().unwrap().push(id.clone());
        Ok(())
    }
}

/// The server end of one fake link.
pub struct Peer {
    pub from_client: fmpsc::UnboundedReceiver<ClientEvent>,
    pub to_client: fmpsc::UnboundedSender<Result<ServerEvent, TransportError>>,
}

impl Peer {
    pub async fn next_frame(&mut self) -> ClientEvent {
        tokio::time::timeout(WAIT, self.from_client.next())
            .await
            .expect("no frame from client")
            .expect("client closed the link")
    }

    pub async fn push(&mut self, event: ServerEvent) {
        self.to_client.send(Ok(event)).await.unwrap();
    }

    /// Ends the stream as if the server went away.
    pub fn hang_up(self) {
        drop(self);
    }
}

/// Dialer over in-memory channels. Each accepted dial hands a [`Peer`] to
/// the test; queued refusals are consumed first.
pub struct FakeDialer {
    refusals: Mutex<VecDeque<()>>,
    refuse_all: AtomicBool,
    peers: mpsc::UnboundedSender<Peer>,
    pub dials: Arc<AtomicUsize>,
}

impl FakeDialer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Peer>, Arc<AtomicUsize>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let dials = Arc::new(AtomicUsize::new(0));
        let dialer = Self {
            refusals: Mutex::new(VecDeque::new()),
            refuse_all: AtomicBool::new(false),
            peers,
            dials: Arc::clone(&dials),
        };
        (dialer, rx, dials)
    }

    pub fn refusing(self) -> Self {
        self.refuse_all.store(true, Ordering::SeqCst);
        self
    }

    pub fn refuse_next(self, count: usize) -> Self {
        self.refusals.lock().unwrap().extend(std::iter::repeat(()).take(count));
        self
    }
}

#[async_trait]
impl Dialer for FakeDialer {
    async fn dial(&self, _credential: &Credential) -> Result<Link, TransportError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        if self.refuse_all.load(Ordering::SeqCst) || self.refusals.lock().unwrap().pop_front().is_some() {
            return Err(TransportError::Disconnected);
        }
        let (client_tx, from_client) = fmpsc::unbounded();
        let (to_client, server_rx) = fmpsc::unbounded();
        let _ = self.peers.send(Peer { from_client, to_client });
        Ok(Link {
            sink: Box::pin(client_tx.sink_map_err(|_| TransportError::Closed)),
            stream: Box::pin(server_rx),
        })
    }
}

pub async fn next_peer(peers: &mut mpsc::UnboundedReceiver<Peer>) -> Peer {
    tokio::time::timeout(WAIT, peers.recv()).await.expect("no dial").expect("dialer gone")
}

pub async fn next_event(events: &mut Subscription) -> TransportEvent {
    tokio::time::timeout(WAIT, events.recv()).await.expect("no event").expect("transport gone")
}

/// Skips events until the connection reaches `state`.
pub async fn wait_for_state(events: &mut Subscription, state: ConnectionState) {
    loop {
        if next_event(events).await == TransportEvent::Connection(state) {
            return;
        }
    }
}

pub fn credential() -> Credential {
    Credential::new("test-token")
}
