//! The one persistent push connection of the application.
//!
//! [`Transport`] is a cheap, clonable handle. It is constructed once at
//! startup and passed to everything that needs push events; nothing else
//! opens a socket. A background worker owns the physical link and reconnects
//! with exponential backoff; all bookkeeping (state, joined conversations,
//! subscribers) lives behind one mutex that is never held across an await.

mod dispatch;
pub mod socket;

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::events::{ClientEvent, ServerEvent};
use crate::api::models::{ConversationId, Message, StatusUpdate, UserId};
use crate::credential::Credential;
use crate::error::TransportError;

pub use dispatch::SubscriptionId;
pub use socket::{Dialer, Link, WebSocketDialer};

use dispatch::HandlerTable;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewMessage,
    MessageStatusUpdate,
    OnlineUsers,
    Connection,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::NewMessage,
        EventKind::MessageStatusUpdate,
        EventKind::OnlineUsers,
        EventKind::Connection,
    ];
}

/// What subscribers receive: server pushes plus local connection changes.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    NewMessage(Message),
    MessageStatusUpdate(StatusUpdate),
    OnlineUsers(Vec<UserId>),
    Connection(ConnectionState),
}

impl TransportEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            TransportEvent::NewMessage(_) => EventKind::NewMessage,
            TransportEvent::MessageStatusUpdate(_) => EventKind::MessageStatusUpdate,
            TransportEvent::OnlineUsers(_) => EventKind::OnlineUsers,
            TransportEvent::Connection(_) => EventKind::Connection,
        }
    }
}

impl From<ServerEvent> for TransportEvent {
    fn from(event: ServerEvent) -> Self {
        match event {
            ServerEvent::NewMessage(message) => TransportEvent::NewMessage(message),
            ServerEvent::MessageStatusUpdate(update) => TransportEvent::MessageStatusUpdate(update),
            ServerEvent::OnlineUsers(users) => TransportEvent::OnlineUsers(users),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// 0 retries forever.
    pub max_attempts: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: 0,
        }
    }
}

impl TransportConfig {
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        let factor = 1_u32.checked_shl(shift).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn should_retry(&self, attempt: u32) -> bool {
        self.max_attempts == 0 || attempt <= self.max_attempts
    }
}

struct Worker {
    epoch: u64,
    shutdown: watch::Sender<bool>,
    _task: JoinHandle<()>,
}

#[derive(Default)]
struct Inner {
    state: ConnectionState,
    joined: BTreeSet<ConversationId>,
    handlers: HandlerTable,
    /// Present only while a link is up.
    outbound: Option<UnboundedSender<ClientEvent>>,
    worker: Option<Worker>,
    /// Bumped on every connect/disconnect so a retired worker cannot touch
    /// the state of its successor.
    epoch: u64,
}

impl Inner {
    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!("transport {:?} -> {:?}", self.state, state);
            self.state = state;
            self.handlers.dispatch(&TransportEvent::Connection(state));
        }
    }

    fn send(&self, event: ClientEvent) -> bool {
        self.outbound.as_ref().is_some_and(|tx| tx.send(event).is_ok())
    }
}

struct Shared {
    dialer: Arc<dyn Dialer>,
    config: TransportConfig,
    runtime: Handle,
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, epoch: u64, state: ConnectionState) {
        let mut inner = self.lock();
        if inner.epoch == epoch {
            inner.set_state(state);
        }
    }

    /// Installs the outbound queue of a fresh link and re-sends every join
    /// recorded while the link was down, as one frame.
    fn link_up(&self, epoch: u64, outbound: UnboundedSender<ClientEvent>) -> bool {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            return false;
        }
        if !inner.joined.is_empty() {
            let ids = inner.joined.iter().cloned().collect();
            let _ = outbound.send(ClientEvent::JoinConversations(ids));
        }
        inner.outbound = Some(outbound);
        inner.set_state(ConnectionState::Connected);
        true
    }

    /// The server forgets subscriptions with the link; consumers re-join on
    /// the next `Connected`.
    fn link_down(&self, epoch: u64) {
        let mut inner = self.lock();
        if inner.epoch == epoch {
            inner.outbound = None;
            inner.joined.clear();
            inner.set_state(ConnectionState::Disconnected);
        }
    }

    fn dispatch(&self, epoch: u64, event: TransportEvent) {
        let mut inner = self.lock();
        if inner.epoch == epoch {
            inner.handlers.dispatch(&event);
        }
    }

    fn worker_finished(&self, epoch: u64) {
        let mut inner = self.lock();
        if inner.worker.as_ref().is_some_and(|w| w.epoch == epoch) {
            inner.worker = None;
            inner.outbound = None;
            inner.set_state(ConnectionState::Disconnected);
        }
    }
}

/// Receives the events a subscriber registered for. Dropping it unregisters.
pub struct Subscription {
    id: SubscriptionId,
    events: UnboundedReceiver<TransportEvent>,
    shared: Weak<Shared>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<TransportEvent> {
        self.events.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.lock().handlers.remove(self.id);
        }
    }
}

#[derive(Clone)]
pub struct Transport {
    shared: Arc<Shared>,
}

impl Transport {
    /// `runtime` is where the connection worker is spawned.
    pub fn new(dialer: impl Dialer, config: TransportConfig, runtime: Handle) -> Self {
        Self {
            shared: Arc::new(Shared {
                dialer: Arc::new(dialer),
                config,
                runtime,
                inner: Mutex::new(Inner::default()),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    /// Starts the connection worker. No-op while connecting or connected.
    pub fn connect(&self, credential: Credential) {
        let mut inner = self.shared.lock();
        if inner.worker.is_some() {
            debug!("connect ignored, transport is {:?}", inner.state);
            return;
        }
        inner.epoch += 1;
        let epoch = inner.epoch;
        let (shutdown, shutdown_rx) = watch::channel(false);
        inner.set_state(ConnectionState::Connecting);
        let task = self
            .shared
            .runtime
            .spawn(run(Arc::clone(&self.shared), epoch, credential, shutdown_rx));
        inner.worker = Some(Worker { epoch, shutdown, _task: task });
    }

    /// Tears the link down and forgets every joined conversation.
    pub fn disconnect(&self) {
        let mut inner = self.shared.lock();
        if let Some(worker) = inner.worker.take() {
            let _ = worker.shutdown.send(true);
            info!("transport disconnecting");
        }
        inner.epoch += 1;
        inner.outbound = None;
        inner.joined.clear();
        inner.set_state(ConnectionState::Disconnected);
    }

    /// Idempotent: joining an already joined conversation sends nothing.
    pub fn join_conversation(&self, id: &ConversationId) {
        let mut inner = self.shared.lock();
        if !inner.joined.insert(id.clone()) {
            return;
        }
        if !inner.send(ClientEvent::JoinConversations(vec![id.clone()])) {
            debug!("join of {id} deferred until connected");
        }
    }

    /// Leaving a conversation that was never joined is a no-op.
    pub fn leave_conversation(&self, id: &ConversationId) {
        let mut inner = self.shared.lock();
        if inner.joined.remove(id) {
            inner.send(ClientEvent::LeaveConversation(id.clone()));
        }
    }

    pub fn is_joined(&self, id: &ConversationId) -> bool {
        self.shared.lock().joined.contains(id)
    }

    pub fn joined_conversations(&self) -> Vec<ConversationId> {
        self.shared.lock().joined.iter().cloned().collect()
    }

    /// Fans a freshly created message out to the other participants.
    pub fn send_message(&self, message: &Message) -> Result<(), TransportError> {
        if self.shared.lock().send(ClientEvent::SendMessage(message.clone())) {
            Ok(())
        } else {
            Err(TransportError::Disconnected)
        }
    }

    pub fn on(&self, kinds: &[EventKind]) -> Subscription {
        let (id, events) = self.shared.lock().handlers.register(kinds);
        Subscription { id, events, shared: Arc::downgrade(&self.shared) }
    }

    pub fn off(&self, id: SubscriptionId) -> bool {
        self.shared.lock().handlers.remove(id)
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.shared.lock().handlers.subscriber_count(kind)
    }
}

enum PumpEnd {
    Shutdown,
    Dropped(TransportError),
}

async fn run(
    shared: Arc<Shared>,
    epoch: u64,
    credential: Credential,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;
    loop {
        shared.set_state(epoch, ConnectionState::Connecting);
        let dialed = tokio::select! {
            _ = shutdown.changed() => break,
            dialed = shared.dialer.dial(&credential) => dialed,
        };

        match dialed {
            Ok(link) => {
                let (tx, rx) = mpsc::unbounded_channel();
                if !shared.link_up(epoch, tx) {
                    break;
                }
                info!("transport connected");
                attempt = 0;
                let end = pump(&shared, epoch, link, rx, &mut shutdown).await;
                shared.link_down(epoch);
                match end {
                    PumpEnd::Shutdown => break,
                    PumpEnd::Dropped(reason) => warn!("transport link dropped: {reason}"),
                }
            }
            Err(err) => {
                warn!("transport dial failed: {err}");
                shared.set_state(epoch, ConnectionState::Disconnected);
            }
        }

        attempt = attempt.saturating_add(1);
        if !shared.config.should_retry(attempt) {
            warn!("transport giving up after {attempt} failed attempts");
            break;
        }
        let delay = shared.config.reconnect_delay(attempt);
        debug!("reconnecting in {delay:?} (attempt {attempt})");
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    shared.worker_finished(epoch);
}

async fn pump(
    shared: &Shared,
    epoch: u64,
    link: Link,
    mut outbound: UnboundedReceiver<ClientEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> PumpEnd {
    let Link { mut sink, mut stream } = link;
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = sink.close().await;
                return PumpEnd::Shutdown;
            }
            Some(event) = outbound.recv() => {
                if let Err(err) = sink.send(event).await {
                    return PumpEnd::Dropped(err);
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(event)) => shared.dispatch(epoch, event.into()),
                Some(Err(err)) => return PumpEnd::Dropped(err),
                None => return PumpEnd::Dropped(TransportError::Closed),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_clamps() {
        let config = TransportConfig {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
            max_attempts: 0,
        };
        assert_eq!(config.reconnect_delay(1), Duration::from_millis(500));
        assert_eq!(config.reconnect_delay(2), Duration::from_secs(1));
        assert_eq!(config.reconnect_delay(3), Duration::from_secs(2));
        assert_eq!(config.reconnect_delay(4), Duration::from_secs(3));
        assert_eq!(config.reconnect_delay(200), Duration::from_secs(3));
    }

    #[test]
    fn retry_budget() {
        let bounded = TransportConfig { max_attempts: 2, ..TransportConfig::default() };
        assert!(bounded.should_retry(2));
        assert!(!bounded.should_retry(3));
        assert!(TransportConfig::default().should_retry(u32::MAX));
    }
}
