//! One open conversation: history, live pushes and outgoing messages.
//!
//! Loading is split in three so a UI can release its borrow of the session
//! while the network is busy:
//!
//! 1. [`ConversationSession::begin_open`] switches state and hands out a
//!    [`HistoryTicket`];
//! 2. [`fetch_history`] runs the two REST calls;
//! 3. [`ConversationSession::finish_open`] applies the result, unless a newer
//!    `begin_open` happened in the meantime.
//!
//! [`ConversationSession::open`] does all three in one go.

use log::{debug, info, warn};

use crate::api::models::{Conversation, ConversationId, Message, MessageId, UserId};
use crate::api::{ChatApi, OutgoingMessage};
use crate::composer::Draft;
use crate::error::{ApiError, ChatError};
use crate::message_log::{Merge, MessageLog, StatusMerge};
use crate::transport::{ConnectionState, EventKind, Subscription, Transport, TransportEvent};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    LoadingHistory { conversation_id: ConversationId },
    Active { conversation_id: ConversationId },
    Failed { conversation_id: ConversationId, error: ChatError },
}

impl SessionState {
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        match self {
            SessionState::Idle => None,
            SessionState::LoadingHistory { conversation_id }
            | SessionState::Active { conversation_id }
            | SessionState::Failed { conversation_id, .. } => Some(conversation_id),
        }
    }
}

/// Identifies one `begin_open` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTicket {
    generation: u64,
    conversation_id: ConversationId,
}

impl HistoryTicket {
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }
}

#[derive(Debug, Clone)]
pub struct History {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    Opened,
    /// Another conversation was opened while this one loaded.
    Superseded,
}

/// What a handled push changed, for the view to redraw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    Unchanged,
    MessageInserted(usize),
    StatusChanged(MessageId),
    PresenceChanged,
    Reconnecting,
    Reconnected,
    Buffered,
}

/// Fetches conversation metadata and the first page of messages
/// concurrently.
pub async fn fetch_history<A>(api: &A, ticket: &HistoryTicket) -> Result<History, ApiError>
where
    A: ChatApi + ?Sized,
{
    let id = &ticket.conversation_id;
    let (conversation, messages) = tokio::try_join!(api.conversation(id), api.messages(id))?;
    Ok(History { conversation, messages })
}

/// Submits a message over REST. Every failure is a `SendFailed`.
pub async fn submit_message<A>(api: &A, outgoing: &OutgoingMessage) -> Result<Message, ChatError>
where
    A: ChatApi + ?Sized,
{
    api.send_message(outgoing).await.map_err(|err| {
        warn!("sending to {} failed: {err}", outgoing.conversation_id);
        ChatError::SendFailed(err.to_string())
    })
}

pub struct ConversationSession {
    transport: Transport,
    current_user: UserId,
    state: SessionState,
    generation: u64,
    conversation: Option<Conversation>,
    log: MessageLog,
    /// Pushes received while history is loading.
    pending: Vec<TransportEvent>,
    reconnecting: bool,
}

impl ConversationSession {
    pub fn new(transport: Transport, current_user: UserId) -> Self {
        Self {
            transport,
            current_user,
            state: SessionState::Idle,
            generation: 0,
            conversation: None,
            log: MessageLog::new(),
            pending: Vec::new(),
            reconnecting: false,
        }
    }

    /// Registers for every event kind the session reacts to. Feed what it
    /// yields to [`handle_event`](Self::handle_event).
    pub fn subscribe(&self) -> Subscription {
        self.transport.on(&[
            EventKind::NewMessage,
            EventKind::MessageStatusUpdate,
            EventKind::OnlineUsers,
            EventKind::Connection,
        ])
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn current_user(&self) -> &UserId {
        &self.current_user
    }

    pub fn conversation_id(&self) -> Option<&ConversationId> {
        self.state.conversation_id()
    }

    pub fn active_conversation_id(&self) -> Option<&ConversationId> {
        match &self.state {
            SessionState::Active { conversation_id } => Some(conversation_id),
            _ => None,
        }
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        self.conversation.as_ref()
    }

    pub fn messages(&self) -> &[Message] {
        self.log.messages()
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting
    }

    pub fn begin_open(&mut self, id: ConversationId) -> HistoryTicket {
        self.close();
        self.generation += 1;
        debug!("opening conversation {id} (generation {})", self.generation);
        self.state = SessionState::LoadingHistory { conversation_id: id.clone() };
        HistoryTicket { generation: self.generation, conversation_id: id }
    }

    pub fn finish_open(
        &mut self,
        ticket: HistoryTicket,
        result: Result<History, ApiError>,
    ) -> Result<OpenOutcome, ChatError> {
        if ticket.generation != self.generation {
            warn!("dropping stale history for {}", ticket.conversation_id);
            return Ok(OpenOutcome::Superseded);
        }
        let id = ticket.conversation_id;

        let history = match result {
            Ok(history) => history,
            Err(err) => {
                self.pending.clear();
                let error = ChatError::from_conversation_fetch(&id, &err);
                warn!("loading conversation {id} failed: {err}");
                self.state = match &error {
                    ChatError::ConversationNotFound(_) => SessionState::Idle,
                    _ => SessionState::Failed { conversation_id: id, error: error.clone() },
                };
                return Err(error);
            }
        };

        self.log = MessageLog::from_history(history.messages);
        self.conversation = Some(history.conversation);
        self.state = SessionState::Active { conversation_id: id.clone() };
        for event in std::mem::take(&mut self.pending) {
            self.handle_event(&event);
        }
        self.transport.join_conversation(&id);
        info!("conversation {id} open with {} messages", self.log.len());
        Ok(OpenOutcome::Opened)
    }

    /// Opens `id`, then asks the server to mark it read. A failed mark-read
    /// is logged and does not fail the open.
    pub async fn open<A>(&mut self, api: &A, id: ConversationId) -> Result<OpenOutcome, ChatError>
    where
        A: ChatApi + ?Sized,
    {
        let ticket = self.begin_open(id);
        let result = fetch_history(api, &ticket).await;
        let outcome = self.finish_open(ticket, result)?;
        if outcome == OpenOutcome::Opened {
            if let Err(err) = self.mark_read(api).await {
                warn!("mark-read failed: {err}");
            }
        }
        Ok(outcome)
    }

    pub async fn mark_read<A>(&self, api: &A) -> Result<(), ChatError>
    where
        A: ChatApi + ?Sized,
    {
        let Some(id) = self.active_conversation_id() else {
            return Ok(());
        };
        api.mark_read(id).await.map_err(ChatError::from)
    }

    pub fn handle_event(&mut self, event: &TransportEvent) -> SessionChange {
        match event {
            TransportEvent::NewMessage(message) => self.on_new_message(message),
            TransportEvent::MessageStatusUpdate(update) => match &self.state {
                SessionState::Active { .. } => {
                    match self.log.apply_updates(&update.message_id, &update.updates) {
                        StatusMerge::Advanced => SessionChange::StatusChanged(update.message_id.clone()),
                        StatusMerge::Unchanged | StatusMerge::Missing => SessionChange::Unchanged,
                    }
                }
                SessionState::LoadingHistory { .. } => {
                    self.pending.push(event.clone());
                    SessionChange::Buffered
                }
                _ => SessionChange::Unchanged,
            },
            TransportEvent::OnlineUsers(online) => match self.conversation.as_mut() {
                Some(conversation) => {
                    if conversation.apply_presence(online) {
                        SessionChange::PresenceChanged
                    } else {
                        SessionChange::Unchanged
                    }
                }
                None => SessionChange::Unchanged,
            },
            TransportEvent::Connection(state) => self.on_connection(*state),
        }
    }

    fn on_new_message(&mut self, message: &Message) -> SessionChange {
        match &self.state {
            SessionState::Active { conversation_id } if *conversation_id == message.conversation_id => {
                match self.log.merge(message.clone()) {
                    Merge::Inserted(index) => SessionChange::MessageInserted(index),
                    Merge::Duplicate => {
                        debug!("duplicate message {} ignored", message.id);
                        SessionChange::Unchanged
                    }
                }
            }
            SessionState::LoadingHistory { conversation_id }
                if *conversation_id == message.conversation_id =>
            {
                self.pending.push(TransportEvent::NewMessage(message.clone()));
                SessionChange::Buffered
            }
            _ => SessionChange::Unchanged,
        }
    }

    fn on_connection(&mut self, state: ConnectionState) -> SessionChange {
        let Some(id) = self.active_conversation_id().cloned() else {
            return SessionChange::Unchanged;
        };
        match state {
            ConnectionState::Disconnected if !self.reconnecting => {
                self.reconnecting = true;
                SessionChange::Reconnecting
            }
            ConnectionState::Connected => {
                self.transport.join_conversation(&id);
                if std::mem::take(&mut self.reconnecting) {
                    info!("rejoined conversation {id}");
                    SessionChange::Reconnected
                } else {
                    SessionChange::Unchanged
                }
            }
            _ => SessionChange::Unchanged,
        }
    }

    /// Validates a draft against the open conversation.
    pub fn prepare_send(&self, draft: &Draft) -> Result<OutgoingMessage, ChatError> {
        if !draft.is_submittable() {
            return Err(ChatError::Validation("message is empty"));
        }
        let id = self
            .active_conversation_id()
            .ok_or(ChatError::Validation("no conversation is open"))?;
        Ok(draft.to_outgoing(id.clone()))
    }

    /// Fans a message the server accepted out to the other participants and
    /// merges it locally. The later push echo is dropped as a duplicate.
    pub fn apply_sent(&mut self, message: Message) -> SessionChange {
        if let Err(err) = self.transport.send_message(&message) {
            warn!("could not fan out message {}: {err}", message.id);
        }
        self.on_new_message(&message)
    }

    pub async fn send<A>(&mut self, api: &A, draft: &Draft) -> Result<Message, ChatError>
    where
        A: ChatApi + ?Sized,
    {
        let outgoing = self.prepare_send(draft)?;
        let message = submit_message(api, &outgoing).await?;
        self.apply_sent(message.clone());
        Ok(message)
    }

    /// Leaves the open conversation and clears the log. Safe to call in any
    /// state.
    pub fn close(&mut self) {
        if let Some(id) = self.conversation_id() {
            debug!("closing conversation {id}");
            self.transport.leave_conversation(id);
        }
        self.state = SessionState::Idle;
        self.conversation = None;
        self.log.clear();
        self.pending.clear();
        self.reconnecting = false;
    }
}

impl Drop for ConversationSession {
    fn drop(&mut self) {
        self.close();
    }
}
