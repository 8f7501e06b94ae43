//! The conversation list shown in the sidebar.

use log::{debug, info, warn};

use crate::api::models::{Conversation, ConversationId, LastMessage, UserId};
use crate::api::ChatApi;
use crate::error::{ApiError, ChatError};
use crate::transport::{EventKind, Subscription, Transport, TransportEvent};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DirectoryStatus {
    #[default]
    NotLoaded,
    Loading,
    Ready,
    Failed(ChatError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(usize),
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryChange {
    Unchanged,
    /// The conversation at this index got a new preview or counter.
    Updated(usize),
    PresenceChanged,
}

pub struct ConversationDirectory {
    transport: Transport,
    current_user: UserId,
    conversations: Vec<Conversation>,
    status: DirectoryStatus,
    generation: u64,
    foreground: Option<ConversationId>,
}

impl ConversationDirectory {
    pub fn new(transport: Transport, current_user: UserId) -> Self {
        Self {
            transport,
            current_user,
            conversations: Vec::new(),
            status: DirectoryStatus::NotLoaded,
            generation: 0,
            foreground: None,
        }
    }

    pub fn subscribe(&self) -> Subscription {
        self.transport.on(&[EventKind::NewMessage, EventKind::OnlineUsers])
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn get(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| &c.id == id)
    }

    pub fn status(&self) -> &DirectoryStatus {
        &self.status
    }

    pub fn is_loading(&self) -> bool {
        self.status == DirectoryStatus::Loading
    }

    pub fn foreground(&self) -> Option<&ConversationId> {
        self.foreground.as_ref()
    }

    /// Seeds the list from the local cache. Ignored once a network load has
    /// landed.
    pub fn restore_cached(&mut self, conversations: Vec<Conversation>) -> bool {
        if self.status == DirectoryStatus::Ready {
            return false;
        }
        debug!("restoring {} cached conversations", conversations.len());
        self.conversations = conversations;
        true
    }

    pub fn begin_load(&mut self) -> LoadTicket {
        self.generation += 1;
        self.status = DirectoryStatus::Loading;
        LoadTicket { generation: self.generation }
    }

    /// Replaces the list wholesale with the fetched one.
    pub fn finish_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<Vec<Conversation>, ApiError>,
    ) -> Result<LoadOutcome, ChatError> {
        if ticket.generation != self.generation {
            debug!("dropping superseded conversation list");
            return Ok(LoadOutcome::Superseded);
        }
        match result {
            Ok(conversations) => {
                info!("loaded {} conversations", conversations.len());
                self.conversations = conversations;
                if let Some(id) = self.foreground.clone() {
                    self.clear_unread(&id);
                }
                self.status = DirectoryStatus::Ready;
                Ok(LoadOutcome::Loaded(self.conversations.len()))
            }
            Err(err) => {
                warn!("loading conversations failed: {err}");
                let error = ChatError::from(err);
                self.status = DirectoryStatus::Failed(error.clone());
                Err(error)
            }
        }
    }

    pub async fn load<A>(&mut self, api: &A) -> Result<LoadOutcome, ChatError>
    where
        A: ChatApi + ?Sized,
    {
        let ticket = self.begin_load();
        let result = api.conversations().await;
        self.finish_load(ticket, result)
    }

    /// Server order is kept; an update never moves a conversation.
    pub fn handle_event(&mut self, event: &TransportEvent) -> DirectoryChange {
        match event {
            TransportEvent::NewMessage(message) => {
                let Some(index) = self.position(&message.conversation_id) else {
                    debug!("push for unlisted conversation {} ignored", message.conversation_id);
                    return DirectoryChange::Unchanged;
                };
                let in_foreground = self.foreground.as_ref() == Some(&message.conversation_id);
                let from_me = message.sender_id() == &self.current_user;
                let conversation = &mut self.conversations[index];
                let newer = conversation
                    .last_message
                    .as_ref()
                    .and_then(|last| last.created_at)
                    .is_none_or(|shown| message.created_at >= shown);
                if newer {
                    conversation.last_message = Some(LastMessage::from(message));
                }
                if !in_foreground && !from_me {
                    conversation.unread_count = conversation.unread_count.saturating_add(1);
                }
                DirectoryChange::Updated(index)
            }
            TransportEvent::OnlineUsers(online) => {
                let mut changed = false;
                for conversation in &mut self.conversations {
                    changed |= conversation.apply_presence(online);
                }
                if changed {
                    DirectoryChange::PresenceChanged
                } else {
                    DirectoryChange::Unchanged
                }
            }
            _ => DirectoryChange::Unchanged,
        }
    }

    /// Marks which conversation the user is looking at; its unread counter
    /// is zeroed and stays zero while it is in the foreground.
    pub fn set_foreground(&mut self, id: Option<ConversationId>) {
        if let Some(id) = &id {
            self.clear_unread(id);
        }
        self.foreground = id;
    }

    fn clear_unread(&mut self, id: &ConversationId) {
        if let Some(index) = self.position(id) {
            self.conversations[index].unread_count = 0;
        }
    }

    /// Deletes on the server first; the local list only changes on success.
    pub async fn delete_conversation<A>(&mut self, api: &A, id: &ConversationId) -> Result<(), ChatError>
    where
        A: ChatApi + ?Sized,
    {
        if let Err(err) = api.delete_conversation(id).await {
            warn!("deleting conversation {id} failed: {err}");
            return Err(err.into());
        }
        self.forget(id);
        Ok(())
    }

    /// Drops a conversation from the list and stops listening to it.
    pub fn forget(&mut self, id: &ConversationId) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        self.conversations.remove(index);
        self.transport.leave_conversation(id);
        if self.foreground.as_ref() == Some(id) {
            self.foreground = None;
        }
        true
    }

    /// Case-insensitive match on the group name or the other participants'
    /// names. A blank term matches everything.
    pub fn filter(&self, term: &str) -> Vec<&Conversation> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return self.conversations.iter().collect();
        }
        let matches = |value: Option<&str>| value.is_some_and(|v| v.to_lowercase().contains(&term));
        self.conversations
            .iter()
            .filter(|c| {
                if c.is_group {
                    matches(c.group_name.as_deref())
                } else {
                    c.others(&self.current_user).any(|p| {
                        matches(p.full_name.as_deref()) || matches(p.user_name.as_deref())
                    })
                }
            })
            .collect()
    }

    fn position(&self, id: &ConversationId) -> Option<usize> {
        self.conversations.iter().position(|c| &c.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::{Message, MessageId, MessageStatus, Sender};
    use crate::credential::Credential;
    use crate::error::TransportError;
    use crate::transport::{Dialer, Link, TransportConfig};
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use tokio::runtime::Handle;

    struct Offline;

    #[async_trait]
    impl Dialer for Offline {
        async fn dial(&self, _: &Credential) -> Result<Link, TransportError> {
            Err(TransportError::Disconnected)
        }
    }

    fn directory() -> ConversationDirectory {
        let transport = Transport::new(Offline, TransportConfig::default(), Handle::current());
        ConversationDirectory::new(transport, UserId::from("me"))
    }

    fn listing() -> Vec<Conversation> {
        serde_json::from_value(json!([
            {
                "_id": "c1",
                "participants": [{ "_id": "me" }, { "_id": "u2", "fullName": "Grace Hopper" }],
                "unreadCount": 0
            },
            {
                "_id": "c2",
                "isGroup": true,
                "groupName": "Compilers",
                "participants": [{ "_id": "me" }, { "_id": "u3", "userName": "dmr" }],
                "unreadCount": 2
            }
        ]))
        .unwrap()
    }

    fn push(conversation: &str, sender: &str, text: &str) -> TransportEvent {
        TransportEvent::NewMessage(Message {
            id: MessageId::from(format!("{conversation}-{text}")),
            conversation_id: ConversationId::from(conversation),
            sender: Sender::Id(UserId::from(sender)),
            text: Some(text.to_string()),
            media: Vec::new(),
            call: None,
            created_at: Utc::now(),
            status: MessageStatus::Sent,
        })
    }

    fn push_at(conversation: &str, text: &str, at: chrono::DateTime<Utc>) -> TransportEvent {
        let TransportEvent::NewMessage(mut message) = push(conversation, "u2", text) else {
            unreachable!()
        };
        message.created_at = at;
        TransportEvent::NewMessage(message)
    }

    fn loaded() -> ConversationDirectory {
        let mut directory = directory();
        let ticket = directory.begin_load();
        directory.finish_load(ticket, Ok(listing())).unwrap();
        directory
    }

    fn ids(directory: &ConversationDirectory) -> Vec<&str> {
        directory.conversations().iter().map(|c| c.id.as_str()).collect()
    }

    #[tokio::test]
    async fn push_updates_preview_and_unread_in_place() {
        let mut directory = loaded();
        assert_eq!(directory.handle_event(&push("c2", "u3", "ping")), DirectoryChange::Updated(1));

        let c2 = directory.get(&ConversationId::from("c2")).unwrap();
        assert_eq!(c2.unread_count, 3);
        assert_eq!(c2.last_message.as_ref().and_then(|m| m.text.as_deref()), Some("ping"));
        assert_eq!(ids(&directory), ["c1", "c2"]);
    }

    #[tokio::test]
    async fn unknown_conversation_is_not_synthesized() {
        let mut directory = loaded();
        assert_eq!(directory.handle_event(&push("c9", "u2", "hi")), DirectoryChange::Unchanged);
        assert_eq!(ids(&directory), ["c1", "c2"]);
    }

    #[tokio::test]
    async fn foreground_and_own_messages_do_not_count_as_unread() {
        let mut directory = loaded();
        directory.set_foreground(Some(ConversationId::from("c2")));
        assert_eq!(directory.get(&ConversationId::from("c2")).unwrap().unread_count, 0);

        directory.handle_event(&push("c2", "u3", "seen live"));
        directory.handle_event(&push("c1", "me", "from another device"));
        assert_eq!(directory.get(&ConversationId::from("c2")).unwrap().unread_count, 0);
        assert_eq!(directory.get(&ConversationId::from("c1")).unwrap().unread_count, 0);
    }

    #[tokio::test]
    async fn failed_load_reports_network_error() {
        let mut directory = directory();
        let ticket = directory.begin_load();
        let err = directory
            .finish_load(ticket, Err(ApiError::Status { status: 500, message: None }))
            .unwrap_err();
        assert!(matches!(err, ChatError::Network(_)));
        assert_eq!(directory.status(), &DirectoryStatus::Failed(err));
    }

    #[tokio::test]
    async fn second_load_supersedes_the_first() {
        let mut directory = directory();
        let first = directory.begin_load();
        let second = directory.begin_load();
        directory.finish_load(second, Ok(listing())).unwrap();

        let outcome = directory.finish_load(first, Ok(Vec::new())).unwrap();
        assert_eq!(outcome, LoadOutcome::Superseded);
        assert_eq!(directory.conversations().len(), 2);
    }

    #[tokio::test]
    async fn cache_only_seeds_before_first_load() {
        let mut directory = directory();
        assert!(directory.restore_cached(listing()));
        assert_eq!(directory.conversations().len(), 2);

        let ticket = directory.begin_load();
        directory.finish_load(ticket, Ok(Vec::new())).unwrap();
        assert!(!directory.restore_cached(listing()));
        assert!(directory.conversations().is_empty());
    }

    #[tokio::test]
    async fn filter_matches_group_and_participant_names() {
        let directory = loaded();
        let found = |term: &str| -> Vec<String> {
            directory.filter(term).iter().map(|c| c.id.to_string()).collect()
        };
        assert_eq!(found("grace"), ["c1"]);
        assert_eq!(found("COMPIL"), ["c2"]);
        assert_eq!(found("dmr"), Vec::<String>::new());
        assert_eq!(found("  "), ["c1", "c2"]);
    }

    #[tokio::test]
    async fn presence_snapshot_reaches_every_conversation() {
        let mut directory = loaded();
        let online = TransportEvent::OnlineUsers(vec![UserId::from("u3")]);
        assert_eq!(directory.handle_event(&online), DirectoryChange::PresenceChanged);
        let c2 = directory.get(&ConversationId::from("c2")).unwrap();
        assert!(c2.participants.iter().any(|p| p.id.as_str() == "u3" && p.is_online));
    }

    #[tokio::test]
    async fn late_push_keeps_the_newer_preview() {
        let mut directory = loaded();
        let now = Utc::now();
        directory.handle_event(&push_at("c1", "newer", now));
        let change = directory.handle_event(&push_at("c1", "older", now - chrono::Duration::minutes(5)));

        assert_eq!(change, DirectoryChange::Updated(0));
        let c1 = &directory.conversations()[0];
        assert_eq!(c1.last_message.as_ref().and_then(|m| m.text.as_deref()), Some("newer"));
        assert_eq!(c1.unread_count, 2);
    }
}
