//! In-memory message log of one open conversation.
//!
//! Messages are kept unique by id and sorted by `(created_at, id)`. The id
//! tie-break makes the final order independent of arrival order, so history
//! fetches and pushed messages can be merged in any interleaving.

use std::collections::HashSet;

use crate::api::models::{Message, MessageId, MessageUpdates};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// Inserted at this position.
    Inserted(usize),
    /// A message with the same id is already present.
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusMerge {
    Advanced,
    /// Update was equal to or behind the current status.
    Unchanged,
    /// No such message in the log.
    Missing,
}

#[derive(Debug, Default, Clone)]
pub struct MessageLog {
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_history(history: impl IntoIterator<Item = Message>) -> Self {
        let mut log = Self::new();
        log.extend(history);
        log
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        for message in messages {
            self.merge(message);
        }
    }

    pub fn merge(&mut self, message: Message) -> Merge {
        if self.ids.contains(&message.id) {
            return Merge::Duplicate;
        }
        let index = self.messages.partition_point(|existing| {
            (existing.created_at, &existing.id) <= (message.created_at, &message.id)
        });
        self.ids.insert(message.id.clone());
        self.messages.insert(index, message);
        Merge::Inserted(index)
    }

    /// Merges the fields of a status-update push. Status only ever moves
    /// forward; a stale `delivered` after `seen` is dropped.
    pub fn apply_updates(&mut self, id: &MessageId, updates: &MessageUpdates) -> StatusMerge {
        let Some(message) = self.messages.iter_mut().rev().find(|m| &m.id == id) else {
            return StatusMerge::Missing;
        };
        match updates.status {
            Some(status) if status > message.status => {
                message.status = status;
                StatusMerge::Advanced
            }
            _ => StatusMerge::Unchanged,
        }
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
    }
}
