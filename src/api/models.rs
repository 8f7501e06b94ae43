use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Server-assigned conversation identifier.
    ConversationId
);
string_id!(
    /// Server-assigned message identifier, unique within a conversation.
    MessageId
);
string_id!(UserId);

/// Participant summary as embedded in conversations and populated senders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    #[serde(rename = "_id", alias = "id")]
    pub id: UserId,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub profile_photo: Option<String>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

impl UserSummary {
    pub fn display_name(&self) -> Option<&str> {
        self.full_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or_else(|| self.user_name.as_deref().filter(|n| !n.is_empty()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Voice,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallInfo {
    #[serde(rename = "type")]
    pub kind: CallKind,
    /// Seconds.
    #[serde(default)]
    pub duration: Option<u32>,
}

/// Delivery state of a message. Ordered: a later variant never regresses to
/// an earlier one once observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    Sent,
    Delivered,
    Seen,
}

/// The `senderId` field arrives either populated or as a bare id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sender {
    User(UserSummary),
    Id(UserId),
}

impl Sender {
    pub fn id(&self) -> &UserId {
        match self {
            Sender::User(user) => &user.id,
            Sender::Id(id) => id,
        }
    }

    pub fn summary(&self) -> Option<&UserSummary> {
        match self {
            Sender::User(user) => Some(user),
            Sender::Id(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id", alias = "id")]
    pub id: MessageId,
    pub conversation_id: ConversationId,
    #[serde(rename = "senderId")]
    pub sender: Sender,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub media: Vec<String>,
    #[serde(default)]
    pub call: Option<CallInfo>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: MessageStatus,
}

impl Message {
    pub fn sender_id(&self) -> &UserId {
        self.sender.id()
    }
}

/// Denormalized preview of the most recent message of a conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub media: Vec<String>,
    #[serde(default)]
    pub call: Option<CallInfo>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&Message> for LastMessage {
    fn from(message: &Message) -> Self {
        Self {
            text: message.text.clone(),
            media: message.media.clone(),
            call: message.call.clone(),
            created_at: Some(message.created_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(rename = "_id", alias = "id")]
    pub id: ConversationId,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub participants: Vec<UserSummary>,
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default)]
    pub group_photo: Option<String>,
    #[serde(default)]
    pub last_message: Option<LastMessage>,
    #[serde(default)]
    pub unread_count: u32,
}

impl Conversation {
    /// Participants other than `me`.
    pub fn others<'a>(&'a self, me: &'a UserId) -> impl Iterator<Item = &'a UserSummary> + 'a {
        self.participants.iter().filter(move |p| &p.id != me)
    }

    /// Applies an `online-users` snapshot to every participant.
    pub fn apply_presence(&mut self, online: &[UserId]) -> bool {
        let mut changed = false;
        for participant in &mut self.participants {
            let is_online = online.contains(&participant.id);
            if participant.is_online != is_online {
                participant.is_online = is_online;
                if !is_online {
                    participant.last_seen = Some(Utc::now());
                }
                changed = true;
            }
        }
        changed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageUpdates {
    #[serde(default)]
    pub status: Option<MessageStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub message_id: MessageId,
    #[serde(default)]
    pub updates: MessageUpdates,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ConversationsEnvelope {
    #[serde(default)]
    pub conversations: Vec<Conversation>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct MessagesEnvelope {
    #[serde(default)]
    pub messages: Vec<Message>,
}
