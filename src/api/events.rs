use log::debug;
use serde::{Deserialize, Serialize};

use crate::api::models::{ConversationId, Message, StatusUpdate, UserId};

/// Raw `{ "event": ..., "data": ... }` frame as read off the socket.
#[derive(Debug, Serialize, Deserialize)]
pub struct IncomingEvent {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Server → client push events.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    NewMessage(Message),
    MessageStatusUpdate(StatusUpdate),
    OnlineUsers(Vec<UserId>),
}

impl ServerEvent {
    /// Decodes one text frame. Unknown event names yield `Ok(None)`.
    pub fn decode(frame: &str) -> Result<Option<Self>, serde_json::Error> {
        let incoming: IncomingEvent = serde_json::from_str(frame)?;
        let event = match incoming.event.as_str() {
            "new-message" => ServerEvent::NewMessage(serde_json::from_value(incoming.data)?),
            "message-status-update" => {
                ServerEvent::MessageStatusUpdate(serde_json::from_value(incoming.data)?)
            }
            "online-users" => ServerEvent::OnlineUsers(serde_json::from_value(incoming.data)?),
            other => {
                debug!("ignoring unknown server event {other:?}");
                return Ok(None);
            }
        };
        Ok(Some(event))
    }
}

/// Client → server frames.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    JoinConversations(Vec<ConversationId>),
    LeaveConversation(ConversationId),
    SendMessage(Message),
}

impl ClientEvent {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
