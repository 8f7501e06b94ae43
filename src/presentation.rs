//! View models derived from the data model. Nothing here touches the network
//! or GTK, so the shell stays a thin renderer.

use chrono::{DateTime, Utc};

use crate::api::models::{
    CallInfo, CallKind, Conversation, LastMessage, Message, MessageStatus, UserId, UserSummary,
};

const UNITS: [(&str, i64); 5] = [
    ("year", 31_536_000),
    ("month", 2_592_000),
    ("day", 86_400),
    ("hour", 3_600),
    ("minute", 60),
];

/// "3 hours ago" style relative time. Anything under a minute, or in the
/// future, is "Just now".
pub fn time_ago(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - at).num_seconds();
    for (unit, size) in UNITS {
        let count = seconds / size;
        if count >= 1 {
            let plural = if count > 1 { "s" } else { "" };
            return format!("{count} {unit}{plural} ago");
        }
    }
    "Just now".to_string()
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Avatar {
    Image(String),
    Initials(String),
}

pub fn avatar(photo: Option<&str>, name: Option<&str>) -> Avatar {
    if let Some(photo) = photo.filter(|p| !p.is_empty()) {
        return Avatar::Image(photo.to_string());
    }
    let initials: String = name
        .unwrap_or_default()
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .take(2)
        .collect();
    if initials.is_empty() {
        Avatar::Initials("?".to_string())
    } else {
        Avatar::Initials(initials)
    }
}

fn other<'a>(conversation: &'a Conversation, me: &'a UserId) -> Option<&'a UserSummary> {
    conversation.others(me).next()
}

/// Group name for groups, otherwise the other participant's name.
pub fn conversation_title(conversation: &Conversation, me: &UserId) -> String {
    let name = if conversation.is_group {
        conversation.group_name.as_deref().filter(|n| !n.is_empty())
    } else {
        other(conversation, me).and_then(UserSummary::display_name)
    };
    name.unwrap_or("Unknown").to_string()
}

pub fn conversation_avatar(conversation: &Conversation, me: &UserId) -> Avatar {
    let photo = if conversation.is_group {
        conversation.group_photo.as_deref()
    } else {
        other(conversation, me).and_then(|u| u.profile_photo.as_deref())
    };
    let title = conversation_title(conversation, me);
    avatar(photo, Some(title.as_str()))
}

/// Header subtitle of a one-to-one conversation. Groups have none.
pub fn presence_label(conversation: &Conversation, me: &UserId, now: DateTime<Utc>) -> Option<String> {
    if conversation.is_group {
        return None;
    }
    let user = other(conversation, me)?;
    Some(match (user.is_online, user.last_seen) {
        (true, _) => "Online".to_string(),
        (false, Some(seen)) => time_ago(seen, now),
        (false, None) => "Offline".to_string(),
    })
}

fn call_icon(kind: CallKind) -> &'static str {
    match kind {
        CallKind::Video => "📹",
        CallKind::Voice => "📞",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub icon: Option<&'static str>,
    pub text: String,
}

pub fn preview(last: Option<&LastMessage>) -> Preview {
    let Some(last) = last else {
        return Preview { icon: None, text: "Start a conversation".to_string() };
    };
    if let Some(text) = last.text.as_deref().filter(|t| !t.is_empty()) {
        return Preview { icon: None, text: text.to_string() };
    }
    if !last.media.is_empty() {
        return Preview { icon: Some("🖼️"), text: "Media".to_string() };
    }
    match &last.call {
        Some(call) => {
            let kind = match call.kind {
                CallKind::Video => "Video",
                CallKind::Voice => "Voice",
            };
            Preview { icon: Some(call_icon(call.kind)), text: format!("{kind} call") }
        }
        None => Preview { icon: None, text: "Start a conversation".to_string() },
    }
}

/// One row of the conversation list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRow {
    pub title: String,
    pub avatar: Avatar,
    pub preview: Preview,
    pub time: Option<String>,
    pub unread: u32,
    pub online: bool,
}

pub fn conversation_row(conversation: &Conversation, me: &UserId, now: DateTime<Utc>) -> ConversationRow {
    let last = conversation.last_message.as_ref();
    ConversationRow {
        title: conversation_title(conversation, me),
        avatar: conversation_avatar(conversation, me),
        preview: preview(last),
        time: last.and_then(|m| m.created_at).map(|at| time_ago(at, now)),
        unread: conversation.unread_count,
        online: !conversation.is_group && other(conversation, me).is_some_and(|u| u.is_online),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

impl MediaKind {
    /// Classified by the guessed MIME type of the URL's path. Anything that
    /// is neither image nor video plays as audio.
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let guess = mime_guess::from_path(path).first();
        match guess.as_ref().map(|mime| mime.type_().as_str()) {
            Some("image") => MediaKind::Image,
            Some("video") => MediaKind::Video,
            _ => MediaKind::Audio,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTick {
    Single,
    Double,
    /// Double tick in the accent color.
    Read,
}

impl From<MessageStatus> for StatusTick {
    fn from(status: MessageStatus) -> Self {
        match status {
            MessageStatus::Sent => StatusTick::Single,
            MessageStatus::Delivered => StatusTick::Double,
            MessageStatus::Seen => StatusTick::Read,
        }
    }
}

pub fn call_label(call: &CallInfo) -> String {
    let kind = match call.kind {
        CallKind::Video => "Video Call",
        CallKind::Voice => "Voice Call",
    };
    match call.duration {
        Some(secs) if secs > 0 => format!("{} {kind} ({secs}s)", call_icon(call.kind)),
        _ => format!("{} {kind}", call_icon(call.kind)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bubble {
    pub alignment: Alignment,
    /// Only for messages from others.
    pub sender_name: Option<String>,
    pub call: Option<String>,
    pub media: Vec<(String, MediaKind)>,
    pub text: Option<String>,
    pub time: String,
    /// Only for own messages.
    pub status: Option<StatusTick>,
}

/// The sender name comes from a populated sender, else from the
/// conversation's participant list.
pub fn bubble(
    message: &Message,
    me: &UserId,
    conversation: Option<&Conversation>,
    now: DateTime<Utc>,
) -> Bubble {
    let own = message.sender_id() == me;
    let sender_name = if own {
        None
    } else {
        message
            .sender
            .summary()
            .or_else(|| {
                conversation?.participants.iter().find(|p| &p.id == message.sender_id())
            })
            .and_then(UserSummary::display_name)
            .map(str::to_string)
    };
    Bubble {
        alignment: if own { Alignment::End } else { Alignment::Start },
        sender_name,
        call: message.call.as_ref().map(call_label),
        media: message.media.iter().map(|url| (url.clone(), MediaKind::from_url(url))).collect(),
        text: message.text.clone().filter(|t| !t.is_empty()),
        time: time_ago(message.created_at, now),
        status: own.then(|| message.status.into()),
    }
}
