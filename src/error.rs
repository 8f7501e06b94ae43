use thiserror::Error;

use crate::api::models::ConversationId;

/// REST layer failures.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}{}", detail(.message))]
    Status { status: u16, message: Option<String> },

    #[error("invalid base URL: {0}")]
    BaseUrl(String),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

fn detail(message: &Option<String>) -> String {
    message.as_deref().map(|m| format!(": {m}")).unwrap_or_default()
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Request(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Socket layer failures.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("malformed frame: {0}")]
    Frame(#[from] serde_json::Error),

    #[error("invalid socket URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("credential is not a valid header value")]
    Credential,

    #[error("not connected")]
    Disconnected,

    #[error("link closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config directory on this platform")]
    NoConfigDir,

    #[error("config I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("legacy config: {0}")]
    Legacy(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("no data directory on this platform")]
    NoDataDir,

    #[error("cache I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("cached row: {0}")]
    Json(#[from] serde_json::Error),
}

/// What the presentation layer is told when an operation fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("network error: {0}")]
    Network(String),

    #[error("conversation {0} not found")]
    ConversationNotFound(ConversationId),

    #[error("failed to send message: {0}")]
    SendFailed(String),

    #[error("connection lost, reconnecting")]
    TransportDisconnected,

    #[error("{0}")]
    Validation(&'static str),
}

impl ChatError {
    /// Maps a failed conversation fetch; 404 means the conversation is gone.
    pub fn from_conversation_fetch(id: &ConversationId, err: &ApiError) -> Self {
        if err.is_not_found() {
            ChatError::ConversationNotFound(id.clone())
        } else {
            ChatError::Network(err.to_string())
        }
    }

    /// Whether a user-initiated retry of the same operation can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChatError::Network(_) | ChatError::SendFailed(_) | ChatError::TransportDisconnected
        )
    }
}

impl From<ApiError> for ChatError {
    fn from(err: ApiError) -> Self {
        ChatError::Network(err.to_string())
    }
}

impl From<TransportError> for ChatError {
    fn from(_: TransportError) -> Self {
        ChatError::TransportDisconnected
    }
}
