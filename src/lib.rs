//! Real-time direct messaging core: REST client, one shared push transport,
//! the conversation list, an open conversation and its composer, plus the
//! view models the GTK shell renders.

pub mod api;
pub mod app;
pub mod composer;
pub mod credential;
pub mod directory;
pub mod error;
pub mod message_log;
pub mod presentation;
pub mod session;
pub mod storage;
pub mod transport;
pub mod utils;

pub use api::{ApiClient, ChatApi};
pub use composer::{Attachment, Composer, Draft};
pub use credential::Credential;
pub use directory::ConversationDirectory;
pub use error::ChatError;
pub use session::ConversationSession;
pub use transport::{Transport, TransportConfig, WebSocketDialer};
