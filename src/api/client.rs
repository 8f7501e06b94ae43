use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use reqwest::{Client as HttpClient, RequestBuilder, Response};
use serde_json::Value;
use url::Url;

use crate::api::models::{
    Conversation, ConversationId, ConversationsEnvelope, Message, MessagesEnvelope,
};
use crate::composer::Attachment;
use crate::credential::Credential;
use crate::error::ApiError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Payload of `POST /chats/messages`.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub conversation_id: ConversationId,
    pub text: String,
    pub attachment: Option<Attachment>,
}

/// The REST endpoints the messaging core consumes.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn conversations(&self) -> Result<Vec<Conversation>, ApiError>;

    async fn conversation(&self, id: &ConversationId) -> Result<Conversation, ApiError>;

    async fn messages(&self, id: &ConversationId) -> Result<Vec<Message>, ApiError>;

    async fn send_message(&self, outgoing: &OutgoingMessage) -> Result<Message, ApiError>;

    async fn delete_conversation(&self, id: &ConversationId) -> Result<(), ApiError>;

    async fn mark_read(&self, id: &ConversationId) -> Result<(), ApiError>;
}

pub struct ApiClient {
    http: HttpClient,
    base: Url,
    credential: Credential,
}

impl ApiClient {
    pub fn new(base_url: &str, credential: Credential) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, credential, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: &str,
        credential: Credential,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = HttpClient::builder().timeout(timeout).build()?;
        let base = Url::parse(&crate::utils::normalize_url(base_url))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::BaseUrl(base_url.to_string()));
        }
        Ok(Self { http, base, credential })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::BaseUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn with_auth(&self, req: RequestBuilder) -> RequestBuilder {
        req.header(AUTHORIZATION, self.credential.bearer())
    }

    async fn execute(&self, req: RequestBuilder) -> Result<Response, ApiError> {
        let resp = self.with_auth(req).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        debug!("HTTP {status} from server: {body}");
        Err(ApiError::Status { status: status.as_u16(), message: error_message(&body) })
    }
}

/// Prefers the `message` field of a JSON error body over the raw text.
fn error_message(body: &str) -> Option<String> {
    if body.trim().is_empty() {
        return None;
    }
    let from_json = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| json.get("message").and_then(|m| m.as_str()).map(str::to_string));
    Some(from_json.unwrap_or_else(|| body.trim().to_string()))
}

#[async_trait]
impl ChatApi for ApiClient {
    async fn conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        let url = self.endpoint(&["chats", "conversations"])?;
        let envelope: ConversationsEnvelope = self.execute(self.http.get(url)).await?.json().await?;
        Ok(envelope.conversations)
    }

    async fn conversation(&self, id: &ConversationId) -> Result<Conversation, ApiError> {
        let url = self.endpoint(&["chats", "conversations", id.as_str()])?;
        Ok(self.execute(self.http.get(url)).await?.json().await?)
    }

    async fn messages(&self, id: &ConversationId) -> Result<Vec<Message>, ApiError> {
        let url = self.endpoint(&["chats", "conversations", id.as_str(), "messages"])?;
        let envelope: MessagesEnvelope = self.execute(self.http.get(url)).await?.json().await?;
        Ok(envelope.messages)
    }

    async fn send_message(&self, outgoing: &OutgoingMessage) -> Result<Message, ApiError> {
        let url = self.endpoint(&["chats", "messages"])?;
        let mut form = Form::new()
            .text("conversationId", outgoing.conversation_id.to_string())
            .text("text", outgoing.text.clone());
        if let Some(attachment) = &outgoing.attachment {
            let part = Part::bytes(attachment.bytes.clone())
                .file_name(attachment.file_name.clone())
                .mime_str(&attachment.mime_type)?;
            form = form.part("media", part);
        }
        Ok(self.execute(self.http.post(url).multipart(form)).await?.json().await?)
    }

    async fn delete_conversation(&self, id: &ConversationId) -> Result<(), ApiError> {
        let url = self.endpoint(&["chats", id.as_str()])?;
        self.execute(self.http.delete(url)).await?;
        Ok(())
    }

    async fn mark_read(&self, id: &ConversationId) -> Result<(), ApiError> {
        let url = self.endpoint(&["chats", "conversations", id.as_str(), "read"])?;
        self.execute(self.http.post(url)).await?;
        Ok(())
    }
}
