//! The message composer: one pending draft, handed to the open session on
//! submit.

use std::fs;
use std::io;
use std::path::Path;

use log::debug;

use crate::api::models::{ConversationId, Message};
use crate::api::ChatApi;
use crate::api::OutgoingMessage;
use crate::error::ChatError;
use crate::session::ConversationSession;

/// A single file attached to the draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let mime_type = mime_guess::from_path(&file_name).first_or_octet_stream().to_string();
        Self { file_name, mime_type, bytes }
    }

    pub fn from_path(path: &Path) -> io::Result<Self> {
        let bytes = fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        Ok(Self::new(file_name, bytes))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub text: String,
    pub attachment: Option<Attachment>,
}

impl Draft {
    /// Submittable when there is non-blank text or an attachment.
    pub fn is_submittable(&self) -> bool {
        !self.text.trim().is_empty() || self.attachment.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.attachment.is_none()
    }

    pub fn to_outgoing(&self, conversation_id: ConversationId) -> OutgoingMessage {
        OutgoingMessage {
            conversation_id,
            text: self.text.clone(),
            attachment: self.attachment.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Composer {
    draft: Draft,
    /// A failed draft that could not go back because a newer one was
    /// already being written.
    unsent: Option<Draft>,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.draft.text = text.into();
    }

    /// Replaces the current attachment; there is only ever one.
    pub fn attach(&mut self, attachment: Attachment) {
        self.draft.attachment = Some(attachment);
    }

    pub fn clear_attachment(&mut self) {
        self.draft.attachment = None;
    }

    pub fn can_submit(&self) -> bool {
        self.draft.is_submittable()
    }

    /// Takes the draft out for sending, leaving the composer empty.
    /// Returns `None` (and keeps the draft) when there is nothing to send.
    pub fn take(&mut self) -> Option<Draft> {
        if !self.draft.is_submittable() {
            return None;
        }
        Some(std::mem::take(&mut self.draft))
    }

    /// Puts a draft whose send failed back. When the user already started a
    /// new one the failed draft is set aside as unsent and `false` is
    /// returned.
    pub fn restore(&mut self, draft: Draft) -> bool {
        if !self.draft.is_empty() {
            debug!("composer already holds a new draft, keeping the failed one as unsent");
            self.unsent = Some(draft);
            return false;
        }
        self.draft = draft;
        true
    }

    pub fn unsent(&self) -> Option<&Draft> {
        self.unsent.as_ref()
    }

    /// Swaps the unsent draft back in. A non-empty current draft takes its
    /// place as unsent.
    pub fn recover_unsent(&mut self) -> bool {
        let Some(unsent) = self.unsent.take() else {
            return false;
        };
        let current = std::mem::replace(&mut self.draft, unsent);
        if !current.is_empty() {
            self.unsent = Some(current);
        }
        true
    }

    /// Sends the draft through `session`. An empty draft is a no-op
    /// (`Ok(None)`); a failed send puts the draft back.
    pub async fn submit<A>(
        &mut self,
        api: &A,
        session: &mut ConversationSession,
    ) -> Result<Option<Message>, ChatError>
    where
        A: ChatApi + ?Sized,
    {
        let Some(draft) = self.take() else {
            return Ok(None);
        };
        match session.send(api, &draft).await {
            Ok(message) => Ok(Some(message)),
            Err(err) => {
                self.restore(draft);
                Err(err)
            }
        }
    }
}
