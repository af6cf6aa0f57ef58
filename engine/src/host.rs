//! The `Host` trait (§6): the only seam between the engine and a concrete chat
//! client. Object-safe and `async_trait`-based, the way this codebase family
//! defines its other host/runtime boundaries (e.g. `LlmClient`, `ToolSource`).
//! Only a host-adapter binary should ever implement this against a real
//! transport; the engine crate never links against one.

use async_trait::async_trait;

use crate::model::{Message, SessionId};

/// A note delivered back to the host UI without expecting a reply (§4.I).
#[derive(Debug, Clone)]
pub struct NotePrompt {
    pub text: String,
    pub ignored: bool,
    pub no_reply: bool,
}

impl NotePrompt {
    pub fn ignored_note(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ignored: true,
            no_reply: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HostFetchError {
    #[error("host message fetch failed: {0}")]
    Fetch(String),
}

#[derive(Debug, thiserror::Error)]
pub enum HostPromptError {
    #[error("host prompt delivery failed: {0}")]
    Deliver(String),
}

#[async_trait]
pub trait Host: Send + Sync {
    /// `session.messages(id) -> ordered sequence of messages with parts`.
    async fn messages(&self, session_id: &SessionId) -> Result<Vec<Message>, HostFetchError>;

    /// `session.prompt(id, body)`, used for the status notification channel.
    async fn prompt(
        &self,
        session_id: &SessionId,
        body: NotePrompt,
    ) -> Result<(), HostPromptError>;
}
