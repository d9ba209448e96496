//! Host Collaborators
//!
//! What the orchestrator needs from the mail client, as async traits. The
//! mail client integration implements these; tests use in-memory fakes.

use async_trait::async_trait;
use mailprompt_core::{PromptTemplate, TabKind};

use crate::models::settings::ReplyType;
use crate::utils::error::AppResult;

/// Read access to the tab a prompt was started from.
#[async_trait]
pub trait MailHost: Send + Sync {
    /// Kind of tab `tab_id` is.
    async fn tab_kind(&self, tab_id: u64) -> AppResult<TabKind>;

    /// Text currently selected in the tab. Empty when nothing is selected.
    async fn selected_text(&self, tab_id: u64) -> AppResult<String>;

    /// Body of the mail displayed or composed in the tab, as plain text.
    async fn mail_body(&self, tab_id: u64) -> AppResult<String>;

    async fn mail_subject(&self, tab_id: u64) -> AppResult<String>;

    /// Signature of the identity the mail belongs to, if it has one.
    async fn signature(&self, tab_id: u64) -> AppResult<Option<String>>;

    /// Id of the mail displayed in the tab, if any.
    async fn message_id(&self, tab_id: u64) -> AppResult<Option<u64>>;
}

/// Write access to compose windows.
#[async_trait]
pub trait ComposeHost: Send + Sync {
    /// Begin a reply to `message_id` and put `body` in it.
    async fn reply(&self, message_id: u64, reply_type: ReplyType, body: &str) -> AppResult<()>;

    /// Replace the selection in the compose window `tab_id` with `text`.
    async fn replace_selection(&self, tab_id: u64, text: &str) -> AppResult<()>;
}

/// Asks the user for free text before a prompt is sent.
#[async_trait]
pub trait CustomTextPrompt: Send + Sync {
    /// `None` when the user cancelled.
    async fn ask(&self, prompt: &PromptTemplate) -> AppResult<Option<String>>;
}
