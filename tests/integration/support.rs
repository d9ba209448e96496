//! In-memory mail client used by the integration tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mailprompt::services::host::{ComposeHost, CustomTextPrompt, MailHost};
use mailprompt::services::windows::ChatWindows;
use mailprompt::{AppResult, PromptOrchestrator, ReplyType, Settings};
use mailprompt_core::{PromptTemplate, TabKind};
use mailprompt_llm::ProviderFactory;

#[derive(Default, Clone)]
pub struct FakeMail {
    pub kind: Option<TabKind>,
    pub selected: String,
    pub body: String,
    pub subject: String,
    pub signature: Option<String>,
    pub message_id: Option<u64>,
}

#[async_trait]
impl MailHost for FakeMail {
    async fn tab_kind(&self, _tab_id: u64) -> AppResult<TabKind> {
        Ok(self.kind.unwrap_or(TabKind::Reading))
    }

    async fn selected_text(&self, _tab_id: u64) -> AppResult<String> {
        Ok(self.selected.clone())
    }

    async fn mail_body(&self, _tab_id: u64) -> AppResult<String> {
        Ok(self.body.clone())
    }

    async fn mail_subject(&self, _tab_id: u64) -> AppResult<String> {
        Ok(self.subject.clone())
    }

    async fn signature(&self, _tab_id: u64) -> AppResult<Option<String>> {
        Ok(self.signature.clone())
    }

    async fn message_id(&self, _tab_id: u64) -> AppResult<Option<u64>> {
        Ok(self.message_id)
    }
}

/// Records everything handed to the compose window.
#[derive(Default)]
pub struct RecordingCompose {
    pub replies: Mutex<Vec<(u64, ReplyType, String)>>,
    pub replaced: Mutex<Vec<(u64, String)>>,
}

#[async_trait]
impl ComposeHost for RecordingCompose {
    async fn reply(&self, message_id: u64, reply_type: ReplyType, body: &str) -> AppResult<()> {
        self.replies
            .lock()
            .unwrap()
            .push((message_id, reply_type, body.to_string()));
        Ok(())
    }

    async fn replace_selection(&self, tab_id: u64, text: &str) -> AppResult<()> {
        self.replaced.lock().unwrap().push((tab_id, text.to_string()));
        Ok(())
    }
}

pub struct NoCustomText;

#[async_trait]
impl CustomTextPrompt for NoCustomText {
    async fn ask(&self, _prompt: &PromptTemplate) -> AppResult<Option<String>> {
        Ok(None)
    }
}

/// Settings pointing at an OpenAI-compatible server.
pub fn compat_settings(host: &str, stream: bool) -> Settings {
    Settings {
        connection_type: "openai_comp_api".to_string(),
        openai_comp_host: host.to_string(),
        openai_comp_model: "local-model".to_string(),
        openai_comp_use_v1: true,
        streaming: stream,
        ..Default::default()
    }
}

pub fn orchestrator(settings: Settings, mail: FakeMail) -> (PromptOrchestrator, Arc<RecordingCompose>) {
    let compose = Arc::new(RecordingCompose::default());
    let orchestrator = PromptOrchestrator::new(
        settings,
        Arc::new(ChatWindows::new(ProviderFactory::new())),
        Arc::new(mail),
        compose.clone(),
        Arc::new(NoCustomText),
    );
    (orchestrator, compose)
}
