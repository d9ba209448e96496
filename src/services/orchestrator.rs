//! Prompt Orchestrator
//!
//! Turns a menu or launcher invocation into a resolved prompt, sends it
//! through the chat window of the active connection type and hands the
//! answer to the compose collaborator.
//!
//! Everything the user has to fix (no selection, a prompt that is too long,
//! a blank provider field) is rejected here, before a worker sees anything.

use std::sync::Arc;

use mailprompt_core::placeholders::{
    ADDITIONAL_TEXT, MAIL_SIGNATURE, MAIL_SUBJECT, MAIL_TEXT, SELECTED_TEXT,
};
use mailprompt_core::prompts::select_by_shortcut;
use mailprompt_core::{
    filter_prompts_for_tab, has_placeholder, replace_placeholders, search_prompts, PromptAction,
    PromptMatch, PromptTemplate, SubstitutionMap, UiError,
};
use mailprompt_llm::LlmError;
use serde::{Deserialize, Serialize};

use super::host::{ComposeHost, CustomTextPrompt, MailHost};
use super::windows::ChatWindows;
use super::worker::{ErrorStrings, PromptInvocation, WorkerEvent};
use crate::models::settings::{Settings, MAX_PROMPT_CHARS};
use crate::utils::error::{AppError, AppResult};

/// A prompt invocation from a menu or the launcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptCommand {
    pub prompt_id: String,
    pub tab_id: u64,
}

/// What happened with the answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PromptOutcome {
    /// A reply was started with the answer as its body
    Replied { text: String },
    /// The selection in the compose window was replaced
    Replaced { text: String },
    /// The answer is only shown to the user
    Shown { text: String },
    /// The user dismissed the custom text request
    Cancelled,
}

/// A template with every placeholder resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrompt {
    pub text: String,
    pub action: PromptAction,
    pub message_id: Option<u64>,
}

pub struct PromptOrchestrator {
    settings: Settings,
    strings: ErrorStrings,
    windows: Arc<ChatWindows>,
    mail: Arc<dyn MailHost>,
    compose: Arc<dyn ComposeHost>,
    custom_text: Arc<dyn CustomTextPrompt>,
}

impl PromptOrchestrator {
    pub fn new(
        settings: Settings,
        windows: Arc<ChatWindows>,
        mail: Arc<dyn MailHost>,
        compose: Arc<dyn ComposeHost>,
        custom_text: Arc<dyn CustomTextPrompt>,
    ) -> Self {
        Self {
            settings,
            strings: ErrorStrings::default(),
            windows,
            mail,
            compose,
            custom_text,
        }
    }

    /// Localized error texts passed to workers.
    pub fn with_error_strings(mut self, strings: ErrorStrings) -> Self {
        self.strings = strings;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Use new settings for the next invocation.
    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    /// Prompts offered in the tab `tab_id`.
    pub async fn available_prompts(&self, tab_id: u64) -> AppResult<Vec<PromptTemplate>> {
        let kind = self.mail.tab_kind(tab_id).await?;
        Ok(filter_prompts_for_tab(&self.settings.prompts(), kind))
    }

    /// Launcher search over the prompts offered in `tab_id`.
    pub async fn search(&self, tab_id: u64, query: &str) -> AppResult<Vec<PromptMatch>> {
        let prompts = self.available_prompts(tab_id).await?;
        Ok(search_prompts(&prompts, query))
    }

    /// Id of the launcher entry with shortcut `key` for `query`.
    pub async fn pick(&self, tab_id: u64, query: &str, key: char) -> AppResult<Option<String>> {
        let matches = self.search(tab_id, query).await?;
        Ok(select_by_shortcut(&matches, key).map(|m| m.id.clone()))
    }

    fn find_prompt(&self, prompt_id: &str) -> AppResult<PromptTemplate> {
        self.settings
            .prompts()
            .into_iter()
            .find(|p| p.id == prompt_id)
            .ok_or_else(|| {
                UiError::UnknownPrompt {
                    id: prompt_id.to_string(),
                }
                .into()
            })
    }

    /// Resolve `template` against the tab `tab_id`.
    ///
    /// Returns `None` when the user cancelled the custom text request.
    pub async fn build_prompt(
        &self,
        template: &PromptTemplate,
        tab_id: u64,
    ) -> AppResult<Option<ResolvedPrompt>> {
        let selected = self.mail.selected_text(tab_id).await?;
        if template.need_selected && selected.trim().is_empty() {
            tracing::info!(
                "[PromptOrchestrator] {} needs a selection, nothing selected in tab {}",
                template.id,
                tab_id
            );
            return Err(UiError::NoSelection.into());
        }

        let custom = if template.need_custom_text {
            match self.custom_text.ask(template).await? {
                Some(text) => Some(text),
                None => {
                    tracing::debug!("[PromptOrchestrator] Custom text cancelled");
                    return Ok(None);
                }
            }
        } else {
            None
        };

        let body = self.mail.mail_body(tab_id).await?;
        let subject = self.mail.mail_subject(tab_id).await?;
        let signature = if template.need_signature {
            self.mail
                .signature(tab_id)
                .await?
                .filter(|s| !s.trim().is_empty())
        } else {
            None
        };

        let mut substitutions = SubstitutionMap::new();
        substitutions.insert(MAIL_TEXT.to_string(), body.clone());
        substitutions.insert(SELECTED_TEXT.to_string(), selected.clone());
        substitutions.insert(MAIL_SUBJECT.to_string(), subject);
        if let Some(custom) = &custom {
            substitutions.insert(ADDITIONAL_TEXT.to_string(), custom.clone());
        }
        if let Some(signature) = &signature {
            substitutions.insert(MAIL_SIGNATURE.to_string(), signature.clone());
        }

        let mut text = replace_placeholders(
            &template.text,
            &substitutions,
            self.settings.placeholders_use_default_value,
        );

        // Templates that do not place the mail themselves get it quoted at the end
        if !has_placeholder(&template.text, MAIL_TEXT)
            && !has_placeholder(&template.text, SELECTED_TEXT)
        {
            let content = if template.need_selected { &selected } else { &body };
            text.push_str(" \"");
            text.push_str(content);
            text.push('"');
        }

        if let Some(custom) = &custom {
            if !has_placeholder(&template.text, ADDITIONAL_TEXT) {
                text.push(' ');
                text.push_str(custom);
            }
        }

        if let Some(signature) = &signature {
            if !has_placeholder(&template.text, MAIL_SIGNATURE) {
                text.push_str(" Use the following signature: \"");
                text.push_str(signature);
                text.push('"');
            }
        }

        let message_id = self.mail.message_id(tab_id).await?;
        Ok(Some(ResolvedPrompt {
            text,
            action: template.action,
            message_id,
        }))
    }

    /// Run a prompt and act on its answer.
    pub async fn run(&self, command: PromptCommand) -> AppResult<PromptOutcome> {
        self.run_streaming(command, |_| {}).await
    }

    /// Like [`run`](Self::run), passing every streamed token to `on_token`.
    pub async fn run_streaming<F>(
        &self,
        command: PromptCommand,
        mut on_token: F,
    ) -> AppResult<PromptOutcome>
    where
        F: FnMut(&str),
    {
        let template = self.find_prompt(&command.prompt_id)?;
        tracing::info!(
            "[PromptOrchestrator] Running {} from tab {}",
            template.id,
            command.tab_id
        );

        let resolved = match self.build_prompt(&template, command.tab_id).await? {
            Some(resolved) => resolved,
            None => return Ok(PromptOutcome::Cancelled),
        };

        let length = resolved.text.chars().count();
        tracing::debug!("[PromptOrchestrator] Prompt length: {}", length);
        if length > MAX_PROMPT_CHARS {
            tracing::warn!(
                "[PromptOrchestrator] Prompt too long: {} > {}",
                length,
                MAX_PROMPT_CHARS
            );
            return Err(UiError::PromptTooLong {
                length,
                max: MAX_PROMPT_CHARS,
            }
            .into());
        }

        let config = self
            .settings
            .active_provider_config()
            .map_err(AppError::config)?;
        if let Err(e) = config.validate() {
            tracing::warn!("[PromptOrchestrator] {} config rejected: {}", config.kind(), e);
            return Err(LlmError::from(e).into());
        }

        let window = self
            .windows
            .open(&config, &self.strings, self.settings.max_tokens)
            .await?;
        let invocation = PromptInvocation::new(resolved.text, resolved.action, command.tab_id)
            .with_message_id(resolved.message_id);

        let data = window
            .run_prompt(invocation, |event| {
                if let WorkerEvent::NewToken { token, .. } = event {
                    on_token(token);
                }
            })
            .await?;

        self.apply(resolved.action, command.tab_id, resolved.message_id, data.text)
            .await
    }

    async fn apply(
        &self,
        action: PromptAction,
        tab_id: u64,
        message_id: Option<u64>,
        text: String,
    ) -> AppResult<PromptOutcome> {
        match action {
            PromptAction::Reply => {
                let message_id =
                    message_id.ok_or_else(|| AppError::not_found("mail to reply to"))?;
                self.compose
                    .reply(message_id, self.settings.reply_type, &text)
                    .await?;
                tracing::info!("[PromptOrchestrator] Reply started for mail {}", message_id);
                Ok(PromptOutcome::Replied { text })
            }
            PromptAction::ReplaceText => {
                self.compose.replace_selection(tab_id, &text).await?;
                Ok(PromptOutcome::Replaced { text })
            }
            PromptAction::Close => Ok(PromptOutcome::Shown { text }),
        }
    }

    /// Stop waiting for the answer in the active connection type's window.
    ///
    /// Returns false when no window is open.
    pub async fn force_completion(&self) -> AppResult<bool> {
        match self.windows.get(&self.settings.connection_type).await {
            Some(window) => {
                window.force_completion().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::settings::ReplyType;
    use async_trait::async_trait;
    use httpmock::prelude::*;
    use mailprompt_core::{PromptType, TabKind};
    use mailprompt_llm::{InitError, ProviderFactory};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeMail {
        kind: Option<TabKind>,
        selected: String,
        body: String,
        subject: String,
        signature: Option<String>,
        message_id: Option<u64>,
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

    #[derive(Default)]
    struct FakeCompose {
        replies: Mutex<Vec<(u64, ReplyType, String)>>,
        replaced: Mutex<Vec<(u64, String)>>,
    }

    #[async_trait]
    impl ComposeHost for FakeCompose {
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

    struct FixedText(Option<&'static str>);

    #[async_trait]
    impl CustomTextPrompt for FixedText {
        async fn ask(&self, _prompt: &PromptTemplate) -> AppResult<Option<String>> {
            Ok(self.0.map(str::to_string))
        }
    }

    fn template(text: &str, action: PromptAction, need_selected: bool) -> PromptTemplate {
        PromptTemplate {
            id: "prompt_test".to_string(),
            name: "Test".to_string(),
            text: text.to_string(),
            prompt_type: PromptType::AlwaysShow,
            action,
            need_selected,
            need_signature: false,
            need_custom_text: false,
        }
    }

    fn compat_settings(host: &str, custom: Vec<PromptTemplate>) -> Settings {
        Settings {
            connection_type: "openai_comp_api".to_string(),
            openai_comp_host: host.to_string(),
            openai_comp_model: "local".to_string(),
            streaming: false,
            custom_prompts: custom,
            ..Default::default()
        }
    }

    fn orchestrator(
        settings: Settings,
        mail: FakeMail,
        custom: FixedText,
    ) -> (PromptOrchestrator, Arc<FakeCompose>) {
        let compose = Arc::new(FakeCompose::default());
        let orchestrator = PromptOrchestrator::new(
            settings,
            Arc::new(ChatWindows::new(ProviderFactory::new())),
            Arc::new(mail),
            compose.clone(),
            Arc::new(custom),
        );
        (orchestrator, compose)
    }

    #[tokio::test]
    async fn test_builtin_prompt_quotes_the_body() {
        let mail = FakeMail {
            body: "Can we meet on Friday?".to_string(),
            ..Default::default()
        };
        let (orch, _) = orchestrator(Settings::default(), mail, FixedText(None));

        let summarize = orch.find_prompt("prompt_summarize_this").unwrap();
        let resolved = orch.build_prompt(&summarize, 1).await.unwrap().unwrap();
        assert_eq!(
            resolved.text,
            "Summarize the following email into a bullet point list. \"Can we meet on Friday?\""
        );
        assert_eq!(resolved.action, PromptAction::Close);
    }

    #[tokio::test]
    async fn test_translate_asks_for_the_language() {
        let mail = FakeMail {
            body: "Ciao a tutti".to_string(),
            ..Default::default()
        };
        let (orch, _) = orchestrator(Settings::default(), mail, FixedText(Some("English")));

        let translate = orch.find_prompt("prompt_translate_this").unwrap();
        let resolved = orch.build_prompt(&translate, 1).await.unwrap().unwrap();
        assert_eq!(
            resolved.text,
            "Translate the following email in English: \"Ciao a tutti\""
        );
    }

    #[tokio::test]
    async fn test_selection_placeholder_is_not_quoted_again() {
        let mail = FakeMail {
            selected: "Hello".to_string(),
            body: "Hello and more".to_string(),
            ..Default::default()
        };
        let (orch, _) = orchestrator(Settings::default(), mail, FixedText(None));

        let t = template("Reply to: {%selected_text%}", PromptAction::Reply, true);
        let resolved = orch.build_prompt(&t, 1).await.unwrap().unwrap();
        assert_eq!(resolved.text, "Reply to: Hello");
    }

    #[tokio::test]
    async fn test_custom_text_and_signature() {
        let mail = FakeMail {
            body: "Hi Bob".to_string(),
            signature: Some("-- Alice".to_string()),
            ..Default::default()
        };
        let (orch, _) = orchestrator(Settings::default(), mail, FixedText(Some("German")));

        let mut t = template("Translate this in {%additional_text%}:", PromptAction::Close, false);
        t.need_custom_text = true;
        let resolved = orch.build_prompt(&t, 1).await.unwrap().unwrap();
        assert_eq!(resolved.text, "Translate this in German: \"Hi Bob\"");

        let mut t = template("Reply to {%mail_text%}.", PromptAction::Reply, false);
        t.need_custom_text = true;
        t.need_signature = true;
        let resolved = orch.build_prompt(&t, 1).await.unwrap().unwrap();
        assert_eq!(
            resolved.text,
            "Reply to Hi Bob. German Use the following signature: \"-- Alice\""
        );

        let t = template("Sign as {%mail_signature%}", PromptAction::Close, false);
        let resolved = orch.build_prompt(&t, 1).await.unwrap().unwrap();
        // need_signature is off: the placeholder is left as written
        assert_eq!(resolved.text, "Sign as {%mail_signature%} \"Hi Bob\"");
    }

    #[tokio::test]
    async fn test_cancelled_custom_text() {
        let server = MockServer::start();
        let chat = server.mock(|when, then| {
            when.method(POST);
            then.status(200);
        });

        let mut t = template("Ask: {%additional_text%}", PromptAction::Close, false);
        t.need_custom_text = true;
        let settings = compat_settings(&server.base_url(), vec![t]);
        let (orch, _) = orchestrator(settings, FakeMail::default(), FixedText(None));

        let outcome = orch
            .run(PromptCommand {
                prompt_id: "prompt_test".to_string(),
                tab_id: 1,
            })
            .await
            .unwrap();
        assert_eq!(outcome, PromptOutcome::Cancelled);
        chat.assert_hits(0);
    }

    #[tokio::test]
    async fn test_no_selection_makes_no_call() {
        let server = MockServer::start();
        let chat = server.mock(|when, then| {
            when.method(POST);
            then.status(200);
        });

        let settings = compat_settings(&server.base_url(), Vec::new());
        let mail = FakeMail {
            selected: "  ".to_string(),
            body: "body".to_string(),
            ..Default::default()
        };
        let (orch, _) = orchestrator(settings, mail, FixedText(None));

        let err = orch
            .run(PromptCommand {
                prompt_id: "prompt_rewrite_polite".to_string(),
                tab_id: 3,
            })
            .await
            .unwrap_err();
        assert_eq!(err.ui(), Some(&UiError::NoSelection));
        chat.assert_hits(0);
    }

    #[tokio::test]
    async fn test_unknown_prompt() {
        let (orch, _) = orchestrator(Settings::default(), FakeMail::default(), FixedText(None));
        let err = orch
            .run(PromptCommand {
                prompt_id: "nope".to_string(),
                tab_id: 1,
            })
            .await
            .unwrap_err();
        assert!(matches!(err.ui(), Some(UiError::UnknownPrompt { id }) if id == "nope"));
    }

    #[tokio::test]
    async fn test_blank_model_rejected_before_dispatch() {
        let server = MockServer::start();
        let chat = server.mock(|when, then| {
            when.method(POST);
            then.status(200);
        });

        let mut settings = compat_settings(&server.base_url(), Vec::new());
        settings.openai_comp_model = String::new();
        let mail = FakeMail {
            body: "body".to_string(),
            ..Default::default()
        };
        let (orch, _) = orchestrator(settings, mail, FixedText(None));

        let err = orch
            .run(PromptCommand {
                prompt_id: "prompt_classify".to_string(),
                tab_id: 1,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Llm(LlmError::Validation(InitError::EmptyModel))
        ));
        chat.assert_hits(0);
    }

    #[tokio::test]
    async fn test_replace_text_action() {
        let server = MockServer::start();
        let chat = server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200)
                .json_body(json!({"choices": [{"message": {"content": "Dear Sir,"}}]}));
        });

        let settings = compat_settings(&server.base_url(), Vec::new());
        let mail = FakeMail {
            kind: Some(TabKind::Composing),
            selected: "hey".to_string(),
            body: "hey there".to_string(),
            ..Default::default()
        };
        let (orch, compose) = orchestrator(settings, mail, FixedText(None));

        let outcome = orch
            .run(PromptCommand {
                prompt_id: "prompt_rewrite_formal".to_string(),
                tab_id: 5,
            })
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PromptOutcome::Replaced {
                text: "Dear Sir,".to_string()
            }
        );
        chat.assert();
        assert_eq!(
            compose.replaced.lock().unwrap().as_slice(),
            &[(5, "Dear Sir,".to_string())]
        );
    }

    #[tokio::test]
    async fn test_reply_without_mail_is_not_found() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST);
            then.status(200)
                .json_body(json!({"choices": [{"message": {"content": "Thanks!"}}]}));
        });

        let settings = compat_settings(&server.base_url(), Vec::new());
        let mail = FakeMail {
            body: "body".to_string(),
            message_id: None,
            ..Default::default()
        };
        let (orch, compose) = orchestrator(settings, mail, FixedText(None));

        let err = orch
            .run(PromptCommand {
                prompt_id: "prompt_reply".to_string(),
                tab_id: 1,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(compose.replies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_launcher_filters_by_tab() {
        let mail = FakeMail {
            kind: Some(TabKind::Composing),
            ..Default::default()
        };
        let (orch, _) = orchestrator(Settings::default(), mail, FixedText(None));

        let ids: Vec<String> = orch
            .available_prompts(1)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert!(!ids.contains(&"prompt_reply".to_string()));
        assert!(ids.contains(&"prompt_rewrite_polite".to_string()));

        let matches = orch.search(1, "rewrite").await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(
            orch.pick(1, "rewrite", '2').await.unwrap().as_deref(),
            Some("prompt_rewrite_formal")
        );
        assert_eq!(orch.pick(1, "rewrite", '3').await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_force_completion_without_window() {
        let (orch, _) = orchestrator(Settings::default(), FakeMail::default(), FixedText(None));
        assert!(!orch.force_completion().await.unwrap());
    }
}
