//! Web Chat Provider
//!
//! Drives a provider's chat web page instead of an HTTP API. The page is
//! reached through a [`PageDriver`] supplied by the host; this module owns
//! the sequence (login check, input, send button, completion detection).
//!
//! There is no response schema on this path. Completion is detected by
//! polling the page every 100 ms until the regenerate control comes back,
//! the user forces completion, or the configured ceiling passes. All three
//! end the same way: whatever answer text is on the page is delivered.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use mailprompt_core::streaming::UnifiedStreamEvent;
use mailprompt_core::UiError;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::provider::ChatProvider;
use crate::types::{ChatMessage, ChatResponse, ChatRole, LlmResult};

/// State of the page's send button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendButton {
    Missing,
    Disabled,
    Ready,
}

/// Access to the live chat page.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// False when the page shows its login screen.
    async fn is_logged_in(&self) -> bool;

    /// Whether the chat input box is present.
    async fn has_input(&self) -> bool;

    /// Replace the content of the chat input box.
    async fn set_input(&self, text: &str) -> Result<(), UiError>;

    async fn send_button(&self) -> SendButton;

    async fn click_send(&self) -> Result<(), UiError>;

    /// Whether the "regenerate" control is shown, meaning the page is idle.
    async fn has_regenerate_button(&self) -> bool;

    /// Text of the most recent answer on the page.
    async fn last_answer(&self) -> Option<String>;
}

/// Timing of the page interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebPollOptions {
    /// Completion polling interval
    pub poll_interval: Duration,
    /// Interval while waiting for the send button to become enabled
    pub send_wait_interval: Duration,
    /// Give up waiting after this long; `None` waits indefinitely
    pub ceiling: Option<Duration>,
}

impl Default for WebPollOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            send_wait_interval: Duration::from_millis(25),
            ceiling: Some(Duration::from_secs(300)),
        }
    }
}

/// How the wait for an answer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The regenerate control came back
    Detected,
    /// The user stopped the wait
    Forced,
    /// The ceiling passed
    TimedOut,
}

/// Handle that stops the current wait for an answer.
///
/// Each request arms a fresh token, so a trigger only affects the wait in
/// progress. A trigger with no wait running is dropped when the next request
/// arms its token.
#[derive(Debug, Clone, Default)]
pub struct ForceCompletion {
    current: Arc<Mutex<CancellationToken>>,
}

impl ForceCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    fn arm(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();
        token
    }

    pub fn trigger(&self) {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }
}

/// Chat provider that automates a web page.
pub struct WebChatProvider {
    page: Arc<dyn PageDriver>,
    options: WebPollOptions,
    stream: bool,
    force: ForceCompletion,
}

impl WebChatProvider {
    pub fn new(page: Arc<dyn PageDriver>, options: WebPollOptions, stream: bool) -> Self {
        Self {
            page,
            options,
            stream,
            force: ForceCompletion::new(),
        }
    }

    /// Handle for stopping the wait from elsewhere (e.g. a UI button).
    pub fn force_handle(&self) -> ForceCompletion {
        self.force.clone()
    }

    /// Type `prompt` into the page, send it and wait for the answer.
    ///
    /// With `tx`, answer text is forwarded as it grows on the page.
    pub async fn run(
        &self,
        prompt: &str,
        tx: Option<&mpsc::Sender<UnifiedStreamEvent>>,
    ) -> LlmResult<(ChatResponse, Completion)> {
        let mut tx = tx;
        let force = self.force.arm();
        let deadline = self.options.ceiling.map(|c| Instant::now() + c);

        if !self.page.is_logged_in().await {
            tracing::warn!("[WebChat] Page shows the login screen");
            return Err(UiError::NotLoggedIn.into());
        }
        if !self.page.has_input().await {
            tracing::error!("[WebChat] Chat input not found");
            return Err(UiError::InputNotFound.into());
        }

        let previous = self.page.last_answer().await;
        self.page.set_input(prompt).await?;
        self.wait_for_send_button(deadline).await?;
        self.page.click_send().await?;
        tracing::debug!("[WebChat] Prompt sent ({} chars)", prompt.chars().count());

        let mut streamed = 0usize;
        let mut saw_busy = false;
        let completion = loop {
            let idle = self.page.has_regenerate_button().await;
            let answer = self.page.last_answer().await;
            saw_busy |= !idle;

            if let (Some(sender), Some(text)) = (tx, answer.as_deref()) {
                match forward_growth(text, streamed, sender).await {
                    Some(count) => streamed = count,
                    None => tx = None,
                }
            }

            if idle && (saw_busy || answer != previous) {
                break Completion::Detected;
            }
            if force.is_cancelled() {
                break Completion::Forced;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break Completion::TimedOut;
            }

            tokio::select! {
                _ = sleep(self.options.poll_interval) => {}
                _ = force.cancelled() => {}
            }
        };

        let content = self.page.last_answer().await.unwrap_or_default();
        if let Some(tx) = tx {
            forward_growth(&content, streamed, tx).await;
        }

        match completion {
            Completion::Detected => tracing::debug!("[WebChat] Answer complete"),
            Completion::Forced => tracing::info!("[WebChat] Completion forced by user"),
            Completion::TimedOut => tracing::warn!(
                "[WebChat] No completion after {:?}, delivering partial answer",
                self.options.ceiling
            ),
        }

        Ok((ChatResponse::text(content), completion))
    }

    async fn wait_for_send_button(&self, deadline: Option<Instant>) -> LlmResult<()> {
        loop {
            match self.page.send_button().await {
                SendButton::Ready => return Ok(()),
                SendButton::Missing => {
                    tracing::error!("[WebChat] Send button not found");
                    return Err(UiError::SendButtonNotFound.into());
                }
                SendButton::Disabled => {
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        tracing::error!("[WebChat] Send button never became enabled");
                        return Err(UiError::SendButtonNotFound.into());
                    }
                    sleep(self.options.send_wait_interval).await;
                }
            }
        }
    }
}

/// Send the part of `text` beyond the first `sent` bytes; returns the new
/// count, or `None` once the receiver is gone.
async fn forward_growth(
    text: &str,
    sent: usize,
    tx: &mpsc::Sender<UnifiedStreamEvent>,
) -> Option<usize> {
    match text.get(sent..) {
        Some(rest) if !rest.is_empty() => {
            if tx.send(UnifiedStreamEvent::text(rest)).await.is_err() {
                tracing::debug!("[WebChat] Receiver gone, no longer forwarding the answer");
                return None;
            }
            Some(text.len())
        }
        Some(_) => Some(sent),
        // The page rewrote earlier text; keep the count and wait for growth.
        None => Some(sent),
    }
}

fn last_user_prompt(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == ChatRole::User)
        .map(|m| m.content.clone())
        .unwrap_or_default()
}

#[async_trait]
impl ChatProvider for WebChatProvider {
    fn name(&self) -> &'static str {
        "chatgpt_web"
    }

    fn model(&self) -> &str {
        ""
    }

    async fn send_chat(
        &self,
        messages: Vec<ChatMessage>,
        _max_tokens: u32,
    ) -> LlmResult<ChatResponse> {
        let (response, _) = self.run(&last_user_prompt(&messages), None).await?;
        Ok(response)
    }

    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: u32,
        tx: mpsc::Sender<UnifiedStreamEvent>,
    ) -> LlmResult<ChatResponse> {
        if !self.stream {
            let response = self.send_chat(messages, max_tokens).await?;
            if !response.content.is_empty()
                && tx.send(UnifiedStreamEvent::text(&response.content)).await.is_err()
            {
                tracing::debug!("[WebChat] Receiver gone before the answer was sent");
            }
            return Ok(response);
        }
        let (response, _) = self.run(&last_user_prompt(&messages), Some(&tx)).await?;
        Ok(response)
    }

    fn force_completion(&self) {
        self.force.trigger();
    }
}
