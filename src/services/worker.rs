//! Chat Worker
//!
//! One background task per open chat window. The window talks to its worker
//! only through two typed channels: [`WorkerCommand`]s in, [`WorkerEvent`]s
//! out. For every prompt the worker emits `messageSent`, zero or more
//! `newToken`, then exactly one terminal event (`tokensDone` or `error`).

use std::collections::VecDeque;
use std::sync::Arc;

use mailprompt_core::streaming::UnifiedStreamEvent;
use mailprompt_core::{PromptAction, UiError};
use mailprompt_llm::{
    ChatMessage, ChatProvider, InitError, LlmError, ProviderConfig, ProviderFactory,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Capacity of the command and event channels
const CHANNEL_CAPACITY: usize = 256;

/// Localized error texts handed to the worker at init time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStrings {
    /// Prefix for failures reported by the remote service
    pub request_failed: String,
    /// Prefix for network failures
    pub connection_interrupted: String,
}

impl Default for ErrorStrings {
    fn default() -> Self {
        Self {
            request_failed: "The request to the model failed".to_string(),
            connection_interrupted: "The connection was interrupted".to_string(),
        }
    }
}

impl ErrorStrings {
    /// Render `err` for display in the chat window.
    pub fn render(&self, err: &LlmError) -> String {
        match err {
            LlmError::Transport { .. } => format!("{}: {}", self.connection_interrupted, err),
            LlmError::Ui(_) | LlmError::Validation(_) => err.to_string(),
            _ => format!("{}: {}", self.request_failed, err),
        }
    }
}

/// A resolved prompt on its way to a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptInvocation {
    /// Unique id of this invocation
    pub id: String,
    /// Fully resolved prompt text
    pub prompt: String,
    pub action: PromptAction,
    /// Tab the prompt was started from
    pub tab_id: u64,
    /// Mail the prompt was started on, when there is one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<u64>,
}

impl PromptInvocation {
    pub fn new(prompt: impl Into<String>, action: PromptAction, tab_id: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            prompt: prompt.into(),
            action,
            tab_id,
            message_id: None,
        }
    }

    pub fn with_message_id(mut self, message_id: Option<u64>) -> Self {
        self.message_id = message_id;
        self
    }
}

/// Payload of the `tokensDone` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptData {
    pub id: String,
    pub action: PromptAction,
    pub tab_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<u64>,
    /// Complete answer text
    pub text: String,
    /// Whether the answer was cut short by a force-completion
    #[serde(default)]
    pub forced: bool,
}

/// Payload of the `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// Id of the failed invocation
    pub id: String,
    /// Localized, user-displayable message
    pub message: String,
    /// Error category (`validation`, `session`, `transport`, `api`, `parse`, `ui`)
    pub category: String,
    /// Network failure, worth offering a retry for
    pub retryable: bool,
    /// The user-facing condition, for UI errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<UiError>,
}

impl ErrorPayload {
    fn from_llm(id: &str, err: &LlmError, strings: &ErrorStrings) -> Self {
        Self {
            id: id.to_string(),
            message: strings.render(err),
            category: err.category().to_string(),
            retryable: err.is_transport(),
            ui: match err {
                LlmError::Ui(ui) => Some(ui.clone()),
                _ => None,
            },
        }
    }
}

/// Window → worker messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum WorkerCommand {
    /// (Re)configure the worker; resets the conversation
    Init {
        config: ProviderConfig,
        i18n_strings: ErrorStrings,
        #[serde(default)]
        max_tokens: u32,
    },
    /// Send one prompt
    Prompt(PromptInvocation),
    /// Stop waiting for the current answer and deliver what is there
    ForceCompletion,
}

/// Worker → window messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum WorkerEvent {
    /// The prompt was accepted and handed to the provider
    MessageSent { id: String },
    /// One incremental piece of the answer (streaming only)
    NewToken { id: String, token: String },
    /// Terminal success
    TokensDone(PromptData),
    /// Terminal failure
    Error(ErrorPayload),
}

impl WorkerEvent {
    /// Whether this event ends a prompt invocation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerEvent::TokensDone(_) | WorkerEvent::Error(_))
    }

    /// Id of the invocation this event belongs to.
    pub fn invocation_id(&self) -> &str {
        match self {
            WorkerEvent::MessageSent { id } | WorkerEvent::NewToken { id, .. } => id,
            WorkerEvent::TokensDone(data) => &data.id,
            WorkerEvent::Error(payload) => &payload.id,
        }
    }
}

/// Window-side ends of a worker's channels.
pub struct WorkerHandle {
    pub commands: mpsc::Sender<WorkerCommand>,
    pub events: mpsc::Receiver<WorkerEvent>,
}

/// Provider state after a successful `init`.
struct Ready {
    provider: Arc<dyn ChatProvider>,
    stream: bool,
    max_tokens: u32,
}

/// Background worker serving one chat window.
pub struct ChatWorker {
    factory: ProviderFactory,
    strings: ErrorStrings,
    ready: Result<Ready, LlmError>,
    history: Vec<ChatMessage>,
    events: mpsc::Sender<WorkerEvent>,
}

impl ChatWorker {
    /// Spawn a worker on the current runtime and return its channels.
    ///
    /// The worker runs until the command sender is dropped.
    pub fn spawn(factory: ProviderFactory) -> WorkerHandle {
        let (command_tx, command_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let worker = Self {
            factory,
            strings: ErrorStrings::default(),
            ready: Err(InitError::NotInitialized.into()),
            history: Vec::new(),
            events: event_tx,
        };
        tokio::spawn(worker.run(command_rx));

        WorkerHandle {
            commands: command_tx,
            events: event_rx,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<WorkerCommand>) {
        tracing::debug!("[ChatWorker] Started");
        let mut pending: VecDeque<WorkerCommand> = VecDeque::new();

        loop {
            let command = match pending.pop_front() {
                Some(command) => command,
                None => match commands.recv().await {
                    Some(command) => command,
                    None => break,
                },
            };

            match command {
                WorkerCommand::Init {
                    config,
                    i18n_strings,
                    max_tokens,
                } => self.init(&config, i18n_strings, max_tokens),
                WorkerCommand::Prompt(invocation) => {
                    if !self.prompt(invocation, &mut commands, &mut pending).await {
                        break;
                    }
                }
                WorkerCommand::ForceCompletion => {
                    tracing::debug!("[ChatWorker] Force completion with no prompt running");
                }
            }
        }

        tracing::debug!("[ChatWorker] Window closed, stopping");
    }

    fn init(&mut self, config: &ProviderConfig, strings: ErrorStrings, max_tokens: u32) {
        self.strings = strings;
        self.history.clear();
        self.ready = self.factory.create(config).map(|provider| Ready {
            provider,
            stream: config.stream(),
            max_tokens,
        });
        match &self.ready {
            Ok(ready) => tracing::info!(
                "[ChatWorker] Initialized {} (stream: {}, max_tokens: {})",
                ready.provider.name(),
                ready.stream,
                ready.max_tokens
            ),
            // Reported as the terminal error of the next prompt
            Err(e) => tracing::warn!("[ChatWorker] Init failed: {}", e),
        }
    }

    async fn emit(&self, event: WorkerEvent) {
        if self.events.send(event).await.is_err() {
            tracing::debug!("[ChatWorker] Event dropped, window is gone");
        }
    }

    /// Run one prompt to its terminal event.
    ///
    /// Returns false when the window went away while the prompt was running.
    async fn prompt(
        &mut self,
        invocation: PromptInvocation,
        commands: &mut mpsc::Receiver<WorkerCommand>,
        pending: &mut VecDeque<WorkerCommand>,
    ) -> bool {
        let (provider, stream, max_tokens) = match &self.ready {
            Ok(ready) => (ready.provider.clone(), ready.stream, ready.max_tokens),
            Err(e) => {
                let payload = ErrorPayload::from_llm(&invocation.id, e, &self.strings);
                self.emit(WorkerEvent::Error(payload)).await;
                return true;
            }
        };

        self.emit(WorkerEvent::MessageSent {
            id: invocation.id.clone(),
        })
        .await;

        let mut messages = self.history.clone();
        messages.push(ChatMessage::user(&invocation.prompt));

        let (stream_tx, mut stream_rx) = mpsc::channel::<UnifiedStreamEvent>(CHANNEL_CAPACITY);
        let call_provider = provider.clone();
        let call_messages = messages.clone();
        let call = async move {
            if stream {
                call_provider
                    .stream_chat(call_messages, max_tokens, stream_tx)
                    .await
            } else {
                drop(stream_tx);
                call_provider.send_chat(call_messages, max_tokens).await
            }
        };
        tokio::pin!(call);

        let mut forced = false;
        let result = loop {
            tokio::select! {
                result = &mut call => break result,
                Some(event) = stream_rx.recv() => self.forward(&invocation.id, event).await,
                command = commands.recv() => match command {
                    Some(WorkerCommand::ForceCompletion) => {
                        tracing::info!("[ChatWorker] Force completion requested");
                        forced = true;
                        provider.force_completion();
                    }
                    Some(other) => pending.push_back(other),
                    None => {
                        tracing::debug!("[ChatWorker] Window closed mid-prompt");
                        return false;
                    }
                },
            }
        };

        // Deltas sent before the call returned are still buffered
        while let Ok(event) = stream_rx.try_recv() {
            self.forward(&invocation.id, event).await;
        }

        match result {
            Ok(response) => {
                self.history = messages;
                self.history.push(ChatMessage::assistant(&response.content));
                self.emit(WorkerEvent::TokensDone(PromptData {
                    id: invocation.id,
                    action: invocation.action,
                    tab_id: invocation.tab_id,
                    message_id: invocation.message_id,
                    text: response.content,
                    forced,
                }))
                .await;
            }
            Err(e) => {
                tracing::error!("[ChatWorker] Prompt {} failed: {}", invocation.id, e);
                let payload = ErrorPayload::from_llm(&invocation.id, &e, &self.strings);
                self.emit(WorkerEvent::Error(payload)).await;
            }
        }
        true
    }

    async fn forward(&self, id: &str, event: UnifiedStreamEvent) {
        match event {
            UnifiedStreamEvent::TextDelta { content } if !content.is_empty() => {
                self.emit(WorkerEvent::NewToken {
                    id: id.to_string(),
                    token: content,
                })
                .await;
            }
            UnifiedStreamEvent::Usage {
                input_tokens,
                output_tokens,
            } => tracing::debug!(
                "[ChatWorker] Usage: {} in, {} out",
                input_tokens,
                output_tokens
            ),
            _ => {}
        }
    }
}
