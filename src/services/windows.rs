//! Chat Windows
//!
//! Registry of open chat windows, one per connection type. Each window owns
//! the channels of its own [`ChatWorker`]; closing the window drops them,
//! which stops the worker.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mailprompt_llm::{ProviderConfig, ProviderFactory};
use tokio::sync::{mpsc, Mutex, RwLock};

use super::worker::{
    ChatWorker, ErrorPayload, ErrorStrings, PromptData, PromptInvocation, WorkerCommand,
    WorkerEvent,
};
use crate::utils::error::{AppError, AppResult};

/// Init parameters last sent to a window's worker.
#[derive(Debug, Clone, PartialEq)]
struct InitParams {
    config: ProviderConfig,
    strings: ErrorStrings,
    max_tokens: u32,
}

/// An open chat window and its worker.
pub struct ChatWindow {
    id: String,
    kind: &'static str,
    opened_at: DateTime<Utc>,
    commands: mpsc::Sender<WorkerCommand>,
    /// Held for a whole invocation, so prompts in one window never interleave
    events: Mutex<mpsc::Receiver<WorkerEvent>>,
    init: Mutex<Option<InitParams>>,
}

impl ChatWindow {
    fn spawn(factory: ProviderFactory, kind: &'static str) -> Self {
        let handle = ChatWorker::spawn(factory);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            opened_at: Utc::now(),
            commands: handle.commands,
            events: Mutex::new(handle.events),
            init: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Connection type this window talks to
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Whether the worker is still running
    pub fn is_open(&self) -> bool {
        !self.commands.is_closed()
    }

    async fn send(&self, command: WorkerCommand) -> AppResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| AppError::channel(format!("worker of window {} has stopped", self.id)))
    }

    /// Send `init` unless the worker already runs with these parameters.
    pub async fn configure(
        &self,
        config: &ProviderConfig,
        strings: &ErrorStrings,
        max_tokens: u32,
    ) -> AppResult<()> {
        let params = InitParams {
            config: config.clone(),
            strings: strings.clone(),
            max_tokens,
        };
        let mut current = self.init.lock().await;
        if current.as_ref() == Some(&params) {
            return Ok(());
        }

        tracing::debug!("[ChatWindows] Initializing window {} ({})", self.id, self.kind);
        self.send(WorkerCommand::Init {
            config: params.config.clone(),
            i18n_strings: params.strings.clone(),
            max_tokens,
        })
        .await?;
        *current = Some(params);
        Ok(())
    }

    /// Ask the worker to stop waiting for the current answer.
    pub async fn force_completion(&self) -> AppResult<()> {
        self.send(WorkerCommand::ForceCompletion).await
    }

    /// Send a prompt and wait for its terminal event.
    ///
    /// Every event of the invocation, terminal included, is passed to
    /// `on_event` in the order the worker sent it. Events left over from an
    /// earlier invocation whose caller stopped waiting are discarded.
    pub async fn run_prompt<F>(
        &self,
        invocation: PromptInvocation,
        mut on_event: F,
    ) -> AppResult<PromptData>
    where
        F: FnMut(&WorkerEvent),
    {
        let mut events = self.events.lock().await;
        let id = invocation.id.clone();
        self.send(WorkerCommand::Prompt(invocation)).await?;

        while let Some(event) = events.recv().await {
            if event.invocation_id() != id {
                tracing::debug!(
                    "[ChatWindows] Dropping stale event of {} in window {}",
                    event.invocation_id(),
                    self.id
                );
                continue;
            }
            on_event(&event);
            match event {
                WorkerEvent::TokensDone(data) => return Ok(data),
                WorkerEvent::Error(payload) => return Err(prompt_error(payload)),
                WorkerEvent::MessageSent { .. } | WorkerEvent::NewToken { .. } => {}
            }
        }

        Err(AppError::channel(format!(
            "worker of window {} stopped before answering",
            self.id
        )))
    }
}

fn prompt_error(payload: ErrorPayload) -> AppError {
    match payload.ui {
        Some(ui) => AppError::Ui(ui),
        None => AppError::Prompt {
            message: payload.message,
            category: payload.category,
            retryable: payload.retryable,
        },
    }
}

/// Open chat windows keyed by connection type.
#[derive(Default)]
pub struct ChatWindows {
    factory: ProviderFactory,
    windows: RwLock<HashMap<&'static str, Arc<ChatWindow>>>,
}

impl ChatWindows {
    pub fn new(factory: ProviderFactory) -> Self {
        Self {
            factory,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Open the window for `config`'s connection type, reusing it when it is
    /// already open, and make sure its worker runs with `config`.
    pub async fn open(
        &self,
        config: &ProviderConfig,
        strings: &ErrorStrings,
        max_tokens: u32,
    ) -> AppResult<Arc<ChatWindow>> {
        let kind = config.kind();
        let window = {
            let mut windows = self.windows.write().await;
            match windows.get(kind) {
                Some(window) if window.is_open() => window.clone(),
                _ => {
                    let window = Arc::new(ChatWindow::spawn(self.factory.clone(), kind));
                    tracing::info!("[ChatWindows] Opened window {} for {}", window.id(), kind);
                    windows.insert(kind, window.clone());
                    window
                }
            }
        };
        window.configure(config, strings, max_tokens).await?;
        Ok(window)
    }

    /// The open window for a connection type, if any.
    pub async fn get(&self, kind: &str) -> Option<Arc<ChatWindow>> {
        self.windows.read().await.get(kind).cloned()
    }

    /// Close the window for a connection type. Returns whether one was open.
    pub async fn close(&self, kind: &str) -> bool {
        let removed = self.windows.write().await.remove(kind);
        if let Some(window) = &removed {
            tracing::info!("[ChatWindows] Closed window {} for {}", window.id(), kind);
        }
        removed.is_some()
    }

    /// Close every window.
    pub async fn close_all(&self) {
        self.windows.write().await.clear();
    }

    /// Number of open windows.
    pub async fn len(&self) -> usize {
        self.windows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
