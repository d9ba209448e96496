//! Services
//!
//! Business logic services for the application: the per-window chat workers,
//! the window registry and the prompt orchestrator.

pub mod host;
pub mod orchestrator;
pub mod windows;
pub mod worker;

pub use host::{ComposeHost, CustomTextPrompt, MailHost};
pub use orchestrator::{PromptCommand, PromptOrchestrator, PromptOutcome, ResolvedPrompt};
pub use windows::{ChatWindow, ChatWindows};
pub use worker::{
    ChatWorker, ErrorPayload, ErrorStrings, PromptData, PromptInvocation, WorkerCommand,
    WorkerEvent, WorkerHandle,
};
