//! Mail Prompt - Application Library
//!
//! Application layer of Mail Prompt. It includes:
//! - Chat window workers and their typed message protocol
//! - The prompt orchestrator and the mail client collaborator traits
//! - Storage layer (JSON settings file)
//! - Data models and utilities

pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

pub use models::settings::{ReplyType, Settings, SettingsUpdate, MAX_PROMPT_CHARS};
pub use services::orchestrator::{PromptCommand, PromptOrchestrator, PromptOutcome};
pub use services::windows::{ChatWindow, ChatWindows};
pub use services::worker::{ChatWorker, WorkerCommand, WorkerEvent};
pub use storage::ConfigService;
pub use utils::error::{AppError, AppResult};
