//! Application Errors
//!
//! `AppError` covers the settings file, the chat windows and everything the
//! core and provider crates can report.

use mailprompt_core::{CoreError, UiError};
use mailprompt_llm::LlmError;
use thiserror::Error;

/// Error returned by the services and the settings store.
#[derive(Error, Debug)]
pub enum AppError {
    /// Settings that cannot be turned into a provider config
    #[error("Configuration error: {0}")]
    Config(String),

    /// Settings file could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file is not valid JSON for [`Settings`](crate::models::settings::Settings)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Settings rejected by `Settings::validate`
    #[error("Validation error: {0}")]
    Validation(String),

    /// Something the prompt needs does not exist (e.g. the mail to reply to)
    #[error("Not found: {0}")]
    NotFound(String),

    /// A chat window's worker is gone or stopped answering
    #[error("Channel error: {0}")]
    Channel(String),

    /// A prompt ended with the worker's `error` event
    #[error("{message}")]
    Prompt {
        message: String,
        category: String,
        retryable: bool,
    },

    /// Raised by `mailprompt-core`
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Raised by a provider or the session manager
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// Conditions the user has to fix before a prompt can run
    #[error(transparent)]
    Ui(#[from] UiError),
}

/// Result of the application services
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }

    /// The user-facing condition behind this error, if any.
    pub fn ui(&self) -> Option<&UiError> {
        match self {
            AppError::Ui(e) | AppError::Llm(LlmError::Ui(e)) | AppError::Core(CoreError::Ui(e)) => {
                Some(e)
            }
            _ => None,
        }
    }
}

/// Display form, for hosts that only take strings
impl From<AppError> for String {
    fn from(err: AppError) -> String {
        err.to_string()
    }
}
