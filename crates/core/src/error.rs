//! Core Errors
//!
//! `CoreError` for template and preference decoding, and `UiError` for the
//! conditions a user has to fix in the mail client. The provider and
//! application crates wrap both.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure while reading prompt templates or their preference codes.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Stored prompts are not valid JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A value outside its allowed range (e.g. an unknown action code)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Lookup by id failed
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conditions the user has to fix in the mail client before a prompt can run
    #[error(transparent)]
    Ui(#[from] UiError),
}

/// Result of core operations
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

/// Display form, for hosts that only take strings
impl From<CoreError> for String {
    fn from(err: CoreError) -> String {
        err.to_string()
    }
}

/// User-visible conditions raised before (or instead of) talking to a provider.
///
/// None of these is retried: the user has to change something first.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiError {
    /// The prompt needs a selection and nothing is selected.
    #[error("No text selected")]
    NoSelection,

    /// The resolved prompt is longer than the provider ceiling.
    #[error("Prompt too long: {length} characters (max {max})")]
    PromptTooLong { length: usize, max: usize },

    /// The chat input box could not be located on the provider page.
    #[error("Chat input not found on the provider page")]
    InputNotFound,

    /// The send button could not be located on the provider page.
    #[error("Send button not found on the provider page")]
    SendButtonNotFound,

    /// The provider page is showing its login screen.
    #[error("User is not logged in to the provider page")]
    NotLoggedIn,

    /// No prompt with this id exists.
    #[error("Unknown prompt: {id}")]
    UnknownPrompt { id: String },
}
