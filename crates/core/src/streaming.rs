//! Stream Events
//!
//! What a provider reports while an answer is being generated. The SSE
//! adapters and the Ollama stream produce these; the chat worker turns text
//! deltas into `newToken` messages for its window.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One step of a streamed answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnifiedStreamEvent {
    /// Next piece of answer text
    TextDelta { content: String },

    /// Token counts, sent by providers that report them
    Usage {
        input_tokens: u32,
        output_tokens: u32,
    },

    /// The provider reported a failure mid-stream
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    Complete {
        #[serde(skip_serializing_if = "Option::is_none")]
        stop_reason: Option<String>,
    },
}

impl UnifiedStreamEvent {
    /// Shorthand for a text delta.
    pub fn text(content: impl Into<String>) -> Self {
        Self::TextDelta {
            content: content.into(),
        }
    }

    /// Whether no further events follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Complete { .. })
    }
}

/// A stream line that could not be turned into events.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum AdapterError {
    /// The `data:` payload is not the JSON the provider documents
    #[error("Undecodable stream payload: {0}")]
    Json(String),
}

/// Turns one provider's wire lines into [`UnifiedStreamEvent`]s.
pub trait StreamAdapter: Send + Sync {
    /// Component name used in log lines
    fn provider_name(&self) -> &'static str;

    /// Events carried by one raw line; blank lines and comments yield none.
    fn adapt(&mut self, input: &str) -> Result<Vec<UnifiedStreamEvent>, AdapterError>;

    /// Forget per-stream state before a new response.
    fn reset(&mut self) {}
}
