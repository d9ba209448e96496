//! LLM Types
//!
//! Core types for chat provider interactions.

use mailprompt_core::UiError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default public OpenAI endpoint used by the ChatGPT API kind.
pub const OPENAI_API_HOST: &str = "https://api.openai.com";

/// Default Gemini REST endpoint.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message in the OpenAI `{role, content}` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Provider configuration, one variant per connection type.
///
/// Exactly one of these is active for a chat window. Blank mandatory fields
/// are reported by [`ProviderConfig::validate`] before any client exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// The ChatGPT web page, driven through page automation or its session API.
    ChatgptWeb {
        url: String,
        /// Ceiling for completion polling in seconds. Unset means five
        /// minutes; `0` waits for the regenerate control or a forced
        /// completion with no ceiling.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_secs: Option<u64>,
        #[serde(default)]
        stream: bool,
        /// `Cookie` header of a logged-in browser session, sent with every
        /// session API request
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_cookie: Option<String>,
    },
    /// OpenAI's official chat completions API.
    ChatgptApi {
        api_key: String,
        model: String,
        #[serde(default)]
        stream: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_url: Option<String>,
    },
    /// Google Gemini `generateContent`.
    GoogleGeminiApi {
        api_key: String,
        model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        system_instruction: Option<String>,
        #[serde(default)]
        stream: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_url: Option<String>,
    },
    /// A local Ollama server.
    OllamaApi {
        host: String,
        model: String,
        #[serde(default)]
        stream: bool,
    },
    /// Any server speaking the OpenAI chat completions dialect.
    OpenaiCompatibleApi {
        host: String,
        model: String,
        #[serde(default)]
        api_key: String,
        #[serde(default)]
        use_v1: bool,
        #[serde(default)]
        stream: bool,
        /// Display name of the remote service
        #[serde(default)]
        chat_name: String,
    },
}

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

impl ProviderConfig {
    /// Check mandatory fields. Performs no I/O.
    pub fn validate(&self) -> Result<(), InitError> {
        self.validate_connection()?;
        match self.model() {
            Some(model) if blank(model) => Err(InitError::EmptyModel),
            _ => Ok(()),
        }
    }

    /// Check only what is needed to reach the service: host and key.
    ///
    /// Model listing goes through this, since the model is usually picked
    /// from its result.
    pub fn validate_connection(&self) -> Result<(), InitError> {
        match self {
            ProviderConfig::ChatgptWeb { url: host, .. }
            | ProviderConfig::OllamaApi { host, .. }
            | ProviderConfig::OpenaiCompatibleApi { host, .. } => {
                if blank(host) {
                    return Err(InitError::EmptyHost);
                }
            }
            ProviderConfig::ChatgptApi { api_key, .. }
            | ProviderConfig::GoogleGeminiApi { api_key, .. } => {
                if blank(api_key) {
                    return Err(InitError::EmptyApiKey);
                }
            }
        }
        Ok(())
    }

    /// Stable name of the connection type, as used in settings.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderConfig::ChatgptWeb { .. } => "chatgpt_web",
            ProviderConfig::ChatgptApi { .. } => "chatgpt_api",
            ProviderConfig::GoogleGeminiApi { .. } => "google_gemini_api",
            ProviderConfig::OllamaApi { .. } => "ollama_api",
            ProviderConfig::OpenaiCompatibleApi { .. } => "openai_comp_api",
        }
    }

    /// Whether answers should be streamed token by token.
    pub fn stream(&self) -> bool {
        match self {
            ProviderConfig::ChatgptWeb { stream, .. }
            | ProviderConfig::ChatgptApi { stream, .. }
            | ProviderConfig::GoogleGeminiApi { stream, .. }
            | ProviderConfig::OllamaApi { stream, .. }
            | ProviderConfig::OpenaiCompatibleApi { stream, .. } => *stream,
        }
    }

    /// Model name, if the kind has one.
    pub fn model(&self) -> Option<&str> {
        match self {
            ProviderConfig::ChatgptWeb { .. } => None,
            ProviderConfig::ChatgptApi { model, .. }
            | ProviderConfig::GoogleGeminiApi { model, .. }
            | ProviderConfig::OllamaApi { model, .. }
            | ProviderConfig::OpenaiCompatibleApi { model, .. } => Some(model),
        }
    }
}

/// A mandatory configuration field is missing or unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InitError {
    #[error("API key is empty")]
    EmptyApiKey,
    #[error("Model is empty")]
    EmptyModel,
    #[error("Host is empty")]
    EmptyHost,
    #[error("Invalid host: {host}")]
    InvalidHost { host: String },
    #[error("No provider configured yet")]
    NotInitialized,
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Complete answer from a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageStats>,
}

impl ChatResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Errors from provider operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    /// Configuration rejected before any I/O
    #[error("Invalid configuration: {0}")]
    Validation(#[from] InitError),

    /// Session authentication failed or expired
    #[error("Session error: {message}")]
    Session { message: String },

    /// The request never produced an HTTP status
    #[error("Network error: {message}")]
    Transport { message: String },

    /// Non-2xx HTTP response
    #[error("HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// Response body could not be decoded
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// Page automation failure
    #[error(transparent)]
    Ui(#[from] UiError),
}

impl LlmError {
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Network-level failure, worth retrying unlike an API answer.
    pub fn is_transport(&self) -> bool {
        matches!(self, LlmError::Transport { .. })
    }

    /// Short category name carried in worker error payloads.
    pub fn category(&self) -> &'static str {
        match self {
            LlmError::Validation(_) => "validation",
            LlmError::Session { .. } => "session",
            LlmError::Transport { .. } => "transport",
            LlmError::Api { .. } => "api",
            LlmError::Parse { .. } => "parse",
            LlmError::Ui(_) => "ui",
        }
    }
}

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;
