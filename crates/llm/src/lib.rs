//! Mail Prompt LLM
//!
//! Provides a unified interface for the chat backends a mail prompt can be
//! sent to:
//! - ChatGPT web page (page automation, or its session API)
//! - ChatGPT API
//! - Google Gemini API
//! - Ollama (local inference)
//! - Any OpenAI-compatible server
//!
//! Also includes the session manager, the SSE stream adapters and the HTTP
//! client factory.

pub mod gemini;
pub mod http_client;
pub mod ollama;
pub mod openai;
pub mod openai_compat;
pub mod provider;
pub mod session;
pub mod streaming_adapters;
pub mod types;
pub mod webchat;

// Re-export main types
pub use gemini::GeminiProvider;
pub use http_client::build_http_client;
pub use ollama::OllamaProvider;
pub use openai_compat::OpenAiCompatibleProvider;
pub use provider::{initialize, parse_http_error, ChatProvider, ProviderFactory};
pub use session::{Session, SessionChatProvider, SessionManager};
pub use types::*;
pub use webchat::{Completion, ForceCompletion, PageDriver, SendButton, WebChatProvider, WebPollOptions};

// Re-export streaming adapters
pub use streaming_adapters::{GeminiSseAdapter, OpenAiSseAdapter};
