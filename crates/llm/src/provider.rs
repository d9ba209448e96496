//! Chat Provider Trait
//!
//! Defines the common interface for all chat providers and the factory that
//! picks an implementation from the [`ProviderConfig`] tag.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mailprompt_core::streaming::UnifiedStreamEvent;
use tokio::sync::mpsc;

use crate::gemini::GeminiProvider;
use crate::http_client::{build_http_client, build_session_client};
use crate::ollama::OllamaProvider;
use crate::openai_compat::OpenAiCompatibleProvider;
use crate::session::{SessionChatProvider, SessionManager};
use crate::types::{ChatMessage, ChatResponse, LlmError, LlmResult, ProviderConfig};
use crate::webchat::{PageDriver, WebChatProvider, WebPollOptions};

/// Trait that all chat providers must implement.
///
/// Provides a unified interface for:
/// - Single answers (send_chat)
/// - Streamed answers (stream_chat)
/// - Model discovery
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Returns the provider name for identification.
    fn name(&self) -> &'static str;

    /// Returns the model in use, or an empty string for page-driven kinds.
    fn model(&self) -> &str;

    /// Send the conversation and wait for the complete answer.
    ///
    /// `max_tokens == 0` leaves the answer length to the provider.
    async fn send_chat(&self, messages: Vec<ChatMessage>, max_tokens: u32)
        -> LlmResult<ChatResponse>;

    /// Stream the answer through `tx` and return it complete at the end.
    ///
    /// Providers without incremental output deliver the whole answer as a
    /// single text delta.
    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: u32,
        tx: mpsc::Sender<UnifiedStreamEvent>,
    ) -> LlmResult<ChatResponse> {
        let response = self.send_chat(messages, max_tokens).await?;
        if !response.content.is_empty()
            && tx.send(UnifiedStreamEvent::text(&response.content)).await.is_err()
        {
            tracing::debug!("[{}] Receiver gone before the answer was sent", self.name());
        }
        Ok(response)
    }

    /// List available models.
    ///
    /// Returns None if the provider doesn't support model listing.
    async fn list_models(&self) -> LlmResult<Option<Vec<String>>> {
        Ok(None)
    }

    /// Stop waiting for the current answer and deliver what is there.
    ///
    /// Only meaningful for providers that detect completion by polling.
    fn force_completion(&self) {}
}

/// Map a non-2xx response to [`LlmError::Api`], logging it under `provider`.
pub fn parse_http_error(status: u16, body: &str, provider: &str) -> LlmError {
    tracing::error!("[{}] HTTP {}: {}", provider, status, body);
    LlmError::Api {
        status,
        body: body.to_string(),
    }
}

/// Map a failed request (no HTTP status) to [`LlmError::Transport`].
pub fn transport_error(err: reqwest::Error, provider: &str) -> LlmError {
    tracing::error!("[{}] Request failed: {:?}", provider, err);
    LlmError::transport(err.to_string())
}

/// Builds providers from configs.
///
/// The web kind is driven through `page` when one is attached and falls back
/// to the page's session API otherwise.
#[derive(Clone, Default)]
pub struct ProviderFactory {
    page: Option<Arc<dyn PageDriver>>,
    request_timeout: Option<Duration>,
}

impl ProviderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the page the web kind should automate.
    pub fn with_page_driver(mut self, page: Arc<dyn PageDriver>) -> Self {
        self.page = Some(page);
        self
    }

    /// Overall timeout for HTTP requests (default: none).
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Validate `config` and build its provider.
    ///
    /// Validation happens first: a blank mandatory field never results in a
    /// client being built or a request being made.
    pub fn create(&self, config: &ProviderConfig) -> LlmResult<Arc<dyn ChatProvider>> {
        if let Err(e) = config.validate() {
            tracing::warn!("[ProviderFactory] Rejected {} config: {}", config.kind(), e);
            return Err(e.into());
        }

        let provider = self.build(config)?;
        tracing::info!(
            "[ProviderFactory] Initialized {} provider (model: {})",
            provider.name(),
            config.model().unwrap_or("-")
        );
        Ok(provider)
    }

    /// List the models `config` can reach.
    ///
    /// Only the host and key are required, so this works before a model has
    /// been chosen. `None` means the kind has no model listing.
    pub async fn list_models(&self, config: &ProviderConfig) -> LlmResult<Option<Vec<String>>> {
        if let Err(e) = config.validate_connection() {
            tracing::warn!(
                "[ProviderFactory] Cannot list models for {}: {}",
                config.kind(),
                e
            );
            return Err(e.into());
        }

        let models = self.build(config)?.list_models().await?;
        tracing::info!(
            "[ProviderFactory] Listed {} models for {}",
            models.as_ref().map_or(0, Vec::len),
            config.kind()
        );
        Ok(models)
    }

    fn build(&self, config: &ProviderConfig) -> LlmResult<Arc<dyn ChatProvider>> {
        let provider: Arc<dyn ChatProvider> = match config {
            ProviderConfig::ChatgptWeb {
                url,
                timeout_secs,
                stream,
                session_cookie,
            } => match &self.page {
                Some(page) => {
                    let mut options = WebPollOptions::default();
                    match timeout_secs {
                        Some(0) => options.ceiling = None,
                        Some(secs) => options.ceiling = Some(Duration::from_secs(*secs)),
                        None => {}
                    }
                    Arc::new(WebChatProvider::new(page.clone(), options, *stream))
                }
                None => {
                    let client = build_session_client(self.request_timeout)?;
                    let mut session = SessionManager::new(client, url.clone())?;
                    if let Some(cookie) = session_cookie.as_deref() {
                        session = session.with_cookie(cookie);
                    }
                    Arc::new(SessionChatProvider::new(Arc::new(session)))
                }
            },
            ProviderConfig::ChatgptApi {
                api_key,
                model,
                stream,
                base_url,
            } => Arc::new(OpenAiCompatibleProvider::chatgpt_api(
                build_http_client(self.request_timeout)?,
                api_key,
                model,
                *stream,
                base_url.as_deref(),
            )),
            ProviderConfig::GoogleGeminiApi {
                api_key,
                model,
                system_instruction,
                stream,
                base_url,
            } => Arc::new(GeminiProvider::new(
                build_http_client(self.request_timeout)?,
                api_key,
                model,
                system_instruction.clone(),
                *stream,
                base_url.as_deref(),
            )),
            ProviderConfig::OllamaApi {
                host,
                model,
                stream,
            } => Arc::new(OllamaProvider::new(host, model, *stream)?),
            ProviderConfig::OpenaiCompatibleApi {
                host,
                model,
                api_key,
                use_v1,
                stream,
                chat_name,
            } => Arc::new(OpenAiCompatibleProvider::new(
                build_http_client(self.request_timeout)?,
                host,
                model,
                api_key,
                *use_v1,
                *stream,
                chat_name,
            )),
        };
        Ok(provider)
    }
}

/// Validate `config` and build its provider with default settings.
pub fn initialize(config: &ProviderConfig) -> LlmResult<Arc<dyn ChatProvider>> {
    ProviderFactory::new().create(config)
}
