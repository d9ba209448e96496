//! Ollama Provider
//!
//! Local inference through the ollama-rs native SDK. No API key; the host
//! and model are mandatory.

use async_trait::async_trait;
use mailprompt_core::streaming::UnifiedStreamEvent;
use ollama_rs::generation::chat::request::ChatMessageRequest;
use ollama_rs::generation::chat::{ChatMessage as OllamaMessage, ChatMessageResponse};
use ollama_rs::error::OllamaError;
use ollama_rs::models::ModelOptions;
use ollama_rs::Ollama;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;

use crate::provider::ChatProvider;
use crate::types::{
    ChatMessage, ChatResponse, ChatRole, InitError, LlmError, LlmResult, UsageStats,
};

/// Default Ollama port when the host URL has none
const OLLAMA_DEFAULT_PORT: u16 = 11434;

/// Status carried by [`LlmError::Api`] when the SDK drops the HTTP status
pub const STATUS_NOT_REPORTED: u16 = 0;

/// Ollama chat provider
pub struct OllamaProvider {
    client: Ollama,
    host: String,
    model: String,
    stream: bool,
}

impl OllamaProvider {
    pub fn new(host: &str, model: &str, stream: bool) -> LlmResult<Self> {
        let (host_url, port) = Self::split_host(host)?;
        Ok(Self {
            client: Ollama::new(host_url.clone(), port),
            host: format!("{host_url}:{port}"),
            model: model.trim().to_string(),
            stream,
        })
    }

    /// Split a host setting into the `scheme://host` and port `Ollama::new` expects.
    ///
    /// A missing scheme means `http`; a missing port means 11434. A scheme
    /// with nothing after it is rejected.
    pub fn split_host(host: &str) -> LlmResult<(String, u16)> {
        let host = host.trim();
        let invalid = || {
            LlmError::Validation(InitError::InvalidHost {
                host: host.to_string(),
            })
        };

        let with_scheme = match host.split_once("://") {
            Some((scheme, rest)) => {
                if scheme.is_empty() || rest.trim_matches('/').is_empty() {
                    return Err(invalid());
                }
                host.trim_end_matches('/').to_string()
            }
            None if host.trim_matches('/').is_empty() => return Err(invalid()),
            None => format!("http://{}", host.trim_end_matches('/')),
        };

        let parsed = url::Url::parse(&with_scheme).map_err(|_| invalid())?;
        let name = parsed
            .host_str()
            .filter(|name| !name.is_empty())
            .ok_or_else(invalid)?;
        let port = parsed.port().unwrap_or(OLLAMA_DEFAULT_PORT);
        Ok((format!("{}://{}", parsed.scheme(), name), port))
    }

    /// Whether answers are streamed.
    pub fn streams(&self) -> bool {
        self.stream
    }

    fn build_chat_request(&self, messages: &[ChatMessage], max_tokens: u32) -> ChatMessageRequest {
        let chat_messages: Vec<OllamaMessage> = messages
            .iter()
            .map(|m| match m.role {
                ChatRole::System => OllamaMessage::system(m.content.clone()),
                ChatRole::User => OllamaMessage::user(m.content.clone()),
                ChatRole::Assistant => OllamaMessage::assistant(m.content.clone()),
            })
            .collect();

        let mut request = ChatMessageRequest::new(self.model.clone(), chat_messages);
        if max_tokens > 0 {
            request = request.options(ModelOptions::default().num_predict(max_tokens as i32));
        }
        request
    }

    fn map_error(&self, err: OllamaError) -> LlmError {
        tracing::error!("[Ollama] Request to {} failed: {}", self.host, err);
        match err {
            OllamaError::ReqwestError(e) => match e.status() {
                Some(status) => LlmError::Api {
                    status: status.as_u16(),
                    body: e.to_string(),
                },
                None => LlmError::transport(format!(
                    "Cannot reach Ollama at {}: {}",
                    self.host, e
                )),
            },
            OllamaError::JsonError(e) => LlmError::parse(e.to_string()),
            OllamaError::InternalError(e) => LlmError::Api {
                status: STATUS_NOT_REPORTED,
                body: e.message,
            },
            // Non-2xx answers arrive as their raw body
            OllamaError::Other(body) => LlmError::Api {
                status: STATUS_NOT_REPORTED,
                body: Self::error_message(body),
            },
            OllamaError::ToolCallError(e) => LlmError::parse(e.to_string()),
        }
    }

    /// The `error` field of a JSON error body, or the body itself.
    fn error_message(body: String) -> String {
        serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("error")?.as_str().map(str::to_string))
            .unwrap_or(body)
    }

    fn usage(response: &ChatMessageResponse) -> Option<UsageStats> {
        response.final_data.as_ref().map(|data| UsageStats {
            input_tokens: data.prompt_eval_count as u32,
            output_tokens: data.eval_count as u32,
        })
    }
}

#[async_trait]
impl ChatProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn send_chat(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: u32,
    ) -> LlmResult<ChatResponse> {
        let request = self.build_chat_request(&messages, max_tokens);
        let response = self
            .client
            .send_chat_messages(request)
            .await
            .map_err(|e| self.map_error(e))?;

        Ok(ChatResponse {
            content: response.message.content.clone(),
            model: Some(response.model.clone()),
            usage: Self::usage(&response),
        })
    }

    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: u32,
        tx: mpsc::Sender<UnifiedStreamEvent>,
    ) -> LlmResult<ChatResponse> {
        let request = self.build_chat_request(&messages, max_tokens);
        let mut stream = self
            .client
            .send_chat_messages_stream(request)
            .await
            .map_err(|e| self.map_error(e))?;

        let mut answer = ChatResponse {
            model: Some(self.model.clone()),
            ..Default::default()
        };

        while let Some(chunk) = stream.next().await {
            let Ok(response) = chunk else {
                tracing::error!("[Ollama] Stream error from {}", self.host);
                return Err(LlmError::transport("Stream error from Ollama"));
            };

            let token = &response.message.content;
            if !token.is_empty() {
                answer.content.push_str(token);
                if tx.send(UnifiedStreamEvent::text(token.clone())).await.is_err() {
                    tracing::debug!("[Ollama] Receiver gone, stopping stream");
                    break;
                }
            }
            if response.done {
                if let Some(usage) = Self::usage(&response) {
                    answer.usage = Some(usage);
                    let event = UnifiedStreamEvent::Usage {
                        input_tokens: usage.input_tokens,
                        output_tokens: usage.output_tokens,
                    };
                    if tx.send(event).await.is_err() {
                        tracing::debug!("[Ollama] Receiver gone, dropping usage");
                    }
                }
            }
        }

        Ok(answer)
    }

    async fn list_models(&self) -> LlmResult<Option<Vec<String>>> {
        let models = self
            .client
            .list_local_models()
            .await
            .map_err(|e| self.map_error(e))?;

        Ok(Some(models.into_iter().map(|m| m.name).collect()))
    }
}
