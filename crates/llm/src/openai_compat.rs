//! OpenAI-Compatible Provider
//!
//! Generic client for any server speaking the OpenAI chat completions
//! dialect (LM Studio, llama.cpp server, vLLM, LocalAI, ...).
//!
//! Endpoints are `{host}[/v1]/models` and `{host}[/v1]/chat/completions`.
//! The bearer header is sent only when an API key is configured, and
//! `max_tokens` is part of the body only when it is greater than zero.

use async_trait::async_trait;
use mailprompt_core::streaming::UnifiedStreamEvent;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use crate::provider::{parse_http_error, transport_error, ChatProvider};
use crate::streaming_adapters::{forward_sse, OpenAiSseAdapter};
use crate::types::{ChatMessage, ChatResponse, LlmError, LlmResult, UsageStats};

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

/// OpenAI-compatible chat provider
pub struct OpenAiCompatibleProvider {
    pub(crate) client: reqwest::Client,
    /// `{host}` or `{host}/v1`, never with a trailing slash
    pub(crate) base: String,
    pub(crate) model: String,
    pub(crate) api_key: Option<String>,
    pub(crate) stream: bool,
    pub(crate) name: &'static str,
    /// Display name of the remote service, used in logs
    pub(crate) label: String,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        client: reqwest::Client,
        host: &str,
        model: &str,
        api_key: &str,
        use_v1: bool,
        stream: bool,
        chat_name: &str,
    ) -> Self {
        let host = host.trim().trim_end_matches('/');
        let base = if use_v1 {
            format!("{host}/v1")
        } else {
            host.to_string()
        };
        let api_key = api_key.trim();
        let label = if chat_name.trim().is_empty() {
            "OpenAI Comp".to_string()
        } else {
            chat_name.trim().to_string()
        };

        Self {
            client,
            base,
            model: model.trim().to_string(),
            api_key: (!api_key.is_empty()).then(|| api_key.to_string()),
            stream,
            name: "openai_compatible",
            label,
        }
    }

    pub fn models_url(&self) -> String {
        format!("{}/models", self.base)
    }

    pub fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base)
    }

    /// Display name of the remote service.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether answers are requested as SSE streams.
    pub fn streams(&self) -> bool {
        self.stream
    }

    /// Request body for a chat completion.
    pub fn build_request_body(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        stream: bool,
    ) -> serde_json::Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
        });
        if max_tokens > 0 {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn post_chat(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        stream: bool,
    ) -> LlmResult<reqwest::Response> {
        let body = self.build_request_body(messages, max_tokens, stream);
        tracing::debug!(
            "[{}] POST {} (stream: {}, max_tokens: {})",
            self.label,
            self.chat_url(),
            stream,
            max_tokens
        );

        let response = self
            .authorize(self.client.post(self.chat_url()))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, &self.label))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .map_err(|e| transport_error(e, &self.label))?;
            return Err(parse_http_error(status.as_u16(), &body_text, &self.label));
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn send_chat(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: u32,
    ) -> LlmResult<ChatResponse> {
        let response = self.post_chat(&messages, max_tokens, false).await?;
        let completion: CompletionResponse = response.json().await.map_err(|e| {
            tracing::error!("[{}] Undecodable completion: {}", self.label, e);
            LlmError::parse(e.to_string())
        })?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::parse("completion has no choices"))?;

        Ok(ChatResponse {
            content,
            model: completion.model,
            usage: completion.usage.map(|u| UsageStats {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        })
    }

    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: u32,
        tx: mpsc::Sender<UnifiedStreamEvent>,
    ) -> LlmResult<ChatResponse> {
        let response = self.post_chat(&messages, max_tokens, true).await?;
        let mut adapter = OpenAiSseAdapter::new();
        let mut answer = forward_sse(response, &mut adapter, &tx).await?;
        answer.model = Some(self.model.clone());
        Ok(answer)
    }

    async fn list_models(&self) -> LlmResult<Option<Vec<String>>> {
        let response = self
            .authorize(self.client.get(self.models_url()))
            .send()
            .await
            .map_err(|e| transport_error(e, &self.label))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .map_err(|e| transport_error(e, &self.label))?;
            return Err(parse_http_error(status.as_u16(), &body_text, &self.label));
        }

        let list: ModelList = response
            .json()
            .await
            .map_err(|e| LlmError::parse(e.to_string()))?;
        Ok(Some(list.data.into_iter().map(|m| m.id).collect()))
    }
}
