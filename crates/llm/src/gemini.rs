//! Google Gemini Provider
//!
//! REST client for `models/{model}:generateContent` and
//! `models/{model}:streamGenerateContent?alt=sse`.
//!
//! Gemini has no system role in `contents`: the configured system
//! instruction and any system messages are sent as `systemInstruction`, and
//! assistant turns use the `model` role.

use async_trait::async_trait;
use mailprompt_core::streaming::UnifiedStreamEvent;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use crate::provider::{parse_http_error, transport_error, ChatProvider};
use crate::streaming_adapters::gemini::GenerateContentResponse;
use crate::streaming_adapters::{forward_sse, GeminiSseAdapter};
use crate::types::{
    ChatMessage, ChatResponse, ChatRole, LlmError, LlmResult, UsageStats, GEMINI_API_BASE,
};

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    name: String,
}

/// Google Gemini chat provider
pub struct GeminiProvider {
    client: reqwest::Client,
    base: String,
    api_key: String,
    model: String,
    system_instruction: Option<String>,
    stream: bool,
}

impl GeminiProvider {
    pub fn new(
        client: reqwest::Client,
        api_key: &str,
        model: &str,
        system_instruction: Option<String>,
        stream: bool,
        base_url: Option<&str>,
    ) -> Self {
        Self {
            client,
            base: base_url
                .unwrap_or(GEMINI_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.trim().to_string(),
            model: model.trim().trim_start_matches("models/").to_string(),
            system_instruction: system_instruction.filter(|s| !s.trim().is_empty()),
            stream,
        }
    }

    fn generate_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.base, self.model)
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base, self.model
        )
    }

    /// Whether answers are requested as SSE streams.
    pub fn streams(&self) -> bool {
        self.stream
    }

    /// Request body for `generateContent`.
    pub fn build_request_body(&self, messages: &[ChatMessage], max_tokens: u32) -> serde_json::Value {
        let mut system_parts: Vec<serde_json::Value> = self
            .system_instruction
            .iter()
            .map(|text| json!({ "text": text }))
            .collect();

        let mut contents = Vec::new();
        for message in messages {
            match message.role {
                ChatRole::System => system_parts.push(json!({ "text": message.content })),
                ChatRole::User => contents.push(json!({
                    "role": "user",
                    "parts": [{ "text": message.content }],
                })),
                ChatRole::Assistant => contents.push(json!({
                    "role": "model",
                    "parts": [{ "text": message.content }],
                })),
            }
        }

        let mut body = json!({ "contents": contents });
        if !system_parts.is_empty() {
            body["systemInstruction"] = json!({ "parts": system_parts });
        }
        if max_tokens > 0 {
            body["generationConfig"] = json!({ "maxOutputTokens": max_tokens });
        }
        body
    }

    async fn post(&self, url: String, body: &serde_json::Value) -> LlmResult<reqwest::Response> {
        tracing::debug!("[Gemini] POST {}", url);
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(e, "Gemini"))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .map_err(|e| transport_error(e, "Gemini"))?;
            return Err(parse_http_error(status.as_u16(), &body_text, "Gemini"));
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "google_gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn send_chat(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: u32,
    ) -> LlmResult<ChatResponse> {
        let body = self.build_request_body(&messages, max_tokens);
        let response = self.post(self.generate_url(), &body).await?;
        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| LlmError::parse(e.to_string()))?;

        if let Some(error) = &parsed.error {
            return Err(parse_http_error(200, &error.message, "Gemini"));
        }

        Ok(ChatResponse {
            content: parsed.text(),
            model: Some(self.model.clone()),
            usage: parsed.usage_metadata.as_ref().map(|u| UsageStats {
                input_tokens: u.prompt_token_count,
                output_tokens: u.candidates_token_count,
            }),
        })
    }

    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: u32,
        tx: mpsc::Sender<UnifiedStreamEvent>,
    ) -> LlmResult<ChatResponse> {
        let body = self.build_request_body(&messages, max_tokens);
        let response = self.post(self.stream_url(), &body).await?;
        let mut adapter = GeminiSseAdapter::new();
        let mut answer = forward_sse(response, &mut adapter, &tx).await?;
        answer.model = Some(self.model.clone());
        Ok(answer)
    }

    async fn list_models(&self) -> LlmResult<Option<Vec<String>>> {
        let response = self
            .client
            .get(format!("{}/models", self.base))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| transport_error(e, "Gemini"))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .map_err(|e| transport_error(e, "Gemini"))?;
            return Err(parse_http_error(status.as_u16(), &body_text, "Gemini"));
        }

        let list: ModelList = response
            .json()
            .await
            .map_err(|e| LlmError::parse(e.to_string()))?;
        Ok(Some(
            list.models
                .into_iter()
                .map(|m| m.name.trim_start_matches("models/").to_string())
                .collect(),
        ))
    }
}
