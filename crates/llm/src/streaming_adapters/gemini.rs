//! Gemini Adapter
//!
//! Handles `streamGenerateContent?alt=sse`: every `data:` line is a complete
//! `GenerateContentResponse` carrying the next slice of candidate text.

use mailprompt_core::streaming::{AdapterError, StreamAdapter, UnifiedStreamEvent};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    pub error: Option<GeminiErrorBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Part {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiErrorBody {
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

impl GenerateContentResponse {
    /// Text of the first candidate, parts concatenated.
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

/// Adapter for Gemini SSE streams
#[derive(Debug, Default)]
pub struct GeminiSseAdapter;

impl GeminiSseAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl StreamAdapter for GeminiSseAdapter {
    fn provider_name(&self) -> &'static str {
        "gemini"
    }

    fn adapt(&mut self, input: &str) -> Result<Vec<UnifiedStreamEvent>, AdapterError> {
        let trimmed = input.trim();
        let Some(json_str) = trimmed.strip_prefix("data:").map(str::trim_start) else {
            return Ok(vec![]);
        };
        if json_str.is_empty() {
            return Ok(vec![]);
        }

        let response: GenerateContentResponse =
            serde_json::from_str(json_str).map_err(|e| AdapterError::Json(e.to_string()))?;

        if let Some(error) = response.error {
            return Ok(vec![UnifiedStreamEvent::Error {
                message: error.message,
                code: error.status,
            }]);
        }

        let mut events = vec![];
        let text = response.text();
        if !text.is_empty() {
            events.push(UnifiedStreamEvent::TextDelta { content: text });
        }
        if let Some(usage) = &response.usage_metadata {
            events.push(UnifiedStreamEvent::Usage {
                input_tokens: usage.prompt_token_count,
                output_tokens: usage.candidates_token_count,
            });
        }
        if let Some(reason) = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.finish_reason)
        {
            events.push(UnifiedStreamEvent::Complete {
                stop_reason: Some(reason),
            });
        }
        Ok(events)
    }
}
