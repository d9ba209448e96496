//! OpenAI Chat Completions Adapter
//!
//! Handles the SSE dialect shared by OpenAI and every OpenAI-compatible
//! server: `data: {json}` lines terminated by `data: [DONE]`.

use mailprompt_core::streaming::{AdapterError, StreamAdapter, UnifiedStreamEvent};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct OpenAiEvent {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<Delta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

/// Adapter for OpenAI-style SSE streams
#[derive(Debug, Default)]
pub struct OpenAiSseAdapter {
    completed: bool,
}

impl OpenAiSseAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StreamAdapter for OpenAiSseAdapter {
    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn adapt(&mut self, input: &str) -> Result<Vec<UnifiedStreamEvent>, AdapterError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.starts_with(':') {
            return Ok(vec![]);
        }

        let json_str = trimmed
            .strip_prefix("data:")
            .map(str::trim_start)
            .unwrap_or(trimmed);

        if json_str == "[DONE]" {
            if self.completed {
                return Ok(vec![]);
            }
            self.completed = true;
            return Ok(vec![UnifiedStreamEvent::Complete { stop_reason: None }]);
        }

        let event: OpenAiEvent =
            serde_json::from_str(json_str).map_err(|e| AdapterError::Json(e.to_string()))?;

        if let Some(error) = event.error {
            return Ok(vec![UnifiedStreamEvent::Error {
                message: error.message,
                code: error.kind,
            }]);
        }

        let mut events = vec![];

        if let Some(usage) = event.usage {
            events.push(UnifiedStreamEvent::Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            });
        }

        for choice in event.choices {
            if let Some(content) = choice.delta.and_then(|d| d.content) {
                if !content.is_empty() {
                    events.push(UnifiedStreamEvent::TextDelta { content });
                }
            }
            if let Some(reason) = choice.finish_reason {
                self.completed = true;
                events.push(UnifiedStreamEvent::Complete {
                    stop_reason: Some(reason),
                });
            }
        }

        Ok(events)
    }

    fn reset(&mut self) {
        self.completed = false;
    }
}
