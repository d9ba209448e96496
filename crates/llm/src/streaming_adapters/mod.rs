//! Provider-specific stream adapters
//!
//! Each adapter turns raw wire lines into `UnifiedStreamEvent`s;
//! [`forward_sse`] drives one over an HTTP response body.

pub mod gemini;
pub mod openai;

pub use gemini::GeminiSseAdapter;
pub use openai::OpenAiSseAdapter;

use futures_util::{Stream, StreamExt};
use mailprompt_core::streaming::{StreamAdapter, UnifiedStreamEvent};
use tokio::sync::mpsc;

use crate::types::{ChatResponse, LlmError, LlmResult, UsageStats};

/// Feed an SSE response body through `adapter`, forwarding text and usage
/// events to `tx` and accumulating the full answer.
///
/// An error reported inside the stream ends it with [`LlmError::Api`]
/// carrying the response status. When `tx` is closed the body is no longer
/// read and the answer so far is returned.
pub async fn forward_sse(
    response: reqwest::Response,
    adapter: &mut dyn StreamAdapter,
    tx: &mpsc::Sender<UnifiedStreamEvent>,
) -> LlmResult<ChatResponse> {
    let status = response.status().as_u16();
    forward_byte_stream(response.bytes_stream(), status, adapter, tx).await
}

/// Line splitting and dispatch behind [`forward_sse`].
///
/// Bytes are buffered until a full line is present, so a multi-byte
/// character split between two chunks is decoded whole.
pub async fn forward_byte_stream<S, B, E>(
    stream: S,
    status: u16,
    adapter: &mut dyn StreamAdapter,
    tx: &mpsc::Sender<UnifiedStreamEvent>,
) -> LlmResult<ChatResponse>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    tokio::pin!(stream);
    let mut buffer: Vec<u8> = Vec::new();
    let mut answer = ChatResponse::default();

    adapter.reset();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| LlmError::transport(e.to_string()))?;
        buffer.extend_from_slice(chunk.as_ref());

        while let Some(line_end) = buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&line);
            if dispatch_line(&line, adapter, tx, &mut answer, status).await? == Flow::Stop {
                return Ok(answer);
            }
        }
    }

    let rest = String::from_utf8_lossy(&buffer);
    if !rest.trim().is_empty() {
        dispatch_line(&rest, adapter, tx, &mut answer, status).await?;
    }

    Ok(answer)
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

async fn dispatch_line(
    line: &str,
    adapter: &mut dyn StreamAdapter,
    tx: &mpsc::Sender<UnifiedStreamEvent>,
    answer: &mut ChatResponse,
    status: u16,
) -> LlmResult<Flow> {
    let events = match adapter.adapt(line) {
        Ok(events) => events,
        Err(e) => {
            tracing::warn!(
                "[{}] Skipping undecodable stream line: {}",
                adapter.provider_name(),
                e
            );
            return Ok(Flow::Continue);
        }
    };

    for event in events {
        let forwarded = match event {
            UnifiedStreamEvent::TextDelta { content } => {
                answer.content.push_str(&content);
                UnifiedStreamEvent::TextDelta { content }
            }
            UnifiedStreamEvent::Usage {
                input_tokens,
                output_tokens,
            } => {
                answer.usage = Some(UsageStats {
                    input_tokens,
                    output_tokens,
                });
                UnifiedStreamEvent::Usage {
                    input_tokens,
                    output_tokens,
                }
            }
            UnifiedStreamEvent::Error { message, .. } => {
                tracing::error!(
                    "[{}] Error reported in stream: {}",
                    adapter.provider_name(),
                    message
                );
                return Err(LlmError::Api {
                    status,
                    body: message,
                });
            }
            // The worker emits the terminal event once the body is drained.
            UnifiedStreamEvent::Complete { .. } => continue,
        };

        if tx.send(forwarded).await.is_err() {
            tracing::debug!(
                "[{}] Receiver gone, stopping stream",
                adapter.provider_name()
            );
            return Ok(Flow::Stop);
        }
    }
    Ok(Flow::Continue)
}
