//! HTTP Client Factory
//!
//! Provides a factory function for building the reqwest client shared by the
//! HTTP-backed providers.

use std::time::Duration;

use crate::types::{LlmError, LlmResult};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build a `reqwest::Client` with a connect timeout and an optional overall
/// request timeout. Streaming answers can take minutes, so `None` is the
/// usual choice.
pub fn build_http_client(request_timeout: Option<Duration>) -> LlmResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder().connect_timeout(CONNECT_TIMEOUT);
    if let Some(timeout) = request_timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| LlmError::transport(format!("failed to build HTTP client: {e}")))
}

/// Like [`build_http_client`], with a cookie store so cookies set by the
/// session endpoint are sent back on the conversation requests.
pub fn build_session_client(request_timeout: Option<Duration>) -> LlmResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .cookie_store(true);
    if let Some(timeout) = request_timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| LlmError::transport(format!("failed to build session client: {e}")))
}
