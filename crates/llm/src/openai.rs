//! ChatGPT API Provider
//!
//! OpenAI's own chat completions endpoint: the OpenAI-compatible client
//! pinned to `https://api.openai.com/v1` with a mandatory API key.

use crate::openai_compat::OpenAiCompatibleProvider;
use crate::types::OPENAI_API_HOST;

impl OpenAiCompatibleProvider {
    /// Client for the official ChatGPT API.
    ///
    /// `base_url` overrides the public host (tests, Azure-style gateways).
    pub fn chatgpt_api(
        client: reqwest::Client,
        api_key: &str,
        model: &str,
        stream: bool,
        base_url: Option<&str>,
    ) -> Self {
        let host = base_url.unwrap_or(OPENAI_API_HOST);
        let mut provider =
            OpenAiCompatibleProvider::new(client, host, model, api_key, true, stream, "ChatGPT");
        provider.name = "chatgpt_api";
        provider
    }
}
