//! Session Manager
//!
//! Authentication state for the session-backed web provider. The state is a
//! two-state machine (unauthenticated / authenticated) held in an explicit
//! [`Session`] value owned by one manager; managers never share it.
//!
//! `is_authenticated()` reads the cached flag only. It is not re-validated
//! against the server until a chat call is rejected, so it can be stale for
//! as long as the provider keeps the cookie alive; `authenticated_at` tells
//! callers how old it is.
//!
//! The browser session travels as a `Cookie` header configured up front;
//! cookies set by the session endpoint are kept by the client's cookie store.
//!
//! Concurrent `authenticate()` calls are single-flight: callers that queue up
//! behind an attempt in progress take its outcome instead of starting their
//! own request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::provider::{parse_http_error, transport_error, ChatProvider};
use crate::types::{ChatMessage, ChatResponse, ChatRole, InitError, LlmError, LlmResult};

const SESSION_PATH: &str = "/api/auth/session";
const CONVERSATION_PATH: &str = "/api/conversation";

/// Snapshot of the authentication state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub authenticated: bool,
    /// Token returned by the session endpoint, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authenticated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    #[serde(default)]
    authenticated: bool,
    #[serde(default)]
    access_token: Option<String>,
}

/// Owns one [`Session`] and the HTTP calls that depend on it.
pub struct SessionManager {
    client: reqwest::Client,
    base: String,
    /// `Cookie` header of the browser session
    cookie: Option<String>,
    session: RwLock<Session>,
    /// Serializes authentication attempts
    auth_lock: Mutex<()>,
    /// Number of finished authentication attempts
    attempts: AtomicU64,
}

impl SessionManager {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> LlmResult<Self> {
        let base: String = base_url.into();
        let base = base.trim().trim_end_matches('/').to_string();
        if base.is_empty() {
            return Err(InitError::EmptyHost.into());
        }
        Ok(Self {
            client,
            base,
            cookie: None,
            session: RwLock::new(Session::default()),
            auth_lock: Mutex::new(()),
            attempts: AtomicU64::new(0),
        })
    }

    /// Send `cookie` as the `Cookie` header of every request.
    pub fn with_cookie(mut self, cookie: &str) -> Self {
        let cookie = cookie.trim();
        self.cookie = (!cookie.is_empty()).then(|| cookie.to_string());
        self
    }

    fn with_credentials(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.cookie {
            Some(cookie) => request.header(reqwest::header::COOKIE, cookie),
            None => request,
        }
    }

    /// Cached flag; no network call.
    pub fn is_authenticated(&self) -> bool {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .authenticated
    }

    /// Copy of the current session state.
    pub fn session(&self) -> Session {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forget the session.
    pub fn invalidate(&self) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Session::default();
        tracing::info!("[SessionManager] Session invalidated");
    }

    /// Validate the session against the provider and record the outcome.
    pub async fn authenticate(&self) -> bool {
        let seen = self.attempts.load(Ordering::SeqCst);
        let _guard = self.auth_lock.lock().await;
        if self.attempts.load(Ordering::SeqCst) != seen {
            // An attempt finished while this caller waited; reuse its result.
            return self.is_authenticated();
        }

        let outcome = self.check_session().await;
        let authenticated = match outcome {
            Ok(response) if response.authenticated => {
                *self.session.write().unwrap_or_else(PoisonError::into_inner) = Session {
                    authenticated: true,
                    access_token: response.access_token,
                    authenticated_at: Some(Utc::now()),
                };
                tracing::info!("[SessionManager] Authenticated against {}", self.base);
                true
            }
            Ok(_) => {
                self.invalidate();
                tracing::warn!("[SessionManager] Session endpoint reports no session");
                false
            }
            Err(e) => {
                self.invalidate();
                tracing::error!("[SessionManager] Authentication failed: {}", e);
                false
            }
        };

        self.attempts.fetch_add(1, Ordering::SeqCst);
        authenticated
    }

    async fn check_session(&self) -> LlmResult<SessionResponse> {
        let response = self
            .with_credentials(self.client.get(format!("{}{}", self.base, SESSION_PATH)))
            .send()
            .await
            .map_err(|e| transport_error(e, "SessionManager"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(parse_http_error(status.as_u16(), &body, "SessionManager"));
        }
        response
            .json()
            .await
            .map_err(|e| LlmError::parse(e.to_string()))
    }

    /// Send `prompt` to the conversation endpoint.
    ///
    /// Authenticates first when needed. Provider errors are returned
    /// unchanged; a rejected session (401/403) is also forgotten, so the next
    /// call authenticates again.
    pub async fn send_prompt(
        &self,
        prompt: &str,
        options: serde_json::Map<String, serde_json::Value>,
    ) -> LlmResult<serde_json::Value> {
        if !self.is_authenticated() && !self.authenticate().await {
            return Err(LlmError::session("authentication failed"));
        }

        let result = self.post_conversation(prompt, &options).await;
        if let Err(LlmError::Api { status: 401 | 403, .. }) = &result {
            self.invalidate();
        }
        result
    }

    async fn post_conversation(
        &self,
        prompt: &str,
        options: &serde_json::Map<String, serde_json::Value>,
    ) -> LlmResult<serde_json::Value> {
        let mut body = options.clone();
        body.insert("prompt".to_string(), serde_json::Value::from(prompt));

        let mut request = self
            .with_credentials(self.client.post(format!("{}{}", self.base, CONVERSATION_PATH)))
            .json(&body);
        if let Some(token) = self.session().access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(e, "SessionManager"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| transport_error(e, "SessionManager"))?;
            return Err(parse_http_error(status.as_u16(), &body, "SessionManager"));
        }
        response
            .json()
            .await
            .map_err(|e| LlmError::parse(e.to_string()))
    }
}

/// Text of a conversation reply: a `response`, `text` or `message` string field.
fn reply_text(reply: &serde_json::Value) -> Option<String> {
    ["response", "text", "message"]
        .iter()
        .find_map(|key| reply.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

/// Chat provider backed by the web page's session API.
pub struct SessionChatProvider {
    session: Arc<SessionManager>,
}

impl SessionChatProvider {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }

    pub fn session_manager(&self) -> &Arc<SessionManager> {
        &self.session
    }
}

#[async_trait]
impl ChatProvider for SessionChatProvider {
    fn name(&self) -> &'static str {
        "chatgpt_session"
    }

    fn model(&self) -> &str {
        ""
    }

    async fn send_chat(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: u32,
    ) -> LlmResult<ChatResponse> {
        let prompt = messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let mut options = serde_json::Map::new();
        if max_tokens > 0 {
            options.insert("max_tokens".to_string(), max_tokens.into());
        }

        let reply = self.session.send_prompt(&prompt, options).await?;
        let content = reply_text(&reply)
            .ok_or_else(|| LlmError::parse("conversation reply has no text"))?;
        Ok(ChatResponse::text(content))
    }
}
