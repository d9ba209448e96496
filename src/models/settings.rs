//! Settings Models
//!
//! Persisted add-on preferences and the provider config derived from them.

use mailprompt_core::{default_prompts, merge_prompts, PromptTemplate};
use mailprompt_llm::ProviderConfig;
use serde::{Deserialize, Serialize};

/// Longest prompt, in characters, that is ever sent to a provider.
pub const MAX_PROMPT_CHARS: usize = 30_000;

/// Connection types a user can pick in the options page.
pub const CONNECTION_TYPES: &[&str] = &[
    "chatgpt_web",
    "chatgpt_api",
    "google_gemini_api",
    "ollama_api",
    "openai_comp_api",
];

/// Who a generated reply is addressed to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyType {
    #[default]
    ReplyAll,
    ReplySender,
}

/// Application configuration stored in config.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Active connection type, one of [`CONNECTION_TYPES`]
    pub connection_type: String,

    pub chatgpt_web_url: String,
    /// Completion polling ceiling for the web kind; `0` disables it
    pub chatgpt_web_timeout_secs: Option<u64>,
    /// `Cookie` header of a logged-in browser session, for the session API
    pub chatgpt_web_session_cookie: String,

    pub chatgpt_api_key: String,
    pub chatgpt_model: String,

    pub google_gemini_api_key: String,
    pub google_gemini_model: String,
    pub google_gemini_system_instruction: String,

    pub ollama_host: String,
    pub ollama_model: String,

    pub openai_comp_host: String,
    pub openai_comp_model: String,
    pub openai_comp_api_key: String,
    pub openai_comp_use_v1: bool,
    pub openai_comp_chat_name: String,

    /// Stream answers token by token
    pub streaming: bool,
    /// Answer length limit; `0` leaves it to the provider
    pub max_tokens: u32,
    pub reply_type: ReplyType,
    /// Replace unknown placeholders with an empty string
    pub placeholders_use_default_value: bool,
    pub do_debug: bool,
    /// User-edited and user-created prompts, merged over the defaults by id
    pub custom_prompts: Vec<PromptTemplate>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            connection_type: "chatgpt_web".to_string(),
            chatgpt_web_url: "https://chatgpt.com".to_string(),
            chatgpt_web_timeout_secs: None,
            chatgpt_web_session_cookie: String::new(),
            chatgpt_api_key: String::new(),
            chatgpt_model: String::new(),
            google_gemini_api_key: String::new(),
            google_gemini_model: String::new(),
            google_gemini_system_instruction: String::new(),
            ollama_host: String::new(),
            ollama_model: String::new(),
            openai_comp_host: String::new(),
            openai_comp_model: String::new(),
            openai_comp_api_key: String::new(),
            openai_comp_use_v1: true,
            openai_comp_chat_name: "OpenAI Comp".to_string(),
            streaming: true,
            max_tokens: 0,
            reply_type: ReplyType::ReplyAll,
            placeholders_use_default_value: false,
            do_debug: false,
            custom_prompts: Vec::new(),
        }
    }
}

/// Settings update request (partial update)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SettingsUpdate {
    pub connection_type: Option<String>,
    pub chatgpt_web_url: Option<String>,
    pub chatgpt_web_timeout_secs: Option<u64>,
    pub chatgpt_web_session_cookie: Option<String>,
    pub chatgpt_api_key: Option<String>,
    pub chatgpt_model: Option<String>,
    pub google_gemini_api_key: Option<String>,
    pub google_gemini_model: Option<String>,
    pub google_gemini_system_instruction: Option<String>,
    pub ollama_host: Option<String>,
    pub ollama_model: Option<String>,
    pub openai_comp_host: Option<String>,
    pub openai_comp_model: Option<String>,
    pub openai_comp_api_key: Option<String>,
    pub openai_comp_use_v1: Option<bool>,
    pub openai_comp_chat_name: Option<String>,
    pub streaming: Option<bool>,
    pub max_tokens: Option<u32>,
    pub reply_type: Option<ReplyType>,
    pub placeholders_use_default_value: Option<bool>,
    pub do_debug: Option<bool>,
    pub custom_prompts: Option<Vec<PromptTemplate>>,
}

macro_rules! apply_fields {
    ($target:expr, $update:expr, $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = $update.$field {
                $target.$field = value;
            }
        )+
    };
}

impl Settings {
    /// Apply a partial update to the configuration
    pub fn apply_update(&mut self, update: SettingsUpdate) {
        if let Some(secs) = update.chatgpt_web_timeout_secs {
            self.chatgpt_web_timeout_secs = Some(secs);
        }
        apply_fields!(
            self,
            update,
            connection_type,
            chatgpt_web_url,
            chatgpt_web_session_cookie,
            chatgpt_api_key,
            chatgpt_model,
            google_gemini_api_key,
            google_gemini_model,
            google_gemini_system_instruction,
            ollama_host,
            ollama_model,
            openai_comp_host,
            openai_comp_model,
            openai_comp_api_key,
            openai_comp_use_v1,
            openai_comp_chat_name,
            streaming,
            max_tokens,
            reply_type,
            placeholders_use_default_value,
            do_debug,
            custom_prompts,
        );
    }

    /// Validate the configuration
    ///
    /// Only the structure is checked here. Blank provider fields are allowed
    /// on disk and reported when a chat window is initialized.
    pub fn validate(&self) -> Result<(), String> {
        if !CONNECTION_TYPES.contains(&self.connection_type.as_str()) {
            return Err(format!(
                "Invalid connection_type: {}. Must be one of {}",
                self.connection_type,
                CONNECTION_TYPES.join(", ")
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for prompt in &self.custom_prompts {
            if prompt.id.trim().is_empty() {
                return Err("custom prompt with an empty id".to_string());
            }
            if !seen.insert(prompt.id.as_str()) {
                return Err(format!("duplicate custom prompt id: {}", prompt.id));
            }
        }

        Ok(())
    }

    /// Build the provider config for the selected connection type.
    pub fn active_provider_config(&self) -> Result<ProviderConfig, String> {
        let stream = self.streaming;
        let config = match self.connection_type.as_str() {
            "chatgpt_web" => ProviderConfig::ChatgptWeb {
                url: self.chatgpt_web_url.clone(),
                timeout_secs: self.chatgpt_web_timeout_secs,
                stream,
                session_cookie: Some(self.chatgpt_web_session_cookie.clone())
                    .filter(|c| !c.trim().is_empty()),
            },
            "chatgpt_api" => ProviderConfig::ChatgptApi {
                api_key: self.chatgpt_api_key.clone(),
                model: self.chatgpt_model.clone(),
                stream,
                base_url: None,
            },
            "google_gemini_api" => ProviderConfig::GoogleGeminiApi {
                api_key: self.google_gemini_api_key.clone(),
                model: self.google_gemini_model.clone(),
                system_instruction: Some(self.google_gemini_system_instruction.clone())
                    .filter(|s| !s.trim().is_empty()),
                stream,
                base_url: None,
            },
            "ollama_api" => ProviderConfig::OllamaApi {
                host: self.ollama_host.clone(),
                model: self.ollama_model.clone(),
                stream,
            },
            "openai_comp_api" => ProviderConfig::OpenaiCompatibleApi {
                host: self.openai_comp_host.clone(),
                model: self.openai_comp_model.clone(),
                api_key: self.openai_comp_api_key.clone(),
                use_v1: self.openai_comp_use_v1,
                stream,
                chat_name: self.openai_comp_chat_name.clone(),
            },
            other => return Err(format!("Unknown connection_type: {}", other)),
        };
        Ok(config)
    }

    /// Built-in prompts with the user's edits applied.
    pub fn prompts(&self) -> Vec<PromptTemplate> {
        merge_prompts(default_prompts(), &self.custom_prompts)
    }
}
