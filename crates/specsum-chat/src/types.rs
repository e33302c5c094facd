//! Provider identifiers, chat messages and the config wire types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LLMProvider {
    OpenAI,
    Groq,
    Anthropic,
}

impl LLMProvider {
    /// Order in which `auto` mode tries configured keys.
    pub const PRIORITY: [LLMProvider; 3] =
        [LLMProvider::OpenAI, LLMProvider::Groq, LLMProvider::Anthropic];

    pub fn as_str(self) -> &'static str {
        match self {
            LLMProvider::OpenAI => "openai",
            LLMProvider::Groq => "groq",
            LLMProvider::Anthropic => "anthropic",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::PRIORITY
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(name.trim()))
    }

    /// Environment variable consulted when no key is stored.
    pub fn key_env_var(self) -> &'static str {
        match self {
            LLMProvider::OpenAI => "OPENAI_API_KEY",
            LLMProvider::Groq => "GROQ_API_KEY",
            LLMProvider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role-tagged chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Per-provider entry of the public config view.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub provider: LLMProvider,
    pub configured: bool,
    pub model: String,
}

/// Public config view. Keys never leave the server.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LLMConfigResponse {
    pub preferred_provider: String,
    pub active_provider: Option<LLMProvider>,
    pub active_model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub providers: Vec<ProviderStatus>,
    pub available_models: Vec<String>,
}

/// Partial update: absent fields keep their value, an empty key clears it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LLMConfigUpdate {
    pub preferred_provider: Option<String>,
    #[serde(default)]
    pub api_keys: HashMap<LLMProvider, String>,
    #[serde(default)]
    pub models: HashMap<LLMProvider, String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestKeyRequest {
    pub provider: String,
    pub api_key: String,
}
