//! LLM configuration persistence and provider selection.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{LLMConfigResponse, LLMConfigUpdate, LLMProvider, ProviderStatus};

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_GROQ_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";

/// Models offered for a provider in the config view.
pub fn known_models(provider: LLMProvider) -> &'static [&'static str] {
    match provider {
        LLMProvider::OpenAI => &["gpt-4o", "gpt-4o-mini", "gpt-4-turbo", "gpt-4"],
        LLMProvider::Groq => &[
            "llama-3.3-70b-versatile",
            "llama-3.1-8b-instant",
            "mixtral-8x7b-32768",
        ],
        LLMProvider::Anthropic => &[
            "claude-sonnet-4-20250514",
            "claude-3-5-sonnet-20241022",
            "claude-3-5-haiku-20241022",
        ],
    }
}

fn default_model(provider: LLMProvider) -> &'static str {
    match provider {
        LLMProvider::OpenAI => DEFAULT_OPENAI_MODEL,
        LLMProvider::Groq => DEFAULT_GROQ_MODEL,
        LLMProvider::Anthropic => DEFAULT_ANTHROPIC_MODEL,
    }
}

/// Key and model for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
}

impl ProviderSettings {
    fn for_provider(provider: LLMProvider) -> Self {
        Self {
            api_key: None,
            model: default_model(provider).into(),
        }
    }
}

/// The provider a request will actually go to.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveProvider {
    pub provider: LLMProvider,
    pub model: String,
    pub api_key: String,
}

/// Stored LLM configuration (persisted to llm-config.json).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// `auto` or a provider name.
    #[serde(default = "default_preferred")]
    pub preferred_provider: String,
    #[serde(default = "default_openai")]
    pub openai: ProviderSettings,
    #[serde(default = "default_groq")]
    pub groq: ProviderSettings,
    #[serde(default = "default_anthropic")]
    pub anthropic: ProviderSettings,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(skip)]
    pub config_path: PathBuf,
}

fn default_preferred() -> String {
    "auto".into()
}
fn default_openai() -> ProviderSettings {
    ProviderSettings::for_provider(LLMProvider::OpenAI)
}
fn default_groq() -> ProviderSettings {
    ProviderSettings::for_provider(LLMProvider::Groq)
}
fn default_anthropic() -> ProviderSettings {
    ProviderSettings::for_provider(LLMProvider::Anthropic)
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    4096
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            preferred_provider: default_preferred(),
            openai: default_openai(),
            groq: default_groq(),
            anthropic: default_anthropic(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            config_path: PathBuf::new(),
        }
    }
}

impl LLMConfig {
    /// Load config from file, falling back to env vars and defaults.
    pub fn load(config_path: &Path) -> Self {
        Self::load_with_env(config_path, |key| std::env::var(key).ok())
    }

    pub fn load_with_env(config_path: &Path, env: impl Fn(&str) -> Option<String>) -> Self {
        let mut config: LLMConfig = std::fs::read_to_string(config_path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();

        config.config_path = config_path.to_path_buf();

        for provider in LLMProvider::PRIORITY {
            let settings = config.settings_mut(provider);
            if settings.api_key.is_none() {
                settings.api_key = env(provider.key_env_var()).filter(|k| !k.trim().is_empty());
            }
        }

        config
    }

    pub fn settings(&self, provider: LLMProvider) -> &ProviderSettings {
        match provider {
            LLMProvider::OpenAI => &self.openai,
            LLMProvider::Groq => &self.groq,
            LLMProvider::Anthropic => &self.anthropic,
        }
    }

    pub fn settings_mut(&mut self, provider: LLMProvider) -> &mut ProviderSettings {
        match provider {
            LLMProvider::OpenAI => &mut self.openai,
            LLMProvider::Groq => &mut self.groq,
            LLMProvider::Anthropic => &mut self.anthropic,
        }
    }

    /// Save config to disk.
    pub fn save(&self) -> specsum_core::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&self.config_path, json)?;
        info!("Saved LLM config to {}", self.config_path.display());
        Ok(())
    }

    /// Apply an update, merging with existing config.
    pub fn apply_update(&mut self, update: &LLMConfigUpdate) {
        if let Some(p) = &update.preferred_provider {
            self.preferred_provider = p.trim().to_ascii_lowercase();
        }
        for (&provider, key) in &update.api_keys {
            let key = key.trim();
            self.settings_mut(provider).api_key = (!key.is_empty()).then(|| key.to_string());
        }
        for (&provider, model) in &update.models {
            if !model.trim().is_empty() {
                self.settings_mut(provider).model = model.trim().to_string();
            }
        }
        if let Some(t) = update.temperature {
            self.temperature = t.clamp(0.0, 2.0);
        }
        if let Some(n) = update.max_tokens {
            self.max_tokens = n.max(1);
        }
    }

    fn active(&self, provider: LLMProvider) -> Option<ActiveProvider> {
        let settings = self.settings(provider);
        settings.api_key.as_ref().map(|key| ActiveProvider {
            provider,
            model: settings.model.clone(),
            api_key: key.clone(),
        })
    }

    /// An explicit preference without a key resolves to nothing; `auto`
    /// takes the first keyed provider in [`LLMProvider::PRIORITY`].
    pub fn resolve_provider(&self) -> Option<ActiveProvider> {
        if self.preferred_provider == "auto" {
            return LLMProvider::PRIORITY.into_iter().find_map(|p| self.active(p));
        }
        LLMProvider::from_name(&self.preferred_provider).and_then(|p| self.active(p))
    }

    /// Build the public config response (no API keys exposed).
    pub fn to_response(&self) -> LLMConfigResponse {
        let active = self.resolve_provider();
        LLMConfigResponse {
            preferred_provider: self.preferred_provider.clone(),
            active_provider: active.as_ref().map(|a| a.provider),
            active_model: active.map(|a| a.model),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            providers: LLMProvider::PRIORITY
                .into_iter()
                .map(|provider| {
                    let settings = self.settings(provider);
                    ProviderStatus {
                        provider,
                        configured: settings.api_key.is_some(),
                        model: settings.model.clone(),
                    }
                })
                .collect(),
            available_models: self.available_models(),
        }
    }

    /// Get available models for the active provider.
    pub fn available_models(&self) -> Vec<String> {
        self.resolve_provider()
            .map(|a| known_models(a.provider).iter().map(|s| s.to_string()).collect())
            .unwrap_or_default()
    }
}
