//! Non-streaming chat completion against external LLM providers.
//!
//! OpenAI and Groq share the `/chat/completions` format. Anthropic uses
//! `/messages` with the system prompt carried outside the message list.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::{ActiveProvider, LLMConfig};
use crate::service::{Completion, ServiceError, SummarizationService};
use crate::types::{ChatMessage, LLMProvider};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Provider API base URLs. Overridable so tests can point at a local server.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub openai: String,
    pub groq: String,
    pub anthropic: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            openai: "https://api.openai.com/v1".into(),
            groq: "https://api.groq.com/openai/v1".into(),
            anthropic: "https://api.anthropic.com/v1".into(),
        }
    }
}

impl Endpoints {
    fn base(&self, provider: LLMProvider) -> &str {
        match provider {
            LLMProvider::OpenAI => &self.openai,
            LLMProvider::Groq => &self.groq,
            LLMProvider::Anthropic => &self.anthropic,
        }
    }
}

/// [`SummarizationService`] backed by whichever provider the live config resolves to.
pub struct ProviderService {
    client: Client,
    config: Arc<RwLock<LLMConfig>>,
    endpoints: Endpoints,
}

impl ProviderService {
    pub fn new(config: Arc<RwLock<LLMConfig>>) -> Self {
        Self::with_endpoints(config, Endpoints::default())
    }

    pub fn with_endpoints(config: Arc<RwLock<LLMConfig>>, endpoints: Endpoints) -> Self {
        Self {
            client: Client::new(),
            config,
            endpoints,
        }
    }
}

#[async_trait]
impl SummarizationService for ProviderService {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<Completion, ServiceError> {
        // Snapshot so the lock is never held across an await.
        let (active, temperature, max_tokens) = {
            let config = self.config.read();
            let active = config.resolve_provider().ok_or(ServiceError::NotConfigured)?;
            (active, config.temperature, config.max_tokens)
        };
        let ActiveProvider {
            provider,
            model,
            api_key,
        } = active;

        debug!("Completion from {} with model {}", provider, model);

        let base = self.endpoints.base(provider);
        let text = match provider {
            LLMProvider::OpenAI | LLMProvider::Groq => {
                let body = json!({
                    "model": model,
                    "messages": messages
                        .iter()
                        .map(|m| json!({"role": m.role, "content": m.content}))
                        .collect::<Vec<_>>(),
                    "temperature": temperature,
                    "max_tokens": max_tokens,
                });
                let request = self
                    .client
                    .post(format!("{}/chat/completions", base))
                    .header("Authorization", format!("Bearer {}", api_key))
                    .json(&body);
                parse_openai_response(&send(request).await?)?
            }
            LLMProvider::Anthropic => {
                let request = self
                    .client
                    .post(format!("{}/messages", base))
                    .header("x-api-key", &api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&anthropic_body(&messages, &model, temperature, max_tokens));
                parse_anthropic_response(&send(request).await?)?
            }
        };

        Ok(Completion { text, model })
    }
}

async fn send(request: reqwest::RequestBuilder) -> Result<Value, ServiceError> {
    let response = request
        .send()
        .await
        .map_err(|e| ServiceError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!("Provider returned {}", status);
        return Err(ServiceError::Api {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| ServiceError::Malformed(e.to_string()))
}

fn anthropic_body(messages: &[ChatMessage], model: &str, temperature: f32, max_tokens: u32) -> Value {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == "system")
        .map(|m| m.content.as_str())
        .collect();

    let conv: Vec<Value> = messages
        .iter()
        .filter(|m| m.role != "system")
        .map(|m| json!({"role": m.role, "content": m.content}))
        .collect();

    let mut body = json!({
        "model": model,
        "messages": conv,
        "temperature": temperature,
        "max_tokens": max_tokens,
    });
    if !system.is_empty() {
        body["system"] = json!(system.join("\n\n"));
    }
    body
}

/// First choice's message content. Null or absent content is empty text.
pub fn parse_openai_response(body: &Value) -> Result<String, ServiceError> {
    let choice = body["choices"]
        .as_array()
        .and_then(|choices| choices.first())
        .ok_or_else(|| ServiceError::Malformed("response has no choices".into()))?;

    Ok(choice["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string())
}

/// Concatenated text blocks of a Messages API response.
pub fn parse_anthropic_response(body: &Value) -> Result<String, ServiceError> {
    let blocks = body["content"]
        .as_array()
        .ok_or_else(|| ServiceError::Malformed("response has no content".into()))?;

    Ok(blocks
        .iter()
        .filter(|b| b["type"] == "text")
        .filter_map(|b| b["text"].as_str())
        .collect::<Vec<_>>()
        .join(""))
}

/// Test an API key by making a minimal request.
pub async fn test_api_key(endpoints: &Endpoints, provider: &str, api_key: &str) -> Result<(), String> {
    let client = Client::new();

    match LLMProvider::from_name(provider) {
        Some(p @ (LLMProvider::OpenAI | LLMProvider::Groq)) => {
            let resp = client
                .get(format!("{}/models", endpoints.base(p)))
                .header("Authorization", format!("Bearer {}", api_key))
                .send()
                .await
                .map_err(|e| e.to_string())?;
            if resp.status().is_success() {
                Ok(())
            } else {
                Err(format!("API returned status {}", resp.status()))
            }
        }
        Some(LLMProvider::Anthropic) => {
            let resp = client
                .post(format!("{}/messages", endpoints.anthropic))
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&json!({
                    "model": "claude-3-5-haiku-20241022",
                    "max_tokens": 1,
                    "messages": [{"role": "user", "content": "Hi"}],
                }))
                .send()
                .await
                .map_err(|e| e.to_string())?;
            // 400 with a valid key is a model or quota problem, not auth
            if resp.status().is_success() || resp.status().as_u16() == 400 {
                Ok(())
            } else {
                Err(format!("API returned status {}", resp.status()))
            }
        }
        None => Err(format!("Unknown provider: {}", provider)),
    }
}
