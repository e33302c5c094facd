//! The text-in/text-out seam between the pipeline and LLM providers.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::ChatMessage;

/// Generated text plus the model that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Empty when the provider returned no content.
    pub text: String,
    pub model: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("No LLM provider configured")]
    NotConfigured,

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

/// Any backend able to answer a role-tagged message list.
#[async_trait]
pub trait SummarizationService: Send + Sync {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<Completion, ServiceError>;
}
