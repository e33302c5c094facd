//! Chat-completion access to external LLM providers (OpenAI/Groq/Anthropic).
//!
//! The rest of the workspace only sees [`SummarizationService`]: a role-tagged
//! message list goes in, generated text comes out.

pub mod config;
pub mod providers;
pub mod service;
pub mod types;

pub use config::LLMConfig;
pub use providers::{Endpoints, ProviderService};
pub use service::{Completion, ServiceError, SummarizationService};
pub use types::*;
