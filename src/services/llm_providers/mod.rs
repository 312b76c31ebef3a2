pub mod local;
pub mod remote;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::utils::error::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponseMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatOptions {
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub json_mode: bool,
}

/// Uniform interface over concrete LLM backends. Generalized from the
/// teacher's `services::llm::client::LLMClient`, which talks to exactly one
/// OpenAI-compatible endpoint; this crate needs two concrete providers per
/// spec.md §4.6 ("a local inference daemon... and a remote OpenAI-compatible
/// gateway"), both reachable behind this one trait.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn provider_name(&self) -> &str;
    fn is_available(&self) -> bool;
    async fn chat(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatResponseMessage, ApiError>;
}
