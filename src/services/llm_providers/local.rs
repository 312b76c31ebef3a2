use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::utils::error::ApiError;

use super::{ChatMessage, ChatOptions, ChatResponseMessage, LlmProvider};
use async_trait::async_trait;

/// Local inference daemon provider: a same-host (or LAN) OpenAI-compatible
/// server with no bearer token, such as the Ollama-style daemon the original
/// Python implementation health-checks in `parameter_agent.py`
/// (`is_ollama_running`). `is_available()` here is a cheap config check
/// (host configured); callers that need a live reachability check should
/// issue a `chat` call and treat a connection error as unavailable.
pub struct LocalDaemonProvider {
    http: Client,
    host: String,
}

impl LocalDaemonProvider {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            http: Client::builder().timeout(Duration::from_secs(60)).build().expect("http client builds"),
            host: host.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[async_trait]
impl LlmProvider for LocalDaemonProvider {
    fn provider_name(&self) -> &str {
        "local_daemon"
    }

    fn is_available(&self) -> bool {
        !self.host.is_empty()
    }

    async fn chat(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatResponseMessage, ApiError> {
        let timeout = Duration::from_secs(options.timeout_secs.unwrap_or(60));
        let url = format!("{}/api/chat", self.host.trim_end_matches('/'));
        let body = ChatRequest { model: model_id, messages, stream: false };

        let response = self
            .http
            .post(&url)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::llm(format!("local daemon unreachable at {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(ApiError::llm(format!("local daemon returned {}", response.status())));
        }

        let parsed: ChatResponse =
            response.json().await.map_err(|e| ApiError::llm(format!("malformed local daemon response: {e}")))?;
        Ok(parsed.message)
    }
}
