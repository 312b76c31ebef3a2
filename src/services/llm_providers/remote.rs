use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::utils::error::ApiError;

use super::{ChatMessage, ChatOptions, ChatResponseMessage, LlmProvider};
use async_trait::async_trait;

/// Remote OpenAI-compatible chat-completions gateway (works against OpenAI,
/// Azure OpenAI, DeepSeek, and other compatible endpoints). Grounded
/// directly on the teacher's `services::llm::client::LLMClient`.
pub struct RemoteGatewayProvider {
    http: Client,
    api_base: String,
    api_key: String,
}

impl RemoteGatewayProvider {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: Client::builder().timeout(Duration::from_secs(120)).build().expect("http client builds"),
            api_base: api_base.into(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[async_trait]
impl LlmProvider for RemoteGatewayProvider {
    fn provider_name(&self) -> &str {
        "remote_gateway"
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn chat(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatResponseMessage, ApiError> {
        let timeout = Duration::from_secs(options.timeout_secs.unwrap_or(120));
        let body = ChatCompletionRequest {
            model: model_id,
            messages,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            response_format: options
                .json_mode
                .then(|| ResponseFormat { r#type: "json_object".to_string() }),
        };

        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ApiError::llm(format!("remote gateway timed out after {}s", timeout.as_secs()))
                } else {
                    ApiError::llm(format!("remote gateway request failed: {e}"))
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(ApiError::llm(format!("rate limited, retry after {retry_after}s")));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            return Err(ApiError::llm(format!("remote gateway returned {status}: {text}")));
        }

        let parsed: ChatCompletionResponse =
            response.json().await.map_err(|e| ApiError::llm(format!("malformed chat response: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| ApiError::llm("empty choices array in chat response".to_string()))
    }
}
