use std::sync::Arc;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::search::SearchParameters;
use crate::services::json_extract::extract_json_value;
use crate::services::llm_providers::{ChatMessage, ChatOptions, LlmProvider};

/// Domain keywords the prompt may mention literally; any of these found
/// case-insensitively in the raw text are merged into the extracted domain
/// set even if the LLM didn't surface them. Grounded verbatim on
/// `original_source/app/agents/parameter_agent.py::DOMAIN_KEYWORDS`.
pub const DOMAIN_KEYWORDS: &[&str] =
    &["NPSB", "BEFTN", "FUNDFTRANSFER", "PAYMENT", "BKASH", "QR"];

pub const ALLOWED_QUERY_KEYS: &[&str] = &[
    "merchant", "amount", "transaction_id", "customer_id", "mfs", "bkash", "nagad", "upay",
    "rocket", "qr", "npsb", "beftn", "fund_transfer", "payment", "balance", "fee", "status",
    "product_id", "category", "rating", "review_text", "user_id",
];

pub const EXCLUDED_QUERY_KEYS: &[&str] = &[
    "password", "token", "secret", "api_key", "private_key", "internal_id", "system_log",
    "debug_info", "date", "amount",
];

static RE_DDMMYYYY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{1,2}\.\d{1,2}\.\d{4}\b").unwrap());
static RE_LONG_NUMERIC_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{10,}\b").unwrap());

/// Extracts structured `SearchParameters` from a free-text investigation
/// prompt. Grounded precisely on
/// `original_source/app/agents/parameter_agent.py::ParametersAgent`.
pub struct ParameterAgent {
    provider: Arc<dyn LlmProvider>,
    model_id: String,
}

impl ParameterAgent {
    pub fn new(provider: Arc<dyn LlmProvider>, model_id: impl Into<String>) -> Self {
        Self { provider, model_id: model_id.into() }
    }

    pub async fn run(&self, text: &str) -> SearchParameters {
        if !self.provider.is_available() {
            return self.fallback(text);
        }

        let system_prompt = build_system_prompt();
        let messages =
            vec![ChatMessage { role: "system".to_string(), content: system_prompt }, ChatMessage {
                role: "user".to_string(),
                content: text.to_string(),
            }];
        let options = ChatOptions { json_mode: true, temperature: Some(0.0), ..Default::default() };

        match self.provider.chat(&self.model_id, &messages, &options).await {
            Ok(response) => match extract_json_value(&response.content) {
                Some(value) => self.normalize(value, text),
                None => self.fallback(text),
            },
            Err(_) => self.fallback(text),
        }
    }

    fn normalize(&self, value: serde_json::Value, original_text: &str) -> SearchParameters {
        let time_frame = value
            .get("time_frame")
            .and_then(|v| v.as_str())
            .map(|s| normalize_date(s).unwrap_or_else(|| s.to_string()));

        let mut domain_parts: Vec<String> = value
            .get("domain")
            .map(|v| match v {
                serde_json::Value::String(s) => vec![s.clone()],
                serde_json::Value::Array(items) => {
                    items.iter().filter_map(|i| i.as_str().map(|s| s.to_string())).collect()
                },
                _ => Vec::new(),
            })
            .unwrap_or_default();

        merge_domain_keywords(&mut domain_parts, original_text);

        let query_keys = value
            .get("query_keys")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().filter_map(|i| i.as_str().map(|s| s.to_string())).collect())
            .unwrap_or_default();

        SearchParameters {
            time_frame,
            domain: if domain_parts.is_empty() { None } else { Some(domain_parts.join(",")) },
            query_keys,
        }
    }

    /// Regex-only extraction used when no LLM is available, or when the
    /// LLM's output could not be parsed as JSON. Grounded on
    /// `parameter_agent.py::ParametersAgent._fallback`.
    fn fallback(&self, text: &str) -> SearchParameters {
        let time_frame =
            RE_DDMMYYYY.find(text).map(|m| normalize_date(m.as_str()).unwrap_or_else(|| m.as_str().to_string()));

        let upper = text.to_uppercase();
        let mut domain_parts = Vec::new();
        merge_domain_keywords(&mut domain_parts, &upper);

        let query_keys = RE_LONG_NUMERIC_ID.find_iter(text).map(|m| m.as_str().to_string()).collect();

        SearchParameters {
            time_frame,
            domain: if domain_parts.is_empty() { None } else { Some(domain_parts.join(",")) },
            query_keys,
        }
    }
}

/// Merges literal, case-insensitive `DOMAIN_KEYWORDS` matches found in
/// `text` into `domain_parts`, preserving first-seen order and
/// deduplicating, matching the original's `dict.fromkeys(forced + existing)`
/// idiom.
fn merge_domain_keywords(domain_parts: &mut Vec<String>, text: &str) {
    let upper = text.to_uppercase();
    let mut merged = Vec::new();
    for keyword in DOMAIN_KEYWORDS {
        if upper.contains(keyword) && !merged.iter().any(|m: &String| m == keyword) {
            merged.push(keyword.to_string());
        }
    }
    for existing in domain_parts.drain(..) {
        if !merged.iter().any(|m| m == &existing) {
            merged.push(existing);
        }
    }
    *domain_parts = merged;
}

/// Normalizes a date string to ISO `YYYY-MM-DD`, dayfirst. Returns `None`
/// (caller falls back to the original string) on total parse failure,
/// matching `_normalize_date`'s fallback-to-original behavior.
fn normalize_date(raw: &str) -> Option<String> {
    for fmt in ["%d.%m.%Y", "%d/%m/%Y", "%Y-%m-%d", "%d-%m-%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw.trim(), fmt) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    None
}

fn build_system_prompt() -> String {
    format!(
        "You extract structured search parameters from a banking dispute investigation prompt. \
         Respond with JSON only: {{\"time_frame\": \"DD.MM.YYYY or null\", \"domain\": \"string or null\", \
         \"query_keys\": [\"...\"]}}. Allowed query keys: {}. Never use: {}.",
        ALLOWED_QUERY_KEYS.join(", "),
        EXCLUDED_QUERY_KEYS.join(", "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct UnavailableProvider;

    #[async_trait::async_trait]
    impl LlmProvider for UnavailableProvider {
        fn provider_name(&self) -> &str {
            "unavailable"
        }
        fn is_available(&self) -> bool {
            false
        }
        async fn chat(
            &self,
            _model_id: &str,
            _messages: &[ChatMessage],
            _options: &ChatOptions,
        ) -> Result<crate::services::llm_providers::ChatResponseMessage, crate::utils::error::ApiError>
        {
            unreachable!("provider is unavailable")
        }
    }

    #[tokio::test]
    async fn falls_back_to_regex_when_no_provider_available() {
        let agent = ParameterAgent::new(Arc::new(UnavailableProvider), "test-model");
        let params = agent.run("Dispute on 05.03.2026 about NPSB transfer id 1234567890123").await;
        assert_eq!(params.time_frame.as_deref(), Some("2026-03-05"));
        assert_eq!(params.domain.as_deref(), Some("NPSB"));
        assert_eq!(params.query_keys, vec!["1234567890123".to_string()]);
    }

    #[test]
    fn normalize_date_parses_dayfirst_formats() {
        assert_eq!(normalize_date("05.03.2026"), Some("2026-03-05".to_string()));
        assert_eq!(normalize_date("not a date"), None);
    }
}
