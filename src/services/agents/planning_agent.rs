use std::sync::Arc;

use crate::models::cache::{CachePolicy, CacheableValue};
use crate::models::plan::PlanResponse;
use crate::models::search::SearchParameters;
use crate::services::cache::{CacheGateway, Message};
use crate::services::json_extract::extract_json_value;
use crate::services::llm_providers::{ChatMessage, ChatOptions, LlmProvider};
use crate::utils::error::ApiError;

/// Validates investigation feasibility before the full pipeline runs,
/// surfacing blocking questions when required parameters are missing.
/// Grounded precisely on
/// `original_source/app/agents/planning_agent.py::PlanningAgent`.
pub struct PlanningAgent {
    provider: Arc<dyn LlmProvider>,
    model_id: String,
    gateway: Arc<CacheGateway>,
}

impl PlanningAgent {
    pub fn new(provider: Arc<dyn LlmProvider>, model_id: impl Into<String>, gateway: Arc<CacheGateway>) -> Self {
        Self { provider, model_id: model_id.into(), gateway }
    }

    pub async fn run(
        &self,
        text: &str,
        project: &str,
        env: &str,
        domain: Option<&str>,
        extracted_params: &SearchParameters,
    ) -> PlanResponse {
        // Availability-gated, not JSON-validity-gated: this matches the
        // original's top-level `if not self.client or not
        // self.client.is_available(): return self._fallback(...)` branch.
        // See DESIGN.md "Planning agent fallback trigger".
        if !self.provider.is_available() {
            return self.fallback(text, extracted_params);
        }

        let messages = vec![
            Message { role: "system".to_string(), content: system_prompt() },
            Message { role: "user".to_string(), content: user_payload(text, project, env, domain, extracted_params) },
        ];
        let options = serde_json::Map::new();
        let policy = CachePolicy::enabled();

        let provider = self.provider.clone();
        let model_id = self.model_id.clone();
        let chat_messages: Vec<ChatMessage> = messages
            .iter()
            .map(|m| ChatMessage { role: m.role.clone(), content: m.content.clone() })
            .collect();

        let result = self
            .gateway
            .cached("planning", &self.model_id, &messages, &options, 600, &policy, move || async move {
                let chat_options = ChatOptions { json_mode: true, timeout_secs: Some(30), ..Default::default() };
                let response = provider
                    .chat(&model_id, &chat_messages, &chat_options)
                    .await
                    .map_err(|e| ApiError::llm(e.to_string()))?;
                let plan = extract_json_value(&response.content)
                    .and_then(|v| serde_json::from_value::<PlanResponse>(v).ok())
                    .ok_or_else(|| ApiError::llm("planning agent response was not valid JSON".to_string()))?;
                Ok(CacheableValue::new(serde_json::to_value(plan).expect("plan serializes")))
            })
            .await;

        match result {
            Ok((value, _diag)) => {
                serde_json::from_value(value).unwrap_or_else(|_| self.fallback(text, extracted_params))
            },
            Err(_) => self.fallback(text, extracted_params),
        }
    }

    fn fallback(&self, text: &str, params: &SearchParameters) -> PlanResponse {
        let mut blocking_questions = Vec::new();
        if params.time_frame.is_none() {
            blocking_questions.push("What time frame should the investigation cover?".to_string());
        }
        if params.query_keys.is_empty() {
            blocking_questions.push(
                "Which merchant, transaction id, or customer id does this dispute concern?".to_string(),
            );
        }
        let can_proceed = blocking_questions.is_empty();
        PlanResponse {
            plan_version: 1,
            goal: format!("Investigate: {text}"),
            can_proceed,
            blocking_questions,
            assumptions: vec!["No LLM planning provider was available; this plan was generated heuristically.".to_string()],
            steps: vec![],
            expected_artifacts: vec!["comprehensive analysis report".to_string(), "verification summary".to_string()],
            replan_triggers: vec![],
            warnings: if can_proceed { vec![] } else { vec!["Investigation cannot proceed until blocking questions are resolved.".to_string()] },
        }
    }
}

fn system_prompt() -> String {
    "You are a planning agent for a log forensics pipeline. Given an investigation prompt and \
     extracted parameters, respond with JSON only: {\"plan_version\": 1, \"goal\": \"string\", \
     \"can_proceed\": bool, \"blocking_questions\": [\"...\"], \"assumptions\": [\"...\"], \
     \"steps\": [{\"name\": \"string\", \"description\": \"string\"}], \"expected_artifacts\": [\"...\"], \
     \"replan_triggers\": [\"...\"], \"warnings\": [\"...\"]}. Set can_proceed to false and list \
     blocking_questions whenever time_frame or query_keys are missing."
        .to_string()
}

fn user_payload(
    text: &str,
    project: &str,
    env: &str,
    domain: Option<&str>,
    params: &SearchParameters,
) -> String {
    serde_json::json!({
        "text": text,
        "project": project,
        "env": env,
        "domain": domain,
        "extracted_parameters": params,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cache::GatewayConfig;

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
        ) -> Result<crate::services::llm_providers::ChatResponseMessage, ApiError> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn missing_time_frame_blocks_with_a_question() {
        let gateway = Arc::new(CacheGateway::new(GatewayConfig::default(), None));
        let agent = PlanningAgent::new(Arc::new(UnavailableProvider), "m", gateway);
        let params = SearchParameters { time_frame: None, domain: None, query_keys: vec![] };
        let plan = agent.run("investigate this", "proj", "prod", None, &params).await;
        assert!(!plan.can_proceed);
        assert!(!plan.blocking_questions.is_empty());
    }
}
