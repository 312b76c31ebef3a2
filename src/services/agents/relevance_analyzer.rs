use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::models::cache::{CachePolicy, CacheableValue};
use crate::models::relevance::{ContextRule, RelevanceLevel, RelevanceResult};
use crate::models::search::SearchParameters;
use crate::services::cache::{CacheGateway, Message};
use crate::services::json_extract::extract_json_value;
use crate::services::llm_providers::{ChatMessage, ChatOptions, LlmProvider};
use crate::utils::error::ApiError;

const HIGHLY_RELEVANT_THRESHOLD: u32 = 80;
const RELEVANT_THRESHOLD: u32 = 60;
const POTENTIALLY_RELEVANT_THRESHOLD: u32 = 40;
/// Fraction of a trace's lines an ignore pattern must occupy before the
/// trace is auto-classified `ignored`, bypassing the LLM call entirely.
/// Grounded verbatim on `verify_agent.py`'s hardcoded `0.3`.
const IGNORE_SATURATION_RATIO: f64 = 0.30;

/// Loads and matches context rules (CSV-backed), auto-creating a default
/// rule file the first time it's needed. Grounded on
/// `verify_agent.py::RAGContextManager`.
pub struct ContextRuleTable {
    rules: Vec<ContextRule>,
}

impl ContextRuleTable {
    pub fn load_or_create_default(path: &Path) -> std::io::Result<Self> {
        if !path.exists() {
            Self::write_default(path)?;
        }
        let mut reader = csv::Reader::from_path(path)?;
        let rules: Vec<ContextRule> = reader.deserialize().filter_map(|r| r.ok()).collect();
        Ok(Self { rules })
    }

    fn write_default(path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path)?;
        writer.serialize(ContextRule {
            id: "1".to_string(),
            context: "mfs".to_string(),
            important: "processPayment,transferMoney,balanceInquiry".to_string(),
            ignore: "MFS_TRANSFER_STATUS_UPDATE_SCHEDULER_INVOCATION_TOPIC,HEARTBEAT,HEALTH_CHECK"
                .to_string(),
            description: "Mobile financial services core operations".to_string(),
        })?;
        writer.flush()
    }

    /// Rules whose `context` tag matches `domain` or any `query_keys`
    /// entry, case-insensitively, in either substring direction. Grounded
    /// on `verify_agent.py::get_relevant_rules`.
    pub fn relevant_rules(&self, domain: Option<&str>, query_keys: &[String]) -> Vec<&ContextRule> {
        let domain_lower = domain.map(|d| d.to_lowercase());
        let keys_lower: Vec<String> = query_keys.iter().map(|k| k.to_lowercase()).collect();

        self.rules
            .iter()
            .filter(|rule| {
                let ctx = rule.context.to_lowercase();
                let domain_match = domain_lower.as_ref().is_some_and(|d| d == &ctx || d.contains(&ctx) || ctx.contains(d));
                let key_match =
                    keys_lower.iter().any(|k| k == &ctx || k.contains(&ctx) || ctx.contains(k));
                domain_match || key_match
            })
            .collect()
    }
}

/// Checks whether `trace_content` should be auto-classified `ignored`
/// without an LLM call: any ignore pattern occupying at least
/// `IGNORE_SATURATION_RATIO` of the trace's lines short-circuits to `true`
/// immediately; otherwise every rule's patterns are still scanned (so
/// `ignored_patterns` reflects every match, even sub-threshold ones) before
/// returning `false`. Grounded verbatim on
/// `verify_agent.py::should_ignore_trace`, including this short-circuit
/// nuance.
pub fn should_ignore_trace(trace_content: &str, relevant_rules: &[&ContextRule]) -> (bool, Vec<String>) {
    let total_lines = trace_content.lines().count().max(1);
    let mut ignored_patterns = Vec::new();
    let mut should_ignore = false;

    for rule in relevant_rules {
        for term in rule.ignore_patterns() {
            let occurrences = count_occurrences_case_insensitive(trace_content, &term);
            if occurrences > 0 {
                ignored_patterns.push(format!("{}:{}", rule.context, term));
                if !should_ignore && occurrences as f64 >= total_lines as f64 * IGNORE_SATURATION_RATIO
                {
                    should_ignore = true;
                }
            }
        }
    }
    (should_ignore, ignored_patterns)
}

fn count_occurrences_case_insensitive(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    let haystack_lower = haystack.to_lowercase();
    let needle_lower = needle.to_lowercase();
    haystack_lower.matches(needle_lower.as_str()).count()
}

pub fn important_patterns(relevant_rules: &[&ContextRule]) -> Vec<String> {
    relevant_rules.iter().flat_map(|r| r.important_patterns()).collect()
}

fn bucket(score: u32) -> RelevanceLevel {
    if score >= HIGHLY_RELEVANT_THRESHOLD {
        RelevanceLevel::HighlyRelevant
    } else if score >= RELEVANT_THRESHOLD {
        RelevanceLevel::Relevant
    } else if score >= POTENTIALLY_RELEVANT_THRESHOLD {
        RelevanceLevel::PotentiallyRelevant
    } else {
        RelevanceLevel::NotRelevant
    }
}

#[derive(Debug, serde::Deserialize)]
struct LlmRelevanceJudgment {
    relevance_score: i64,
    #[serde(default)]
    confidence_score: i64,
    #[serde(default)]
    matching_elements: Vec<String>,
    #[serde(default)]
    non_matching_elements: Vec<String>,
    #[serde(default)]
    key_findings: Vec<String>,
    #[serde(default)]
    recommendation: String,
}

/// Scores each trace for relevance to the original prompt: a rule-driven
/// pre-filter (`ignored`) short-circuits the LLM call entirely; everything
/// else is scored by the LLM and bucketed into one of four relevance
/// levels. Grounded on
/// `original_source/app/agents/verify_agent.py::RelevanceAnalyzerAgent`.
pub struct RelevanceAnalyzer {
    provider: Arc<dyn LlmProvider>,
    model_id: String,
    gateway: Arc<CacheGateway>,
}

impl RelevanceAnalyzer {
    pub fn new(provider: Arc<dyn LlmProvider>, model_id: impl Into<String>, gateway: Arc<CacheGateway>) -> Self {
        Self { provider, model_id: model_id.into(), gateway }
    }

    pub async fn analyze_trace_relevance(
        &self,
        original_text: &str,
        parameters: &SearchParameters,
        rules: &ContextRuleTable,
        file_path: &str,
        trace_id: &str,
        trace_content: &str,
        cache_policy: &CachePolicy,
    ) -> RelevanceResult {
        let start = Instant::now();
        let relevant_rules = rules.relevant_rules(parameters.domain.as_deref(), &parameters.query_keys);
        let (ignored, ignored_patterns) = should_ignore_trace(trace_content, &relevant_rules);

        if ignored {
            return RelevanceResult {
                file_path: file_path.to_string(),
                trace_id: trace_id.to_string(),
                relevance_level: RelevanceLevel::Ignored,
                relevance_score: 0,
                confidence_score: 100,
                matching_elements: vec![],
                non_matching_elements: vec![],
                key_findings: vec!["Trace matched an ignore rule pre-filter".to_string()],
                recommendation: "No further review needed".to_string(),
                analysis_timestamp: Utc::now(),
                processing_time_ms: start.elapsed().as_millis() as u64,
                applied_rules: relevant_rules.iter().map(|r| r.id.clone()).collect(),
                ignored_patterns,
            };
        }

        let judgment = if self.provider.is_available() {
            self.llm_score(original_text, parameters, trace_content, cache_policy).await
        } else {
            None
        };

        // Clamped to [0, 100]: the model can return out-of-range scores.
        // Mirrors `verify_agent.py`'s `max(0, min(100, ...))` on both fields.
        let (score, confidence, matching, non_matching, findings, recommendation) = match judgment {
            Some(j) => (
                j.relevance_score.clamp(0, 100) as u32,
                j.confidence_score.clamp(0, 100) as u32,
                j.matching_elements,
                j.non_matching_elements,
                j.key_findings,
                j.recommendation,
            ),
            None => (0, 0, vec![], vec![], vec!["Relevance scoring unavailable".to_string()], "Manual review required".to_string()),
        };

        RelevanceResult {
            file_path: file_path.to_string(),
            trace_id: trace_id.to_string(),
            relevance_level: bucket(score),
            relevance_score: score,
            confidence_score: confidence,
            matching_elements: matching,
            non_matching_elements: non_matching,
            key_findings: findings,
            recommendation,
            analysis_timestamp: Utc::now(),
            processing_time_ms: start.elapsed().as_millis() as u64,
            applied_rules: relevant_rules.iter().map(|r| r.id.clone()).collect(),
            ignored_patterns,
        }
    }

    async fn llm_score(
        &self,
        original_text: &str,
        parameters: &SearchParameters,
        trace_content: &str,
        cache_policy: &CachePolicy,
    ) -> Option<LlmRelevanceJudgment> {
        let system_prompt = relevance_system_prompt();
        let user_prompt = serde_json::json!({
            "original_text": original_text,
            "parameters": parameters,
            "trace_content": trace_content,
        })
        .to_string();

        let messages =
            vec![Message { role: "system".to_string(), content: system_prompt.clone() }, Message {
                role: "user".to_string(),
                content: user_prompt.clone(),
            }];
        let options = serde_json::Map::new();

        let provider = self.provider.clone();
        let model_id = self.model_id.clone();

        let result = self
            .gateway
            .cached("relevance_analysis", &self.model_id, &messages, &options, 14_400, cache_policy, move || async move {
                let chat_options = ChatOptions { json_mode: true, ..Default::default() };
                let chat_messages = vec![
                    ChatMessage { role: "system".to_string(), content: system_prompt },
                    ChatMessage { role: "user".to_string(), content: user_prompt },
                ];
                let response = provider
                    .chat(&model_id, &chat_messages, &chat_options)
                    .await
                    .map_err(|e| ApiError::llm(e.to_string()))?;
                let value = extract_json_value(&response.content)
                    .ok_or_else(|| ApiError::llm("relevance response was not valid JSON".to_string()))?;
                Ok(CacheableValue::new(value))
            })
            .await
            .ok()?;

        serde_json::from_value(result.0).ok()
    }
}

fn relevance_system_prompt() -> String {
    "You score how relevant a distributed trace's log content is to a banking dispute \
     investigation prompt. Respond with JSON only: {\"relevance_score\": 0-100, \
     \"confidence_score\": 0-100, \"matching_elements\": [\"...\"], \"non_matching_elements\": [\"...\"], \
     \"key_findings\": [\"...\"], \"recommendation\": \"string\"}."
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(context: &str, ignore: &str) -> ContextRule {
        ContextRule {
            id: "1".to_string(),
            context: context.to_string(),
            important: String::new(),
            ignore: ignore.to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn bucket_thresholds_match_spec() {
        assert_eq!(bucket(80), RelevanceLevel::HighlyRelevant);
        assert_eq!(bucket(60), RelevanceLevel::Relevant);
        assert_eq!(bucket(40), RelevanceLevel::PotentiallyRelevant);
        assert_eq!(bucket(39), RelevanceLevel::NotRelevant);
    }

    #[test]
    fn ignore_shortcut_fires_once_saturation_crossed() {
        let rules = vec![rule("mfs", "HEARTBEAT")];
        let refs: Vec<&ContextRule> = rules.iter().collect();
        // 10 lines, 5 contain HEARTBEAT => 50% >= 30% threshold
        let content = (0..10)
            .map(|i| if i % 2 == 0 { "HEARTBEAT ping" } else { "normal log line" })
            .collect::<Vec<_>>()
            .join("\n");
        let (ignored, patterns) = should_ignore_trace(&content, &refs);
        assert!(ignored);
        assert!(patterns.iter().any(|p| p.contains("HEARTBEAT")));
    }

    #[test]
    fn below_threshold_patterns_still_recorded_but_not_ignored() {
        let rules = vec![rule("mfs", "HEARTBEAT")];
        let refs: Vec<&ContextRule> = rules.iter().collect();
        let content = (0..10)
            .map(|i| if i == 0 { "HEARTBEAT ping" } else { "normal log line" })
            .collect::<Vec<_>>()
            .join("\n");
        let (ignored, patterns) = should_ignore_trace(&content, &refs);
        assert!(!ignored);
        assert_eq!(patterns, vec!["mfs:HEARTBEAT".to_string()]);
    }
}
