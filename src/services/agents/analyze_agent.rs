use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::models::cache::{CachePolicy, CacheableValue};
use crate::models::search::SearchParameters;
use crate::models::trace::TraceBundle;
use crate::services::cache::{CacheGateway, Message};
use crate::services::json_extract::extract_json_value;
use crate::services::llm_providers::{ChatMessage, ChatOptions, LlmProvider};
use crate::utils::error::ApiError;

/// Per-trace forensic analysis result. Field names match
/// `original_source/app/agents/analyze_agent.py::_analyze_single_trace`'s
/// prompt schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TraceAnalysis {
    pub relevance_score: u32,
    pub request_summary: String,
    pub transaction_outcome: String,
    pub failure_point: String,
    pub key_finding: String,
    pub primary_issue: String,
    pub confidence_level: String,
    #[serde(default)]
    pub evidence_found: Vec<String>,
    #[serde(default)]
    pub critical_indicators: Vec<String>,
    pub timeline_summary: String,
    pub customer_claim_assessment: String,
    pub root_cause_analysis: String,
    pub recommendation: String,
    pub technical_details: String,
}

/// Overall-quality assessment across every analyzed trace, produced once
/// per batch. Grounded on `analyze_agent.py::_assess_overall_quality`.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct QualityAssessment {
    pub completeness_score: u32,
    pub relevance_score: u32,
    pub coverage_score: u32,
    pub overall_confidence: u32,
    pub status: String,
}

/// Default fallback when the LLM is unavailable or its response can't be
/// parsed. Matches `analyze_agent.py::_default_trace_analysis` verbatim.
fn default_trace_analysis() -> TraceAnalysis {
    TraceAnalysis {
        relevance_score: 0,
        request_summary: "Analysis could not be completed".to_string(),
        transaction_outcome: "unknown".to_string(),
        failure_point: "unknown".to_string(),
        key_finding: "insufficient_data".to_string(),
        primary_issue: "Analysis could not be completed".to_string(),
        confidence_level: "LOW".to_string(),
        evidence_found: vec![],
        critical_indicators: vec![],
        timeline_summary: "Analysis could not be completed".to_string(),
        customer_claim_assessment: "insufficient_data".to_string(),
        root_cause_analysis: "Analysis could not be completed".to_string(),
        recommendation: "Manual review required".to_string(),
        technical_details: "Analysis could not be completed".to_string(),
    }
}

/// Deserialization target for the LLM's raw response: scores are signed so
/// out-of-range values (including negatives) can be clamped rather than
/// silently rejected by `serde`.
#[derive(Debug, Deserialize)]
struct RawQualityAssessment {
    completeness_score: i64,
    relevance_score: i64,
    coverage_score: i64,
    overall_confidence: i64,
    status: String,
}

impl RawQualityAssessment {
    /// Clamps every score to [0, 100], mirroring
    /// `analyze_agent.py`'s `max(0, min(100, ...))` handling.
    fn into_clamped(self) -> QualityAssessment {
        QualityAssessment {
            completeness_score: self.completeness_score.clamp(0, 100) as u32,
            relevance_score: self.relevance_score.clamp(0, 100) as u32,
            coverage_score: self.coverage_score.clamp(0, 100) as u32,
            overall_confidence: self.overall_confidence.clamp(0, 100) as u32,
            status: self.status,
        }
    }
}

/// Neutral midpoint fallback when the LLM is unavailable or its response
/// can't be parsed. Matches `analyze_agent.py::_default_quality_assessment`
/// verbatim: every score defaults to 50, not to an extreme.
fn default_quality_assessment() -> QualityAssessment {
    QualityAssessment {
        completeness_score: 50,
        relevance_score: 50,
        coverage_score: 50,
        overall_confidence: 50,
        status: "Default assessment applied due to processing error".to_string(),
    }
}

/// Produces per-trace comprehensive analyses and an overall quality
/// assessment, and renders them as human-readable report text. Grounded on
/// `original_source/app/agents/analyze_agent.py` and
/// `original_source/agents/report_writer.py`.
pub struct AnalyzeAgent {
    provider: Arc<dyn LlmProvider>,
    model_id: String,
    gateway: Arc<CacheGateway>,
}

impl AnalyzeAgent {
    pub fn new(provider: Arc<dyn LlmProvider>, model_id: impl Into<String>, gateway: Arc<CacheGateway>) -> Self {
        Self { provider, model_id: model_id.into(), gateway }
    }

    pub async fn analyze_trace(
        &self,
        original_context: &str,
        parameters: &SearchParameters,
        bundle: &TraceBundle,
        cache_policy: &CachePolicy,
    ) -> TraceAnalysis {
        if !self.provider.is_available() {
            return default_trace_analysis();
        }

        let system_prompt = trace_analysis_system_prompt();
        let user_prompt = serde_json::json!({
            "original_context": original_context,
            "parameters": parameters,
            "trace_id": bundle.trace_id,
            "timeline": bundle.timeline_text(),
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
            .cached("trace_analysis", &self.model_id, &messages, &options, 14_400, cache_policy, move || async move {
                let chat_options = ChatOptions { json_mode: true, ..Default::default() };
                let chat_messages = vec![
                    ChatMessage { role: "system".to_string(), content: system_prompt },
                    ChatMessage { role: "user".to_string(), content: user_prompt },
                ];
                let response = provider
                    .chat(&model_id, &chat_messages, &chat_options)
                    .await
                    .map_err(|e| ApiError::llm(e.to_string()))?;
                let analysis = extract_json_value(&response.content)
                    .and_then(|v| serde_json::from_value::<TraceAnalysis>(v).ok())
                    .unwrap_or_else(default_trace_analysis);
                Ok(CacheableValue::new(serde_json::to_value(analysis).expect("analysis serializes")))
            })
            .await;

        match result {
            Ok((value, _)) => serde_json::from_value(value).unwrap_or_else(|_| default_trace_analysis()),
            Err(_) => default_trace_analysis(),
        }
    }

    pub async fn assess_quality(
        &self,
        trace_analyses: &[TraceAnalysis],
        cache_policy: &CachePolicy,
    ) -> QualityAssessment {
        if !self.provider.is_available() || trace_analyses.is_empty() {
            return default_quality_assessment();
        }

        let messages = vec![
            Message { role: "system".to_string(), content: quality_system_prompt() },
            Message {
                role: "user".to_string(),
                content: serde_json::to_string(trace_analyses).unwrap_or_default(),
            },
        ];
        let options = serde_json::Map::new();
        let provider = self.provider.clone();
        let model_id = self.model_id.clone();
        let chat_messages: Vec<ChatMessage> = messages
            .iter()
            .map(|m| ChatMessage { role: m.role.clone(), content: m.content.clone() })
            .collect();

        let result = self
            .gateway
            .cached("quality_assessment", &self.model_id, &messages, &options, 7_200, cache_policy, move || async move {
                let chat_options = ChatOptions { json_mode: true, ..Default::default() };
                let response = provider
                    .chat(&model_id, &chat_messages, &chat_options)
                    .await
                    .map_err(|e| ApiError::llm(e.to_string()))?;
                let assessment = extract_json_value(&response.content)
                    .and_then(|v| serde_json::from_value::<RawQualityAssessment>(v).ok())
                    .map(RawQualityAssessment::into_clamped)
                    .unwrap_or_else(default_quality_assessment);
                Ok(CacheableValue::new(serde_json::to_value(assessment).expect("assessment serializes")))
            })
            .await;

        match result {
            Ok((value, _)) => serde_json::from_value(value).unwrap_or_else(|_| default_quality_assessment()),
            Err(_) => default_quality_assessment(),
        }
    }

    /// Renders one trace's comprehensive report as markdown text. Grounded
    /// on `report_writer.py`'s section layout (executive summary,
    /// parameters, detailed analysis, timeline, full entries, technical
    /// metrics, trailing `Generated:` / `Analysis completed:` lines — the
    /// exact lines the cache gateway strips before hashing
    /// `relevance_analysis` messages).
    pub fn render_report(
        trace_id: &str,
        analysis: &TraceAnalysis,
        bundle: &TraceBundle,
        parameters: &SearchParameters,
    ) -> String {
        format!(
            "# Comprehensive Analysis: {trace_id}\n\n\
             ## Executive Summary\n{summary}\n\n\
             ## Parameters\n{params:?}\n\n\
             ## Detailed Analysis\n- Primary issue: {issue}\n- Root cause: {root_cause}\n\
             - Recommendation: {recommendation}\n\n\
             ## Timeline\n{timeline}\n\n\
             ## Technical Details\n{technical}\n\n\
             Generated: {generated}\n\
             Analysis completed: {completed}\n",
            summary = analysis.request_summary,
            params = parameters,
            issue = analysis.primary_issue,
            root_cause = analysis.root_cause_analysis,
            recommendation = analysis.recommendation,
            timeline = analysis.timeline_summary,
            technical = analysis.technical_details,
            generated = Utc::now().to_rfc3339(),
            completed = Utc::now().to_rfc3339(),
        )
    }
}

fn trace_analysis_system_prompt() -> String {
    "You analyze one distributed trace's log timeline for a banking dispute investigation. \
     Respond with JSON only matching: {\"relevance_score\": 0-100, \"request_summary\": \"string\", \
     \"transaction_outcome\": \"string\", \"failure_point\": \"string\", \"key_finding\": \"string\", \
     \"primary_issue\": \"string\", \"confidence_level\": \"HIGH|MEDIUM|LOW\", \"evidence_found\": [\"...\"], \
     \"critical_indicators\": [\"...\"], \"timeline_summary\": \"string\", \
     \"customer_claim_assessment\": \"string\", \"root_cause_analysis\": \"string\", \
     \"recommendation\": \"string\", \"technical_details\": \"string\"}."
        .to_string()
}

fn quality_system_prompt() -> String {
    "You assess the overall quality of a batch of trace analyses for a banking dispute \
     investigation. Respond with JSON only: {\"completeness_score\": 0-100, \
     \"relevance_score\": 0-100, \"coverage_score\": 0-100, \"overall_confidence\": 0-100, \
     \"status\": \"string\"}."
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_trace_analysis_has_low_confidence() {
        assert_eq!(default_trace_analysis().confidence_level, "LOW");
    }
}
