use serde::{Deserialize, Serialize};

/// One row of the context-rule table (CSV-backed), grounded on
/// `verify_agent.py`'s `ContextRule` dataclass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextRule {
    pub id: String,
    pub context: String,
    /// Comma-separated important patterns (kept as the raw string; callers
    /// split on demand, matching the CSV source format).
    pub important: String,
    /// Comma-separated ignore patterns.
    pub ignore: String,
    pub description: String,
}

impl ContextRule {
    pub fn important_patterns(&self) -> Vec<String> {
        split_patterns(&self.important)
    }

    pub fn ignore_patterns(&self) -> Vec<String> {
        split_patterns(&self.ignore)
    }
}

fn split_patterns(raw: &str) -> Vec<String> {
    raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RelevanceLevel {
    HighlyRelevant,
    Relevant,
    PotentiallyRelevant,
    NotRelevant,
    Ignored,
    Unknown,
}

impl std::fmt::Display for RelevanceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RelevanceLevel::HighlyRelevant => "highly_relevant",
            RelevanceLevel::Relevant => "relevant",
            RelevanceLevel::PotentiallyRelevant => "potentially_relevant",
            RelevanceLevel::NotRelevant => "not_relevant",
            RelevanceLevel::Ignored => "ignored",
            RelevanceLevel::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Outcome of scoring one trace's relevance to the original prompt. Mirrors
/// `verify_agent.py`'s `RelevanceResult` dataclass.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct RelevanceResult {
    pub file_path: String,
    pub trace_id: String,
    pub relevance_level: RelevanceLevel,
    pub relevance_score: u32,
    pub confidence_score: u32,
    pub matching_elements: Vec<String>,
    pub non_matching_elements: Vec<String>,
    pub key_findings: Vec<String>,
    pub recommendation: String,
    pub analysis_timestamp: chrono::DateTime<chrono::Utc>,
    pub processing_time_ms: u64,
    pub applied_rules: Vec<String>,
    pub ignored_patterns: Vec<String>,
}
