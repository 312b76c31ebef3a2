use serde::{Deserialize, Serialize};

/// Output of the planning agent (C8). Mirrors `planning_agent.py`'s strict
/// JSON schema.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PlanResponse {
    pub plan_version: u32,
    pub goal: String,
    pub can_proceed: bool,
    #[serde(default)]
    pub blocking_questions: Vec<String>,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub expected_artifacts: Vec<String>,
    #[serde(default)]
    pub replan_triggers: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PlanStep {
    pub name: String,
    pub description: String,
}
