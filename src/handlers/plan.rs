use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::models::plan::PlanResponse;
use crate::utils::error::{ApiError, ApiResult};
use crate::utils::StringExt;
use crate::AppState;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct PlanRequest {
    pub prompt: String,
    pub project: String,
    pub env: String,
    #[serde(default)]
    pub domain: Option<String>,
}

/// Previews the planning agent's feasibility check without running the
/// full pipeline: no files written, no orchestrator spawned. Grounded on
/// `original_source/app/agents/planning_agent.py`.
pub async fn preview_plan(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PlanRequest>,
) -> ApiResult<Json<PlanResponse>> {
    let prompt = req.prompt.clean().ok_or_else(|| ApiError::validation_error("prompt must not be empty"))?;
    let extracted = state.parameter_agent.run(&prompt).await;
    let plan = state
        .planning_agent
        .run(&prompt, &req.project, &req.env, req.domain.as_deref(), &extracted)
        .await;
    Ok(Json(plan))
}
