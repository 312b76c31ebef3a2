use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::services::cache::l1::L1Stats;
use crate::utils::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CachePingResponse {
    pub l2_reachable: bool,
}

/// `GET /api/cache/ping` — reports whether the L2 backend answers.
pub async fn ping_cache(State(state): State<Arc<AppState>>) -> Json<CachePingResponse> {
    Json(CachePingResponse { l2_reachable: state.cache_gateway.ping_l2().await })
}

/// `GET /api/cache/stats` — L1 hit/miss/eviction counters.
pub async fn cache_stats(State(state): State<Arc<AppState>>) -> Json<L1Stats> {
    Json(state.cache_gateway.stats())
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CacheDeleteRequest {
    pub key: String,
}

/// `POST /api/cache/delete` — evicts one key from both L1 and L2.
pub async fn delete_cache_key(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CacheDeleteRequest>,
) -> ApiResult<()> {
    if req.key.trim().is_empty() {
        return Err(ApiError::validation_error("key must not be empty"));
    }
    state.cache_gateway.delete(&req.key).await;
    Ok(())
}

/// `POST /api/cache/clear-l1` — drops the whole in-process L1 map (L2
/// untouched), useful after a config change that invalidates L1 entries'
/// assumptions without wanting to pay an L2 round-trip for every key.
pub async fn clear_l1(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.cache_gateway.clear_l1();
    Json(serde_json::json!({ "cleared": true }))
}
