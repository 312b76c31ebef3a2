use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::models::cache::CachePolicy;
use crate::models::search::ProjectSource;
use crate::services::orchestrator::ProgressEvent;
use crate::utils::error::{ApiError, ApiResult};
use crate::utils::StringExt;
use crate::AppState;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ChatRequest {
    /// Free-text investigation prompt.
    pub prompt: String,
    /// Name of one of the configured `[[projects]]`.
    pub project: String,
    /// Environment code to resolve against the project's `environments` map.
    pub env: String,
    /// Free-text domain tag, same shape as `PlanRequest::domain`.
    pub domain: Option<String>,
    /// Per-request cache override; omitted fields fall back to
    /// `CachePolicy::enabled()`'s defaults.
    #[serde(default)]
    pub cache: Option<CachePolicy>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ChatResponse {
    pub session_id: Uuid,
    pub stream_url: String,
}

/// Starts one end-to-end investigation: creates an `AnalysisSession`,
/// spawns the orchestrator onto the tokio runtime, and returns the SSE
/// stream URL the client should subscribe to. Grounded on spec.md §6 and
/// `original_source/app/orchestrator.py`'s `analyze_stream` entry point.
pub async fn submit_chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    let prompt = req.prompt.clean().ok_or_else(|| ApiError::validation_error("prompt must not be empty"))?;
    let env = state
        .projects
        .resolve_env(&req.project, &req.env)
        .cloned()
        .ok_or_else(|| {
            ApiError::not_found(format!("unknown project/env '{}/{}'", req.project, req.env))
        })?;
    if let ProjectSource::File { root_dir } = &env {
        if !std::path::Path::new(root_dir).exists() {
            tracing::warn!(root_dir, "configured project's log root does not exist yet");
        }
    }
    let cache_policy = req.cache.unwrap_or_else(CachePolicy::enabled);

    let session_id = Uuid::new_v4();
    let (tx, rx) = tokio::sync::mpsc::channel::<ProgressEvent>(32);
    state.sessions.lock().await.insert(session_id, rx);

    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        orchestrator.run(tx, prompt, env, cache_policy).await;
    });

    Ok(Json(ChatResponse { session_id, stream_url: format!("/api/chat/stream/{session_id}") }))
}

/// Serves the orchestrator's progress events as `text/event-stream`. A
/// session's receiver can be consumed exactly once; a second subscribe
/// attempt returns `404`.
pub async fn stream_chat(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let rx = state
        .sessions
        .lock()
        .await
        .remove(&session_id)
        .ok_or_else(|| ApiError::not_found("unknown or already-consumed session id"))?;

    let stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

pub async fn not_found() -> impl IntoResponse {
    ApiError::not_found("no such route")
}
