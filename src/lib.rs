//! Logtrace backend library.
//!
//! Contains the core modules for the log-analysis service: the two-tier
//! cache gateway, the Loki client, the file-based log reader, the trace
//! extraction/compilation pipeline, the LLM-backed agents, and the
//! orchestrator that drives one end-to-end investigation.

use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::Mutex;

pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use models::search::ProjectRegistry;
pub use services::agents::{AnalyzeAgent, ContextRuleTable, ParameterAgent, PlanningAgent, RelevanceAnalyzer};
pub use services::cache::{CacheGateway, GatewayConfig};
pub use services::loki::LokiClient;
pub use services::orchestrator::{Orchestrator, ProgressEvent};

/// Application shared state.
///
/// Rust's type system is the DI container: every long-lived collaborator is
/// built once at startup and handed out as a cheaply-cloneable `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: SqlitePool,
    pub projects: Arc<ProjectRegistry>,

    pub cache_gateway: Arc<CacheGateway>,
    pub loki_client: Arc<LokiClient>,

    pub parameter_agent: Arc<ParameterAgent>,
    pub planning_agent: Arc<PlanningAgent>,
    pub analyze_agent: Arc<AnalyzeAgent>,
    pub relevance_analyzer: Arc<RelevanceAnalyzer>,
    pub context_rules: Arc<ContextRuleTable>,
    pub orchestrator: Arc<Orchestrator>,

    /// Active analysis sessions keyed by session id, each holding the
    /// receiving half of its orchestrator's progress channel until a
    /// client subscribes to `/api/chat/stream/:session_id`. See
    /// `handlers::chat`.
    pub sessions: Arc<Mutex<std::collections::HashMap<uuid::Uuid, tokio::sync::mpsc::Receiver<ProgressEvent>>>>,
}
