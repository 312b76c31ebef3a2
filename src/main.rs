use std::collections::HashMap;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use logtrace_core::config::Config;
use logtrace_core::services::agents::{AnalyzeAgent, ContextRuleTable, ParameterAgent, PlanningAgent, RelevanceAnalyzer};
use logtrace_core::services::cache::{CacheGateway, GatewayConfig, SqliteL2Backend};
use logtrace_core::services::llm_providers::local::LocalDaemonProvider;
use logtrace_core::services::llm_providers::remote::RemoteGatewayProvider;
use logtrace_core::services::llm_providers::LlmProvider;
use logtrace_core::services::loki::LokiClient;
use logtrace_core::services::orchestrator::Orchestrator;
use logtrace_core::{handlers, AppState};

#[derive(OpenApi)]
#[openapi(
    paths(),
    components(schemas(
        handlers::chat::ChatRequest,
        handlers::chat::ChatResponse,
        handlers::plan::PlanRequest,
        logtrace_core::models::plan::PlanResponse,
        logtrace_core::models::plan::PlanStep,
        logtrace_core::models::search::SearchParameters,
        logtrace_core::models::cache::CachePolicy,
        logtrace_core::services::cache::l1::L1Stats,
    )),
    tags(
        (name = "logtrace", description = "Log-analysis backend: investigation pipeline, cache admin, health")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    init_tracing(&config);

    tracing::info!("logtrace starting up");

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database.url)
        .await?;
    tracing::info!("database pool created");

    let l2: Option<Arc<dyn logtrace_core::services::cache::L2Backend>> = if config.cache.l2_enabled {
        Some(Arc::new(SqliteL2Backend::new(pool.clone()).await?))
    } else {
        None
    };
    let gateway_config = GatewayConfig {
        enabled: config.cache.enabled,
        gateway_version: config.cache.gateway_version.clone(),
        prompt_version: config.cache.prompt_version.clone(),
        namespace: config.cache.namespace.clone(),
        l1_max_entries: config.cache.l1_max_entries,
        l1_default_ttl: std::time::Duration::from_secs(config.cache.l1_default_ttl_secs),
        lock_ttl_ms: config.cache.lock_ttl_ms,
        lock_wait_ms: config.cache.lock_wait_ms,
    };
    let cache_gateway = Arc::new(CacheGateway::new(gateway_config, l2));

    let provider: Arc<dyn LlmProvider> = if config.llm.provider == "remote" {
        Arc::new(RemoteGatewayProvider::new(config.llm.remote_api_base.clone(), config.llm.remote_api_key.clone()))
    } else {
        Arc::new(LocalDaemonProvider::new(config.llm.local_host.clone()))
    };
    tracing::info!(provider = provider.provider_name(), "llm provider selected");

    let loki_client =
        Arc::new(LokiClient::new(config.loki.endpoint.clone(), std::path::PathBuf::from(&config.loki.cache_dir)));

    let parameter_agent = Arc::new(ParameterAgent::new(provider.clone(), config.llm.model_id.clone()));
    let planning_agent =
        Arc::new(PlanningAgent::new(provider.clone(), config.llm.model_id.clone(), cache_gateway.clone()));
    let analyze_agent =
        Arc::new(AnalyzeAgent::new(provider.clone(), config.llm.model_id.clone(), cache_gateway.clone()));
    let relevance_analyzer =
        Arc::new(RelevanceAnalyzer::new(provider.clone(), config.llm.model_id.clone(), cache_gateway.clone()));

    let context_rules_path = std::path::Path::new(&config.context_rules.path);
    if let Some(parent) = context_rules_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let context_rules = Arc::new(ContextRuleTable::load_or_create_default(context_rules_path)?);

    std::fs::create_dir_all(&config.reports.output_dir)?;
    let orchestrator = Arc::new(Orchestrator::new(
        parameter_agent.clone(),
        analyze_agent.clone(),
        relevance_analyzer.clone(),
        context_rules.clone(),
        loki_client.clone(),
        std::path::PathBuf::from(&config.reports.output_dir),
    ));

    let projects = Arc::new(logtrace_core::ProjectRegistry::new(config.projects.clone()));

    let app_state = Arc::new(AppState {
        config: Arc::new(config.clone()),
        db: pool,
        projects,
        cache_gateway,
        loki_client,
        parameter_agent,
        planning_agent,
        analyze_agent,
        relevance_analyzer,
        context_rules,
        orchestrator,
        sessions: Arc::new(Mutex::new(HashMap::new())),
    });

    let api_routes = Router::new()
        .route("/api/chat", post(handlers::chat::submit_chat))
        .route("/api/chat/stream/:session_id", get(handlers::chat::stream_chat))
        .route("/api/plan", post(handlers::plan::preview_plan))
        .route("/api/cache/ping", get(handlers::cache_admin::ping_cache))
        .route("/api/cache/stats", get(handlers::cache_admin::cache_stats))
        .route("/api/cache/delete", post(handlers::cache_admin::delete_cache_key))
        .route("/api/cache/clear-l1", post(handlers::cache_admin::clear_l1))
        .with_state(app_state);

    let health_routes = Router::new().route("/healthz", get(handlers::health::healthz));

    let app = Router::new()
        .merge(SwaggerUi::new("/api-docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_routes)
        .merge(health_routes)
        .fallback(handlers::chat::not_found)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("server listening on http://{}", addr);
    tracing::info!("API documentation available at http://{}/api-docs", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(config: &Config) {
    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let registry = tracing_subscriber::registry().with(log_filter);

    if let Some(log_file) = &config.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path.file_name().and_then(|n| n.to_str()).unwrap_or("logtrace.log");
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Leak the guard: it must outlive the subscriber, and the subscriber
        // lives for the process, so there is no later point to drop it at.
        Box::leak(Box::new(guard));
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
