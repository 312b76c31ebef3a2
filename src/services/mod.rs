pub mod agents;
pub mod cache;
pub mod files;
pub mod json_extract;
pub mod llm_providers;
pub mod loki;
pub mod orchestrator;
pub mod trace_compiler;
pub mod trace_extractor;

pub use agents::{AnalyzeAgent, ContextRuleTable, ParameterAgent, PlanningAgent, RelevanceAnalyzer};
pub use cache::{CacheGateway, GatewayConfig};
pub use files::FileLogReader;
pub use llm_providers::LlmProvider;
pub use loki::{LokiClient, LokiResultCache};
pub use orchestrator::{Orchestrator, ProgressEvent};
