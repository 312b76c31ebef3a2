pub mod analyze_agent;
pub mod parameter_agent;
pub mod planning_agent;
pub mod relevance_analyzer;

pub use analyze_agent::{AnalyzeAgent, QualityAssessment, TraceAnalysis};
pub use parameter_agent::ParameterAgent;
pub use planning_agent::PlanningAgent;
pub use relevance_analyzer::{ContextRuleTable, RelevanceAnalyzer};
