pub mod cache;
pub mod client;
pub mod query_builder;

pub use cache::{LokiCacheMetrics, LokiResultCache};
pub use client::{LokiClient, LokiResponse};
pub use query_builder::{QueryBuilderInput, ResolvedQuery};
