pub mod cache;
pub mod log_entry;
pub mod loki;
pub mod plan;
pub mod relevance;
pub mod search;
pub mod trace;

pub use cache::*;
pub use log_entry::*;
pub use loki::*;
pub use plan::*;
pub use relevance::*;
pub use search::*;
pub use trace::*;
