use serde::{Deserialize, Serialize};

/// Pointer to a downloaded Loki result file, cached in L1/L2. On lookup the
/// backing file's existence is re-verified; a cache entry whose file has
/// since been removed is deleted and treated as a miss (self-healing stale
/// pointer, see `services::loki::cache`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LokiCacheEntry {
    pub file_path: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub result_count: usize,
    pub file_size: u64,
}
