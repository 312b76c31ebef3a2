use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Content-addressed cache key: `{cache_type}:{namespace?}:{sha256 hex}`.
/// Produced by `services::cache::key::make_cache_key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(pub String);

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One stored cache value plus its creation time, used by both the L1
/// in-process map and (serialized) the L2 backend.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: serde_json::Value,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.ttl
    }

    /// Whether this entry is older than `s_maxage`, used for the
    /// cache-control-style staleness check independent of hard expiry.
    pub fn is_stale(&self, s_maxage: Duration) -> bool {
        self.created_at.elapsed() >= s_maxage
    }
}

/// Cache-control-style policy accompanying one cache call. Mirrors
/// `CachePolicy` in `llm_gateway/gateway.py`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CachePolicy {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub no_cache: bool,
    #[serde(default)]
    pub no_store: bool,
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
    #[serde(default)]
    pub s_maxage_seconds: Option<u64>,
    #[serde(default)]
    pub namespace: Option<String>,
}

fn default_true() -> bool {
    true
}

impl CachePolicy {
    pub fn enabled() -> Self {
        Self { enabled: true, ..Default::default() }
    }
}

/// Diagnostics describing how a `cached()` call was satisfied, mirroring
/// `CacheDiagnostics` in `llm_gateway/gateway.py`.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CacheDiagnostics {
    pub status: CacheStatus,
    pub key_prefix: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
    #[serde(default)]
    pub waited: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    Bypass,
    HitL1,
    HitL2,
    Miss,
    Coalesced,
}

/// A value returned from a `compute` closure passed to the cache gateway.
/// Lets callers mark a result as non-cacheable (e.g. an empty Loki result)
/// without special-casing the gateway itself.
#[derive(Debug, Clone)]
pub struct CacheableValue<T> {
    pub value: T,
    pub cacheable: bool,
}

impl<T> CacheableValue<T> {
    pub fn new(value: T) -> Self {
        Self { value, cacheable: true }
    }

    pub fn uncacheable(value: T) -> Self {
        Self { value, cacheable: false }
    }
}
