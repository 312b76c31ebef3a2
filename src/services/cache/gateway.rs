use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::cache::{CacheDiagnostics, CacheStatus, CacheableValue, CachePolicy};
use crate::utils::error::ApiError;

use super::key::{make_cache_key, Message};
use super::l1::L1Cache;
use super::l2::L2Backend;
use super::singleflight::SingleFlight;

pub struct GatewayConfig {
    pub enabled: bool,
    pub gateway_version: String,
    pub prompt_version: String,
    pub namespace: Option<String>,
    pub l1_max_entries: usize,
    pub l1_default_ttl: Duration,
    pub lock_ttl_ms: u64,
    pub lock_wait_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gateway_version: "v1".into(),
            prompt_version: "v1".into(),
            namespace: None,
            l1_max_entries: 10_000,
            l1_default_ttl: Duration::from_secs(3600),
            lock_ttl_ms: 30_000,
            lock_wait_ms: 2_000,
        }
    }
}

/// Two-tier content-addressed cache gateway every LLM call and remote log
/// fetch flows through. Grounded precisely on
/// `original_source/app/services/llm_gateway/gateway.py::LLMCacheGateway`.
pub struct CacheGateway {
    config: GatewayConfig,
    l1: L1Cache,
    l2: Option<Arc<dyn L2Backend>>,
    single_flight: SingleFlight,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct Envelope {
    created_at: i64,
    value: serde_json::Value,
}

impl CacheGateway {
    pub fn new(config: GatewayConfig, l2: Option<Arc<dyn L2Backend>>) -> Self {
        let l1 = L1Cache::new(config.l1_max_entries, config.l1_default_ttl);
        Self { config, l1, l2, single_flight: SingleFlight::new() }
    }

    /// The core entry point. `compute` runs only on a cache miss (and only
    /// once per key across concurrent in-process callers). Mirrors
    /// `LLMCacheGateway.cached`.
    #[allow(clippy::too_many_arguments)]
    pub async fn cached<F, Fut>(
        &self,
        cache_type: &str,
        model: &str,
        messages: &[Message],
        options: &serde_json::Map<String, serde_json::Value>,
        default_ttl_seconds: u64,
        policy: &CachePolicy,
        compute: F,
    ) -> Result<(serde_json::Value, CacheDiagnostics), ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<CacheableValue<serde_json::Value>, ApiError>>,
    {
        if !self.config.enabled || !policy.enabled {
            let value = compute().await?.value;
            return Ok((
                value,
                CacheDiagnostics {
                    status: CacheStatus::Bypass,
                    key_prefix: String::new(),
                    layer: None,
                    ttl_seconds: None,
                    waited: false,
                },
            ));
        }

        let namespace = policy.namespace.as_deref().or(self.config.namespace.as_deref());
        let key = make_cache_key(
            cache_type,
            namespace,
            model,
            messages,
            options,
            &self.config.gateway_version,
            &self.config.prompt_version,
        );
        let ttl_seconds = policy.ttl_seconds.unwrap_or(default_ttl_seconds);
        let key_prefix = key.chars().take(12).collect::<String>();

        if !policy.no_cache {
            if let Some(value) = self.l1.get(&key) {
                if let Some(s_maxage) = policy.s_maxage_seconds {
                    let created_at = self.l1.peek_created_at(&key);
                    let stale = created_at
                        .map(|c| Instant::now().duration_since(c) >= Duration::from_secs(s_maxage))
                        .unwrap_or(false);
                    if stale {
                        // fall through to recompute below
                    } else {
                        return Ok((
                            value,
                            CacheDiagnostics {
                                status: CacheStatus::HitL1,
                                key_prefix,
                                layer: Some("l1".into()),
                                ttl_seconds: Some(ttl_seconds),
                                waited: false,
                            },
                        ));
                    }
                } else {
                    return Ok((
                        value,
                        CacheDiagnostics {
                            status: CacheStatus::HitL1,
                            key_prefix,
                            layer: Some("l1".into()),
                            ttl_seconds: Some(ttl_seconds),
                            waited: false,
                        },
                    ));
                }
            }

            if let Some(l2) = &self.l2 {
                if let Some(raw) = l2.get(&key).await {
                    if let Ok(envelope) = serde_json::from_str::<Envelope>(&raw) {
                        self.l1.set(key.clone(), envelope.value.clone(), Some(Duration::from_secs(ttl_seconds)));
                        return Ok((
                            envelope.value,
                            CacheDiagnostics {
                                status: CacheStatus::HitL2,
                                key_prefix,
                                layer: Some("l2".into()),
                                ttl_seconds: Some(ttl_seconds),
                                waited: false,
                            },
                        ));
                    }
                }
            }
        }

        let key_for_leader = key.clone();
        let no_store = policy.no_store;
        let l1 = &self.l1;
        let l2 = self.l2.clone();
        let lock_ttl_ms = self.config.lock_ttl_ms;
        let lock_wait_ms = self.config.lock_wait_ms;

        let (result, was_follower): (Result<serde_json::Value, String>, bool) = self
            .single_flight
            .do_once(&key, move || async move {
                leader_compute(
                    &key_for_leader,
                    ttl_seconds,
                    no_store,
                    l1,
                    l2,
                    lock_ttl_ms,
                    lock_wait_ms,
                    compute,
                )
                .await
            })
            .await;

        let value = result.map_err(ApiError::llm)?;
        let status = if was_follower { CacheStatus::Coalesced } else { CacheStatus::Miss };
        Ok((
            value,
            CacheDiagnostics {
                status,
                key_prefix,
                layer: None,
                ttl_seconds: Some(ttl_seconds),
                waited: was_follower,
            },
        ))
    }

    pub fn stats(&self) -> super::l1::L1Stats {
        self.l1.stats()
    }

    pub async fn delete(&self, key: &str) {
        self.l1.delete(key);
        if let Some(l2) = &self.l2 {
            l2.delete(key).await;
        }
    }

    pub fn clear_l1(&self) {
        self.l1.clear();
    }

    pub async fn ping_l2(&self) -> bool {
        match &self.l2 {
            Some(l2) => l2.ping().await,
            None => false,
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn leader_compute<F, Fut>(
    key: &str,
    ttl_seconds: u64,
    no_store: bool,
    l1: &L1Cache,
    l2: Option<Arc<dyn L2Backend>>,
    lock_ttl_ms: u64,
    lock_wait_ms: u64,
    compute: F,
) -> Result<serde_json::Value, String>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<CacheableValue<serde_json::Value>, ApiError>>,
{
    let mut lock_token = None;
    if let Some(l2) = &l2 {
        lock_token = l2.acquire_lock(key, lock_ttl_ms).await;
        if lock_token.is_none() {
            // Someone else in another process holds the lock; poll L2 for
            // their result instead of recomputing independently.
            let deadline = tokio::time::Instant::now() + Duration::from_millis(lock_wait_ms);
            while tokio::time::Instant::now() < deadline {
                if let Some(raw) = l2.get(key).await {
                    if let Ok(envelope) = serde_json::from_str::<Envelope>(&raw) {
                        l1.set(key.to_string(), envelope.value.clone(), Some(Duration::from_secs(ttl_seconds)));
                        return Ok(envelope.value);
                    }
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            // Gave up waiting; fall through and compute independently.
        }
    }

    let result = compute().await.map_err(|e| e.to_string())?;

    if !no_store && result.cacheable {
        if let Some(l2) = &l2 {
            let envelope = Envelope { created_at: chrono::Utc::now().timestamp(), value: result.value.clone() };
            if let Ok(raw) = serde_json::to_string(&envelope) {
                l2.set(key, &raw, ttl_seconds).await;
            }
        }
        l1.set(key.to_string(), result.value.clone(), Some(Duration::from_secs(ttl_seconds)));
    }

    if let (Some(l2), Some(token)) = (&l2, &lock_token) {
        l2.release_lock(key, token).await;
    }

    Ok(result.value)
}
