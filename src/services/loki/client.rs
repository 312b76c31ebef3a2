use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::utils::error::ApiError;

use super::cache::{make_entry, LokiCacheMetrics, LokiResultCache};
use super::query_builder::{cache_key, QueryBuilderInput, ResolvedQuery};

/// Direct HTTP client for a Loki-style `query_range` endpoint, fronted by a
/// pointer cache so repeat queries skip the round trip entirely. Replaces
/// the original's `subprocess` + `curl` invocation
/// (`loki_query_builder.py::download_logs`) with `reqwest`, per spec.md's
/// Design Notes ("replace subprocess-driven HTTP... with a direct HTTP
/// client; the selector string and time window remain the only observable
/// externals"). Caching is grounded on
/// `loki_query_builder.py::download_logs_cached`: a cache hit returns the
/// already-downloaded file's contents; a miss downloads, writes the
/// response to `{cache_dir}/loki_{cache_key}.json`, and stores the pointer.
pub struct LokiClient {
    http: reqwest::Client,
    base_url: String,
    cache_dir: PathBuf,
    cache: LokiResultCache,
    metrics: RwLock<LokiCacheMetrics>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LokiResponse {
    pub status: String,
    pub data: LokiData,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LokiData {
    #[serde(default)]
    pub result: Vec<LokiStreamResult>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LokiStreamResult {
    pub stream: serde_json::Map<String, serde_json::Value>,
    /// `[[nanos_as_string, message], ...]`
    pub values: Vec<(String, String)>,
}

impl LokiClient {
    pub fn new(base_url: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            cache_dir: cache_dir.into(),
            cache: LokiResultCache::new(),
            metrics: RwLock::new(LokiCacheMetrics::default()),
        }
    }

    pub fn metrics(&self) -> LokiCacheMetrics {
        *self.metrics.read().unwrap()
    }

    /// Runs `input` through the query builder and serves it from the
    /// on-disk pointer cache when possible, falling back to a live
    /// `query_range` call on a cache miss.
    pub async fn query_cached(&self, input: &QueryBuilderInput) -> Result<LokiResponse, ApiError> {
        let key = cache_key(input);
        let query = super::query_builder::resolve(input).map_err(ApiError::acquisition)?;

        if let Some(entry) = self.cache.get(&key) {
            if let Ok(bytes) = std::fs::read(&entry.file_path) {
                if let Ok(response) = serde_json::from_slice::<LokiResponse>(&bytes) {
                    self.metrics.write().unwrap().record_hit(entry.file_size);
                    return Ok(response);
                }
            }
        }

        let response = self.query_range(&query).await?;
        self.metrics.write().unwrap().record_miss();
        self.store(&key, &response);
        Ok(response)
    }

    fn store(&self, key: &str, response: &LokiResponse) {
        let Ok(bytes) = serde_json::to_vec(response) else { return };
        if std::fs::create_dir_all(&self.cache_dir).is_err() {
            self.metrics.write().unwrap().record_error();
            return;
        }
        let path = self.cache_dir.join(format!("loki_{key}.json"));
        if std::fs::write(&path, &bytes).is_err() {
            self.metrics.write().unwrap().record_error();
            return;
        }
        let entry = make_entry(path.to_string_lossy().to_string(), response.data.result.len(), bytes.len() as u64);
        self.cache.set(key.to_string(), entry);
    }

    pub async fn query_range(&self, query: &ResolvedQuery) -> Result<LokiResponse, ApiError> {
        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("query", query.selector.as_str()),
                ("start", &query.start.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
                ("end", &query.end.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            ])
            .send()
            .await
            .map_err(|e| ApiError::acquisition(format!("loki request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ApiError::acquisition(format!("loki returned status {}", response.status())));
        }

        response
            .json::<LokiResponse>()
            .await
            .map_err(|e| ApiError::framing(format!("loki response was not valid JSON: {e}")))
    }
}
