use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use chrono::Utc;

use crate::models::loki::LokiCacheEntry;

/// Caches the *pointer* to a downloaded Loki result file, not the result
/// itself. Grounded on `loki_redis_cache.py::LokiRedisBackend` — in
/// particular its `get()`, which re-verifies the backing file still exists
/// on disk and silently evicts + misses if it doesn't (the original never
/// serves a pointer to a file that was cleaned up from under it).
#[derive(Default)]
pub struct LokiResultCache {
    inner: RwLock<HashMap<String, LokiCacheEntry>>,
}

#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct LokiCacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub downloads: u64,
    pub errors: u64,
    pub bytes_saved: u64,
}

impl LokiResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached entry if present and its file still exists;
    /// otherwise removes the stale entry (if any) and returns `None`.
    pub fn get(&self, key: &str) -> Option<LokiCacheEntry> {
        let existing = self.inner.read().unwrap().get(key).cloned();
        let entry = existing?;
        if Path::new(&entry.file_path).exists() {
            Some(entry)
        } else {
            self.inner.write().unwrap().remove(key);
            None
        }
    }

    pub fn set(&self, key: String, entry: LokiCacheEntry) {
        self.inner.write().unwrap().insert(key, entry);
    }

    pub fn delete(&self, key: &str) {
        self.inner.write().unwrap().remove(key);
    }

    pub fn clear(&self) {
        self.inner.write().unwrap().clear();
    }
}

impl LokiCacheMetrics {
    pub fn record_hit(&mut self, file_size: u64) {
        self.hits += 1;
        self.bytes_saved += file_size;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

pub fn make_entry(file_path: String, result_count: usize, file_size: u64) -> LokiCacheEntry {
    LokiCacheEntry { file_path, created_at: Utc::now(), result_count, file_size }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn stale_pointer_to_removed_file_self_heals_as_a_miss() {
        let cache = LokiResultCache::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loki_abc.json");
        std::fs::File::create(&path).unwrap().write_all(b"{}").unwrap();

        let entry = make_entry(path.to_string_lossy().to_string(), 1, 2);
        cache.set("k".into(), entry);
        assert!(cache.get("k").is_some());

        std::fs::remove_file(&path).unwrap();
        assert!(cache.get("k").is_none());
        // second call confirms the stale entry was actually evicted, not
        // just skipped
        assert!(cache.get("k").is_none());
    }
}
