use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::models::cache::CacheEntry;

#[derive(Debug, Default, Clone, Copy, serde::Serialize, utoipa::ToSchema)]
pub struct L1Stats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub sets: u64,
}

struct Node {
    entry: CacheEntry,
    /// Monotonically increasing sequence number; the lowest value among
    /// live entries is the least-recently-used one.
    touched_at: u64,
}

/// In-process LRU + TTL cache, modeled on the original's `_LRUTTLCache`
/// (an `OrderedDict` under a lock) and on the teacher's
/// `profile_analyzer::analyzer::baseline_cache` TTL-map shape. A plain
/// `RwLock<HashMap<..>>` plus a logical clock stands in for the
/// `OrderedDict`'s move-to-end semantics.
pub struct L1Cache {
    max_entries: usize,
    default_ttl: Duration,
    inner: RwLock<Inner>,
}

struct Inner {
    entries: HashMap<String, Node>,
    clock: u64,
    stats: L1Stats,
}

impl L1Cache {
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            max_entries,
            default_ttl,
            inner: RwLock::new(Inner { entries: HashMap::new(), clock: 0, stats: L1Stats::default() }),
        }
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let mut inner = self.inner.write().unwrap();
        inner.clock += 1;
        let clock = inner.clock;
        let expired = inner.entries.get(key).map(|n| n.entry.is_expired()).unwrap_or(false);
        if expired {
            inner.entries.remove(key);
            inner.stats.misses += 1;
            return None;
        }
        if let Some(node) = inner.entries.get_mut(key) {
            node.touched_at = clock;
            inner.stats.hits += 1;
            Some(node.entry.value.clone())
        } else {
            inner.stats.misses += 1;
            None
        }
    }

    /// Used by the staleness (`s_maxage_seconds`) check, which needs the
    /// entry's age without counting as an access for LRU purposes.
    pub fn peek_created_at(&self, key: &str) -> Option<Instant> {
        let inner = self.inner.read().unwrap();
        inner.entries.get(key).map(|n| n.entry.created_at)
    }

    pub fn set(&self, key: String, value: serde_json::Value, ttl: Option<Duration>) {
        let mut inner = self.inner.write().unwrap();
        inner.clock += 1;
        let clock = inner.clock;
        let entry = CacheEntry { value, created_at: Instant::now(), ttl: ttl.unwrap_or(self.default_ttl) };
        inner.entries.insert(key, Node { entry, touched_at: clock });
        inner.stats.sets += 1;
        self.evict_over_capacity(&mut inner);
    }

    fn evict_over_capacity(&self, inner: &mut Inner) {
        while inner.entries.len() > self.max_entries {
            let Some(oldest_key) =
                inner.entries.iter().min_by_key(|(_, n)| n.touched_at).map(|(k, _)| k.clone())
            else {
                break;
            };
            inner.entries.remove(&oldest_key);
            inner.stats.evictions += 1;
        }
    }

    pub fn delete(&self, key: &str) {
        self.inner.write().unwrap().entries.remove(key);
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.entries.clear();
    }

    pub fn size(&self) -> usize {
        self.inner.read().unwrap().entries.len()
    }

    pub fn stats(&self) -> L1Stats {
        self.inner.read().unwrap().stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used_when_over_capacity() {
        let cache = L1Cache::new(2, Duration::from_secs(60));
        cache.set("a".into(), serde_json::json!(1), None);
        cache.set("b".into(), serde_json::json!(2), None);
        // touch "a" so "b" becomes the least-recently-used entry
        assert!(cache.get("a").is_some());
        cache.set("c".into(), serde_json::json!(3), None);

        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn expired_entry_is_treated_as_miss() {
        let cache = L1Cache::new(10, Duration::from_millis(1));
        cache.set("a".into(), serde_json::json!(1), Some(Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get("a").is_none());
    }
}
