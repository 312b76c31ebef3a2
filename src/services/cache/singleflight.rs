use dashmap::DashMap;
use std::any::Any;
use std::sync::Arc;
use tokio::sync::Mutex;

type Slot = Arc<Mutex<Option<Arc<dyn Any + Send + Sync>>>>;

/// In-process single-flight request coalescing: concurrent callers for the
/// same key share one computation, the leader computes while holding the
/// slot's lock and followers simply wait on it. Grounded on
/// `llm_gateway/gateway.py`'s `_ThreadSingleFlight` (`Future`-based there;
/// `tokio::sync::Mutex`-based here since this gateway is async).
///
/// This coalesces *callers within this process*; cross-process coalescing
/// is handled separately by the L2 backend's lock (see `l2::L2Backend`).
#[derive(Default)]
pub struct SingleFlight {
    inflight: DashMap<String, Slot>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `compute` for `key`, returning `(value, was_follower)`. Exactly
    /// one concurrent caller per key actually invokes `compute`; every other
    /// concurrent caller receives a clone of that result instead.
    pub async fn do_once<F, Fut, T>(&self, key: &str, compute: F) -> (T, bool)
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
        T: Clone + Send + Sync + 'static,
    {
        let slot = self.inflight.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(None))).clone();
        let mut guard = slot.lock().await;
        if let Some(existing) = guard.as_ref() {
            let value =
                existing.downcast_ref::<T>().cloned().expect("singleflight type mismatch for key");
            return (value, true);
        }
        let value = compute().await;
        *guard = Some(Arc::new(value.clone()) as Arc<dyn Any + Send + Sync>);
        drop(guard);
        self.inflight.remove_if(key, |_, v| Arc::ptr_eq(v, &slot));
        (value, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn concurrent_callers_compute_exactly_once() {
        let sf = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let sf = sf.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                sf.do_once("k", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    42u32
                })
                .await
            }));
        }

        let mut follower_count = 0;
        for h in handles {
            let (value, was_follower) = h.await.unwrap();
            assert_eq!(value, 42);
            if was_follower {
                follower_count += 1;
            }
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(follower_count, 7);
    }
}
