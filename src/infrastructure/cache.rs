//! Process-wide read-through cache for reference data (shipping zones, coupons).

use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::{Duration, Instant};
use crate::Result;

#[derive(Clone, Debug)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

pub struct ReadThroughCache<K, V> {
    ttl: Duration,
    entries: DashMap<K, CacheEntry<V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> ReadThroughCache<K, V> {
    pub fn new(ttl: Duration) -> Self { Self { ttl, entries: DashMap::new() } }

    /// Cached value if still fresh, otherwise the result of `load` (which is cached on success).
    pub async fn get_or_load<F, Fut>(&self, key: K, load: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let fresh = self.entries.get(&key).filter(|e| e.expires_at > Instant::now()).map(|e| e.value.clone());
        if let Some(value) = fresh {
            return Ok(value);
        }
        let value = load().await?;
        self.entries.insert(key, CacheEntry { value: value.clone(), expires_at: Instant::now() + self.ttl });
        Ok(value)
    }

    pub fn invalidate(&self, key: &K) { self.entries.remove(key); }

    pub fn invalidate_all(&self) { self.entries.clear(); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_hit_then_invalidate() {
        let cache = ReadThroughCache::<&str, u32>::new(Duration::from_secs(60));
        let counter = AtomicU32::new(0);
        let loads = &counter;
        let load = move || async move { Ok(loads.fetch_add(1, Ordering::SeqCst) + 1) };
        assert_eq!(cache.get_or_load("k", load).await.unwrap(), 1);
        assert_eq!(cache.get_or_load("k", load).await.unwrap(), 1);
        cache.invalidate(&"k");
        assert_eq!(cache.get_or_load("k", load).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_expired_entry_reloads() {
        let cache = ReadThroughCache::<u8, u8>::new(Duration::ZERO);
        cache.get_or_load(1, || async { Ok(1) }).await.unwrap();
        assert_eq!(cache.get_or_load(1, || async { Ok(2) }).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_load_not_cached() {
        let cache = ReadThroughCache::<u8, u8>::new(Duration::from_secs(60));
        let err = cache.get_or_load(1, || async { Err(crate::EcommerceError::StorageError("down".into())) }).await;
        assert!(err.is_err());
        assert_eq!(cache.get_or_load(1, || async { Ok(7) }).await.unwrap(), 7);
    }
}
