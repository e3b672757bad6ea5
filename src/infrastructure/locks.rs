//! Per-key async mutual exclusion (one cart owner, one order).
//!
//! A key's slot lives only while someone holds or waits on it: the last
//! guard to drop removes it, so the map tracks in-flight keys, not every key
//! ever seen.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub struct KeyedLocks<K: Eq + Hash + Clone> {
    slots: DashMap<K, Arc<Mutex<()>>>,
}

/// Exclusive access to one key; released (and the slot reclaimed if idle) on drop.
pub struct KeyGuard<'a, K: Eq + Hash + Clone> {
    locks: &'a KeyedLocks<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self { Self { slots: DashMap::new() } }

    /// Waits for exclusive access to `key`.
    pub async fn lock(&self, key: &K) -> KeyGuard<'_, K> {
        let slot = self.slots.entry(key.clone()).or_default().clone();
        let guard = slot.lock_owned().await;
        KeyGuard { locks: self, key: key.clone(), guard: Some(guard) }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize { self.slots.len() }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self { Self::new() }
}

impl<K: Eq + Hash + Clone> Drop for KeyGuard<'_, K> {
    fn drop(&mut self) {
        self.guard.take();
        // Only the map's own reference left: nobody holds or waits on the slot.
        // `entry()` and `remove_if` share the shard lock, so a concurrent
        // `lock` either sees the slot removed or bumps the count first.
        self.locks.slots.remove_if(&self.key, |_, slot| Arc::strong_count(slot) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_serializes() {
        let locks = Arc::new(KeyedLocks::<u32>::new());
        let counter = Arc::new(std::sync::Mutex::new(0u32));
        let mut handles = vec![];
        for _ in 0..20 {
            let (locks, counter) = (locks.clone(), counter.clone());
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(&1).await;
                let seen = *counter.lock().unwrap();
                tokio::time::sleep(Duration::from_millis(1)).await;
                *counter.lock().unwrap() = seen + 1;
            }));
        }
        for h in handles { h.await.unwrap(); }
        assert_eq!(*counter.lock().unwrap(), 20);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_slot_released_with_last_guard() {
        let locks = KeyedLocks::<u32>::new();
        let held = locks.lock(&1).await;
        drop(locks.lock(&2).await);
        assert_eq!(locks.len(), 1);
        drop(held);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_waiter_keeps_slot_alive() {
        let locks = Arc::new(KeyedLocks::<u32>::new());
        let first = locks.lock(&7).await;
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(&7).await;
                tokio::time::sleep(Duration::from_millis(5)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        drop(first);
        assert_eq!(locks.len(), 1);
        waiter.await.unwrap();
        assert_eq!(locks.len(), 0);
    }
}
