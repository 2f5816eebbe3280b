//! In-memory TTL cache in front of the durable store.
//!
//! The read service checks here first; a miss falls through to SQLite and
//! repopulates the entry with the dataset's TTL. The cache is an optimization
//! only: a disabled cache degrades every read to a store lookup, it never
//! fails a request.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Clone)]
pub struct Cache {
    inner: Option<Arc<RwLock<HashMap<String, Entry>>>>,
}

struct Entry {
    value: serde_json::Value,
    expires_at: Instant,
}

impl Cache {
    pub fn new() -> Self {
        Cache {
            inner: Some(Arc::new(RwLock::new(HashMap::new()))),
        }
    }

    /// A cache where every operation is a no-op. Reads fall through to the
    /// durable store; nothing errors.
    pub fn disabled() -> Self {
        Cache { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Fetch a live (non-expired) entry. Expired entries are dropped lazily.
    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let inner = self.inner.as_ref()?;
        {
            let map = inner.read().await;
            match map.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Some(entry.value.clone());
                }
                Some(_) => {} // expired, evict below
                None => return None,
            }
        }
        let mut map = inner.write().await;
        map.remove(key);
        debug!("cache: evicted expired key '{}'", key);
        None
    }

    pub async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        if let Some(inner) = &self.inner {
            let mut map = inner.write().await;
            map.insert(
                key.to_string(),
                Entry {
                    value,
                    expires_at: Instant::now() + ttl,
                },
            );
        }
    }

    pub async fn delete(&self, key: &str) {
        if let Some(inner) = &self.inner {
            inner.write().await.remove(key);
        }
    }

    /// Number of entries, including not-yet-evicted expired ones.
    pub async fn len(&self) -> usize {
        match &self.inner {
            Some(inner) => inner.read().await.len(),
            None => 0,
        }
    }
}

impl Default for Cache {
    fn default() -> Self {
        Cache::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = Cache::new();
        cache
            .set("live_fixtures", json!([1, 2, 3]), Duration::from_secs(60))
            .await;
        assert_eq!(cache.get("live_fixtures").await, Some(json!([1, 2, 3])));
    }

    #[tokio::test]
    async fn test_expired_entry_misses() {
        let cache = Cache::new();
        cache
            .set("live_fixtures", json!("x"), Duration::from_millis(5))
            .await;
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert!(cache.get("live_fixtures").await.is_none());
        // Lazy eviction removed the entry.
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_delete() {
        let cache = Cache::new();
        cache.set("k", json!(1), Duration::from_secs(60)).await;
        cache.delete("k").await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_cache_is_silent_noop() {
        let cache = Cache::disabled();
        cache.set("k", json!(1), Duration::from_secs(60)).await;
        assert!(cache.get("k").await.is_none());
        cache.delete("k").await;
        assert!(!cache.is_enabled());
    }
}
