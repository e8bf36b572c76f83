//! Generic in-memory cache driver.
//!
//! Modeled as a narrow capability boundary so discovery and the token store don't care
//! whether the backing store is this in-memory one or something else later;
//! misses and deserialize failures on read are always non-fatal — the caller just re-fetches.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;

#[async_trait]
pub trait Cache<K, V>: Send + Sync
where
    K: std::hash::Hash + Eq + Send + Sync,
    V: Clone + Send + Sync,
{
    async fn get(&self, key: &K) -> Option<V>;
    async fn set(&self, key: K, value: V, ttl: Duration);
    async fn delete(&self, key: &K);
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// `dashmap`-backed best-effort TTL cache. Expired entries are evicted lazily on the next read
/// or write that happens to observe them; there is no background sweep.
pub struct InMemoryCache<K, V> {
    inner: Arc<DashMap<K, Entry<V>>>,
}

impl<K, V> Default for InMemoryCache<K, V>
where
    K: std::hash::Hash + Eq,
{
    fn default() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }
}

impl<K, V> Clone for InMemoryCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl<K, V> Cache<K, V> for InMemoryCache<K, V>
where
    K: std::hash::Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> Option<V> {
        let entry = self.inner.get(key)?;
        if entry.expires_at <= Instant::now() {
            drop(entry);
            self.inner.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    async fn set(&self, key: K, value: V, ttl: Duration) {
        self.inner.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn delete(&self, key: &K) {
        self.inner.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_within_ttl() {
        let cache: InMemoryCache<String, String> = InMemoryCache::default();
        cache
            .set("k".to_string(), "v".to_string(), Duration::from_secs(60))
            .await;
        assert_eq!(cache.get(&"k".to_string()).await, Some("v".to_string()));
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let cache: InMemoryCache<String, String> = InMemoryCache::default();
        cache
            .set("k".to_string(), "v".to_string(), Duration::from_millis(1))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get(&"k".to_string()).await, None);
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let cache: InMemoryCache<String, String> = InMemoryCache::default();
        cache
            .set("k".to_string(), "v".to_string(), Duration::from_secs(60))
            .await;
        cache.delete(&"k".to_string()).await;
        assert_eq!(cache.get(&"k".to_string()).await, None);
    }
}
