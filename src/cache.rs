//! # Status Cache
//!
//! Keeps recent [`ServerStatus`] results keyed by `host:port`.
//!
//! ## Features
//! - **TTL expiry**: an entry older than the TTL is a miss and is dropped on access.
//! - **Bounded size**: inserting into a full cache evicts the oldest entry, the least
//!   accessed one among equally old entries.
//! - **Owned cleanup task**: a periodic sweep that is started and stopped explicitly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock, oneshot};
use tracing::{debug, info};

use crate::config::MAX_CACHE_DURATION;
use crate::protocol::packets::ServerStatus;

struct CacheEntry {
    data: Arc<ServerStatus>,
    expires_at: Instant,
    created_at: Instant,
    access_count: u64,
}

/// Counters of cache activity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub total_size: usize,
    /// Unix seconds of the last sweep
    pub last_cleanup: Option<i64>,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    stats: CacheStats,
}

pub struct StatusCache {
    ttl: Duration,
    max_entries: usize,
    inner: RwLock<CacheInner>,
    /// Channel for stopping the cleanup task
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl StatusCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl: ttl.min(MAX_CACHE_DURATION),
            max_entries: max_entries.max(1),
            inner: RwLock::new(CacheInner::default()),
            stop_tx: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, key: &str) -> Option<Arc<ServerStatus>> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let now = Instant::now();

        match inner.entries.get_mut(key) {
            Some(entry) if now <= entry.expires_at => {
                entry.access_count += 1;
                inner.stats.hits += 1;
                Some(entry.data.clone())
            }
            Some(_) => {
                inner.entries.remove(key);
                inner.stats.misses += 1;
                None
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    pub async fn set(&self, key: &str, data: ServerStatus) -> Arc<ServerStatus> {
        let mut inner = self.inner.write().await;

        if !inner.entries.contains_key(key) && inner.entries.len() >= self.max_entries {
            Self::evict_oldest(&mut inner);
        }

        let now = Instant::now();
        let data = Arc::new(data);
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                data: data.clone(),
                expires_at: now + self.ttl,
                created_at: now,
                access_count: 1,
            },
        );
        inner.stats.total_size = inner.entries.len();
        data
    }

    pub async fn delete(&self, key: &str) {
        let mut inner = self.inner.write().await;
        inner.entries.remove(key);
        inner.stats.total_size = inner.entries.len();
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.entries.clear();
        inner.stats.total_size = 0;
    }

    pub async fn keys(&self) -> Vec<String> {
        self.inner.read().await.entries.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.read().await;
        let mut stats = inner.stats.clone();
        stats.total_size = inner.entries.len();
        stats
    }

    /// Removes every expired entry, returns how many were dropped
    pub async fn cleanup(&self) -> usize {
        let mut inner = self.inner.write().await;
        let now = Instant::now();

        let before = inner.entries.len();
        inner.entries.retain(|_, entry| now <= entry.expires_at);
        let removed = before - inner.entries.len();

        inner.stats.evictions += removed as u64;
        inner.stats.last_cleanup = Some(chrono::Utc::now().timestamp());
        inner.stats.total_size = inner.entries.len();

        if removed > 0 {
            debug!(removed, remaining = inner.entries.len(), "Expired cache entries removed");
        }
        removed
    }

    fn evict_oldest(inner: &mut CacheInner) {
        let oldest = inner
            .entries
            .iter()
            .min_by(|(_, a), (_, b)| {
                a.created_at
                    .cmp(&b.created_at)
                    .then(a.access_count.cmp(&b.access_count))
            })
            .map(|(key, _)| key.clone());

        if let Some(key) = oldest {
            inner.entries.remove(&key);
            inner.stats.evictions += 1;
            debug!(key = %key, "Cache entry evicted");
        }
    }

    /// Spawns the periodic sweep; a running task is left as is
    pub async fn start_cleanup(self: &Arc<Self>, interval: Duration) {
        let mut stop_lock = self.stop_tx.lock().await;
        if stop_lock.is_some() {
            return;
        }

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        *stop_lock = Some(stop_tx);

        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.min(MAX_CACHE_DURATION));
            // first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        match cache.upgrade() {
                            Some(cache) => {
                                cache.cleanup().await;
                            }
                            None => break,
                        }
                    }
                }
            }
            debug!("Cache cleanup task stopped");
        });

        info!(interval = ?interval, "Cache cleanup task started");
    }

    /// Stops the periodic sweep if it runs
    pub async fn stop_cleanup(&self) {
        if let Some(tx) = self.stop_tx.lock().await.take() {
            let _ = tx.send(());
        }
    }

    pub async fn is_cleanup_running(&self) -> bool {
        self.stop_tx.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(address: &str) -> ServerStatus {
        ServerStatus::offline(address, "test", Duration::ZERO, "none")
    }

    #[tokio::test]
    async fn get_after_set_hits() {
        let cache = StatusCache::new(Duration::from_secs(30), 10);
        cache.set("a:5520", status("a:5520")).await;

        let hit = cache.get("a:5520").await.unwrap();
        assert_eq!(hit.address(), "a:5520");
        assert!(cache.get("b:5520").await.is_none());

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_size, 1);
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss_and_removed() {
        let cache = StatusCache::new(Duration::from_millis(20), 10);
        cache.set("a:5520", status("a:5520")).await;

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(cache.get("a:5520").await.is_none());
        assert!(cache.is_empty().await);
        assert_eq!(cache.stats().await.misses, 1);
    }

    #[tokio::test]
    async fn full_cache_evicts_oldest() {
        let cache = StatusCache::new(Duration::from_secs(30), 2);
        cache.set("first", status("first")).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.set("second", status("second")).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.set("third", status("third")).await;

        let mut keys = cache.keys().await;
        keys.sort();
        assert_eq!(keys, vec!["second".to_string(), "third".to_string()]);
        assert_eq!(cache.stats().await.evictions, 1);
    }

    #[tokio::test]
    async fn overwriting_existing_key_does_not_evict() {
        let cache = StatusCache::new(Duration::from_secs(30), 2);
        cache.set("a", status("a")).await;
        cache.set("b", status("b")).await;
        cache.set("a", status("a")).await;

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.stats().await.evictions, 0);
    }

    #[tokio::test]
    async fn cleanup_removes_only_expired() {
        let cache = StatusCache::new(Duration::from_millis(30), 10);
        cache.set("old", status("old")).await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        cache.set("new", status("new")).await;

        assert_eq!(cache.cleanup().await, 1);
        assert_eq!(cache.keys().await, vec!["new".to_string()]);

        let stats = cache.stats().await;
        assert_eq!(stats.evictions, 1);
        assert!(stats.last_cleanup.is_some());
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let cache = StatusCache::new(Duration::from_secs(30), 10);
        cache.set("a", status("a")).await;
        cache.set("b", status("b")).await;

        cache.delete("a").await;
        assert_eq!(cache.keys().await, vec!["b".to_string()]);

        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn background_cleanup_runs_until_stopped() {
        let cache = Arc::new(StatusCache::new(Duration::from_millis(10), 10));
        cache.start_cleanup(Duration::from_millis(20)).await;
        cache.start_cleanup(Duration::from_millis(20)).await;
        assert!(cache.is_cleanup_running().await);

        cache.set("a", status("a")).await;
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.is_empty().await);
        assert!(cache.stats().await.last_cleanup.is_some());

        cache.stop_cleanup().await;
        cache.stop_cleanup().await;
        assert!(!cache.is_cleanup_running().await);
    }
}
