//! Fixed-TTL response cache.
//!
//! Sits in front of the aggregator: handlers look here first and store
//! computed responses afterwards. The aggregator itself never sees it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

/// A cached value and the instant it stops being served.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: Instant,
}

/// Key → value map with one TTL for every entry.
///
/// Expiry is lazy: an expired entry is a miss on read even while it still
/// sits in the map. [`ResponseCache::purge_expired`] reclaims the memory.
///
/// Every [`ResponseCache::clear`] advances a generation counter. A value
/// computed under an older generation is refused by
/// [`ResponseCache::set_if_current`].
#[derive(Debug)]
pub struct ResponseCache<V = serde_json::Value> {
    ttl: Duration,
    generation: AtomicU64,
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            generation: AtomicU64::new(0),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of clears so far. Capture it before computing a value.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now()).await
    }

    /// Lookup as of `now`.
    pub async fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if now < entry.expires_at => {
                debug!(key, "cache hit");
                Some(entry.value.clone())
            }
            Some(_) => {
                debug!(key, "cache entry expired");
                None
            }
            None => {
                debug!(key, "cache miss");
                None
            }
        }
    }

    pub async fn set(&self, key: impl Into<String>, value: V) {
        self.set_at(key, value, Instant::now()).await
    }

    /// Store `value` as if written at `now`.
    pub async fn set_at(&self, key: impl Into<String>, value: V, now: Instant) {
        let entry = CacheEntry {
            value,
            expires_at: now + self.ttl,
        };
        self.entries.write().await.insert(key.into(), entry);
    }

    pub async fn set_if_current(&self, key: impl Into<String>, value: V, generation: u64) -> bool {
        self.set_if_current_at(key, value, generation, Instant::now())
            .await
    }

    /// Store `value` only if no clear happened since `generation` was read.
    /// Returns whether it was stored.
    pub async fn set_if_current_at(
        &self,
        key: impl Into<String>,
        value: V,
        generation: u64,
        now: Instant,
    ) -> bool {
        let key = key.into();
        let mut entries = self.entries.write().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(key = %key, "cache cleared while computing; not stored");
            return false;
        }
        let entry = CacheEntry {
            value,
            expires_at: now + self.ttl,
        };
        entries.insert(key, entry);
        true
    }

    /// Drop every entry and advance the generation.
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        let dropped = entries.len();
        entries.clear();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(dropped, generation, "cache cleared");
    }

    /// Remove entries that expired before `now`. Returns how many went.
    pub async fn purge_expired_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| now < e.expires_at);
        before - entries.len()
    }

    pub async fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now()).await
    }

    /// Entries physically held, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Periodically purge expired entries until the cache is dropped elsewhere.
pub fn spawn_sweeper<V>(cache: Arc<ResponseCache<V>>, every: Duration) -> tokio::task::JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = cache.purge_expired().await;
            if purged > 0 {
                debug!(purged, "purged expired cache entries");
            }
        }
    })
}
