//! Resolution cache
//!
//! Remembers every finished fallback attempt per track. Hits live for half
//! an hour; misses expire after a few seconds so a source recovering from a
//! blip is retried soon.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::resolver::AggregationResult;

pub const KEY_SUFFIX: &str = "_unblock_url";
pub const HIT_TTL: Duration = Duration::from_secs(30 * 60);
pub const MISS_TTL: Duration = Duration::from_secs(5);

/// Expired entries are swept on every this many writes
const PURGE_EVERY: usize = 64;

/// Key-value store with per-key expiry
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    async fn has(&self, key: &str) -> Result<bool>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;
}

#[derive(Debug)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Process-local [`KeyValueCache`]
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    writes: AtomicUsize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries, returning how many went
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl KeyValueCache for MemoryCache {
    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.live_value(key).is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.live_value(key))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .ok_or_else(|| anyhow!("ttl {:?} out of range", ttl))?;
        let mut entries = self.entries.lock();
        if self.writes.fetch_add(1, Ordering::Relaxed) % PURGE_EVERY == PURGE_EVERY - 1 {
            let before = entries.len();
            entries.retain(|_, entry| entry.is_live(now));
            debug!("cache sweep dropped {} entries", before - entries.len());
        }
        entries.insert(key.to_string(), CacheEntry { value, expires_at });
        Ok(())
    }
}

/// [`AggregationResult`]s keyed by track id only
#[derive(Clone)]
pub struct ResolutionCache {
    store: Arc<dyn KeyValueCache>,
}

impl ResolutionCache {
    pub fn new(store: Arc<dyn KeyValueCache>) -> Self {
        Self { store }
    }

    pub fn key(track_id: u64) -> String {
        format!("{}{}", track_id, KEY_SUFFIX)
    }

    pub fn ttl_for(result: &AggregationResult) -> Duration {
        if result.is_hit() { HIT_TTL } else { MISS_TTL }
    }

    /// Cached verdict for a track, if one is still live
    ///
    /// Store failures and unreadable entries count as a miss.
    pub async fn lookup(&self, track_id: u64) -> Option<AggregationResult> {
        let key = Self::key(track_id);
        let raw = match self.store.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("cache miss for track {}", track_id);
                return None;
            }
            Err(e) => {
                warn!("cache read for track {} failed: {}", track_id, e);
                return None;
            }
        };
        match serde_json::from_str::<AggregationResult>(&raw) {
            Ok(result) => {
                debug!("cache hit for track {}: '{}'", track_id, result.chosen_url);
                Some(result)
            }
            Err(e) => {
                warn!("discarding unreadable cache entry {}: {}", key, e);
                None
            }
        }
    }

    pub async fn store(&self, track_id: u64, result: &AggregationResult) {
        let ttl = Self::ttl_for(result);
        let raw = match serde_json::to_string(result) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("could not encode result for track {}: {}", track_id, e);
                return;
            }
        };
        if let Err(e) = self.store.set(&Self::key(track_id), raw, ttl).await {
            warn!("cache write for track {} failed: {}", track_id, e);
        }
    }

    pub async fn contains(&self, track_id: u64) -> bool {
        self.store.has(&Self::key(track_id)).await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::source::SourceName;
    use crate::fallback::testing::RecordingCache;

    fn hit() -> AggregationResult {
        AggregationResult {
            chosen_url: "http://q.example/a.mp3".into(),
            chosen_source: Some(SourceName::Qq),
            ..Default::default()
        }
    }

    #[test]
    fn test_ttl_is_asymmetric() {
        assert_eq!(ResolutionCache::ttl_for(&hit()), Duration::from_secs(1800));
        assert_eq!(
            ResolutionCache::ttl_for(&AggregationResult::default()),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_key_is_track_id_only() {
        assert_eq!(ResolutionCache::key(347230), "347230_unblock_url");
    }

    #[tokio::test]
    async fn test_memory_cache_expiry() {
        let cache = MemoryCache::new();
        cache.set("a", "1".into(), Duration::from_millis(20)).await.unwrap();
        cache.set("b", "2".into(), Duration::from_secs(60)).await.unwrap();
        assert!(cache.has("a").await.unwrap());
        assert_eq!(cache.get("b").await.unwrap().as_deref(), Some("2"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!cache.has("a").await.unwrap());
        assert_eq!(cache.get("a").await.unwrap(), None);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = MemoryCache::new();
        cache.set("a", "1".into(), Duration::ZERO).await.unwrap();
        cache.set("b", "2".into(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_writes_sweep_expired_entries() {
        let cache = MemoryCache::new();
        for i in 0..1000 {
            cache
                .set(&ResolutionCache::key(i), "{}".into(), Duration::ZERO)
                .await
                .unwrap();
        }
        assert!(cache.len() <= PURGE_EVERY);

        cache.set("live", "1".into(), HIT_TTL).await.unwrap();
        for i in 0..PURGE_EVERY as u64 {
            cache
                .set(&ResolutionCache::key(i), "{}".into(), Duration::ZERO)
                .await
                .unwrap();
        }
        assert_eq!(cache.get("live").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_is_rejected() {
        let cache = MemoryCache::new();
        assert!(cache.set("a", "1".into(), Duration::MAX).await.is_err());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_store_then_lookup() {
        let store = Arc::new(RecordingCache::default());
        let cache = ResolutionCache::new(store.clone());
        assert_eq!(cache.lookup(7).await, None);

        cache.store(7, &hit()).await;
        assert_eq!(cache.lookup(7).await, Some(hit()));
        assert!(cache.contains(7).await);
        assert_eq!(
            store.writes.lock().clone(),
            vec![("7_unblock_url".to_string(), HIT_TTL)]
        );
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let store = Arc::new(MemoryCache::new());
        store
            .set(&ResolutionCache::key(9), "not json".into(), HIT_TTL)
            .await
            .unwrap();
        let cache = ResolutionCache::new(store);
        assert_eq!(cache.lookup(9).await, None);
    }
}
