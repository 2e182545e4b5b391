use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::debug;

use crate::error::CacheError;
use crate::metrics::CACHE_SIZE;
use crate::models::DomainAnalysis;

// Key/value store holding serialized values with a TTL
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

// Cache entry with expiry
#[derive(Clone)]
pub struct CacheEntry {
    pub value: String,
    pub expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    // drop every expired entry, returns how many went away
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        CACHE_SIZE.set(self.entries.len() as f64);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // background cleanup, stops once the cache is dropped
    pub fn spawn_cleanup(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let purged = cache.purge_expired();
                if purged > 0 {
                    debug!(purged, remaining = cache.len(), "purged expired cache entries");
                }
            }
        })
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        if ttl.is_zero() {
            return Err(CacheError::InvalidTtl(ttl));
        }

        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        CACHE_SIZE.set(self.entries.len() as f64);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        CACHE_SIZE.set(self.entries.len() as f64);
        Ok(())
    }
}

/// Typed view over a [`CacheStore`] for domain analyses.
pub struct DomainCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl DomainCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn key(domain: &str) -> String {
        format!("domain:{}", domain.trim().to_lowercase())
    }

    pub async fn get(&self, domain: &str) -> Result<Option<DomainAnalysis>, CacheError> {
        match self.store.get(&Self::key(domain)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn set(&self, domain: &str, analysis: &DomainAnalysis) -> Result<(), CacheError> {
        let raw = serde_json::to_string(analysis)?;
        self.store.set(&Self::key(domain), raw, self.ttl).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AdvertiserCount;
    use chrono::Utc;

    fn analysis(domain: &str) -> DomainAnalysis {
        DomainAnalysis {
            domain: domain.to_string(),
            total_advertisers: 3,
            advertisers: vec![
                AdvertiserCount { domain: "google.com".into(), count: 2 },
                AdvertiserCount { domain: "openx.com".into(), count: 1 },
            ],
            cached: false,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = MemoryCache::new();
        cache.set("k", "v".into(), Duration::from_secs(10)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        // still stored until purged
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn zero_ttl_is_rejected() {
        let cache = MemoryCache::new();
        let err = cache.set("k", "v".into(), Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidTtl(_)));
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let cache = MemoryCache::new();
        cache.set("k", "v".into(), Duration::from_secs(60)).await.unwrap();
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_task_purges_in_background() {
        let cache = Arc::new(MemoryCache::new());
        cache.set("k", "v".into(), Duration::from_secs(5)).await.unwrap();

        let cleanup = cache.spawn_cleanup(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(cache.is_empty());

        cleanup.abort();
    }

    #[tokio::test]
    async fn domain_cache_stores_analysis_under_normalized_key() {
        let store = Arc::new(MemoryCache::new());
        let cache = DomainCache::new(store.clone(), Duration::from_secs(60));
        let stored = analysis("Example.com");

        cache.set("Example.com", &stored).await.unwrap();
        assert!(store.get("domain:example.com").await.unwrap().is_some());

        let loaded = cache.get("example.com").await.unwrap().unwrap();
        assert_eq!(loaded, stored);
    }
}
