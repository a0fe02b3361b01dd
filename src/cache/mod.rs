//! Result cache: bounded, TTL'd, LRU-evicted index of completed conversions.
//!
//! The in-memory index is the source of truth for reads; every mutation is
//! written through to the durable cache store so the two never diverge after
//! a successful `set`. A failed durable write rolls the in-memory change
//! back and surfaces the error.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::Result;
use crate::config::CacheConfig;
use crate::store::{CacheStore, JobStore};

/// Window of document activity considered when discovering warm candidates.
const WARM_ACTIVITY_WINDOW_HOURS: i64 = 24;

/// A cached successful conversion result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResult {
    pub document_id: String,
    /// Opaque conversion payload.
    pub result: serde_json::Value,
    /// Version/hash token for invalidation; `None` skips version checks.
    pub document_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u64,
    pub expires_at: DateTime<Utc>,
    /// Approximate serialized size.
    pub size_bytes: u64,
}

impl CachedResult {
    pub fn new(
        document_id: impl Into<String>,
        result: serde_json::Value,
        document_version: Option<String>,
        ttl: Duration,
    ) -> Result<Self> {
        let size_bytes = serde_json::to_vec(&result)?.len() as u64;
        let now = Utc::now();
        Ok(Self {
            document_id: document_id.into(),
            result,
            document_version,
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            expires_at: now + ttl,
            size_bytes,
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Access figure for one document, used in cache stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentAccess {
    pub document_id: String,
    pub access_count: u64,
}

/// Cache statistics and derived efficiency estimates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub average_access_count: f64,
    pub top_accessed: Vec<DocumentAccess>,
    /// Conversions avoided times the assumed per-conversion cost.
    pub estimated_time_saved_secs: u64,
    /// Bytes served from cache instead of being re-generated.
    pub estimated_bytes_served: u64,
}

/// Bounded, TTL'd, LRU-evicted cache of conversion results.
pub struct ResultCache {
    config: CacheConfig,
    store: Arc<dyn CacheStore>,
    jobs: Arc<dyn JobStore>,
    entries: DashMap<String, CachedResult>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    pub fn new(config: CacheConfig, store: Arc<dyn CacheStore>, jobs: Arc<dyn JobStore>) -> Self {
        Self {
            config,
            store,
            jobs,
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Populate the in-memory index from unexpired durable entries.
    pub async fn load_from_store(&self) -> Result<usize> {
        let loaded = self
            .store
            .find_unexpired(self.config.max_entries, Utc::now())
            .await?;
        let count = loaded.len();
        for entry in loaded {
            self.entries.insert(entry.document_id.clone(), entry);
        }
        if count > 0 {
            info!("Loaded {} cache entries from store", count);
        }
        Ok(count)
    }

    /// Look up the cached result for a document.
    ///
    /// Expired or version-mismatched entries are synchronously invalidated
    /// and count as misses.
    pub async fn get(
        &self,
        document_id: &str,
        document_version: Option<&str>,
    ) -> Result<Option<serde_json::Value>> {
        let now = Utc::now();

        let snapshot = self
            .entries
            .get(document_id)
            .map(|e| (e.expires_at, e.document_version.clone()));
        let Some((expires_at, version)) = snapshot else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        if expires_at <= now {
            debug!(document_id = %document_id, "Cache entry expired");
            self.remove_entry(document_id).await?;
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        if let Some(requested) = document_version
            && version.as_deref() != Some(requested)
        {
            debug!(
                document_id = %document_id,
                requested = %requested,
                "Cache entry version mismatch, invalidating"
            );
            self.remove_entry(document_id).await?;
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        let result = self.entries.get_mut(document_id).map(|mut entry| {
            entry.last_accessed_at = now;
            entry.access_count += 1;
            entry.result.clone()
        });

        match result {
            Some(result) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(result))
            }
            None => {
                // Entry disappeared between snapshot and touch.
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    /// Insert or refresh the entry for a document, writing through to the
    /// durable store. Evicts the least-recently-accessed entry first when
    /// the cache is full.
    pub async fn set(
        &self,
        document_id: &str,
        result: serde_json::Value,
        document_version: Option<String>,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let ttl = ttl.unwrap_or_else(|| Duration::seconds(self.config.default_ttl_secs as i64));
        let entry = CachedResult::new(document_id, result, document_version, ttl)?;

        if !self.entries.contains_key(document_id) && self.entries.len() >= self.config.max_entries
        {
            self.evict_lru().await?;
        }

        let previous = self.entries.insert(document_id.to_string(), entry.clone());
        if let Err(e) = self.store.upsert_by_document(&entry).await {
            // Keep memory and store consistent: undo the insert.
            match previous {
                Some(prev) => {
                    self.entries.insert(document_id.to_string(), prev);
                }
                None => {
                    self.entries.remove(document_id);
                }
            }
            return Err(e);
        }

        debug!(
            document_id = %document_id,
            size_bytes = entry.size_bytes,
            "Cached conversion result"
        );
        Ok(())
    }

    /// Remove a document's entry. Returns true when something was removed
    /// from either memory or the durable store.
    pub async fn invalidate(&self, document_id: &str) -> Result<bool> {
        let removed_memory = self.entries.remove(document_id).is_some();
        let removed_store = self.store.delete_by_document(document_id).await?;
        Ok(removed_memory || removed_store)
    }

    /// Remove several documents' entries. Returns the removal count.
    pub async fn invalidate_multiple(&self, document_ids: &[String]) -> Result<u64> {
        let mut removed_memory = 0u64;
        for document_id in document_ids {
            if self.entries.remove(document_id).is_some() {
                removed_memory += 1;
            }
        }
        let removed_store = self.store.delete_many(document_ids).await?;
        Ok(removed_memory.max(removed_store))
    }

    /// Drop every entry from memory and the durable store.
    pub async fn clear(&self) -> Result<()> {
        self.entries.clear();
        self.store.delete_all().await?;
        info!("Result cache cleared");
        Ok(())
    }

    /// Sweep expired entries from memory and the durable store.
    pub async fn cleanup_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let swept_memory = (before - self.entries.len()) as u64;

        let swept_store = self.store.delete_expired(now).await?;
        let swept = swept_memory.max(swept_store);
        if swept > 0 {
            debug!("Swept {} expired cache entries", swept);
        }
        Ok(swept)
    }

    /// Resolve the documents worth warming: the explicit ids that are not
    /// cached, or recently active documents discovered from job history.
    /// Bounded by the configured warm batch size.
    pub async fn warm_candidates(&self, document_ids: Option<&[String]>) -> Result<Vec<String>> {
        let candidates = match document_ids {
            Some(ids) => ids
                .iter()
                .filter(|id| !self.entries.contains_key(id.as_str()))
                .take(self.config.warm_batch_size)
                .cloned()
                .collect(),
            None => {
                let since = Utc::now() - Duration::hours(WARM_ACTIVITY_WINDOW_HOURS);
                let recent = self
                    .jobs
                    .recently_completed_documents(since, self.config.warm_batch_size * 4)
                    .await?;
                recent
                    .into_iter()
                    .filter(|id| !self.entries.contains_key(id.as_str()))
                    .take(self.config.warm_batch_size)
                    .collect()
            }
        };
        Ok(candidates)
    }

    /// Current statistics, including derived efficiency estimates.
    pub fn get_stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        let mut total_size_bytes = 0u64;
        let mut total_access = 0u64;
        let mut estimated_bytes_served = 0u64;
        let mut accesses: Vec<DocumentAccess> = Vec::with_capacity(self.entries.len());
        for entry in self.entries.iter() {
            total_size_bytes += entry.size_bytes;
            total_access += entry.access_count;
            estimated_bytes_served += entry.size_bytes * entry.access_count;
            accesses.push(DocumentAccess {
                document_id: entry.document_id.clone(),
                access_count: entry.access_count,
            });
        }

        accesses.sort_by(|a, b| b.access_count.cmp(&a.access_count));
        accesses.truncate(self.config.top_accessed_limit);

        let entries = self.entries.len();
        CacheStats {
            entries,
            total_size_bytes,
            hits,
            misses,
            hit_rate: if lookups > 0 {
                hits as f64 / lookups as f64
            } else {
                0.0
            },
            average_access_count: if entries > 0 {
                total_access as f64 / entries as f64
            } else {
                0.0
            },
            top_accessed: accesses,
            estimated_time_saved_secs: hits * self.config.assumed_conversion_secs,
            estimated_bytes_served,
        }
    }

    /// Number of live in-memory entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, document_id: &str) -> bool {
        self.entries.contains_key(document_id)
    }

    async fn remove_entry(&self, document_id: &str) -> Result<()> {
        self.entries.remove(document_id);
        // "Not found" in the durable store is a no-op.
        self.store.delete_by_document(document_id).await?;
        Ok(())
    }

    async fn evict_lru(&self) -> Result<()> {
        let victim = self
            .entries
            .iter()
            .min_by_key(|entry| entry.last_accessed_at)
            .map(|entry| entry.document_id.clone());

        if let Some(document_id) = victim {
            self.entries.remove(&document_id);
            // Eviction bounds memory. If the durable delete fails the row
            // stays behind with its TTL intact; the expired sweep or the
            // next upsert for this document clears it.
            if let Err(e) = self.store.delete_by_document(&document_id).await {
                warn!(
                    document_id = %document_id,
                    error = %e,
                    "Failed to delete evicted entry from cache store"
                );
            }
            debug!(document_id = %document_id, "Evicted LRU cache entry");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryCacheStore, MemoryJobStore};
    use async_trait::async_trait;

    fn cache_with(config: CacheConfig) -> (ResultCache, Arc<MemoryCacheStore>) {
        let store = Arc::new(MemoryCacheStore::new());
        let cache = ResultCache::new(config, store.clone(), Arc::new(MemoryJobStore::new()));
        (cache, store)
    }

    fn payload(tag: &str) -> serde_json::Value {
        serde_json::json!({ "pages": [format!("{tag}.png")] })
    }

    #[tokio::test]
    async fn test_get_miss_then_hit() {
        let (cache, _) = cache_with(CacheConfig::default());
        assert!(cache.get("doc-1", None).await.unwrap().is_none());

        cache.set("doc-1", payload("a"), None, None).await.unwrap();
        let hit = cache.get("doc-1", None).await.unwrap().unwrap();
        assert_eq!(hit, payload("a"));

        let stats = cache.get_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_ttl_expiry_invalidates() {
        let (cache, store) = cache_with(CacheConfig::default());
        cache
            .set("doc-1", payload("a"), None, Some(Duration::milliseconds(100)))
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        assert!(cache.get("doc-1", None).await.unwrap().is_none());
        assert_eq!(cache.len(), 0);
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_version_mismatch_hard_invalidation() {
        let (cache, store) = cache_with(CacheConfig::default());
        cache
            .set("doc-1", payload("a"), Some("v1".to_string()), None)
            .await
            .unwrap();

        assert!(cache.get("doc-1", Some("v2")).await.unwrap().is_none());
        assert!(!cache.contains("doc-1"));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_matching_version_hits() {
        let (cache, _) = cache_with(CacheConfig::default());
        cache
            .set("doc-1", payload("a"), Some("v1".to_string()), None)
            .await
            .unwrap();
        assert!(cache.get("doc-1", Some("v1")).await.unwrap().is_some());
        // Caller without a version also hits.
        assert!(cache.get("doc-1", None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_lru_eviction_bound() {
        let (cache, _) = cache_with(CacheConfig::default().with_max_entries(3));
        cache.set("doc-1", payload("1"), None, None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        cache.set("doc-2", payload("2"), None, None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        cache.set("doc-3", payload("3"), None, None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        // Touch doc-1 so doc-2 becomes the LRU victim.
        cache.get("doc-1", None).await.unwrap();

        cache.set("doc-4", payload("4"), None, None).await.unwrap();
        assert_eq!(cache.len(), 3);
        assert!(cache.contains("doc-1"));
        assert!(!cache.contains("doc-2"));
        assert!(cache.contains("doc-3"));
        assert!(cache.contains("doc-4"));
    }

    struct FailingCacheStore;

    #[async_trait]
    impl CacheStore for FailingCacheStore {
        async fn upsert_by_document(&self, _entry: &CachedResult) -> Result<()> {
            Err(crate::Error::Database("disk full".to_string()))
        }
        async fn find_unexpired(
            &self,
            _limit: usize,
            _now: DateTime<Utc>,
        ) -> Result<Vec<CachedResult>> {
            Ok(vec![])
        }
        async fn delete_by_document(&self, _document_id: &str) -> Result<bool> {
            Ok(false)
        }
        async fn delete_many(&self, _document_ids: &[String]) -> Result<u64> {
            Ok(0)
        }
        async fn delete_expired(&self, _now: DateTime<Utc>) -> Result<u64> {
            Ok(0)
        }
        async fn delete_all(&self) -> Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_failed_durable_write_rolls_back_memory() {
        let cache = ResultCache::new(
            CacheConfig::default(),
            Arc::new(FailingCacheStore),
            Arc::new(MemoryJobStore::new()),
        );
        let err = cache.set("doc-1", payload("a"), None, None).await;
        assert!(err.is_err());
        assert!(!cache.contains("doc-1"));
    }

    #[tokio::test]
    async fn test_invalidate_multiple() {
        let (cache, _) = cache_with(CacheConfig::default());
        cache.set("doc-1", payload("1"), None, None).await.unwrap();
        cache.set("doc-2", payload("2"), None, None).await.unwrap();

        let removed = cache
            .invalidate_multiple(&["doc-1".to_string(), "doc-2".to_string(), "doc-3".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_expired_sweeps_both_sides() {
        let (cache, store) = cache_with(CacheConfig::default());
        cache
            .set("doc-1", payload("1"), None, Some(Duration::milliseconds(50)))
            .await
            .unwrap();
        cache.set("doc-2", payload("2"), None, None).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(80)).await;
        let swept = cache.cleanup_expired().await.unwrap();
        assert_eq!(swept, 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_load_from_store() {
        let store = Arc::new(MemoryCacheStore::new());
        let entry = CachedResult::new("doc-1", payload("1"), None, Duration::hours(1)).unwrap();
        store.upsert_by_document(&entry).await.unwrap();

        let cache = ResultCache::new(
            CacheConfig::default(),
            store,
            Arc::new(MemoryJobStore::new()),
        );
        assert_eq!(cache.load_from_store().await.unwrap(), 1);
        assert!(cache.contains("doc-1"));
    }

    #[tokio::test]
    async fn test_warm_candidates_explicit_skips_cached() {
        let (cache, _) = cache_with(CacheConfig::default().with_warm_batch_size(2));
        cache.set("doc-1", payload("1"), None, None).await.unwrap();

        let ids = vec![
            "doc-1".to_string(),
            "doc-2".to_string(),
            "doc-3".to_string(),
            "doc-4".to_string(),
        ];
        let candidates = cache.warm_candidates(Some(&ids)).await.unwrap();
        assert_eq!(candidates, vec!["doc-2".to_string(), "doc-3".to_string()]);
    }

    #[tokio::test]
    async fn test_stats_top_accessed() {
        let (cache, _) = cache_with(CacheConfig::default());
        cache.set("doc-1", payload("1"), None, None).await.unwrap();
        cache.set("doc-2", payload("2"), None, None).await.unwrap();
        for _ in 0..3 {
            cache.get("doc-2", None).await.unwrap();
        }
        cache.get("doc-1", None).await.unwrap();

        let stats = cache.get_stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.top_accessed[0].document_id, "doc-2");
        assert_eq!(stats.top_accessed[0].access_count, 3);
        assert!(stats.estimated_time_saved_secs >= 4 * 30);
    }
}
