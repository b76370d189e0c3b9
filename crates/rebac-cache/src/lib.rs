//! # ReBAC Cache - Namespace Definition Cache
//!
//! Every dispatch step resolves its namespace definition through
//! [`NamespaceCache`]. Entries are keyed by namespace name and expire after a
//! fixed TTL; a TTL of zero turns the cache off so that every lookup goes to
//! the store.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use moka::future::Cache;
use rebac_store::{TupleStore, VersionedNamespace};
use rebac_types::{Revision, StoreResult};
use tracing::{debug, Instrument};

/// Cache of namespace definitions fetched from a [`TupleStore`]
///
/// The store is passed to each lookup rather than owned, so one cache
/// instance can be shared by every caller that reads the same store.
pub struct NamespaceCache {
    cache: Option<Cache<String, Arc<VersionedNamespace>>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    invalidations: AtomicU64,
}

impl NamespaceCache {
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        let cache = if ttl.is_zero() {
            None
        } else {
            Some(Cache::builder().max_capacity(max_capacity).time_to_live(ttl).build())
        };

        Self {
            cache,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            fetches: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// A cache that always fetches from the store
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, 0)
    }

    pub fn is_enabled(&self) -> bool {
        self.cache.is_some()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get the definition of `name` as of `revision`
    ///
    /// Returns `Ok(None)` when the namespace does not exist at that revision.
    /// Absent namespaces are never cached, so a namespace written after a
    /// failed lookup is visible on the next call. A cached entry written
    /// after `revision` is bypassed rather than served to an older read.
    pub async fn get(
        &self,
        store: &dyn TupleStore,
        name: &str,
        revision: Revision,
    ) -> StoreResult<Option<Arc<VersionedNamespace>>> {
        let span = rebac_observe::span_utils::cache_span("get", name);

        async {
            let mut cacheable = self.cache.is_some();
            if let Some(cache) = &self.cache {
                if let Some(entry) = cache.get(name).await {
                    if entry.revision <= revision {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        rebac_observe::metrics::record_namespace_cache_hit(true);
                        tracing::Span::current().record("hit", true);
                        return Ok(Some(entry));
                    }
                    // Keep the newer entry for reads at later revisions
                    cacheable = false;
                }
            }

            self.misses.fetch_add(1, Ordering::Relaxed);
            rebac_observe::metrics::record_namespace_cache_hit(false);
            tracing::Span::current().record("hit", false);

            self.fetch(store, name, revision, cacheable).await
        }
        .instrument(span)
        .await
    }

    async fn fetch(
        &self,
        store: &dyn TupleStore,
        name: &str,
        revision: Revision,
        cacheable: bool,
    ) -> StoreResult<Option<Arc<VersionedNamespace>>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let fetched = store.read_namespace(name, revision).await?;
        rebac_observe::metrics::record_namespace_fetch(fetched.is_some());

        let Some(versioned) = fetched else {
            debug!(namespace = name, revision = %revision, "Namespace not found");
            return Ok(None);
        };

        let entry = Arc::new(versioned);
        if let Some(cache) = self.cache.as_ref().filter(|_| cacheable) {
            // Concurrent misses race here; the last insert wins
            cache.insert(name.to_string(), Arc::clone(&entry)).await;
            debug!(namespace = name, revision = %entry.revision, "Cached namespace definition");
        }
        Ok(Some(entry))
    }

    /// Drop the cached definition of one namespace
    pub async fn invalidate(&self, name: &str) {
        if let Some(cache) = &self.cache {
            cache.invalidate(name).await;
            self.invalidations.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drop every cached definition
    pub fn invalidate_all(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
            self.invalidations.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);

        let total_requests = hits + misses;
        let hit_rate =
            if total_requests > 0 { (hits as f64 / total_requests as f64) * 100.0 } else { 0.0 };

        CacheStats {
            entry_count: self.cache.as_ref().map_or(0, |c| c.entry_count()),
            hits,
            misses,
            fetches: self.fetches.load(Ordering::Relaxed),
            hit_rate,
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }

    /// Reset statistics
    pub fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.fetches.store(0, Ordering::Relaxed);
        self.invalidations.store(0, Ordering::Relaxed);
    }
}

impl Default for NamespaceCache {
    fn default() -> Self {
        Self::disabled()
    }
}

#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Approximate, as reported by the underlying cache
    pub entry_count: u64,
    pub hits: u64,
    pub misses: u64,
    pub fetches: u64,
    pub hit_rate: f64,
    pub invalidations: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use async_trait::async_trait;
    use rebac_store::{MemoryBackend, MetricsSnapshot};
    use rebac_test_fixtures::direct_namespace;
    use rebac_types::{NamespaceDefinition, RelationTuple, StoreError, TupleUpdate};

    use super::*;

    async fn store_with_document() -> (MemoryBackend, Revision) {
        let store = MemoryBackend::new();
        let revision =
            store.write_namespace(direct_namespace("document", &["viewer"])).await.unwrap();
        (store, revision)
    }

    fn namespace_reads(store: &MemoryBackend) -> u64 {
        store.metrics().unwrap().namespace_read_count
    }

    #[tokio::test]
    async fn test_hit_after_first_fetch() {
        let (store, revision) = store_with_document().await;
        let cache = NamespaceCache::new(Duration::from_secs(60), 100);

        let first = cache.get(&store, "document", revision).await.unwrap().unwrap();
        let second = cache.get(&store, "document", revision).await.unwrap().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(namespace_reads(&store), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.fetches, 1);
        assert_eq!(stats.hit_rate, 50.0);
    }

    #[tokio::test]
    async fn test_zero_ttl_always_fetches() {
        let (store, revision) = store_with_document().await;
        let cache = NamespaceCache::new(Duration::ZERO, 100);
        assert!(!cache.is_enabled());

        for _ in 0..3 {
            assert!(cache.get(&store, "document", revision).await.unwrap().is_some());
        }

        assert_eq!(namespace_reads(&store), 3);
        assert_eq!(cache.stats().hits, 0);
    }

    #[tokio::test]
    async fn test_ttl_expiration_refetches() {
        let (store, revision) = store_with_document().await;
        let cache = NamespaceCache::new(Duration::from_millis(100), 100);

        cache.get(&store, "document", revision).await.unwrap();
        cache.get(&store, "document", revision).await.unwrap();
        assert_eq!(namespace_reads(&store), 1);

        // Wait for TTL to expire
        tokio::time::sleep(Duration::from_millis(150)).await;

        cache.get(&store, "document", revision).await.unwrap();
        assert_eq!(namespace_reads(&store), 2);
    }

    #[tokio::test]
    async fn test_not_found_is_not_cached() {
        let store = MemoryBackend::new();
        let cache = NamespaceCache::new(Duration::from_secs(60), 100);
        let head = store.head().await.unwrap();

        assert!(cache.get(&store, "document", head).await.unwrap().is_none());

        let revision =
            store.write_namespace(direct_namespace("document", &["viewer"])).await.unwrap();
        let found = cache.get(&store, "document", revision).await.unwrap();
        assert_eq!(found.unwrap().revision, revision);
    }

    #[tokio::test]
    async fn test_newer_cached_entry_is_bypassed_for_older_reads() {
        let store = MemoryBackend::new();
        let cache = NamespaceCache::new(Duration::from_secs(60), 100);

        let v1 = store.write_namespace(direct_namespace("document", &["viewer"])).await.unwrap();
        let v2 = store
            .write_namespace(direct_namespace("document", &["viewer", "editor"]))
            .await
            .unwrap();

        let latest = cache.get(&store, "document", v2).await.unwrap().unwrap();
        assert!(latest.definition.find_relation("editor").is_some());

        let older = cache.get(&store, "document", v1).await.unwrap().unwrap();
        assert!(older.definition.find_relation("editor").is_none());

        // The older fetch must not replace the newer entry
        let again = cache.get(&store, "document", v2).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&latest, &again));
    }

    #[tokio::test]
    async fn test_invalidate() {
        let (store, revision) = store_with_document().await;
        let cache = NamespaceCache::new(Duration::from_secs(60), 100);

        cache.get(&store, "document", revision).await.unwrap();
        cache.invalidate("document").await;
        cache.get(&store, "document", revision).await.unwrap();
        assert_eq!(namespace_reads(&store), 2);

        cache.invalidate_all();
        cache.get(&store, "document", revision).await.unwrap();
        assert_eq!(namespace_reads(&store), 3);
        assert_eq!(cache.stats().invalidations, 2);
    }

    struct UnavailableStore;

    #[async_trait]
    impl TupleStore for UnavailableStore {
        async fn read_tuples(
            &self,
            _namespace: &str,
            _object_id: &str,
            _relation: &str,
            _revision: Revision,
        ) -> StoreResult<Vec<RelationTuple>> {
            Err(StoreError::Unavailable("offline".to_string()))
        }

        async fn read_tuples_by_prefix(
            &self,
            _namespace: &str,
            _object_id: &str,
            _relation_prefix: &str,
            _revision: Revision,
        ) -> StoreResult<Vec<RelationTuple>> {
            Err(StoreError::Unavailable("offline".to_string()))
        }

        async fn head(&self) -> StoreResult<Revision> {
            Err(StoreError::Unavailable("offline".to_string()))
        }

        async fn check_revision(&self, _revision: Revision) -> StoreResult<()> {
            Err(StoreError::Unavailable("offline".to_string()))
        }

        async fn read_namespace(
            &self,
            _name: &str,
            _revision: Revision,
        ) -> StoreResult<Option<VersionedNamespace>> {
            Err(StoreError::Unavailable("offline".to_string()))
        }

        async fn write_tuples(&self, _updates: Vec<TupleUpdate>) -> StoreResult<Revision> {
            Err(StoreError::Unavailable("offline".to_string()))
        }

        async fn write_namespace(&self, _definition: NamespaceDefinition) -> StoreResult<Revision> {
            Err(StoreError::Unavailable("offline".to_string()))
        }

        async fn delete_namespace(&self, _name: &str) -> StoreResult<Revision> {
            Err(StoreError::Unavailable("offline".to_string()))
        }

        fn metrics(&self) -> Option<MetricsSnapshot> {
            None
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_distinct_from_not_found() {
        let cache = NamespaceCache::new(Duration::from_secs(60), 100);

        let err = cache.get(&UnavailableStore, "document", Revision(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
