//! In-memory storage backend for testing and development

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::metrics::{MetricsSnapshot, OpTimer, StoreMetrics};
use crate::{validate_revision, Result, TupleStore, VersionedNamespace};
use rebac_types::{NamespaceDefinition, RelationTuple, Revision, StoreError, TupleUpdate};

/// History retention used by [`MemoryBackend::new`]
pub const DEFAULT_GC_WINDOW: Duration = Duration::from_secs(60 * 60);

/// A tuple with the revision range in which it is live
#[derive(Debug, Clone, PartialEq, Eq)]
struct VersionedTuple {
    tuple: RelationTuple,
    created_at: Revision,
    deleted_at: Option<Revision>,
}

impl VersionedTuple {
    fn visible_at(&self, revision: Revision) -> bool {
        self.created_at <= revision && self.deleted_at.map_or(true, |deleted| deleted > revision)
    }
}

/// One version of a namespace; `None` records a deletion
#[derive(Debug, Clone)]
struct NamespaceVersion {
    definition: Option<NamespaceDefinition>,
    revision: Revision,
}

/// In-memory tuple store with revision history and a GC window
pub struct MemoryBackend {
    data: Arc<RwLock<MemoryStore>>,
    gc_window: Duration,
    metrics: Arc<StoreMetrics>,
}

#[derive(Default)]
struct MemoryStore {
    /// Primary storage: all tuples with their version history
    tuples: Vec<VersionedTuple>,

    /// Index by (namespace, object_id, relation)
    relation_index: HashMap<(String, String, String), Vec<usize>>,

    /// Index by (namespace, object_id) for prefix reads
    object_index: HashMap<(String, String), Vec<usize>>,

    /// Namespace versions in ascending revision order
    namespaces: HashMap<String, Vec<NamespaceVersion>>,

    /// Revision of the last write
    revision: Revision,

    /// Highest revision handed out by `head`
    issued: AtomicU64,
}

impl MemoryStore {
    /// Mint a revision newer than every earlier write and every issued head
    fn next_revision(&mut self) -> Revision {
        let now = Revision::now();
        let floor = self.revision.max(Revision(*self.issued.get_mut()));
        self.revision = if now > floor { now } else { floor.next() };
        self.revision
    }

    /// The current head, remembered so later writes land after it
    fn head(&self) -> Revision {
        let head = Revision::now().max(self.revision);
        let issued = self.issued.fetch_max(head.0, Ordering::AcqRel);
        Revision(issued.max(head.0))
    }

    fn insert(&mut self, tuple: RelationTuple, revision: Revision) {
        let idx = self.tuples.len();
        self.relation_index
            .entry((tuple.namespace.clone(), tuple.object_id.clone(), tuple.relation.clone()))
            .or_default()
            .push(idx);
        self.object_index
            .entry((tuple.namespace.clone(), tuple.object_id.clone()))
            .or_default()
            .push(idx);
        self.tuples.push(VersionedTuple { tuple, created_at: revision, deleted_at: None });
    }

    fn live_index(&self, tuple: &RelationTuple) -> Option<usize> {
        self.relation_index
            .get(&(tuple.namespace.clone(), tuple.object_id.clone(), tuple.relation.clone()))?
            .iter()
            .copied()
            .find(|&idx| {
                let vt = &self.tuples[idx];
                vt.deleted_at.is_none() && vt.tuple.subject == tuple.subject
            })
    }

    fn rebuild_indexes(&mut self) {
        self.relation_index.clear();
        self.object_index.clear();
        for (idx, vt) in self.tuples.iter().enumerate() {
            let tuple = &vt.tuple;
            self.relation_index
                .entry((tuple.namespace.clone(), tuple.object_id.clone(), tuple.relation.clone()))
                .or_default()
                .push(idx);
            self.object_index
                .entry((tuple.namespace.clone(), tuple.object_id.clone()))
                .or_default()
                .push(idx);
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_gc_window(DEFAULT_GC_WINDOW)
    }

    /// Create a backend that keeps `gc_window` worth of history readable
    pub fn with_gc_window(gc_window: Duration) -> Self {
        Self {
            data: Arc::new(RwLock::new(MemoryStore::default())),
            gc_window,
            metrics: Arc::new(StoreMetrics::new()),
        }
    }

    pub fn gc_window(&self) -> Duration {
        self.gc_window
    }

    /// Drop history that no readable revision can observe any more
    ///
    /// Returns the number of tuple and namespace versions removed.
    pub async fn collect_garbage(&self) -> Result<usize> {
        let mut guard = self.data.write().await;
        let store = &mut *guard;
        let horizon = store.head().saturating_sub(self.gc_window);

        let before = store.tuples.len();
        store.tuples.retain(|vt| vt.deleted_at.map_or(true, |deleted| deleted > horizon));
        let mut removed = before - store.tuples.len();
        if removed > 0 {
            store.rebuild_indexes();
        }

        for versions in store.namespaces.values_mut() {
            // Keep the newest version at or before the horizon; older ones are unreachable
            let visible_at_horizon = versions.iter().rposition(|v| v.revision <= horizon);
            if let Some(keep_from) = visible_at_horizon {
                removed += keep_from;
                versions.drain(..keep_from);
            }
        }
        store.namespaces.retain(|_, versions| {
            !(versions.len() == 1 && versions[0].definition.is_none() && versions[0].revision <= horizon)
        });

        debug!(removed = removed, horizon = %horizon, "Garbage collected store history");
        Ok(removed)
    }

    /// Get statistics about the store
    pub async fn stats(&self) -> MemoryStats {
        let store = self.data.read().await;

        let active_tuples = store.tuples.iter().filter(|vt| vt.deleted_at.is_none()).count();

        MemoryStats {
            total_tuples: store.tuples.len(),
            active_tuples,
            deleted_tuples: store.tuples.len() - active_tuples,
            current_revision: store.revision,
            namespaces: store
                .namespaces
                .values()
                .filter(|versions| versions.last().is_some_and(|v| v.definition.is_some()))
                .count(),
        }
    }

    fn check(&self, store: &MemoryStore, revision: Revision) -> Result<()> {
        let result = validate_revision(revision, store.head(), self.gc_window);
        if matches!(result, Err(StoreError::RevisionExpired { .. })) {
            self.metrics.record_expired_read();
        }
        result
    }

    fn collect_visible(
        store: &MemoryStore,
        indices: Option<&Vec<usize>>,
        revision: Revision,
        mut filter: impl FnMut(&RelationTuple) -> bool,
    ) -> Vec<RelationTuple> {
        indices
            .map(|v| v.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(|&idx| &store.tuples[idx])
            .filter(|vt| vt.visible_at(revision) && filter(&vt.tuple))
            .map(|vt| vt.tuple.clone())
            .collect()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TupleStore for MemoryBackend {
    async fn read_tuples(
        &self,
        namespace: &str,
        object_id: &str,
        relation: &str,
        revision: Revision,
    ) -> Result<Vec<RelationTuple>> {
        let timer = OpTimer::new();
        let store = self.data.read().await;

        if let Err(e) = self.check(&store, revision) {
            self.metrics.record_read(timer.elapsed(), true);
            return Err(e);
        }

        let key = (namespace.to_string(), object_id.to_string(), relation.to_string());
        let tuples = Self::collect_visible(&store, store.relation_index.get(&key), revision, |_| true);

        self.metrics.record_read(timer.elapsed(), false);
        Ok(tuples)
    }

    async fn read_tuples_by_prefix(
        &self,
        namespace: &str,
        object_id: &str,
        relation_prefix: &str,
        revision: Revision,
    ) -> Result<Vec<RelationTuple>> {
        let timer = OpTimer::new();
        let store = self.data.read().await;

        if let Err(e) = self.check(&store, revision) {
            self.metrics.record_read(timer.elapsed(), true);
            return Err(e);
        }

        let key = (namespace.to_string(), object_id.to_string());
        let mut tuples = Self::collect_visible(&store, store.object_index.get(&key), revision, |t| {
            t.relation.starts_with(relation_prefix)
        });
        tuples.sort();

        self.metrics.record_read(timer.elapsed(), false);
        Ok(tuples)
    }

    async fn head(&self) -> Result<Revision> {
        let store = self.data.read().await;
        Ok(store.head())
    }

    async fn check_revision(&self, revision: Revision) -> Result<()> {
        let store = self.data.read().await;
        self.check(&store, revision)
    }

    async fn read_namespace(
        &self,
        name: &str,
        revision: Revision,
    ) -> Result<Option<VersionedNamespace>> {
        let store = self.data.read().await;
        self.metrics.record_namespace_read();
        self.check(&store, revision)?;

        let found = store
            .namespaces
            .get(name)
            .and_then(|versions| versions.iter().rev().find(|v| v.revision <= revision))
            .and_then(|version| {
                version.definition.clone().map(|definition| VersionedNamespace {
                    definition,
                    revision: version.revision,
                })
            });
        Ok(found)
    }

    async fn write_tuples(&self, updates: Vec<TupleUpdate>) -> Result<Revision> {
        let timer = OpTimer::new();
        let mut store = self.data.write().await;
        let revision = store.next_revision();

        let mut touched = 0usize;
        let mut deleted = 0usize;
        for update in updates {
            match update {
                TupleUpdate::Touch(tuple) => {
                    if store.live_index(&tuple).is_none() {
                        store.insert(tuple, revision);
                        touched += 1;
                    }
                },
                TupleUpdate::Delete(tuple) => {
                    if let Some(idx) = store.live_index(&tuple) {
                        store.tuples[idx].deleted_at = Some(revision);
                        deleted += 1;
                    }
                },
            }
        }

        self.metrics.record_write(timer.elapsed());
        debug!(revision = %revision, touched, deleted, "Wrote tuples");
        Ok(revision)
    }

    async fn write_namespace(&self, definition: NamespaceDefinition) -> Result<Revision> {
        let timer = OpTimer::new();
        let mut store = self.data.write().await;
        let revision = store.next_revision();

        debug!(namespace = %definition.name, revision = %revision, "Wrote namespace");
        store
            .namespaces
            .entry(definition.name.clone())
            .or_default()
            .push(NamespaceVersion { definition: Some(definition), revision });

        self.metrics.record_write(timer.elapsed());
        Ok(revision)
    }

    async fn delete_namespace(&self, name: &str) -> Result<Revision> {
        let timer = OpTimer::new();
        let mut store = self.data.write().await;

        let exists = store
            .namespaces
            .get(name)
            .and_then(|versions| versions.last())
            .is_some_and(|v| v.definition.is_some());
        if !exists {
            return Err(StoreError::NotFound);
        }

        let revision = store.next_revision();
        store
            .namespaces
            .entry(name.to_string())
            .or_default()
            .push(NamespaceVersion { definition: None, revision });

        self.metrics.record_write(timer.elapsed());
        Ok(revision)
    }

    fn metrics(&self) -> Option<MetricsSnapshot> {
        Some(self.metrics.snapshot())
    }
}

#[derive(Debug, Clone)]
pub struct MemoryStats {
    pub total_tuples: usize,
    pub active_tuples: usize,
    pub deleted_tuples: usize,
    pub current_revision: Revision,
    pub namespaces: usize,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rebac_types::{RelationDef, Subject};

    use super::*;

    fn tuple(s: &str) -> RelationTuple {
        s.parse().unwrap()
    }

    fn touch(s: &str) -> TupleUpdate {
        TupleUpdate::Touch(tuple(s))
    }

    #[tokio::test]
    async fn test_basic_operations() {
        let store = MemoryBackend::new();

        let rev = store.write_tuples(vec![touch("doc:readme#reader@user:alice")]).await.unwrap();

        let results = store.read_tuples("doc", "readme", "reader", rev).await.unwrap();
        assert_eq!(results, vec![tuple("doc:readme#reader@user:alice")]);
        assert!(store.read_tuples("doc", "readme", "writer", rev).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_revisions_strictly_increase() {
        let store = MemoryBackend::new();

        let rev1 = store.write_tuples(vec![touch("doc:1#reader@user:alice")]).await.unwrap();
        let rev2 = store.write_tuples(vec![touch("doc:2#reader@user:alice")]).await.unwrap();
        let rev3 = store.write_namespace(NamespaceDefinition::new("doc", vec![])).await.unwrap();

        assert!(rev1 < rev2);
        assert!(rev2 < rev3);
        assert!(store.head().await.unwrap() >= rev3);
    }

    #[tokio::test]
    async fn test_writes_land_after_observed_head() {
        let store = MemoryBackend::new();

        for i in 0..50 {
            let head = store.head().await.unwrap();
            let rev = store
                .write_tuples(vec![touch(&format!("doc:{i}#reader@user:alice"))])
                .await
                .unwrap();
            assert!(rev > head, "write at {rev:?} not after head {head:?}");

            let before = store.read_tuples("doc", &i.to_string(), "reader", head).await.unwrap();
            assert!(before.is_empty());
        }

        let head = store.head().await.unwrap();
        let rev = store.write_namespace(NamespaceDefinition::new("doc", vec![])).await.unwrap();
        assert!(rev > head);
    }

    #[tokio::test]
    async fn test_revision_isolation() {
        let store = MemoryBackend::new();

        let rev1 = store.write_tuples(vec![touch("doc:readme#reader@user:alice")]).await.unwrap();
        let rev2 = store.write_tuples(vec![touch("doc:readme#reader@user:bob")]).await.unwrap();

        // Read at rev1 should only see alice
        let results = store.read_tuples("doc", "readme", "reader", rev1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].subject, Subject::new("user", "alice"));

        // Read at rev2 should see both
        let results = store.read_tuples("doc", "readme", "reader", rev2).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryBackend::new();

        let rev1 = store.write_tuples(vec![touch("doc:readme#reader@user:alice")]).await.unwrap();
        let rev2 = store
            .write_tuples(vec![TupleUpdate::Delete(tuple("doc:readme#reader@user:alice"))])
            .await
            .unwrap();

        // Deleted tuples remain visible to older snapshots
        assert_eq!(store.read_tuples("doc", "readme", "reader", rev1).await.unwrap().len(), 1);
        assert!(store.read_tuples("doc", "readme", "reader", rev2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_touch_is_idempotent() {
        let store = MemoryBackend::new();

        store.write_tuples(vec![touch("doc:readme#reader@user:alice")]).await.unwrap();
        let rev = store.write_tuples(vec![touch("doc:readme#reader@user:alice")]).await.unwrap();

        let results = store.read_tuples("doc", "readme", "reader", rev).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(store.stats().await.total_tuples, 1);
    }

    #[tokio::test]
    async fn test_userset_subjects_are_distinct() {
        let store = MemoryBackend::new();

        let rev = store
            .write_tuples(vec![
                touch("doc:readme#reader@group:eng"),
                touch("doc:readme#reader@group:eng#member"),
            ])
            .await
            .unwrap();

        let results = store.read_tuples("doc", "readme", "reader", rev).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_read_by_prefix() {
        let store = MemoryBackend::new();

        let rev = store
            .write_tuples(vec![
                touch("doc:readme#can_view@user:alice"),
                touch("doc:readme#can_edit@user:bob"),
                touch("doc:readme#owner@user:carol"),
                touch("doc:other#can_view@user:dave"),
            ])
            .await
            .unwrap();

        let results = store.read_tuples_by_prefix("doc", "readme", "can_", rev).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|t| t.relation.starts_with("can_") && t.object_id == "readme"));

        let everything = store.read_tuples_by_prefix("doc", "readme", "", rev).await.unwrap();
        assert_eq!(everything.len(), 3);
    }

    #[tokio::test]
    async fn test_namespace_versions() {
        let store = MemoryBackend::new();

        let v1 = NamespaceDefinition::new("doc", vec![RelationDef::new("reader", None)]);
        let v2 = NamespaceDefinition::new(
            "doc",
            vec![RelationDef::new("reader", None), RelationDef::new("writer", None)],
        );

        let before = store.head().await.unwrap();
        let rev1 = store.write_namespace(v1.clone()).await.unwrap();
        let rev2 = store.write_namespace(v2.clone()).await.unwrap();

        assert!(store.read_namespace("doc", before).await.unwrap().is_none());
        let at_rev1 = store.read_namespace("doc", rev1).await.unwrap().unwrap();
        assert_eq!(at_rev1.definition, v1);
        assert_eq!(at_rev1.revision, rev1);
        let at_rev2 = store.read_namespace("doc", rev2).await.unwrap().unwrap();
        assert_eq!(at_rev2.definition, v2);

        let rev3 = store.delete_namespace("doc").await.unwrap();
        assert!(store.read_namespace("doc", rev3).await.unwrap().is_none());
        assert!(matches!(store.delete_namespace("doc").await, Err(StoreError::NotFound)));

        let metrics = store.metrics().unwrap();
        assert_eq!(metrics.namespace_read_count, 4);
    }

    #[tokio::test]
    async fn test_expired_revision_is_rejected() {
        let store = MemoryBackend::with_gc_window(Duration::from_secs(60));

        let rev = store.write_tuples(vec![touch("doc:readme#reader@user:alice")]).await.unwrap();

        // A revision far older than the window has been collected
        let ancient = rev.saturating_sub(Duration::from_secs(3600));
        let err = store.read_tuples("doc", "readme", "reader", ancient).await.unwrap_err();
        assert!(matches!(err, StoreError::RevisionExpired { .. }));

        // A read at head never expires
        let head = store.head().await.unwrap();
        assert!(store.read_tuples("doc", "readme", "reader", head).await.is_ok());
        assert_eq!(store.metrics().unwrap().expired_reads, 1);
    }

    #[tokio::test]
    async fn test_future_revision_is_rejected() {
        let store = MemoryBackend::new();
        let head = store.head().await.unwrap();
        let future = Revision(head.0 + Duration::from_secs(3600).as_nanos() as u64);

        let err = store.check_revision(future).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidRevision { .. }));
    }

    #[tokio::test]
    async fn test_collect_garbage() {
        let store = MemoryBackend::with_gc_window(Duration::from_millis(10));

        store.write_tuples(vec![touch("doc:readme#reader@user:alice")]).await.unwrap();
        store
            .write_tuples(vec![
                TupleUpdate::Delete(tuple("doc:readme#reader@user:alice")),
                touch("doc:readme#reader@user:bob"),
            ])
            .await
            .unwrap();
        store.write_namespace(NamespaceDefinition::new("doc", vec![])).await.unwrap();
        store.write_namespace(NamespaceDefinition::new("doc", vec![])).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        let removed = store.collect_garbage().await.unwrap();
        assert_eq!(removed, 2);

        let stats = store.stats().await;
        assert_eq!(stats.total_tuples, 1);
        assert_eq!(stats.namespaces, 1);

        let head = store.head().await.unwrap();
        let results = store.read_tuples("doc", "readme", "reader", head).await.unwrap();
        assert_eq!(results, vec![tuple("doc:readme#reader@user:bob")]);
        assert!(store.read_namespace("doc", head).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let store = Arc::new(MemoryBackend::new());

        let mut handles = vec![];

        for i in 0..10 {
            let store_clone = Arc::clone(&store);
            let handle = tokio::spawn(async move {
                store_clone.write_tuples(vec![touch(&format!("doc:{}#reader@user:alice", i))]).await
            });
            handles.push(handle);
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stats = store.stats().await;
        assert_eq!(stats.active_tuples, 10);
    }
}
