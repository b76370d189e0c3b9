//! # ReBAC Store - Storage Abstraction Layer
//!
//! The dispatch engine only ever sees storage through [`TupleStore`]: an
//! ordered, revision-addressable tuple store that also versions namespace
//! definitions. [`MemoryBackend`] is the in-process implementation.

use async_trait::async_trait;
use rebac_types::{
    NamespaceDefinition, RelationTuple, Revision, StoreError, StoreResult, TupleUpdate,
};

pub mod memory;
pub mod metrics;

pub use memory::{MemoryBackend, MemoryStats, DEFAULT_GC_WINDOW};
pub use metrics::{MetricsSnapshot, OpTimer, StoreMetrics};

type Result<T> = StoreResult<T>;

/// A namespace definition together with the revision that wrote it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedNamespace {
    pub definition: NamespaceDefinition,
    pub revision: Revision,
}

/// The abstract tuple store interface
///
/// Every read names the revision it observes. Reads never see writes made
/// after that revision, and reads at revisions older than the store's
/// garbage collection horizon fail with [`StoreError::RevisionExpired`]
/// instead of silently returning a different snapshot.
#[async_trait]
pub trait TupleStore: Send + Sync {
    /// Read tuples for an exact `(namespace, object_id, relation)`
    async fn read_tuples(
        &self,
        namespace: &str,
        object_id: &str,
        relation: &str,
        revision: Revision,
    ) -> Result<Vec<RelationTuple>>;

    /// Read tuples on an object whose relation starts with `relation_prefix`
    ///
    /// An empty prefix returns every tuple on the object.
    async fn read_tuples_by_prefix(
        &self,
        namespace: &str,
        object_id: &str,
        relation_prefix: &str,
        revision: Revision,
    ) -> Result<Vec<RelationTuple>>;

    /// The newest readable revision
    async fn head(&self) -> Result<Revision>;

    /// Fail if `revision` can no longer be read or lies ahead of head
    async fn check_revision(&self, revision: Revision) -> Result<()>;

    /// Read the namespace definition as of `revision`
    ///
    /// Returns `Ok(None)` when no definition existed at that revision.
    async fn read_namespace(
        &self,
        name: &str,
        revision: Revision,
    ) -> Result<Option<VersionedNamespace>>;

    /// Apply tuple mutations atomically and return the new revision
    async fn write_tuples(&self, updates: Vec<TupleUpdate>) -> Result<Revision>;

    /// Store a namespace definition, replacing any previous version
    async fn write_namespace(&self, definition: NamespaceDefinition) -> Result<Revision>;

    /// Remove a namespace definition
    async fn delete_namespace(&self, name: &str) -> Result<Revision>;

    /// Get metrics snapshot (optional, returns None if not supported)
    fn metrics(&self) -> Option<MetricsSnapshot> {
        None
    }
}

/// Shorthand for checking a revision against a head and GC window
pub fn validate_revision(
    revision: Revision,
    head: Revision,
    gc_window: std::time::Duration,
) -> Result<()> {
    if revision > head {
        return Err(StoreError::InvalidRevision { revision, head });
    }
    let horizon = head.saturating_sub(gc_window);
    if revision < horizon {
        return Err(StoreError::RevisionExpired { revision, horizon });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_validate_revision_window() {
        let head = Revision(10_000);
        let window = Duration::from_nanos(1_000);

        assert!(validate_revision(head, head, window).is_ok());
        assert!(validate_revision(Revision(9_000), head, window).is_ok());
        assert!(matches!(
            validate_revision(Revision(8_999), head, window),
            Err(StoreError::RevisionExpired { horizon: Revision(9_000), .. })
        ));
        assert!(matches!(
            validate_revision(Revision(10_001), head, window),
            Err(StoreError::InvalidRevision { .. })
        ));
    }
}
