//! Revision selection
//!
//! The [`RevisionOracle`] turns a [`Consistency`] choice into the single
//! revision an entire check or expand reads at. Latency-minimizing reads are
//! pushed a random distance into the past so that concurrent callers spread
//! across nearby snapshots instead of all hitting the newest one.

use std::time::Duration;

use rand::Rng;
use rebac_store::{validate_revision, TupleStore, DEFAULT_GC_WINDOW};
use rebac_types::{Revision, StoreError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Result;

/// How fresh the snapshot for a request must be
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Consistency {
    /// A recent revision chosen by the oracle, possibly slightly stale
    #[default]
    MinimizeLatency,
    /// The oracle's revision, raised to at least the given one
    AtLeastAsFresh(Revision),
    /// Exactly the given revision; fails if it has been collected
    AtExactSnapshot(Revision),
    /// The store head with no jitter
    FullyConsistent,
}

#[derive(Debug, Clone)]
pub struct RevisionOracle {
    gc_window: Duration,
    fuzzing_window: Duration,
}

impl RevisionOracle {
    pub fn new(gc_window: Duration, fuzzing_window: Duration) -> Self {
        Self { gc_window, fuzzing_window }
    }

    pub fn gc_window(&self) -> Duration {
        self.gc_window
    }

    pub fn fuzzing_window(&self) -> Duration {
        self.fuzzing_window
    }

    /// The newest revision, without jitter
    pub async fn head(&self, store: &dyn TupleStore) -> Result<Revision> {
        Ok(store.head().await?)
    }

    /// A recent revision: head minus a random jitter, never past the GC horizon
    pub async fn now(&self, store: &dyn TupleStore) -> Result<Revision> {
        let head = store.head().await?;
        Ok(self.jittered(head))
    }

    /// Like [`RevisionOracle::now`], but never older than `pinned`
    pub async fn now_at_least(&self, store: &dyn TupleStore, pinned: Revision) -> Result<Revision> {
        let head = store.head().await?;
        self.validate(pinned, head)?;
        Ok(self.jittered(head).max(pinned))
    }

    /// Whether `revision` has fallen behind the GC horizon
    pub async fn is_expired(&self, store: &dyn TupleStore, revision: Revision) -> Result<bool> {
        let head = store.head().await?;
        Ok(head.since(revision) > self.gc_window)
    }

    /// Fail with `RevisionExpired` or `InvalidRevision` unless `revision` is readable
    pub async fn check_revision(&self, store: &dyn TupleStore, revision: Revision) -> Result<()> {
        let head = store.head().await?;
        self.validate(revision, head)
    }

    /// Pick the revision a request reads at
    pub async fn resolve(
        &self,
        store: &dyn TupleStore,
        consistency: Consistency,
    ) -> Result<Revision> {
        let revision = match consistency {
            Consistency::MinimizeLatency => self.now(store).await?,
            Consistency::AtLeastAsFresh(pinned) => self.now_at_least(store, pinned).await?,
            Consistency::AtExactSnapshot(revision) => {
                self.check_revision(store, revision).await?;
                revision
            },
            Consistency::FullyConsistent => self.head(store).await?,
        };
        debug!(consistency = ?consistency, revision = %revision, "Resolved read revision");
        Ok(revision)
    }

    fn validate(&self, revision: Revision, head: Revision) -> Result<()> {
        validate_revision(revision, head, self.gc_window).map_err(|e| {
            if matches!(e, StoreError::RevisionExpired { .. }) {
                rebac_observe::metrics::record_revision_expired();
            }
            e.into()
        })
    }

    fn jittered(&self, head: Revision) -> Revision {
        let fuzz = u64::try_from(self.fuzzing_window.as_nanos()).unwrap_or(u64::MAX);
        let jitter = if fuzz == 0 { 0 } else { rand::thread_rng().gen_range(0..=fuzz) };
        let horizon = head.saturating_sub(self.gc_window);
        Revision(head.0.saturating_sub(jitter)).max(horizon)
    }
}

impl Default for RevisionOracle {
    fn default() -> Self {
        Self::new(DEFAULT_GC_WINDOW, Duration::from_millis(10))
    }
}
