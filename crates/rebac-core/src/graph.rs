//! Graph traversal state shared by one check or expand call tree

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rebac_cache::NamespaceCache;
use rebac_store::{TupleStore, VersionedNamespace};
use rebac_types::{ObjectRef, RelationDef, RelationTuple, Revision, Subject};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::Instrument;

use crate::{EvalError, Result};

/// Three-valued set membership
///
/// `Indeterminate` means the recursion budget ran out before membership
/// was decided. Operators combine values with Kleene logic, so an
/// undecided branch only matters when the decided ones do not settle the
/// answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Membership {
    Member,
    NotMember,
    Indeterminate,
}

impl Membership {
    pub fn or(self, other: Membership) -> Membership {
        match (self, other) {
            (Membership::Member, _) | (_, Membership::Member) => Membership::Member,
            (Membership::Indeterminate, _) | (_, Membership::Indeterminate) => {
                Membership::Indeterminate
            },
            _ => Membership::NotMember,
        }
    }

    pub fn and(self, other: Membership) -> Membership {
        match (self, other) {
            (Membership::NotMember, _) | (_, Membership::NotMember) => Membership::NotMember,
            (Membership::Indeterminate, _) | (_, Membership::Indeterminate) => {
                Membership::Indeterminate
            },
            _ => Membership::Member,
        }
    }

    pub fn not(self) -> Membership {
        match self {
            Membership::Member => Membership::NotMember,
            Membership::NotMember => Membership::Member,
            Membership::Indeterminate => Membership::Indeterminate,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Membership::Member => "member",
            Membership::NotMember => "not_member",
            Membership::Indeterminate => "indeterminate",
        }
    }
}

impl From<bool> for Membership {
    fn from(member: bool) -> Self {
        if member {
            Membership::Member
        } else {
            Membership::NotMember
        }
    }
}

/// What a lookup does when the namespace or relation is undefined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnMissing {
    Fail,
    /// Treat the branch as empty; used for objects reached through a tupleset
    Deny,
}

/// Identical sub-dispatches within one call tree
pub type DispatchKey = (ObjectRef, String, Subject, u32);

/// Graph traversal context
///
/// One context serves a whole call tree, so every read in it observes the
/// same revision.
pub struct GraphContext<'a> {
    /// Storage backend
    pub store: &'a dyn TupleStore,

    /// Namespace definitions, read through the cache
    pub namespaces: &'a NamespaceCache,

    /// Revision every read in this call tree uses
    pub revision: Revision,

    /// Sibling sub-dispatches evaluated at once
    pub concurrency: usize,

    memo: RwLock<HashMap<DispatchKey, Membership>>,
    dispatches: AtomicU64,
}

impl<'a> GraphContext<'a> {
    pub fn new(
        store: &'a dyn TupleStore,
        namespaces: &'a NamespaceCache,
        revision: Revision,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            namespaces,
            revision,
            concurrency: concurrency.max(1),
            memo: RwLock::new(HashMap::new()),
            dispatches: AtomicU64::new(0),
        }
    }

    pub async fn memoized(&self, key: &DispatchKey) -> Option<Membership> {
        self.memo.read().await.get(key).copied()
    }

    pub async fn memoize(&self, key: DispatchKey, membership: Membership) {
        self.memo.write().await.insert(key, membership);
    }

    pub fn record_dispatch(&self, operator: &'static str) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
        rebac_observe::metrics::record_dispatch(operator);
    }

    pub fn dispatch_count(&self) -> u64 {
        self.dispatches.load(Ordering::Relaxed)
    }

    /// Look up the namespace and relation for `object#relation`
    ///
    /// Returns `Ok(None)` only with [`OnMissing::Deny`].
    pub async fn resolve_relation(
        &self,
        object: &ObjectRef,
        relation: &str,
        on_missing: OnMissing,
    ) -> Result<Option<ResolvedRelation>> {
        let namespace =
            self.namespaces.get(self.store, &object.namespace, self.revision).await?;

        let Some(namespace) = namespace else {
            return match on_missing {
                OnMissing::Fail => Err(EvalError::NamespaceNotFound(object.namespace.clone())),
                OnMissing::Deny => Ok(None),
            };
        };

        if namespace.definition.find_relation(relation).is_none() {
            return match on_missing {
                OnMissing::Fail => Err(EvalError::RelationNotFound {
                    namespace: object.namespace.clone(),
                    relation: relation.to_string(),
                }),
                OnMissing::Deny => Ok(None),
            };
        }

        Ok(Some(ResolvedRelation { namespace, relation: relation.to_string() }))
    }

    /// Read the tuples of `object#relation` at this context's revision
    pub async fn read_tuples(
        &self,
        object: &ObjectRef,
        relation: &str,
    ) -> Result<Vec<RelationTuple>> {
        let span =
            rebac_observe::span_utils::store_span("read", &format!("{}#{}", object, relation));
        let tuples = self
            .store
            .read_tuples(&object.namespace, &object.object_id, relation, self.revision)
            .instrument(span.clone())
            .await?;
        span.record("tuple_count", tuples.len());
        rebac_observe::metrics::record_store_read(tuples.len());
        Ok(tuples)
    }
}

/// A relation definition located inside its namespace
pub struct ResolvedRelation {
    namespace: Arc<VersionedNamespace>,
    relation: String,
}

impl ResolvedRelation {
    pub fn definition(&self) -> Result<&RelationDef> {
        self.namespace.definition.find_relation(&self.relation).ok_or_else(|| {
            EvalError::Internal(format!("relation {} vanished from its namespace", self.relation))
        })
    }
}
