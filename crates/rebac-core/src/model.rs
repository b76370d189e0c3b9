//! A complete engine instance
//!
//! [`Model`] bundles a tuple store, its namespace cache, a revision oracle and
//! an evaluator. Every instance is independent: nothing is shared between two
//! models unless the caller passes the same store to both.

use std::sync::Arc;

use rebac_cache::NamespaceCache;
use rebac_config::Config;
use rebac_store::{MemoryBackend, TupleStore};
use rebac_types::{
    NamespaceDefinition, ObjectRef, RelationTuple, Revision, StoreError, TupleUpdate,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::revision::{Consistency, RevisionOracle};
use crate::schema::{parse_schema, validate_namespace, validate_schema};
use crate::{
    CheckRequest, CheckResult, EvalError, Evaluator, ExpandRequest, ExpandResult, Result,
};

/// Selects the tuples on one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleFilter {
    pub namespace: String,
    pub object_id: String,
    /// Only relations starting with this prefix; empty matches all
    #[serde(default)]
    pub relation_prefix: String,
}

impl TupleFilter {
    pub fn object(object: &ObjectRef) -> Self {
        Self {
            namespace: object.namespace.clone(),
            object_id: object.object_id.clone(),
            relation_prefix: String::new(),
        }
    }

    pub fn with_relation_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.relation_prefix = prefix.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadTuplesResult {
    pub tuples: Vec<RelationTuple>,
    pub revision: Revision,
}

pub struct Model {
    store: Arc<dyn TupleStore>,
    namespaces: Arc<NamespaceCache>,
    oracle: RevisionOracle,
    evaluator: Evaluator,
}

impl Model {
    pub fn new(
        store: Arc<dyn TupleStore>,
        namespaces: Arc<NamespaceCache>,
        oracle: RevisionOracle,
        evaluator: Evaluator,
    ) -> Self {
        Self { store, namespaces, oracle, evaluator }
    }

    /// Build an in-memory model from validated configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        rebac_config::validation::validate(config)
            .map_err(|e| EvalError::Config(e.to_string()))?;

        let gc_window = config.revisions.gc_window();
        let store = MemoryBackend::with_gc_window(gc_window);
        let namespaces = NamespaceCache::new(
            config.namespace_cache.ttl(),
            config.namespace_cache.max_capacity,
        );

        info!(
            gc_window_secs = config.revisions.gc_window_secs,
            cache_ttl_ms = config.namespace_cache.ttl_ms,
            max_depth = config.engine.max_depth,
            "Created model"
        );

        Ok(Self::new(
            Arc::new(store),
            Arc::new(namespaces),
            RevisionOracle::new(gc_window, config.revisions.fuzzing_window()),
            Evaluator::from_config(&config.engine),
        ))
    }

    /// A model over a fresh in-memory store with default settings
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(NamespaceCache::disabled()),
            RevisionOracle::default(),
            Evaluator::default(),
        )
    }

    pub fn store(&self) -> &Arc<dyn TupleStore> {
        &self.store
    }

    pub fn namespaces(&self) -> &NamespaceCache {
        &self.namespaces
    }

    pub fn oracle(&self) -> &RevisionOracle {
        &self.oracle
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// The newest revision
    pub async fn head(&self) -> Result<Revision> {
        self.oracle.head(self.store.as_ref()).await
    }

    // ------------------------------------------------------------------------
    // Schema
    // ------------------------------------------------------------------------

    /// Parse, validate and store every namespace in a schema document
    ///
    /// Returns the revision of the last namespace written. Nothing is
    /// written if any namespace fails validation.
    pub async fn write_schema(&self, source: &str) -> Result<Revision> {
        let definitions = parse_schema(source)?;
        let errors = validate_schema(&definitions);
        if !errors.is_empty() {
            return Err(EvalError::InvalidSchema(errors));
        }

        let mut revision = self.head().await?;
        for definition in definitions {
            revision = self.store_namespace(definition).await?;
        }
        Ok(revision)
    }

    pub async fn write_namespace(&self, definition: NamespaceDefinition) -> Result<Revision> {
        let errors = validate_namespace(&definition);
        if !errors.is_empty() {
            return Err(EvalError::InvalidSchema(errors));
        }
        self.store_namespace(definition).await
    }

    pub async fn delete_namespace(&self, name: &str) -> Result<Revision> {
        let revision = self.store.delete_namespace(name).await.map_err(|e| match e {
            StoreError::NotFound => EvalError::NamespaceNotFound(name.to_string()),
            other => other.into(),
        })?;
        self.namespaces.invalidate(name).await;
        info!(namespace = name, revision = %revision, "Deleted namespace");
        Ok(revision)
    }

    pub async fn read_namespace(
        &self,
        name: &str,
        consistency: Consistency,
    ) -> Result<NamespaceDefinition> {
        let revision = self.oracle.resolve(self.store.as_ref(), consistency).await?;
        self.namespaces
            .get(self.store.as_ref(), name, revision)
            .await?
            .map(|versioned| versioned.definition.clone())
            .ok_or_else(|| EvalError::NamespaceNotFound(name.to_string()))
    }

    async fn store_namespace(&self, definition: NamespaceDefinition) -> Result<Revision> {
        let name = definition.name.clone();
        let revision = self.store.write_namespace(definition).await?;
        self.namespaces.invalidate(&name).await;
        info!(namespace = %name, revision = %revision, "Wrote namespace");
        Ok(revision)
    }

    // ------------------------------------------------------------------------
    // Tuples
    // ------------------------------------------------------------------------

    /// Apply tuple mutations after checking them against the current schema
    ///
    /// Tuples must name a defined relation, and userset subjects must name a
    /// defined relation of their own namespace. Deletes are checked too.
    #[instrument(skip(self, updates), fields(updates = updates.len()))]
    pub async fn write_tuples(&self, updates: Vec<TupleUpdate>) -> Result<Revision> {
        let head = self.head().await?;
        for update in &updates {
            self.validate_tuple(update.tuple(), head).await?;
        }

        let count = updates.len();
        let revision = self.store.write_tuples(updates).await?;
        rebac_observe::metrics::record_store_write(count);
        debug!(revision = %revision, "Wrote tuples");
        Ok(revision)
    }

    pub async fn read_tuples(
        &self,
        filter: &TupleFilter,
        consistency: Consistency,
    ) -> Result<ReadTuplesResult> {
        let revision = self.oracle.resolve(self.store.as_ref(), consistency).await?;
        let tuples = self
            .store
            .read_tuples_by_prefix(
                &filter.namespace,
                &filter.object_id,
                &filter.relation_prefix,
                revision,
            )
            .await?;
        rebac_observe::metrics::record_store_read(tuples.len());
        Ok(ReadTuplesResult { tuples, revision })
    }

    async fn validate_tuple(&self, tuple: &RelationTuple, revision: Revision) -> Result<()> {
        self.require_relation(tuple, &tuple.namespace, &tuple.relation, revision).await?;
        if let Some(subject_relation) = &tuple.subject.relation {
            self.require_relation(tuple, &tuple.subject.namespace, subject_relation, revision)
                .await?;
        }
        Ok(())
    }

    async fn require_relation(
        &self,
        tuple: &RelationTuple,
        namespace: &str,
        relation: &str,
        revision: Revision,
    ) -> Result<()> {
        let definition = self
            .namespaces
            .get(self.store.as_ref(), namespace, revision)
            .await?
            .ok_or_else(|| EvalError::NamespaceNotFound(namespace.to_string()))?;

        if definition.definition.find_relation(relation).is_none() {
            return Err(EvalError::InvalidTuple {
                tuple: tuple.to_string(),
                reason: format!("relation `{}#{}` is not defined", namespace, relation),
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub async fn check(
        &self,
        request: &CheckRequest,
        consistency: Consistency,
    ) -> Result<CheckResult> {
        let revision = self.oracle.resolve(self.store.as_ref(), consistency).await?;
        self.evaluator.check(self.store.as_ref(), &self.namespaces, request, revision).await
    }

    /// Check at the newest revision, for decisions guarding a content change
    pub async fn content_change_check(&self, request: &CheckRequest) -> Result<CheckResult> {
        self.check(request, Consistency::FullyConsistent).await
    }

    pub async fn expand(
        &self,
        request: &ExpandRequest,
        consistency: Consistency,
    ) -> Result<ExpandResult> {
        let revision = self.oracle.resolve(self.store.as_ref(), consistency).await?;
        self.evaluator.expand(self.store.as_ref(), &self.namespaces, request, revision).await
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::in_memory()
    }
}
