//! # ReBAC Core - Permission Check Engine
//!
//! Resolves relation rewrite rules against stored tuples. Handles the schema
//! language, the revision oracle that picks read snapshots, recursive check
//! dispatch and expand.

use std::time::Duration;

use rebac_types::{Revision, StoreError};
use thiserror::Error;

pub mod evaluator;
pub mod graph;
pub mod model;
pub mod revision;
pub mod schema;
pub mod types;

pub use evaluator::Evaluator;
pub use graph::Membership;
pub use model::{Model, ReadTuplesResult, TupleFilter};
pub use revision::{Consistency, RevisionOracle};
pub use types::*;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("Relation not found: {namespace}#{relation}")]
    RelationNotFound { namespace: String, relation: String },

    #[error("Revision {revision} expired (garbage collection horizon is {horizon})")]
    RevisionExpired { revision: Revision, horizon: Revision },

    #[error("Revision {revision} is ahead of head revision {head}")]
    InvalidRevision { revision: Revision, head: Revision },

    /// Only produced by strict checks; regular checks report depth
    /// exhaustion as a denial
    #[error("Maximum recursion depth of {0} exceeded")]
    DepthExceeded(u32),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid schema: {}", schema::validation::format_errors(.0))]
    InvalidSchema(Vec<schema::validation::SchemaError>),

    #[error("Invalid tuple {tuple}: {reason}")]
    InvalidTuple { tuple: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Evaluation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for EvalError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RevisionExpired { revision, horizon } => {
                EvalError::RevisionExpired { revision, horizon }
            },
            StoreError::InvalidRevision { revision, head } => {
                EvalError::InvalidRevision { revision, head }
            },
            StoreError::Unavailable(reason) => EvalError::StoreUnavailable(reason),
            other => EvalError::Store(other),
        }
    }
}

impl EvalError {
    /// Short label used for error metrics
    pub fn kind(&self) -> &'static str {
        match self {
            EvalError::NamespaceNotFound(_) => "namespace_not_found",
            EvalError::RelationNotFound { .. } => "relation_not_found",
            EvalError::RevisionExpired { .. } => "revision_expired",
            EvalError::InvalidRevision { .. } => "invalid_revision",
            EvalError::DepthExceeded(_) => "depth_exceeded",
            EvalError::StoreUnavailable(_) => "store_unavailable",
            EvalError::Store(_) => "store",
            EvalError::Parse(_) => "parse",
            EvalError::InvalidSchema(_) => "invalid_schema",
            EvalError::InvalidTuple { .. } => "invalid_tuple",
            EvalError::Config(_) => "config",
            EvalError::Timeout(_) => "timeout",
            EvalError::Internal(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, EvalError>;
