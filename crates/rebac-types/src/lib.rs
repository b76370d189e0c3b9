//! # ReBAC Types
//!
//! Shared type definitions for the relationship-based access-control engine.
//!
//! Everything the store, cache and evaluator exchange lives here so that the
//! lower layers never depend on the engine crate.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod namespace;
pub mod tuple;

pub use namespace::{NamespaceDefinition, RelationDef, RelationExpr};
pub use tuple::{ObjectRef, RelationTuple, Subject, TupleParseError, TupleUpdate};

// ============================================================================
// Revisions
// ============================================================================

/// A snapshot token for consistent reads.
///
/// The value is a count of nanoseconds since the Unix epoch, which lets the
/// GC window and the read-fuzzing window be applied as plain durations.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Revision(pub u64);

impl Revision {
    pub fn zero() -> Self {
        Self(0)
    }

    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Revision for the current wall-clock instant
    pub fn from_system_time(time: SystemTime) -> Self {
        let nanos = time.duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or_default();
        Self(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Revision `duration` before this one, clamped at zero
    pub fn saturating_sub(&self, duration: Duration) -> Self {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        Self(self.0.saturating_sub(nanos))
    }

    /// Distance from `earlier` to this revision, zero if `earlier` is newer
    pub fn since(&self, earlier: Revision) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Decisions
// ============================================================================

/// The result of a permission check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Deny => "deny",
        }
    }
}

impl From<bool> for Decision {
    fn from(allowed: bool) -> Self {
        if allowed {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found")]
    NotFound,

    #[error("Revision {revision} expired (garbage collection horizon is {horizon})")]
    RevisionExpired { revision: Revision, horizon: Revision },

    #[error("Revision {revision} is ahead of head revision {head}")]
    InvalidRevision { revision: Revision, head: Revision },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
