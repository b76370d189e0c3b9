//! Request and result types for check and expand

use std::collections::BTreeSet;

use rebac_types::{Decision, ObjectRef, Revision, Subject};
use serde::{Deserialize, Serialize};

use crate::graph::Membership;

/// A permission check: does `subject` have `relation` on `object`?
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRequest {
    pub object: ObjectRef,
    pub relation: String,
    pub subject: Subject,
    /// Recursion budget; clamped to the engine maximum, which is also the default
    pub depth: Option<u32>,
}

impl CheckRequest {
    pub fn new(object: ObjectRef, relation: impl Into<String>, subject: Subject) -> Self {
        Self { object, relation: relation.into(), subject, depth: None }
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }
}

/// The outcome of a check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub decision: Decision,
    /// The snapshot the whole call tree read at
    pub revision: Revision,
    /// The recursion budget ran out before membership could be decided;
    /// the decision is then always `Deny`
    pub depth_exceeded: bool,
    /// Recursive sub-dispatches evaluated, memo hits excluded
    pub dispatch_count: u64,
}

impl CheckResult {
    pub fn is_allowed(&self) -> bool {
        self.decision.is_allowed()
    }
}

/// Expand `relation` on `object` into the tree of subjects that hold it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandRequest {
    pub object: ObjectRef,
    pub relation: String,
    pub depth: Option<u32>,
}

impl ExpandRequest {
    pub fn new(object: ObjectRef, relation: impl Into<String>) -> Self {
        Self { object, relation: relation.into(), depth: None }
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandResult {
    pub tree: UsersetTree,
    /// Every subject for which a check at the same revision and depth is allowed
    pub subjects: Vec<Subject>,
    pub revision: Revision,
    /// Some branch hit the depth limit
    pub truncated: bool,
}

// ============================================================================
// Userset trees
// ============================================================================

/// A tree representing the expanded userset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsersetTree {
    pub node_type: UsersetNodeType,
    pub children: Vec<UsersetTree>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsersetNodeType {
    /// Direct tuples of `relation` on `object`; children hold the direct
    /// subjects followed by the expansion of each userset subject
    This { object: ObjectRef, relation: String },
    ComputedUserset { relation: String },
    TupleToUserset { tupleset: String, computed: String },
    Union,
    Intersection,
    Exclusion,
    Leaf { subjects: Vec<Subject> },
    /// Expansion of `relation` on `object` was cut off by the depth limit
    Truncated { object: ObjectRef, relation: String },
}

impl UsersetTree {
    pub fn leaf(subjects: Vec<Subject>) -> Self {
        Self { node_type: UsersetNodeType::Leaf { subjects }, children: vec![] }
    }

    pub fn node(node_type: UsersetNodeType, children: Vec<UsersetTree>) -> Self {
        Self { node_type, children }
    }

    /// Whether any branch was cut off by the depth limit
    pub fn is_truncated(&self) -> bool {
        matches!(self.node_type, UsersetNodeType::Truncated { .. })
            || self.children.iter().any(UsersetTree::is_truncated)
    }

    /// Membership of `subject` in the set this tree describes
    pub fn membership(&self, subject: &Subject) -> Membership {
        self.resolve().membership(subject)
    }

    /// Evaluate the tree into definite and possible member sets
    pub fn resolve(&self) -> ResolvedUserset {
        match &self.node_type {
            UsersetNodeType::Leaf { subjects } => {
                let set = SubjectSet::finite(subjects.iter().cloned());
                ResolvedUserset { definite: set.clone(), possible: set }
            },
            UsersetNodeType::Truncated { .. } => ResolvedUserset::unknown(),
            UsersetNodeType::This { .. }
            | UsersetNodeType::ComputedUserset { .. }
            | UsersetNodeType::TupleToUserset { .. }
            | UsersetNodeType::Union => self
                .children
                .iter()
                .map(UsersetTree::resolve)
                .fold(ResolvedUserset::empty(), |acc, child| acc.union(&child)),
            UsersetNodeType::Intersection => {
                let mut children = self.children.iter().map(UsersetTree::resolve);
                match children.next() {
                    Some(first) => children.fold(first, |acc, child| acc.intersection(&child)),
                    None => ResolvedUserset::empty(),
                }
            },
            UsersetNodeType::Exclusion => match self.children.as_slice() {
                [base, subtract] => base.resolve().intersection(&subtract.resolve().complement()),
                _ => ResolvedUserset::empty(),
            },
        }
    }
}

// ============================================================================
// Subject sets
// ============================================================================

/// A set of subjects that may be infinite: either finitely many subjects
/// or everything except finitely many
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectSet {
    Finite(BTreeSet<Subject>),
    AllExcept(BTreeSet<Subject>),
}

impl SubjectSet {
    pub fn empty() -> Self {
        SubjectSet::Finite(BTreeSet::new())
    }

    pub fn all() -> Self {
        SubjectSet::AllExcept(BTreeSet::new())
    }

    pub fn finite(subjects: impl IntoIterator<Item = Subject>) -> Self {
        SubjectSet::Finite(subjects.into_iter().collect())
    }

    pub fn contains(&self, subject: &Subject) -> bool {
        match self {
            SubjectSet::Finite(set) => set.contains(subject),
            SubjectSet::AllExcept(set) => !set.contains(subject),
        }
    }

    pub fn complement(&self) -> Self {
        match self {
            SubjectSet::Finite(set) => SubjectSet::AllExcept(set.clone()),
            SubjectSet::AllExcept(set) => SubjectSet::Finite(set.clone()),
        }
    }

    pub fn union(&self, other: &SubjectSet) -> Self {
        use SubjectSet::*;
        match (self, other) {
            (Finite(a), Finite(b)) => Finite(a | b),
            (AllExcept(a), AllExcept(b)) => AllExcept(a & b),
            (Finite(a), AllExcept(b)) | (AllExcept(b), Finite(a)) => AllExcept(b - a),
        }
    }

    pub fn intersection(&self, other: &SubjectSet) -> Self {
        use SubjectSet::*;
        match (self, other) {
            (Finite(a), Finite(b)) => Finite(a & b),
            (AllExcept(a), AllExcept(b)) => AllExcept(a | b),
            (Finite(a), AllExcept(b)) | (AllExcept(b), Finite(a)) => Finite(a - b),
        }
    }

    /// The members when the set is finite
    pub fn as_finite(&self) -> Option<&BTreeSet<Subject>> {
        match self {
            SubjectSet::Finite(set) => Some(set),
            SubjectSet::AllExcept(_) => None,
        }
    }
}

/// Three-valued membership over all subjects at once
///
/// `definite` holds the subjects that are members; `possible` additionally
/// holds those whose membership could not be decided. `definite` is always a
/// subset of `possible`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUserset {
    pub definite: SubjectSet,
    pub possible: SubjectSet,
}

impl ResolvedUserset {
    pub fn empty() -> Self {
        Self { definite: SubjectSet::empty(), possible: SubjectSet::empty() }
    }

    /// Nothing is known about anyone
    pub fn unknown() -> Self {
        Self { definite: SubjectSet::empty(), possible: SubjectSet::all() }
    }

    pub fn membership(&self, subject: &Subject) -> Membership {
        if self.definite.contains(subject) {
            Membership::Member
        } else if self.possible.contains(subject) {
            Membership::Indeterminate
        } else {
            Membership::NotMember
        }
    }

    pub fn union(&self, other: &ResolvedUserset) -> Self {
        Self {
            definite: self.definite.union(&other.definite),
            possible: self.possible.union(&other.possible),
        }
    }

    pub fn intersection(&self, other: &ResolvedUserset) -> Self {
        Self {
            definite: self.definite.intersection(&other.definite),
            possible: self.possible.intersection(&other.possible),
        }
    }

    pub fn complement(&self) -> Self {
        Self { definite: self.possible.complement(), possible: self.definite.complement() }
    }
}
