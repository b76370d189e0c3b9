//! Namespace definitions and relation rewrite trees

use serde::{Deserialize, Serialize};

/// A namespace: the schema for one object type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceDefinition {
    pub name: String,
    pub relations: Vec<RelationDef>,
}

/// A relation or permission inside a namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDef {
    pub name: String,
    /// Rewrite rule; `None` behaves like `this`
    pub rewrite: Option<RelationExpr>,
}

/// Relation rewrite expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationExpr {
    /// Direct tuples for the relation being evaluated: `this`
    This,

    /// Another relation on the same object: `editor`
    ComputedUserset { relation: String },

    /// Follow `tupleset` to referenced objects, then evaluate `computed`
    /// on each of them: `parent->viewer`
    TupleToUserset { tupleset: String, computed: String },

    /// `expr1 | expr2`
    Union(Vec<RelationExpr>),

    /// `expr1 & expr2`
    Intersection(Vec<RelationExpr>),

    /// `base - subtract`
    Exclusion { base: Box<RelationExpr>, subtract: Box<RelationExpr> },
}

impl NamespaceDefinition {
    pub fn new(name: impl Into<String>, relations: Vec<RelationDef>) -> Self {
        Self { name: name.into(), relations }
    }

    /// Find a relation by name
    pub fn find_relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }
}

impl RelationDef {
    pub fn new(name: impl Into<String>, rewrite: Option<RelationExpr>) -> Self {
        Self { name: name.into(), rewrite }
    }

    /// The effective rewrite, with an absent rule read as `this`
    pub fn rewrite_or_this(&self) -> &RelationExpr {
        self.rewrite.as_ref().unwrap_or(&RelationExpr::This)
    }

    /// Check if this is a direct relation (no expression or `this`)
    pub fn is_direct(&self) -> bool {
        matches!(&self.rewrite, None | Some(RelationExpr::This))
    }
}

impl RelationExpr {
    pub fn computed(relation: impl Into<String>) -> Self {
        RelationExpr::ComputedUserset { relation: relation.into() }
    }

    pub fn tuple_to_userset(tupleset: impl Into<String>, computed: impl Into<String>) -> Self {
        RelationExpr::TupleToUserset { tupleset: tupleset.into(), computed: computed.into() }
    }

    pub fn exclusion(base: RelationExpr, subtract: RelationExpr) -> Self {
        RelationExpr::Exclusion { base: Box::new(base), subtract: Box::new(subtract) }
    }
}
