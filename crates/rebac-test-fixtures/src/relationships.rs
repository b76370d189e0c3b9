//! Helpers for creating test tuples and namespaces
//!
//! Tuples are written in their textual form so test tables read like the
//! data they describe.

use rebac_types::{NamespaceDefinition, RelationDef, RelationExpr, RelationTuple, TupleUpdate};

/// Parse a tuple such as `document:1#viewer@user:alice`
///
/// # Example
/// ```
/// use rebac_test_fixtures::tuple;
///
/// let t = tuple("document:1#viewer@group:eng#member");
/// assert_eq!(t.relation, "viewer");
/// assert!(t.subject.is_userset());
/// ```
pub fn tuple(text: &str) -> RelationTuple {
    text.parse().unwrap_or_else(|e| panic!("invalid test tuple `{text}`: {e}"))
}

/// A touch update for the tuple in `text`
pub fn touch(text: &str) -> TupleUpdate {
    TupleUpdate::Touch(tuple(text))
}

/// A delete update for the tuple in `text`
pub fn delete(text: &str) -> TupleUpdate {
    TupleUpdate::Delete(tuple(text))
}

pub fn relation(name: &str, rewrite: Option<RelationExpr>) -> RelationDef {
    RelationDef::new(name, rewrite)
}

pub fn computed(relation: &str) -> RelationExpr {
    RelationExpr::computed(relation)
}

pub fn tuple_to_userset(tupleset: &str, computed: &str) -> RelationExpr {
    RelationExpr::tuple_to_userset(tupleset, computed)
}

pub fn namespace(name: &str, relations: Vec<RelationDef>) -> NamespaceDefinition {
    NamespaceDefinition::new(name, relations)
}

/// A namespace whose relations all read direct tuples only
///
/// # Example
/// ```
/// use rebac_test_fixtures::direct_namespace;
///
/// let ns = direct_namespace("group", &["member"]);
/// assert!(ns.find_relation("member").unwrap().is_direct());
/// ```
pub fn direct_namespace(name: &str, relations: &[&str]) -> NamespaceDefinition {
    NamespaceDefinition::new(name, relations.iter().map(|r| RelationDef::new(*r, None)).collect())
}
