//! Schema validation
//!
//! Checks that a set of namespace definitions is internally consistent
//! before it is written. Cycles are allowed: recursion is bounded by the
//! dispatch depth at check time, not rejected here.

use std::collections::HashSet;
use std::fmt;

use rebac_types::{NamespaceDefinition, RelationExpr};

/// A problem found in a namespace definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    DuplicateNamespace { namespace: String },
    DuplicateRelation { namespace: String, relation: String },
    /// A computed userset names a relation missing from the namespace
    UndefinedRelation { namespace: String, relation: String, referenced: String },
    /// A tuple-to-userset reads its tupleset from a relation missing from the namespace
    UndefinedTupleset { namespace: String, relation: String, referenced: String },
    EmptyOperator { namespace: String, relation: String },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::DuplicateNamespace { namespace } => {
                write!(f, "namespace `{}` is defined more than once", namespace)
            },
            SchemaError::DuplicateRelation { namespace, relation } => {
                write!(f, "relation `{}#{}` is defined more than once", namespace, relation)
            },
            SchemaError::UndefinedRelation { namespace, relation, referenced } => write!(
                f,
                "relation `{}#{}` references undefined relation `{}`",
                namespace, relation, referenced
            ),
            SchemaError::UndefinedTupleset { namespace, relation, referenced } => write!(
                f,
                "relation `{}#{}` reads undefined tupleset `{}`",
                namespace, relation, referenced
            ),
            SchemaError::EmptyOperator { namespace, relation } => {
                write!(f, "relation `{}#{}` has a set operator with no operands", namespace, relation)
            },
        }
    }
}

pub(crate) fn format_errors(errors: &[SchemaError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Validate a whole schema document
pub fn validate_schema(namespaces: &[NamespaceDefinition]) -> Vec<SchemaError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for namespace in namespaces {
        if !seen.insert(namespace.name.as_str()) {
            errors.push(SchemaError::DuplicateNamespace { namespace: namespace.name.clone() });
        }
        errors.extend(validate_namespace(namespace));
    }

    errors
}

/// Validate one namespace definition on its own
pub fn validate_namespace(namespace: &NamespaceDefinition) -> Vec<SchemaError> {
    let mut errors = Vec::new();
    let mut defined = HashSet::new();

    for relation in &namespace.relations {
        if !defined.insert(relation.name.as_str()) {
            errors.push(SchemaError::DuplicateRelation {
                namespace: namespace.name.clone(),
                relation: relation.name.clone(),
            });
        }
    }

    for relation in &namespace.relations {
        if let Some(rewrite) = &relation.rewrite {
            check_expr(rewrite, &namespace.name, &relation.name, &defined, &mut errors);
        }
    }

    errors
}

fn check_expr(
    expr: &RelationExpr,
    namespace: &str,
    relation: &str,
    defined: &HashSet<&str>,
    errors: &mut Vec<SchemaError>,
) {
    match expr {
        RelationExpr::This => {},
        RelationExpr::ComputedUserset { relation: referenced } => {
            if !defined.contains(referenced.as_str()) {
                errors.push(SchemaError::UndefinedRelation {
                    namespace: namespace.to_string(),
                    relation: relation.to_string(),
                    referenced: referenced.clone(),
                });
            }
        },
        // The computed side lives on whatever namespace the tupleset points at
        RelationExpr::TupleToUserset { tupleset, .. } => {
            if !defined.contains(tupleset.as_str()) {
                errors.push(SchemaError::UndefinedTupleset {
                    namespace: namespace.to_string(),
                    relation: relation.to_string(),
                    referenced: tupleset.clone(),
                });
            }
        },
        RelationExpr::Union(children) | RelationExpr::Intersection(children) => {
            if children.is_empty() {
                errors.push(SchemaError::EmptyOperator {
                    namespace: namespace.to_string(),
                    relation: relation.to_string(),
                });
            }
            for child in children {
                check_expr(child, namespace, relation, defined, errors);
            }
        },
        RelationExpr::Exclusion { base, subtract } => {
            check_expr(base, namespace, relation, defined, errors);
            check_expr(subtract, namespace, relation, defined, errors);
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::schema::parse_schema;

    #[test]
    fn test_valid_schema() {
        let namespaces = parse_schema(
            r#"
            namespace folder { relation viewer }
            namespace document {
                relation parent
                relation editor
                relation banned
                relation viewer: this | editor | parent->viewer
                relation auditor: viewer & (editor - banned)
            }
            "#,
        )
        .unwrap();

        assert!(validate_schema(&namespaces).is_empty());
    }

    #[test]
    fn test_self_reference_is_allowed() {
        let namespaces =
            parse_schema("namespace group { relation member: this | member }").unwrap();
        assert!(validate_schema(&namespaces).is_empty());
    }

    #[test]
    fn test_duplicates() {
        let namespaces = parse_schema(
            r#"
            namespace document { relation viewer relation viewer }
            namespace document { relation owner }
            "#,
        )
        .unwrap();

        let errors = validate_schema(&namespaces);
        assert!(errors.contains(&SchemaError::DuplicateRelation {
            namespace: "document".to_string(),
            relation: "viewer".to_string(),
        }));
        assert!(errors
            .contains(&SchemaError::DuplicateNamespace { namespace: "document".to_string() }));
    }

    #[test]
    fn test_undefined_references() {
        let namespaces = parse_schema(
            "namespace document { relation viewer: editor | parent->viewer }",
        )
        .unwrap();

        let errors = validate_schema(&namespaces);
        assert_eq!(errors.len(), 2);
        assert!(matches!(&errors[0], SchemaError::UndefinedRelation { referenced, .. } if referenced == "editor"));
        assert!(matches!(&errors[1], SchemaError::UndefinedTupleset { referenced, .. } if referenced == "parent"));
        assert_eq!(
            format_errors(&errors[..1]),
            "relation `document#viewer` references undefined relation `editor`"
        );
    }

    #[test]
    fn test_empty_operator() {
        let namespace = NamespaceDefinition::new(
            "document",
            vec![rebac_types::RelationDef::new("viewer", Some(RelationExpr::Union(vec![])))],
        );
        assert_eq!(validate_namespace(&namespace).len(), 1);
    }
}
