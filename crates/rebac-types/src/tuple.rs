//! Relation tuples and their components
//!
//! The textual form follows the usual Zanzibar notation:
//! `document:1#viewer@user:alice` or `document:1#viewer@group:eng#member`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TupleParseError {
    #[error("Missing `{separator}` in `{input}`")]
    MissingSeparator { separator: char, input: String },

    #[error("Empty {component} in `{input}`")]
    EmptyComponent { component: &'static str, input: String },

    #[error("Unexpected `{separator}` in {component} of `{input}`")]
    UnexpectedSeparator { separator: char, component: &'static str, input: String },
}

fn component<'a>(
    value: &'a str,
    name: &'static str,
    input: &str,
) -> Result<&'a str, TupleParseError> {
    if value.is_empty() {
        return Err(TupleParseError::EmptyComponent { component: name, input: input.to_string() });
    }
    if let Some(separator) = value.chars().find(|c| matches!(c, ':' | '#' | '@')) {
        return Err(TupleParseError::UnexpectedSeparator {
            separator,
            component: name,
            input: input.to_string(),
        });
    }
    Ok(value)
}

fn split_once<'a>(
    value: &'a str,
    separator: char,
    input: &str,
) -> Result<(&'a str, &'a str), TupleParseError> {
    value
        .split_once(separator)
        .ok_or_else(|| TupleParseError::MissingSeparator { separator, input: input.to_string() })
}

// ============================================================================
// Objects
// ============================================================================

/// A concrete object: `namespace:object_id`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub namespace: String,
    pub object_id: String,
}

impl ObjectRef {
    pub fn new(namespace: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), object_id: object_id.into() }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.object_id)
    }
}

impl FromStr for ObjectRef {
    type Err = TupleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, object_id) = split_once(s, ':', s)?;
        Ok(Self::new(component(namespace, "namespace", s)?, component(object_id, "object id", s)?))
    }
}

// ============================================================================
// Subjects
// ============================================================================

/// The subject side of a tuple.
///
/// With `relation` unset the subject is a concrete principal (`user:alice`);
/// with it set the subject is a userset (`group:eng#member`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub namespace: String,
    pub object_id: String,
    pub relation: Option<String>,
}

impl Subject {
    pub fn new(namespace: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), object_id: object_id.into(), relation: None }
    }

    pub fn userset(
        namespace: impl Into<String>,
        object_id: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            object_id: object_id.into(),
            relation: Some(relation.into()),
        }
    }

    pub fn is_userset(&self) -> bool {
        self.relation.is_some()
    }

    /// The object this subject lives on, dropping any relation
    pub fn object(&self) -> ObjectRef {
        ObjectRef::new(self.namespace.clone(), self.object_id.clone())
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.relation {
            Some(relation) => write!(f, "{}:{}#{}", self.namespace, self.object_id, relation),
            None => write!(f, "{}:{}", self.namespace, self.object_id),
        }
    }
}

impl FromStr for Subject {
    type Err = TupleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (object, relation) = match s.split_once('#') {
            Some((object, relation)) => (object, Some(component(relation, "subject relation", s)?)),
            None => (s, None),
        };
        let object: ObjectRef = object.parse().map_err(|e| match e {
            TupleParseError::MissingSeparator { separator, .. } => {
                TupleParseError::MissingSeparator { separator, input: s.to_string() }
            },
            other => other,
        })?;
        Ok(Self {
            namespace: object.namespace,
            object_id: object.object_id,
            relation: relation.map(str::to_string),
        })
    }
}

// ============================================================================
// Tuples
// ============================================================================

/// A stored relationship fact: `namespace:object_id#relation@subject`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationTuple {
    pub namespace: String,
    pub object_id: String,
    pub relation: String,
    pub subject: Subject,
}

impl RelationTuple {
    pub fn new(object: ObjectRef, relation: impl Into<String>, subject: Subject) -> Self {
        Self {
            namespace: object.namespace,
            object_id: object.object_id,
            relation: relation.into(),
            subject,
        }
    }

    pub fn object(&self) -> ObjectRef {
        ObjectRef::new(self.namespace.clone(), self.object_id.clone())
    }
}

impl fmt::Display for RelationTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}#{}@{}", self.namespace, self.object_id, self.relation, self.subject)
    }
}

impl FromStr for RelationTuple {
    type Err = TupleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (resource, subject) = split_once(s, '@', s)?;
        let (object, relation) = split_once(resource, '#', s)?;
        let object: ObjectRef = object.parse()?;
        let subject: Subject = subject.parse()?;
        Ok(Self::new(object, component(relation, "relation", s)?, subject))
    }
}

/// A single mutation applied by a tuple write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TupleUpdate {
    /// Insert the tuple, or keep it if it is already live
    Touch(RelationTuple),
    /// Remove the tuple if it is live
    Delete(RelationTuple),
}

impl TupleUpdate {
    pub fn tuple(&self) -> &RelationTuple {
        match self {
            TupleUpdate::Touch(tuple) | TupleUpdate::Delete(tuple) => tuple,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_direct_tuple() {
        let tuple: RelationTuple = "document:1#viewer@user:alice".parse().unwrap();
        assert_eq!(tuple.namespace, "document");
        assert_eq!(tuple.object_id, "1");
        assert_eq!(tuple.relation, "viewer");
        assert_eq!(tuple.subject, Subject::new("user", "alice"));
        assert!(!tuple.subject.is_userset());
    }

    #[test]
    fn test_parse_userset_tuple() {
        let tuple: RelationTuple = "document:1#viewer@group:eng#member".parse().unwrap();
        assert_eq!(tuple.subject, Subject::userset("group", "eng", "member"));
        assert_eq!(tuple.subject.object(), ObjectRef::new("group", "eng"));
        assert_eq!(tuple.to_string(), "document:1#viewer@group:eng#member");
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        assert!(matches!(
            "document:1#viewer".parse::<RelationTuple>(),
            Err(TupleParseError::MissingSeparator { separator: '@', .. })
        ));
        assert!(matches!(
            "document:1@user:alice".parse::<RelationTuple>(),
            Err(TupleParseError::MissingSeparator { separator: '#', .. })
        ));
        assert!(matches!(
            "document:#viewer@user:alice".parse::<RelationTuple>(),
            Err(TupleParseError::EmptyComponent { component: "object id", .. })
        ));
        assert!(matches!(
            "document:1#viewer@user".parse::<RelationTuple>(),
            Err(TupleParseError::MissingSeparator { separator: ':', .. })
        ));
        assert!(matches!(
            "document:a:b#viewer@user:alice".parse::<RelationTuple>(),
            Err(TupleParseError::UnexpectedSeparator { separator: ':', .. })
        ));
    }

    #[test]
    fn test_subject_display() {
        assert_eq!(Subject::new("user", "alice").to_string(), "user:alice");
        assert_eq!(Subject::userset("group", "eng", "member").to_string(), "group:eng#member");
    }

    #[test]
    fn test_tuple_update_accessor() {
        let tuple: RelationTuple = "document:1#viewer@user:alice".parse().unwrap();
        let touch = TupleUpdate::Touch(tuple.clone());
        let delete = TupleUpdate::Delete(tuple.clone());
        assert_eq!(touch.tuple(), &tuple);
        assert_eq!(delete.tuple(), &tuple);
    }
}
