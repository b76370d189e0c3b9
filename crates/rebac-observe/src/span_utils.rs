//! Span creation utilities
//!
//! Consistent span names and attributes for the check pipeline.

use tracing::{span, Level, Span};

/// Create a span for a top-level permission check
///
/// `decision` is left empty for the caller to record once known.
pub fn check_span(subject: &str, object: &str, relation: &str) -> Span {
    span!(
        Level::INFO,
        "permission_check",
        subject = subject,
        object = object,
        relation = relation,
        decision = tracing::field::Empty,
    )
}

/// Create a span for one recursive sub-dispatch
pub fn dispatch_span(object: &str, relation: &str, depth: u32) -> Span {
    span!(
        Level::DEBUG,
        "dispatch",
        object = object,
        relation = relation,
        depth = depth,
        membership = tracing::field::Empty,
    )
}

/// Create a span for tuple store operations
pub fn store_span(operation: &str, object: &str) -> Span {
    span!(
        Level::DEBUG,
        "tuple_store_operation",
        operation = operation,
        object = object,
        tuple_count = tracing::field::Empty,
    )
}

/// Create a span for namespace cache operations
pub fn cache_span(operation: &str, key: &str) -> Span {
    span!(
        Level::DEBUG,
        "namespace_cache_operation",
        operation = operation,
        cache_key = key,
        hit = tracing::field::Empty,
    )
}
