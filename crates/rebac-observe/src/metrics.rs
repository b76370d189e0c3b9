//! Metrics collection for engine operations
//!
//! Provides structured metrics using the `metrics` crate with Prometheus export.

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Initialize all metric descriptions
pub fn init_metrics_descriptions() {
    // Check metrics
    describe_counter!("rebac_checks_total", "Total number of permission checks performed");
    describe_counter!(
        "rebac_checks_allowed_total",
        "Total number of checks that resulted in Allow"
    );
    describe_counter!("rebac_checks_denied_total", "Total number of checks that resulted in Deny");
    describe_histogram!(
        "rebac_check_duration_seconds",
        "Duration of permission checks in seconds"
    );
    describe_counter!(
        "rebac_check_errors_total",
        "Total number of checks that failed with an error, by kind"
    );
    describe_counter!(
        "rebac_depth_exceeded_total",
        "Total number of checks denied because the recursion depth ran out"
    );

    // Dispatch metrics
    describe_counter!(
        "rebac_dispatches_total",
        "Total number of recursive sub-dispatches by rewrite operator"
    );
    describe_counter!(
        "rebac_dispatch_memo_hits_total",
        "Total number of sub-dispatches answered from the per-call memo"
    );

    // Expand metrics
    describe_counter!("rebac_expands_total", "Total number of expand requests");
    describe_histogram!("rebac_expand_duration_seconds", "Duration of expands in seconds");

    // Namespace cache metrics
    describe_counter!("rebac_namespace_cache_hits_total", "Total number of namespace cache hits");
    describe_counter!(
        "rebac_namespace_cache_misses_total",
        "Total number of namespace cache misses"
    );
    describe_counter!(
        "rebac_namespace_fetches_total",
        "Total number of namespace definitions fetched from the store"
    );

    // Store metrics
    describe_counter!("rebac_store_reads_total", "Total number of tuple store reads");
    describe_counter!("rebac_store_writes_total", "Total number of tuple store writes");
    describe_histogram!("rebac_store_read_tuples", "Number of tuples returned per store read");
    describe_histogram!("rebac_store_write_updates", "Number of updates applied per store write");
    describe_counter!(
        "rebac_revision_expired_total",
        "Total number of requests rejected for an expired revision"
    );
}

/// Record a completed permission check
pub fn record_check(decision: &str, duration_seconds: f64) {
    counter!("rebac_checks_total").increment(1);

    match decision {
        "allow" => counter!("rebac_checks_allowed_total").increment(1),
        "deny" => counter!("rebac_checks_denied_total").increment(1),
        _ => {},
    }

    histogram!("rebac_check_duration_seconds").record(duration_seconds);
}

/// Record a check that ended in an error
pub fn record_check_error(kind: &'static str) {
    counter!("rebac_check_errors_total", "kind" => kind).increment(1);
}

/// Record a check whose answer was cut short by the depth limit
pub fn record_depth_exceeded(namespace: &str, relation: &str) {
    counter!(
        "rebac_depth_exceeded_total",
        "namespace" => namespace.to_string(),
        "relation" => relation.to_string()
    )
    .increment(1);
}

/// Record a recursive sub-dispatch
pub fn record_dispatch(operator: &'static str) {
    counter!("rebac_dispatches_total", "operator" => operator).increment(1);
}

pub fn record_dispatch_memo_hit() {
    counter!("rebac_dispatch_memo_hits_total").increment(1);
}

/// Record an expand request
pub fn record_expand(duration_seconds: f64, truncated: bool) {
    let truncated = if truncated { "true" } else { "false" };
    counter!("rebac_expands_total", "truncated" => truncated).increment(1);
    histogram!("rebac_expand_duration_seconds").record(duration_seconds);
}

/// Record a namespace cache lookup
pub fn record_namespace_cache_hit(hit: bool) {
    if hit {
        counter!("rebac_namespace_cache_hits_total").increment(1);
    } else {
        counter!("rebac_namespace_cache_misses_total").increment(1);
    }
}

/// Record a namespace definition fetch from the store
pub fn record_namespace_fetch(found: bool) {
    let result = if found { "found" } else { "not_found" };
    counter!("rebac_namespace_fetches_total", "result" => result).increment(1);
}

pub fn record_store_read(count: usize) {
    counter!("rebac_store_reads_total").increment(1);
    histogram!("rebac_store_read_tuples").record(count as f64);
}

pub fn record_store_write(updates: usize) {
    counter!("rebac_store_writes_total").increment(1);
    histogram!("rebac_store_write_updates").record(updates as f64);
}

pub fn record_revision_expired() {
    counter!("rebac_revision_expired_total").increment(1);
}

#[cfg(test)]
mod tests {
    use std::sync::Once;

    use super::*;

    static INIT: Once = Once::new();

    fn init_test_metrics() {
        INIT.call_once(|| {
            let _ = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder();
            init_metrics_descriptions();
        });
    }

    #[test]
    fn test_record_check() {
        init_test_metrics();
        record_check("allow", 0.001);
        record_check("deny", 0.002);
        record_check_error("namespace_not_found");
        record_depth_exceeded("document", "viewer");
    }

    #[test]
    fn test_record_dispatch_operations() {
        init_test_metrics();
        record_dispatch("union");
        record_dispatch("tuple_to_userset");
        record_dispatch_memo_hit();
        record_expand(0.003, false);
    }

    #[test]
    fn test_record_cache_and_store_operations() {
        init_test_metrics();
        record_namespace_cache_hit(true);
        record_namespace_cache_hit(false);
        record_namespace_fetch(true);
        record_namespace_fetch(false);
        record_store_read(10);
        record_store_write(2);
        record_revision_expired();
    }
}
