//! Configuration validation
//!
//! Validates configuration values and ensures consistency

use thiserror::Error;

use crate::{Config, EngineConfig, NamespaceCacheConfig, ObservabilityConfig, RevisionConfig};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid max depth: {0} (must be > 0)")]
    InvalidMaxDepth(u32),

    #[error("Invalid dispatch concurrency: {0} (must be > 0)")]
    InvalidDispatchConcurrency(usize),

    #[error("Invalid check timeout: {0}ms (must be > 0 when set)")]
    InvalidCheckTimeout(u64),

    #[error("Invalid GC window: {0}s (must be > 0)")]
    InvalidGcWindow(u64),

    #[error("Fuzzing window of {fuzzing_ms}ms must be shorter than the GC window of {gc_window_secs}s")]
    FuzzingWindowTooLarge { fuzzing_ms: u64, gc_window_secs: u64 },

    #[error("Invalid namespace cache capacity: {0} (must be > 0 when the cache is enabled)")]
    InvalidCacheCapacity(u64),

    #[error("Invalid log level: {0} (must be one of: trace, debug, info, warn, error)")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0} (must be one of: pretty, compact, json)")]
    InvalidLogFormat(String),

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Validation result type
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate complete configuration
pub fn validate(config: &Config) -> ValidationResult<()> {
    let mut errors = Vec::new();

    if let Err(e) = validate_engine(&config.engine) {
        errors.push(e);
    }

    if let Err(e) = validate_revisions(&config.revisions) {
        errors.push(e);
    }

    if let Err(e) = validate_namespace_cache(&config.namespace_cache) {
        errors.push(e);
    }

    if let Err(e) = validate_observability(&config.observability) {
        errors.push(e);
    }

    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

pub fn validate_engine(config: &EngineConfig) -> ValidationResult<()> {
    if config.max_depth == 0 {
        return Err(ValidationError::InvalidMaxDepth(config.max_depth));
    }

    if config.dispatch_concurrency == 0 {
        return Err(ValidationError::InvalidDispatchConcurrency(config.dispatch_concurrency));
    }

    if config.check_timeout_ms == Some(0) {
        return Err(ValidationError::InvalidCheckTimeout(0));
    }

    Ok(())
}

/// Validate revision windows
///
/// Jittered reads must stay inside the GC window or they would expire
/// before they are served.
pub fn validate_revisions(config: &RevisionConfig) -> ValidationResult<()> {
    if config.gc_window_secs == 0 {
        return Err(ValidationError::InvalidGcWindow(config.gc_window_secs));
    }

    if config.fuzzing_window() >= config.gc_window() {
        return Err(ValidationError::FuzzingWindowTooLarge {
            fuzzing_ms: config.fuzzing_window_ms,
            gc_window_secs: config.gc_window_secs,
        });
    }

    Ok(())
}

pub fn validate_namespace_cache(config: &NamespaceCacheConfig) -> ValidationResult<()> {
    if config.ttl_ms > 0 && config.max_capacity == 0 {
        return Err(ValidationError::InvalidCacheCapacity(config.max_capacity));
    }

    Ok(())
}

pub fn validate_observability(config: &ObservabilityConfig) -> ValidationResult<()> {
    match config.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {},
        _ => return Err(ValidationError::InvalidLogLevel(config.log_level.clone())),
    }

    if config.log_format.parse::<rebac_observe::LogFormat>().is_err() {
        return Err(ValidationError::InvalidLogFormat(config.log_format.clone()));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = Config::default();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_validate_engine() {
        let config = EngineConfig { max_depth: 0, ..Default::default() };
        assert!(matches!(validate_engine(&config), Err(ValidationError::InvalidMaxDepth(0))));

        let config = EngineConfig { dispatch_concurrency: 0, ..Default::default() };
        assert!(matches!(
            validate_engine(&config),
            Err(ValidationError::InvalidDispatchConcurrency(0))
        ));

        let config = EngineConfig { check_timeout_ms: Some(0), ..Default::default() };
        assert!(matches!(validate_engine(&config), Err(ValidationError::InvalidCheckTimeout(0))));
    }

    #[test]
    fn test_validate_revisions() {
        let config = RevisionConfig { gc_window_secs: 0, fuzzing_window_ms: 0 };
        assert!(matches!(validate_revisions(&config), Err(ValidationError::InvalidGcWindow(0))));

        let config = RevisionConfig { gc_window_secs: 1, fuzzing_window_ms: 1000 };
        assert!(matches!(
            validate_revisions(&config),
            Err(ValidationError::FuzzingWindowTooLarge { .. })
        ));
    }

    #[test]
    fn test_validate_namespace_cache() {
        let disabled = NamespaceCacheConfig { ttl_ms: 0, max_capacity: 0 };
        assert!(validate_namespace_cache(&disabled).is_ok());

        let enabled = NamespaceCacheConfig { ttl_ms: 100, max_capacity: 0 };
        assert!(matches!(
            validate_namespace_cache(&enabled),
            Err(ValidationError::InvalidCacheCapacity(0))
        ));
    }

    #[test]
    fn test_validate_observability() {
        let config =
            ObservabilityConfig { log_level: "verbose".to_string(), ..Default::default() };
        assert!(matches!(
            validate_observability(&config),
            Err(ValidationError::InvalidLogLevel(_))
        ));

        let config = ObservabilityConfig { log_format: "xml".to_string(), ..Default::default() };
        assert!(matches!(
            validate_observability(&config),
            Err(ValidationError::InvalidLogFormat(_))
        ));
    }

    #[test]
    fn test_multiple_errors_are_collected() {
        let mut config = Config::default();
        config.engine.max_depth = 0;
        config.observability.log_level = "loud".to_string();

        match validate(&config) {
            Err(ValidationError::Multiple(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }
}
