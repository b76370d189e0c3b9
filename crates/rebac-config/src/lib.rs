//! # ReBAC Config - Configuration Management
//!
//! Loads engine configuration from an optional file and `REBAC__*`
//! environment variables, e.g. `REBAC__ENGINE__MAX_DEPTH=25`.

pub mod validation;

use std::path::Path;
use std::time::Duration;

use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use rebac_observe::{LogConfig, LogFormat};
use serde::{Deserialize, Serialize};

/// Prefix for environment variable overrides
pub const ENV_PREFIX: &str = "REBAC";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub revisions: RevisionConfig,
    #[serde(default)]
    pub namespace_cache: NamespaceCacheConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Global maximum recursion depth; per-request overrides are clamped to it
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Sibling sub-dispatches evaluated concurrently per operator
    #[serde(default = "default_dispatch_concurrency")]
    pub dispatch_concurrency: usize,

    /// Wall-clock budget for one check or expand, unbounded when unset
    #[serde(default)]
    pub check_timeout_ms: Option<u64>,
}

fn default_max_depth() -> u32 {
    50
}

fn default_dispatch_concurrency() -> usize {
    10
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            dispatch_concurrency: default_dispatch_concurrency(),
            check_timeout_ms: None,
        }
    }
}

impl EngineConfig {
    pub fn check_timeout(&self) -> Option<Duration> {
        self.check_timeout_ms.map(Duration::from_millis)
    }
}

// ============================================================================
// Revisions
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionConfig {
    /// How far behind head a revision stays readable
    #[serde(default = "default_gc_window_secs")]
    pub gc_window_secs: u64,

    /// Upper bound of the random staleness applied to latency-minimizing reads
    #[serde(default = "default_fuzzing_window_ms")]
    pub fuzzing_window_ms: u64,
}

fn default_gc_window_secs() -> u64 {
    3600
}

fn default_fuzzing_window_ms() -> u64 {
    10
}

impl Default for RevisionConfig {
    fn default() -> Self {
        Self {
            gc_window_secs: default_gc_window_secs(),
            fuzzing_window_ms: default_fuzzing_window_ms(),
        }
    }
}

impl RevisionConfig {
    pub fn gc_window(&self) -> Duration {
        Duration::from_secs(self.gc_window_secs)
    }

    pub fn fuzzing_window(&self) -> Duration {
        Duration::from_millis(self.fuzzing_window_ms)
    }
}

// ============================================================================
// Namespace cache
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceCacheConfig {
    /// Entry lifetime; zero disables the cache
    #[serde(default)]
    pub ttl_ms: u64,

    #[serde(default = "default_cache_max_capacity")]
    pub max_capacity: u64,
}

fn default_cache_max_capacity() -> u64 {
    1000
}

impl Default for NamespaceCacheConfig {
    fn default() -> Self {
        Self { ttl_ms: 0, max_capacity: default_cache_max_capacity() }
    }
}

impl NamespaceCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

// ============================================================================
// Observability
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// One of `pretty`, `compact` or `json`
    #[serde(default = "default_log_format")]
    pub log_format: String,

    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ObservabilityConfig {
    /// Logging setup for [`rebac_observe::init_logging`]
    ///
    /// An unrecognised format falls back to the build default; run
    /// [`validation::validate`] first to reject it instead.
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            format: self.log_format.parse().unwrap_or_else(|_| LogFormat::default()),
            filter: Some(self.log_level.to_lowercase()),
            ..LogConfig::default()
        }
    }
}

/// Load configuration from file and environment
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let builder = ConfigBuilder::builder()
        .add_source(File::from(path.as_ref()).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    builder.try_deserialize()
}

/// Load configuration with defaults
pub fn load_or_default<P: AsRef<Path>>(path: P) -> Config {
    load(path).unwrap_or_default()
}
