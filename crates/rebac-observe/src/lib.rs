//! # ReBAC Observe - Observability Layer
//!
//! Centralized tracing, structured logging and metrics for the engine.

use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod logging;
pub mod metrics;
pub mod span_utils;

pub use logging::{init_logging, LogConfig, LogFormat};

/// Default filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "info,rebac=debug";

/// Initialize tracing with an env filter and the plain fmt layer
pub fn init_tracing() -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true));

    // Try to init, but don't fail if already initialized
    if subscriber.try_init().is_err() {
        tracing::debug!("Tracing already initialized, skipping");
        return Ok(());
    }

    tracing::info!("Tracing initialized");
    Ok(())
}

/// Install the Prometheus recorder and register metric descriptions
///
/// The returned handle renders the current metrics in the Prometheus text
/// format; exposing it over HTTP is left to the embedding process.
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    metrics::init_metrics_descriptions();

    tracing::info!("Metrics recorder initialized");
    Ok(handle)
}

/// Initialize logging and, when enabled, metrics
pub fn init(log_config: LogConfig, metrics_enabled: bool) -> Result<Option<PrometheusHandle>> {
    init_logging(log_config)?;
    if metrics_enabled {
        return init_metrics().map(Some);
    }
    Ok(None)
}
