//! Structured logging utilities
//!
//! Provides log formatting options on top of `tracing_subscriber::fmt`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

use crate::DEFAULT_FILTER;

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format with colors (for development)
    Pretty,
    /// Compact format without colors
    Compact,
    /// JSON format (for production)
    Json,
}

#[allow(clippy::derivable_impls)]
impl Default for LogFormat {
    fn default() -> Self {
        #[cfg(debug_assertions)]
        {
            LogFormat::Pretty
        }
        #[cfg(not(debug_assertions))]
        {
            LogFormat::Json
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogFormat::Pretty => "pretty",
            LogFormat::Compact => "compact",
            LogFormat::Json => "json",
        };
        f.write_str(name)
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format `{other}`")),
        }
    }
}

/// Configuration for logging behavior
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output format
    pub format: LogFormat,
    /// Whether to include file/line numbers
    pub include_location: bool,
    /// Whether to include target module
    pub include_target: bool,
    /// Whether to include thread IDs
    pub include_thread_id: bool,
    /// Whether to log span events (enter/exit/close)
    pub log_spans: bool,
    /// Environment filter (e.g., "info,rebac=debug")
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            include_location: cfg!(debug_assertions),
            include_target: true,
            include_thread_id: false,
            log_spans: false,
            filter: None,
        }
    }
}

/// Initialize structured logging with configuration
///
/// A more flexible alternative to [`crate::init_tracing`] that allows
/// customization of log format and behavior.
pub fn init_logging(config: LogConfig) -> anyhow::Result<()> {
    let env_filter = match config.filter {
        Some(filter) => EnvFilter::try_new(filter)?,
        None => {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
        },
    };

    let fmt_span = if config.log_spans { FmtSpan::NEW | FmtSpan::CLOSE } else { FmtSpan::NONE };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_id)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(fmt_span);

    match config.format {
        LogFormat::Pretty => {
            subscriber
                .pretty()
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize pretty logger: {}", e))?;
        },
        LogFormat::Compact => {
            subscriber
                .compact()
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize compact logger: {}", e))?;
        },
        LogFormat::Json => {
            subscriber
                .json()
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize JSON logger: {}", e))?;
        },
    }

    tracing::info!(
        format = %config.format,
        location = config.include_location,
        target = config.include_target,
        "Logging initialized"
    );

    Ok(())
}
