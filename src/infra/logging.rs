//! Structured logging setup.
//!
//! Component-targeted `tracing` with an env-filter base, optional JSON
//! output, and an optional rolling file via `tracing-appender`.
//!
//! # Component targets
//!
//! | Target | Description |
//! |--------|-------------|
//! | `index_maker::engine` | Gate decisions and order lifecycle |
//! | `index_maker::estimator` | Pricing model guards |
//! | `index_maker::features` | Iceberg findings, regime transitions |
//! | `index_maker::ingress` | Frame drops, feed health |
//! | `index_maker::runtime` | Queue pressure, shutdown |
//!
//! ```bash
//! # Debug only the engine decisions
//! RUST_LOG=info,index_maker::engine=debug maker
//! ```

use serde::Deserialize;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable, for a terminal.
    #[default]
    Pretty,
    /// JSON lines, for aggregation.
    Json,
    /// Single-line compact.
    Compact,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Base level filter when RUST_LOG is unset.
    pub level: String,
    pub stdout_format: LogFormat,
    /// Directory for the rolling daily log file; `None` disables file
    /// output.
    pub log_dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            stdout_format: LogFormat::default(),
            log_dir: None,
        }
    }
}

/// Initialize global logging.
///
/// Returns the appender guard when file logging is enabled; it must stay
/// alive for the life of the process or buffered lines are lost.
pub fn init_logging(config: &LogConfig) -> std::io::Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let mut guard = None;
    let file_layer = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, "maker.log");
            let (writer, g) = tracing_appender::non_blocking(appender);
            guard = Some(g);
            Some(fmt::layer().with_writer(writer).with_ansi(false).json())
        }
        None => None,
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    match config.stdout_format {
        LogFormat::Json => registry.with(fmt::layer().json().boxed()).init(),
        LogFormat::Compact => registry.with(fmt::layer().compact().boxed()).init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(false).boxed())
            .init(),
    }

    Ok(guard)
}

/// Log target constants for component-specific filtering.
pub mod targets {
    /// Gate decisions and order lifecycle.
    pub const ENGINE: &str = "index_maker::engine";
    /// Pricing model numerical guards.
    pub const ESTIMATOR: &str = "index_maker::estimator";
    /// Iceberg findings and regime transitions.
    pub const FEATURES: &str = "index_maker::features";
    /// Frame drops and feed health.
    pub const INGRESS: &str = "index_maker::ingress";
    /// Queue pressure and shutdown.
    pub const RUNTIME: &str = "index_maker::runtime";
}
