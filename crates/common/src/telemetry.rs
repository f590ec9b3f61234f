//! Logging initialization for fathom binaries.
//!
//! Stdout gets human-readable output filtered by `RUST_LOG`. Events emitted with
//! `target: "queries"`, `"errors"` or `"metrics"` are additionally written as JSON
//! lines to daily-rolling files under the configured log directory.

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

pub const QUERIES_TARGET: &str = "queries";
pub const ERRORS_TARGET: &str = "errors";
pub const METRICS_TARGET: &str = "metrics";

pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory)
        .with_context(|| format!("Failed to create log directory: {}", config.directory))?;

    let errors_appender = tracing_appender::rolling::daily(&config.directory, "errors.jsonl");
    let errors_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(errors_appender)
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
            metadata.target() == ERRORS_TARGET
        }));

    let metrics_appender = tracing_appender::rolling::daily(&config.directory, "metrics.jsonl");
    let metrics_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(metrics_appender)
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
            metadata.target() == METRICS_TARGET
        }));

    let stdout_layer = tracing_subscriber::fmt::layer().with_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    );

    let registry = tracing_subscriber::registry()
        .with(stdout_layer)
        .with(errors_layer)
        .with(metrics_layer);

    if config.query_log_enabled {
        let queries_appender = tracing_appender::rolling::daily(&config.directory, "queries.jsonl");
        let queries_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(queries_appender)
            .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
                metadata.target() == QUERIES_TARGET
            }));
        registry.with(queries_layer).try_init().ok();
    } else {
        registry.try_init().ok();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_creates_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("nested").join("logs");
        let config = LoggingConfig {
            directory: log_dir.to_string_lossy().to_string(),
            query_log_enabled: false,
        };

        init_tracing(&config).unwrap();
        assert!(log_dir.is_dir());

        // A second initialization is tolerated
        init_tracing(&config).unwrap();
    }
}
