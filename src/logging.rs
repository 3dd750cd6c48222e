//! Tracing subscriber setup.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogFormat;

pub const LOG_FILE_PREFIX: &str = "issuelink.log";

/// `RUST_LOG` when set, otherwise `level`.
pub fn build_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log filter '{}'", level))
}

/// Install the global subscriber. Logs go to stderr, and to a daily rolling
/// file when `directory` is set; keep the returned guard alive until exit so
/// buffered file output is flushed.
pub fn init(level: &str, format: LogFormat, directory: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(level)?;

    let (file_layer, guard) = match directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    }
    .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_accepts_directives() {
        assert!(build_filter("info").is_ok());
        assert!(build_filter("issuelink=debug,tower_http=info").is_ok());
    }
}
