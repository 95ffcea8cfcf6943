//! Tracing setup: console output plus an optional log file

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LogConfig;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `IPMI_LOG_LEVEL` when set. The returned guard
/// flushes the file writer and must live until the process exits.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.is_empty() => EnvFilter::try_new(directives)?,
        _ => EnvFilter::try_new(&config.level)?,
    };

    let (file_writer, guard) = match &config.file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(open_appender(path)?);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };
    let file_layer = file_writer.map(|writer| fmt::layer().with_writer(writer).with_ansi(false));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(file_layer)
        .with(filter)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(guard)
}

/// Appender writing to exactly `path`, never rotated
fn open_appender(path: &Path) -> Result<RollingFileAppender> {
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("IPMI_LOG_FILE has no file name: {}", path.display()))?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy())
        .build(dir)
        .with_context(|| format!("failed to open log file {}", path.display()))
}
