//! Logging initialization for homestead
//!
//! Diagnostics go to stderr at `warn` (`debug` with `-v`; `RUST_LOG` overrides both).
//! `--log-file` adds a debug-level file log without ANSI codes.

use std::fs;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{DeployError, Result};

/// Keeps the file writer alive; buffered lines are flushed on drop
pub struct LoggingHandle {
    pub _guard: Option<WorkerGuard>,
}

/// Filter directive for the stderr layer
pub fn stderr_directive(verbose: bool, rust_log: Option<&str>) -> String {
    match rust_log {
        Some(value) if !value.trim().is_empty() => value.to_string(),
        _ if verbose => "debug".to_string(),
        _ => "warn".to_string(),
    }
}

pub fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<LoggingHandle> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let stderr_filter = EnvFilter::new(stderr_directive(verbose, rust_log.as_deref()));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(stderr_filter);

    let mut guard = None;
    let file_layer = match log_file {
        Some(path) => {
            let (dir, name) = split_log_path(path)?;
            fs::create_dir_all(&dir).map_err(|e| DeployError::FileWriteFailed {
                path: dir.display().to_string(),
                reason: e.to_string(),
            })?;
            let appender = tracing_appender::rolling::never(&dir, &name);
            let (writer, worker) = tracing_appender::non_blocking(appender);
            guard = Some(worker);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| DeployError::IoError {
            message: format!("failed to initialise logging: {e}"),
        })?;

    Ok(LoggingHandle { _guard: guard })
}

fn split_log_path(path: &Path) -> Result<(PathBuf, String)> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| DeployError::IoError {
            message: format!("log file path {} has no file name", path.display()),
        })?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, name))
}
