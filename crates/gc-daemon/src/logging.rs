// SPDX-License-Identifier: MIT

//! Structured logging setup: `tracing` call sites throughout the workspace
//! feed a file-appended, non-blocking subscriber writing to
//! `<state-dir>/daemon.log`, filtered by `GC_LOG` (falling back to
//! `RUST_LOG`, then `info`). The appender never rolls the log file, and
//! the returned guard must be held for the process lifetime so buffered
//! lines are flushed on drop.

use std::path::Path;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("creating log directory {path}: {source}")]
    CreateDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Install the global tracing subscriber. Returns a [`WorkerGuard`] the
/// caller must hold for the process lifetime — dropping it stops flushing
/// the non-blocking writer.
pub fn init(state_dir: &Path) -> Result<WorkerGuard, LoggingError> {
    std::fs::create_dir_all(state_dir).map_err(|source| LoggingError::CreateDir {
        path: state_dir.to_path_buf(),
        source,
    })?;

    let file_appender = tracing_appender::rolling::never(state_dir, "daemon.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_env("GC_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init();

    Ok(guard)
}
