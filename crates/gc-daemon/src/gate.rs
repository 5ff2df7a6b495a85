// SPDX-License-Identifier: MIT

//! Single-writer gate: exclusive advisory lock on a fixed file inside the
//! city's state directory, a PID file, and a Unix-domain control socket.
//! Lock is acquired before the PID file is written, and the control
//! socket binds last, so a process observing the socket can trust the
//! lock and PID are already in place.

use fs2::FileExt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::net::UnixListener;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("another controller already owns this city (lock held): {0}")]
    LockHeld(#[source] std::io::Error),
    #[error("creating state directory {path}: {source}")]
    CreateStateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("opening lock file {path}: {source}")]
    OpenLock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("writing PID file {path}: {source}")]
    WritePid {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("removing stale socket {path}: {source}")]
    RemoveStaleSocket {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("binding control socket {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Fixed paths inside `<city>/.<state-dir>/`.
#[derive(Debug, Clone)]
pub struct GatePaths {
    pub lock_path: PathBuf,
    pub pid_path: PathBuf,
    pub socket_path: PathBuf,
}

impl GatePaths {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            lock_path: state_dir.join("lock"),
            pid_path: state_dir.join("daemon.pid"),
            socket_path: state_dir.join("daemon.sock"),
        }
    }
}

/// Held for the controller process lifetime. Dropping this releases the
/// advisory lock, removes the PID file and socket.
pub struct Gate {
    paths: GatePaths,
    // Held only to keep the exclusive lock alive; never read after acquire.
    #[allow(dead_code)]
    lock_file: File,
    pub listener: UnixListener,
}

impl Gate {
    /// Acquire the lock, write the PID file, then bind the control socket
    /// last — only once lock and PID are in place does the gate start
    /// accepting connections.
    pub fn acquire(state_dir: &Path) -> Result<Self, GateError> {
        std::fs::create_dir_all(state_dir).map_err(|source| GateError::CreateStateDir {
            path: state_dir.to_path_buf(),
            source,
        })?;

        let paths = GatePaths::new(state_dir);

        // Open without truncating before the lock is held: truncating first
        // would wipe a running controller's PID if the lock attempt fails.
        let lock_file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&paths.lock_path)
            .map_err(|source| GateError::OpenLock {
                path: paths.lock_path.clone(),
                source,
            })?;
        lock_file.try_lock_exclusive().map_err(GateError::LockHeld)?;

        let mut lock_file = lock_file;
        lock_file.set_len(0).map_err(|source| GateError::WritePid {
            path: paths.lock_path.clone(),
            source,
        })?;
        writeln!(lock_file, "{}", std::process::id()).map_err(|source| GateError::WritePid {
            path: paths.lock_path.clone(),
            source,
        })?;
        std::fs::write(&paths.pid_path, format!("{}\n", std::process::id())).map_err(|source| {
            GateError::WritePid {
                path: paths.pid_path.clone(),
                source,
            }
        })?;

        if paths.socket_path.exists() {
            std::fs::remove_file(&paths.socket_path).map_err(|source| {
                GateError::RemoveStaleSocket {
                    path: paths.socket_path.clone(),
                    source,
                }
            })?;
        }
        let listener = UnixListener::bind(&paths.socket_path).map_err(|source| GateError::Bind {
            path: paths.socket_path.clone(),
            source,
        })?;

        Ok(Self {
            paths,
            lock_file,
            listener,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.paths.socket_path
    }

    /// Release the PID file and socket; the advisory lock releases when
    /// `lock_file` drops. Best-effort: a failure here is logged by the
    /// caller, not fatal — the process is exiting regardless.
    pub fn release(&self) {
        let _ = std::fs::remove_file(&self.paths.socket_path);
        let _ = std::fs::remove_file(&self.paths.pid_path);
        let _ = std::fs::remove_file(&self.paths.lock_path);
    }
}

/// One accepted connection's single-line request. Anything other than
/// `stop` is ignored; malformed clients are closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRequest {
    Stop,
    Unrecognized,
}

pub fn parse_request(line: &str) -> GateRequest {
    if line.trim() == "stop" {
        GateRequest::Stop
    } else {
        GateRequest::Unrecognized
    }
}
