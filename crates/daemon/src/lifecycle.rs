// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and teardown.
//!
//! Startup: state directory, exclusive lock file, version file, kernel,
//! sockets. A failure anywhere unwinds what was created and maps to exit
//! code 1; a teardown failure maps to exit code 2.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use fs2::FileExt;
use thiserror::Error;
use tokio::net::{TcpListener, UnixListener};
use tracing::{info, warn};

use crate::env;
use crate::kernel::{Kernel, KernelOptions};
use crate::listener::Listener;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("no home directory; set LITHIUM_STATE_DIR")]
    NoStateDir,

    #[error("another lithiumd holds the lock: {0}")]
    LockFailed(std::io::Error),

    #[error("cannot bind {path}: {source}")]
    Bind { path: PathBuf, source: std::io::Error },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolved paths and ports for one daemon instance.
#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    pub config_dir: PathBuf,
    pub component_roots: Vec<PathBuf>,
    pub tcp_port: Option<u16>,
}

impl Config {
    /// Resolve from the environment.
    pub fn from_env() -> Result<Self, LifecycleError> {
        let state_dir = env::state_dir()?;
        let config_dir = env::config_dir()?;
        let component_roots = env::component_roots(&config_dir);
        Ok(Self { state_dir, config_dir, component_roots, tcp_port: env::tcp_port() })
    }

    pub fn socket_path(&self) -> PathBuf {
        self.state_dir.join("lithiumd.sock")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join("lithiumd.lock")
    }

    pub fn version_path(&self) -> PathBuf {
        self.state_dir.join("version")
    }
}

/// Everything a running daemon owns.
pub struct DaemonState {
    pub kernel: Arc<Kernel>,
    pub listener: Listener,
    // Held for the process lifetime; dropping releases the lock.
    _lock_file: std::fs::File,
}

/// Bring the daemon up. Errors here are unrecoverable (exit code 1).
pub async fn startup(config: &Config) -> Result<DaemonState, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;
    std::fs::create_dir_all(&config.config_dir)?;

    // Lock first so two daemons cannot race on the socket. Opened without
    // truncation: the file may hold the live daemon's pid.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(config.lock_path())?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    std::fs::write(config.version_path(), env::PROTOCOL_VERSION)?;

    // A previous unclean exit can leave the socket file behind; we hold
    // the lock, so it is ours to remove.
    let socket_path = config.socket_path();
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }
    let unix = UnixListener::bind(&socket_path)
        .map_err(|e| LifecycleError::Bind { path: socket_path.clone(), source: e })?;

    let tcp = match config.tcp_port {
        Some(port) => {
            let addr = format!("127.0.0.1:{port}");
            let listener = TcpListener::bind(&addr)
                .await
                .map_err(|e| LifecycleError::Bind { path: PathBuf::from(addr), source: e })?;
            Some(listener)
        }
        None => None,
    };

    let host_command = std::env::current_exe().ok();
    let kernel = Arc::new(
        Kernel::start(KernelOptions {
            config_dir: config.config_dir.clone(),
            component_roots: config.component_roots.clone(),
            host_command,
            tick_period: env::tick_period(),
        })
        .await,
    );

    let listener = Listener::new(unix, tcp, Arc::clone(&kernel));
    info!(socket = %config.socket_path().display(), "lithiumd ready");
    Ok(DaemonState { kernel, listener, _lock_file: lock_file })
}

/// Tear down in reverse startup order. Errors here map to exit code 2.
pub async fn shutdown(config: &Config, kernel: &Kernel) -> Result<(), LifecycleError> {
    kernel.shutdown().await;
    if let Err(e) = std::fs::remove_file(config.socket_path()) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(error = %e, "cannot remove socket file");
            return Err(e.into());
        }
    }
    Ok(())
}
