// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: pidfile locking, directory layout, and the
//! dependency-ordered startup/shutdown sequence (§5: "client -> health ->
//! mode -> state-machine -> lease -> sync -> registry -> scheduler").

use conclave_core::{AgentId, AgentRole};
use conclave_engine::{Config as EngineConfig, Supervisor};
use conclave_hotstore::{HotStore, RedisHotStore};
use fs2::FileExt;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine a state directory (no $HOME)")]
    NoStateDir,

    #[error("daemon already running (pid file locked)")]
    AlreadyRunning,

    #[error("failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error(transparent)]
    Engine(#[from] conclave_engine::EngineError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Filesystem layout for one daemon instance (§6: socket + pidfile +
/// log file, overridable per `start`'s `--work-dir`/`--pid-file`/`--log-file`).
#[derive(Debug, Clone)]
pub struct Paths {
    pub state_dir: PathBuf,
    pub socket_path: PathBuf,
    pub pid_path: PathBuf,
    pub log_path: PathBuf,
}

impl Paths {
    pub fn resolve(work_dir: Option<PathBuf>, pid_file: Option<PathBuf>, log_file: Option<PathBuf>) -> Result<Self, LifecycleError> {
        let state_dir = work_dir.map(Ok).unwrap_or_else(crate::env::state_dir)?;
        Ok(Self {
            socket_path: state_dir.join("daemon.sock"),
            pid_path: pid_file.unwrap_or_else(|| state_dir.join("daemon.pid")),
            log_path: log_file.unwrap_or_else(|| state_dir.join("daemon.log")),
            state_dir,
        })
    }
}

/// Holds the exclusive pidfile lock for the process lifetime; the lock is
/// released when this (and the underlying `File`) drops.
pub struct PidLock {
    #[allow(dead_code)]
    file: File,
}

/// Acquire the pidfile lock (§6 exit code 2: "already running"). Opens
/// without truncating, locks, then truncates and writes the PID only
/// once the lock is held, so a losing contender never sees a
/// zeroed-out file belonging to the winner.
pub fn acquire_pid_lock(pid_path: &std::path::Path) -> Result<PidLock, LifecycleError> {
    if let Some(parent) = pid_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new().write(true).create(true).truncate(false).open(pid_path)?;
    file.try_lock_exclusive().map_err(|_| LifecycleError::AlreadyRunning)?;

    let mut file = file;
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(PidLock { file })
}

/// Everything `startup` hands back to `main`: the locked supervisor plus
/// the bound listener, ready to be driven by the connection-accept loop.
pub struct Daemon {
    pub paths: Paths,
    pub supervisor: Arc<Supervisor>,
    pub listener: tokio::net::UnixListener,
    _pid_lock: PidLock,
}

/// Wire every component in dependency order, connect to the hot store,
/// hydrate from the cold store, recover from any prior crash, bind the
/// IPC socket, and register this process as the sole `planning`-role
/// agent slot reserved for the daemon's own dispatch loop.
pub async fn startup(config: EngineConfig, paths: Paths) -> Result<Daemon, LifecycleError> {
    std::fs::create_dir_all(&paths.state_dir)?;
    let pid_lock = acquire_pid_lock(&paths.pid_path)?;

    let store = Arc::new(RedisHotStore::new(&config.redis.url).map_err(conclave_engine::EngineError::from)?);
    store.connect().await.map_err(conclave_engine::EngineError::from)?;
    let store: Arc<dyn HotStore> = store;

    let now_ms = now_ms();
    let supervisor = Arc::new(Supervisor::new(config, store, now_ms));

    supervisor.sync_coordinator.hydrate_redis_from_git(now_ms).await.map_err(conclave_engine::EngineError::from)?;
    let report = supervisor.sync_coordinator.reconcile_after_crash(now_ms).await.map_err(conclave_engine::EngineError::from)?;
    if !report.is_clean() {
        warn!(n = report.discrepancies.len(), "crash recovery found discrepancies");
    }

    if paths.socket_path.exists() {
        std::fs::remove_file(&paths.socket_path)?;
    }
    let listener = tokio::net::UnixListener::bind(&paths.socket_path).map_err(|e| LifecycleError::BindFailed(paths.socket_path.clone(), e))?;

    supervisor.start().await;
    register_self(&supervisor, now_ms).await?;
    info!(socket = %paths.socket_path.display(), "daemon started");

    Ok(Daemon { paths, supervisor, listener, _pid_lock: pid_lock })
}

/// Reverse-order shutdown: stop accepting new dispatch ticks, let the
/// supervisor unwind its own background tasks, then remove the socket.
pub async fn shutdown(daemon: &Daemon) {
    daemon.supervisor.stop().await;
    let _ = std::fs::remove_file(&daemon.paths.socket_path);
    info!("daemon stopped");
}

fn now_ms() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// Register the process-reserved dispatch agent so `AssignmentManager` has
/// at least one idle `Planning`-role slot to hand new PRs to; concrete
/// worker/qc/review agents register themselves independently (§1:
/// "concrete agent implementations" are out of scope here).
pub async fn register_self(supervisor: &Supervisor, now_ms: u64) -> Result<(), LifecycleError> {
    supervisor
        .registry
        .register(AgentId::from_string("daemon-dispatch"), AgentRole::Planning, std::process::id(), now_ms)
        .await
        .map_err(conclave_engine::EngineError::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_second_lock_on_the_same_pid_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let pid_path = dir.path().join("daemon.pid");
        let first = acquire_pid_lock(&pid_path).unwrap();
        let err = acquire_pid_lock(&pid_path).unwrap_err();
        assert!(matches!(err, LifecycleError::AlreadyRunning));
        drop(first);
    }

    #[test]
    fn paths_resolve_relative_to_an_explicit_work_dir() {
        let paths = Paths::resolve(Some(PathBuf::from("/tmp/conclave-wd")), None, None).unwrap();
        assert_eq!(paths.socket_path, PathBuf::from("/tmp/conclave-wd/daemon.sock"));
        assert_eq!(paths.pid_path, PathBuf::from("/tmp/conclave-wd/daemon.pid"));
    }

    #[test]
    fn explicit_pid_file_overrides_the_work_dir_default() {
        let paths = Paths::resolve(Some(PathBuf::from("/tmp/conclave-wd")), Some(PathBuf::from("/tmp/custom.pid")), None).unwrap();
        assert_eq!(paths.pid_path, PathBuf::from("/tmp/custom.pid"));
    }
}
