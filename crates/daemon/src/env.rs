// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

/// Resolve state directory: CONCLAVE_STATE_DIR > XDG_STATE_HOME/conclave >
/// ~/.local/state/conclave.
pub fn state_dir() -> Result<PathBuf, crate::lifecycle::LifecycleError> {
    if let Ok(dir) = std::env::var("CONCLAVE_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("conclave"));
    }
    let home = std::env::var("HOME").map_err(|_| crate::lifecycle::LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/conclave"))
}

/// IPC read/write timeout for a single wire message.
pub fn ipc_timeout() -> Duration {
    std::env::var("CONCLAVE_IPC_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// `stop`'s graceful-drain deadline before the daemon is killed outright
/// (§6 exit code 3).
pub fn drain_timeout() -> Duration {
    std::env::var("CONCLAVE_DRAIN_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(10))
}
