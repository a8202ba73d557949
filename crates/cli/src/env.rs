// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State-directory resolution, kept in lockstep with `conclave-daemon`'s
//! own copy since the two processes must agree on the socket path without
//! sharing a dependency edge.

use crate::exit_error::ExitError;
use std::path::PathBuf;
use std::time::Duration;

pub fn state_dir() -> Result<PathBuf, ExitError> {
    if let Ok(dir) = std::env::var("CONCLAVE_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("conclave"));
    }
    let home = std::env::var("HOME").map_err(|_| ExitError::new(1, "could not determine a state directory (no $HOME)"))?;
    Ok(PathBuf::from(home).join(".local/state/conclave"))
}

pub fn ipc_timeout() -> Duration {
    std::env::var("CONCLAVE_IPC_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}
