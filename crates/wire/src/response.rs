// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::types::StatusReport;
use serde::{Deserialize, Serialize};

/// Response from the daemon to the CLI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    Pong,
    Hello { version: String },
    Status(StatusReport),
    Ok,
    /// Shutdown accepted but still draining in-flight work.
    ShuttingDown,
    Error { message: String },
}
