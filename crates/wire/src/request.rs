// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// Request from the CLI to the daemon (§6 "CLI surface").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check ping, used by `conclave status` to detect a dead socket.
    Ping,

    /// Version handshake, sent as the first message of every connection.
    Hello { version: String },

    /// `status` / `status --verbose`.
    Status { verbose: bool },

    /// `stop` (§6 exit code 3: "graceful shutdown cancelled by timeout").
    Shutdown {
        #[serde(default)]
        drain: bool,
    },
}
