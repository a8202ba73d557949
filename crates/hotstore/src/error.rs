// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for the hot-store client (§4.1, §7): connection refusal
//! and watch-conflicts are typed results callers are expected to handle,
//! not exceptional control flow.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HotStoreError {
    #[error("hot store connection refused: {0}")]
    ConnectionRefused(String),

    #[error("operation attempted on an unconnected client")]
    OperationOnUnconnectedClient,

    #[error("watch conflict after {attempts} attempt(s)")]
    WatchConflict { attempts: u32 },

    #[error("hot store operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}
