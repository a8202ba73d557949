// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for the engine crate (§7). `LeaseConflict` is
//! data-carrying and routed through `LeaseResult` rather than propagated;
//! it implements `Error` anyway so it composes with `?` in the rarer paths
//! that do want to bail.

use conclave_hotstore::HotStoreError;
use conclave_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("lease conflict on {file}: held by {holder_agent_id}")]
    LeaseConflict { file: String, holder_agent_id: String },

    #[error("no eligible agent found for PR {pr_id}")]
    AssignmentFailed { pr_id: String },

    #[error("scheduling exceeded {budget_ms}ms budget, returning partial result")]
    SchedulingTimedOut { budget_ms: u64 },

    #[error("operation on {pr_id} timed out after {timeout:?}")]
    Timeout { pr_id: String, timeout: std::time::Duration },

    #[error(transparent)]
    Graph(#[from] conclave_core::GraphError),

    #[error(transparent)]
    Transition(#[from] crate::transitions::TransitionError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    HotStore(#[from] HotStoreError),

    #[error(transparent)]
    Core(#[from] conclave_core::CoreError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
