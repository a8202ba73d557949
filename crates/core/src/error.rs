// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crate-wide error aggregate (§7).

use crate::dependency_graph::GraphError;
use crate::state_machine::InvalidTransition;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error(transparent)]
    CyclesDetected(#[from] GraphError),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}
