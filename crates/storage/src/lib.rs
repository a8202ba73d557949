// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cold-store document parsing/commit (L), hot-store keyspace helpers (M),
//! and crash reconciliation (N).

pub mod cold_store;
pub mod document;
pub mod error;
pub mod hot_ops;
pub mod reconcile;

pub use cold_store::{finalize_commit_message, ColdStore, DisplayUpdate, PrColdState};
pub use document::{ColdDocument, PrFrontMatter};
pub use error::StorageError;
pub use hot_ops::HotStoreOps;
pub use reconcile::{reconcile_after_crash, validate_consistency, Discrepancy, ReconcileReport};
