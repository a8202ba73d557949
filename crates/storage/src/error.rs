// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for the cold/hot store operations (§7): document parsing
//! and commit failures propagate to the caller; hot-store I/O wraps the
//! lower-level [`conclave_hotstore::HotStoreError`].

use conclave_hotstore::HotStoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to parse cold-store document: {0}")]
    DocumentParse(String),

    #[error("commit failed: {0}")]
    CommitFailed(String),

    #[error("cold-store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    HotStoreIo(#[from] HotStoreError),
}
