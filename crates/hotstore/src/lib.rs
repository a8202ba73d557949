// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hot-store client (§4.1, §4.2, §6): a Redis-compatible transport with
//! optimistic watch/multi/exec transactions, a health monitor, and the
//! keyspace helpers shared by every higher crate that reads or writes hot
//! state.

pub mod backoff;
pub mod client;
pub mod error;
pub mod health;
pub mod keys;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use backoff::RetryConfig;
pub use client::{AcquireOutcome, ConnectionState, HotStore, RedisHotStore};
pub use error::HotStoreError;
pub use health::{Health, HealthConfig, HealthEvent, HealthMonitor, TickOutcome};
pub use keys::HOT_STATE_TTL_SECS;
