// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sync coordinator (§4.15, component O): hydration on startup,
//! crash reconciliation, the 30 s periodic display flush, and the
//! event-driven cold/hot sync paths.

use crate::config::SyncConfig;
use conclave_storage::{reconcile_after_crash, ColdStore, DisplayUpdate, HotStoreOps, ReconcileReport, StorageError};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Default)]
pub struct SyncCounters {
    pub last_hydrate_ms: Option<u64>,
    pub last_display_sync_ms: Option<u64>,
    pub last_reconcile_ms: Option<u64>,
    pub sync_count: u64,
    pub reconciliation_count: u64,
    pub error_count: u64,
}

/// Sync coordinator (§4.15). Wraps the cold store and the hot-store
/// keyspace helper; owns no lifecycle of its own beyond the counters below
/// (the periodic flush timer lives in the supervisor, same as every other
/// per-agent/per-component timer in this engine).
pub struct SyncCoordinator {
    cold: Arc<ColdStore>,
    hot: Arc<HotStoreOps>,
    config: SyncConfig,
    counters: Mutex<SyncCounters>,
}

impl SyncCoordinator {
    pub fn new(cold: Arc<ColdStore>, hot: Arc<HotStoreOps>, config: SyncConfig) -> Self {
        Self { cold, hot, config, counters: Mutex::new(SyncCounters::default()) }
    }

    pub fn counters(&self) -> SyncCounters {
        self.counters.lock().clone()
    }

    pub fn display_sync_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.config.display_sync_interval_ms)
    }

    /// Startup hydration: reads the task-list document and writes cold
    /// caches + dependency sets into the hot store (§4.15).
    #[instrument(skip(self))]
    pub async fn hydrate_redis_from_git(&self, now_ms: u64) -> Result<(), StorageError> {
        let prs = self.cold.reconstruct_state().await?;
        self.hot.hydrate_from_task_list(&prs).await?;
        let mut counters = self.counters.lock();
        counters.last_hydrate_ms = Some(now_ms);
        counters.sync_count += 1;
        info!(n = prs.len(), "hydrated hot store from git");
        Ok(())
    }

    /// Crash reconciliation (§4.14, §4.15): delegates to storage's
    /// `reconcile_after_crash`, tracking its own counters on top.
    #[instrument(skip(self))]
    pub async fn reconcile_after_crash(&self, now_ms: u64) -> Result<ReconcileReport, StorageError> {
        let report = reconcile_after_crash(&self.cold, &self.hot, now_ms).await?;
        let mut counters = self.counters.lock();
        counters.last_reconcile_ms = Some(now_ms);
        counters.reconciliation_count += 1;
        if !report.is_clean() {
            info!(n = report.discrepancies.len(), "reconciliation repaired discrepancies");
        }
        Ok(report)
    }

    /// Periodic 30 s display-flush body (§4.12 `commitDisplaySync`): a
    /// milestone commit within the last 5 s always wins the race, handled
    /// by `ColdStore::has_recent_commit` itself.
    #[instrument(skip(self, updates))]
    pub async fn display_sync_tick(&self, updates: &[DisplayUpdate], now_ms: u64) -> Result<(), StorageError> {
        if updates.is_empty() {
            return Ok(());
        }
        match self.cold.commit_display_sync(updates).await {
            Ok(()) => {
                let mut counters = self.counters.lock();
                counters.last_display_sync_ms = Some(now_ms);
                counters.sync_count += 1;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "display sync flush failed, will retry next tick");
                self.counters.lock().error_count += 1;
                Err(e)
            }
        }
    }

    /// Event-driven path for a cold-state change (§4.15): commit to git
    /// first, then best-effort refresh the hot cold-state cache and clear
    /// any stale hot state for the PR.
    #[instrument(skip(self))]
    pub async fn on_cold_state_change(&self, pr_id: &str, new_cold_state: conclave_core::ColdState, message: &str) -> Result<(), StorageError> {
        self.cold.commit(pr_id, new_cold_state, message).await?;
        if let Err(e) = self.hot.update_cold_state_cache(pr_id, &new_cold_state.to_string()).await {
            warn!(pr_id, error = %e, "best-effort cold cache refresh failed after commit");
            self.counters.lock().error_count += 1;
        }
        if let Err(e) = self.hot.clear_hot_state(pr_id).await {
            warn!(pr_id, error = %e, "best-effort hot state clear failed after commit");
            self.counters.lock().error_count += 1;
        }
        self.counters.lock().sync_count += 1;
        Ok(())
    }

    /// Event-driven path for a hot-state change (§4.15): hot store only,
    /// no git commit (hot transitions are not durable by design).
    #[instrument(skip(self))]
    pub async fn on_hot_state_change(&self, pr_id: &str, hot_state: &str, agent_id: &str, now_ms: u64) -> Result<(), StorageError> {
        self.hot.write_hot_state(pr_id, hot_state, agent_id, now_ms).await?;
        self.counters.lock().sync_count += 1;
        Ok(())
    }
}
