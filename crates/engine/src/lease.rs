// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-lease manager (§4.6, component F): pre-check, atomic multi-set,
//! local tracking as a logical triple, with a grace period past the TTL
//! during which a lease is still honored for conflict purposes (§5).

use crate::config::{LeaseConfig, PairedLockingConfig};
use crate::events::EventSink;
use conclave_core::paired_files::{expand, PathExists};
use conclave_core::Event;
use conclave_hotstore::{keys, AcquireOutcome, HotStore, RetryConfig};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// On-disk shape of a `lease:file:<path>` value.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LeasePayload {
    holder_agent_id: String,
    pr_id: String,
    acquired_at_ms: u64,
    ttl_secs: u64,
    grace_secs: u64,
    last_heartbeat_ms: u64,
}

impl LeasePayload {
    fn effective_expiry_ms(&self) -> u64 {
        self.acquired_at_ms + (self.ttl_secs + self.grace_secs) * 1000
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseConflict {
    pub file: String,
    pub holder_agent_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct LeaseResult {
    pub success: bool,
    pub leased_files: Option<Vec<String>>,
    pub conflicts: Option<Vec<LeaseConflict>>,
    pub expanded: bool,
    pub error: Option<String>,
}

impl LeaseResult {
    fn ok(leased_files: Vec<String>, expanded: bool) -> Self {
        Self { success: true, leased_files: Some(leased_files), conflicts: None, expanded, error: None }
    }

    fn conflict(conflicts: Vec<LeaseConflict>, expanded: bool) -> Self {
        Self { success: false, leased_files: None, conflicts: Some(conflicts), expanded, error: None }
    }

    fn rejected(error: impl Into<String>) -> Self {
        Self { success: false, leased_files: None, conflicts: None, expanded: false, error: Some(error.into()) }
    }
}

/// Checks file existence against the real filesystem, used when
/// `pairedLocking.checkExists` is set (§4.5).
pub struct FsPathExists {
    pub root: std::path::PathBuf,
}

impl PathExists for FsPathExists {
    fn exists(&self, path: &str) -> bool {
        self.root.join(path).exists()
    }
}

/// Lease manager (§4.6). Owns the hot-store handle plus the local
/// `agent -> {files}` tracking map that mirrors the per-agent/per-PR index
/// sets in the hot store.
pub struct LeaseManager {
    store: Arc<dyn HotStore>,
    events: Arc<EventSink>,
    lease_cfg: LeaseConfig,
    paired_cfg: PairedLockingConfig,
    fs_root: Option<std::path::PathBuf>,
    held: Mutex<HashMap<String, HashSet<String>>>,
    heartbeating: Mutex<HashSet<String>>,
}

impl LeaseManager {
    pub fn new(store: Arc<dyn HotStore>, events: Arc<EventSink>, lease_cfg: LeaseConfig, paired_cfg: PairedLockingConfig, fs_root: Option<std::path::PathBuf>) -> Self {
        Self { store, events, lease_cfg, paired_cfg, fs_root, held: Mutex::new(HashMap::new()), heartbeating: Mutex::new(HashSet::new()) }
    }

    fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_cfg.default_ttl_secs)
    }

    /// Acquisition protocol (§4.6 steps 1-5).
    #[instrument(skip(self, files), fields(agent_id = %agent_id, pr_id = %pr_id, n = files.len()))]
    pub async fn acquire(&self, files: &[String], agent_id: &str, pr_id: &str, ttl: Option<Duration>, now_ms: u64) -> Result<LeaseResult, crate::EngineError> {
        if files.len() > self.lease_cfg.max_files_per_request {
            return Ok(LeaseResult::rejected(format!(
                "requested {} files exceeds max_files_per_request ({})",
                files.len(),
                self.lease_cfg.max_files_per_request
            )));
        }

        let (targets, expanded) = self.expand_targets(files);
        let ttl = ttl.unwrap_or_else(|| self.default_ttl());

        if let Some(conflicts) = self.pre_check(&targets, agent_id, now_ms).await? {
            warn!(n = conflicts.len(), "lease pre-check found conflicts");
            for c in &conflicts {
                self.events.emit(Event::LeaseConflict { agent_id: agent_id.to_string(), file: c.file.clone(), holder_agent_id: c.holder_agent_id.clone() }, now_ms).await;
            }
            return Ok(LeaseResult::conflict(conflicts, expanded));
        }

        let payload = LeasePayload {
            holder_agent_id: agent_id.to_string(),
            pr_id: pr_id.to_string(),
            acquired_at_ms: now_ms,
            ttl_secs: ttl.as_secs(),
            grace_secs: self.lease_cfg.grace_period_secs,
            last_heartbeat_ms: now_ms,
        };
        let serialized = serde_json::to_string(&payload).map_err(|e| crate::EngineError::Config(e.to_string()))?;
        let entries: Vec<(String, String)> = targets.iter().map(|f| (keys::lease_file(f), serialized.clone())).collect();

        match self.store.acquire_if_absent(&entries, ttl, RetryConfig::default()).await? {
            AcquireOutcome::AlreadyHeld(held_keys) => {
                let conflicts = self.reread_conflicts(&held_keys).await?;
                return Ok(LeaseResult::conflict(conflicts, expanded));
            }
            AcquireOutcome::Acquired => {}
        }

        if self.lease_cfg.track_sets {
            for file in &targets {
                self.store.sadd(&keys::agent_leases(agent_id), file).await?;
                self.store.expire(&keys::agent_leases(agent_id), ttl).await?;
                self.store.sadd(&keys::lease_pr(pr_id), file).await?;
                self.store.expire(&keys::lease_pr(pr_id), ttl).await?;
            }
        }

        {
            let mut held = self.held.lock();
            held.entry(agent_id.to_string()).or_default().extend(targets.iter().cloned());
        }
        self.heartbeating.lock().insert(agent_id.to_string());

        info!(n = targets.len(), "lease acquired");
        self.events.emit(Event::LeaseAcquired { pr_id: pr_id.to_string(), agent_id: agent_id.to_string(), files: targets.clone() }, now_ms).await;
        Ok(LeaseResult::ok(targets, expanded))
    }

    fn expand_targets(&self, files: &[String]) -> (Vec<String>, bool) {
        if !self.paired_cfg.enabled {
            return (files.to_vec(), false);
        }
        let checker = self.fs_root.as_ref().filter(|_| self.paired_cfg.check_exists).map(|root| FsPathExists { root: root.clone() });
        let specials = conclave_core::default_special_cases();
        let result = expand(files, &self.paired_cfg.patterns, &specials, checker.as_ref().map(|c| c as &dyn PathExists));
        let expanded = result.all.len() > files.len();
        (result.all, expanded)
    }

    async fn pre_check(&self, targets: &[String], agent_id: &str, now_ms: u64) -> Result<Option<Vec<LeaseConflict>>, crate::EngineError> {
        let mut conflicts = Vec::new();
        for file in targets {
            let Some(raw) = self.store.get(&keys::lease_file(file)).await? else { continue };
            let Ok(payload) = serde_json::from_str::<LeasePayload>(&raw) else { continue };
            if payload.holder_agent_id != agent_id && payload.effective_expiry_ms() > now_ms {
                conflicts.push(LeaseConflict { file: file.clone(), holder_agent_id: payload.holder_agent_id });
            }
        }
        Ok(if conflicts.is_empty() { None } else { Some(conflicts) })
    }

    async fn reread_conflicts(&self, keys: &[String]) -> Result<Vec<LeaseConflict>, crate::EngineError> {
        let mut conflicts = Vec::new();
        for key in keys {
            let file = key.strip_prefix("lease:file:").unwrap_or(key).to_string();
            if let Some(raw) = self.store.get(key).await? {
                if let Ok(payload) = serde_json::from_str::<LeasePayload>(&raw) {
                    conflicts.push(LeaseConflict { file, holder_agent_id: payload.holder_agent_id });
                    continue;
                }
            }
            conflicts.push(LeaseConflict { file, holder_agent_id: "unknown".to_string() });
        }
        Ok(conflicts)
    }

    /// Release protocol (§4.6): `files = None` releases every locally
    /// tracked file for the agent. Always succeeds, even on an empty set.
    #[instrument(skip(self, files), fields(agent_id = %agent_id))]
    pub async fn release(&self, files: Option<&[String]>, agent_id: &str, now_ms: u64) -> Result<LeaseResult, crate::EngineError> {
        let candidates: Vec<String> = match files {
            Some(f) => f.to_vec(),
            None => self.held.lock().get(agent_id).map(|set| set.iter().cloned().collect()).unwrap_or_default(),
        };

        let mut released = Vec::new();
        for file in &candidates {
            let key = keys::lease_file(file);
            let Some(raw) = self.store.get(&key).await? else { continue };
            let Ok(payload) = serde_json::from_str::<LeasePayload>(&raw) else { continue };
            if payload.holder_agent_id != agent_id {
                continue;
            }
            self.store.del(&[key]).await?;
            if self.lease_cfg.track_sets {
                self.store.srem(&keys::agent_leases(agent_id), file).await?;
                self.store.srem(&keys::lease_pr(&payload.pr_id), file).await?;
            }
            released.push(file.clone());
        }

        {
            let mut held = self.held.lock();
            if let Some(set) = held.get_mut(agent_id) {
                for file in &released {
                    set.remove(file);
                }
                if set.is_empty() {
                    held.remove(agent_id);
                    self.heartbeating.lock().remove(agent_id);
                }
            }
        }

        info!(n = released.len(), "lease released");
        if !released.is_empty() {
            self.events.emit(Event::LeaseReleased { agent_id: agent_id.to_string(), files: released.clone() }, now_ms).await;
        }
        Ok(LeaseResult::ok(released, false))
    }

    /// Renew protocol, also the heartbeat body (§4.6).
    #[instrument(skip(self), fields(agent_id = %agent_id))]
    pub async fn renew(&self, agent_id: &str, ttl: Option<Duration>, now_ms: u64) -> Result<LeaseResult, crate::EngineError> {
        let ttl = ttl.unwrap_or_else(|| self.default_ttl());
        let files: Vec<String> = self.held.lock().get(agent_id).map(|s| s.iter().cloned().collect()).unwrap_or_default();
        let mut renewed = Vec::new();
        for file in &files {
            let key = keys::lease_file(file);
            let raw = match self.store.get(&key).await {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    warn!(file, error = %e, "heartbeat-failed: could not read lease payload");
                    self.events.emit(Event::HeartbeatFailed { agent_id: agent_id.to_string(), reason: e.to_string() }, now_ms).await;
                    continue;
                }
            };
            let Ok(mut payload) = serde_json::from_str::<LeasePayload>(&raw) else { continue };
            if payload.holder_agent_id != agent_id {
                continue;
            }
            payload.last_heartbeat_ms = now_ms;
            payload.acquired_at_ms = now_ms;
            payload.ttl_secs = ttl.as_secs();
            let Ok(serialized) = serde_json::to_string(&payload) else { continue };
            self.store.set(&key, &serialized, Some(ttl)).await?;
            renewed.push(file.clone());
        }
        Ok(LeaseResult::ok(renewed, false))
    }

    pub fn leases_of_agent(&self, agent_id: &str) -> Vec<String> {
        self.held.lock().get(agent_id).map(|s| s.iter().cloned().collect()).unwrap_or_default()
    }

    pub fn is_heartbeating(&self, agent_id: &str) -> bool {
        self.heartbeating.lock().contains(agent_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_hotstore::fake::FakeHotStore;

    fn manager() -> LeaseManager {
        let store: Arc<dyn HotStore> = Arc::new(FakeHotStore::new());
        LeaseManager::new(
            store.clone(),
            Arc::new(EventSink::new(store)),
            LeaseConfig { default_ttl_secs: 300, heartbeat_interval_ms: 1000, grace_period_secs: 30, track_sets: true, max_files_per_request: 5 },
            PairedLockingConfig { enabled: false, patterns: vec![], check_exists: false, require_tests: false },
            None,
        )
    }

    #[tokio::test]
    async fn acquire_then_release_round_trips() {
        let mgr = manager();
        let files = vec!["src/a.rs".to_string()];
        let result = mgr.acquire(&files, "agt-1", "PR-1", None, 0).await.unwrap();
        assert!(result.success);
        assert_eq!(mgr.leases_of_agent("agt-1"), vec!["src/a.rs".to_string()]);

        let released = mgr.release(None, "agt-1", 10_000).await.unwrap();
        assert!(released.success);
        assert!(mgr.leases_of_agent("agt-1").is_empty());
        assert!(!mgr.is_heartbeating("agt-1"));
    }

    #[tokio::test]
    async fn second_agent_conflicts_within_grace_period() {
        let mgr = manager();
        let files = vec!["src/a.rs".to_string()];
        mgr.acquire(&files, "agt-1", "PR-1", Some(Duration::from_secs(10)), 0).await.unwrap();

        let result = mgr.acquire(&files, "agt-2", "PR-2", None, 5_000).await.unwrap();
        assert!(!result.success);
        let conflicts = result.conflicts.unwrap();
        assert_eq!(conflicts[0].holder_agent_id, "agt-1");
    }

    #[tokio::test]
    async fn acquisition_beyond_grace_period_succeeds_for_a_new_agent() {
        let mgr = manager();
        let files = vec!["src/a.rs".to_string()];
        mgr.acquire(&files, "agt-1", "PR-1", Some(Duration::from_secs(10)), 0).await.unwrap();

        // effective_expiry = 0 + (10 + 30) * 1000 = 40_000ms
        let result = mgr.acquire(&files, "agt-2", "PR-2", None, 45_000).await.unwrap();
        assert!(result.success, "a lease past its grace period should not block a new acquirer");
    }

    #[tokio::test]
    async fn releasing_a_file_you_do_not_hold_is_silently_skipped() {
        let mgr = manager();
        let files = vec!["src/a.rs".to_string()];
        mgr.acquire(&files, "agt-1", "PR-1", None, 0).await.unwrap();

        let result = mgr.release(Some(&files), "agt-2", 10_000).await.unwrap();
        assert!(result.success);
        assert_eq!(mgr.leases_of_agent("agt-1"), vec!["src/a.rs".to_string()]);
    }

    #[tokio::test]
    async fn renew_refreshes_ttl_for_owned_leases_only() {
        let mgr = manager();
        let files = vec!["src/a.rs".to_string()];
        mgr.acquire(&files, "agt-1", "PR-1", Some(Duration::from_secs(10)), 0).await.unwrap();

        let result = mgr.renew("agt-1", Some(Duration::from_secs(60)), 1_000).await.unwrap();
        assert!(result.success);
        assert_eq!(result.leased_files.unwrap(), vec!["src/a.rs".to_string()]);
    }

    #[tokio::test]
    async fn exceeding_max_files_per_request_is_rejected_without_touching_the_store() {
        let mgr = manager();
        let files: Vec<String> = (0..10).map(|i| format!("src/f{i}.rs")).collect();
        let result = mgr.acquire(&files, "agt-1", "PR-1", None, 0).await.unwrap();
        assert!(!result.success);
        assert!(result.error.is_some());
    }
}
