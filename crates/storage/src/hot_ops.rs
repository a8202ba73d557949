// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hot-store operations (§4.13, component M): the thin keyspace-shaped
//! layer atop [`conclave_hotstore::HotStore`] that writes/reads PR hot
//! state, maintains the cold-state cache, and scans for orphans/expired
//! heartbeats.

use crate::cold_store::PrColdState;
use crate::error::StorageError;
use conclave_hotstore::{keys, HotStore, HOT_STATE_TTL_SECS};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

pub struct HotStoreOps {
    store: Arc<dyn HotStore>,
}

impl HotStoreOps {
    pub fn new(store: Arc<dyn HotStore>) -> Self {
        Self { store }
    }

    /// Write hot state + agent + timestamp, each with the 5 min TTL (§4.13,
    /// §6 keyspace).
    #[instrument(skip(self), fields(pr_id = %pr_id, agent_id = %agent_id))]
    pub async fn write_hot_state(&self, pr_id: &str, hot_state: &str, agent_id: &str, now_ms: u64) -> Result<(), StorageError> {
        let ttl = Duration::from_secs(HOT_STATE_TTL_SECS);
        self.store.set(&keys::pr_hot_state(pr_id), hot_state, Some(ttl)).await?;
        self.store.set(&keys::pr_agent(pr_id), agent_id, Some(ttl)).await?;
        self.store.set(&keys::pr_hot_state_timestamp(pr_id), &now_ms.to_string(), Some(ttl)).await?;
        Ok(())
    }

    /// Delete the three hot-state keys for a PR (§4.13 "Hot state clear").
    pub async fn clear_hot_state(&self, pr_id: &str) -> Result<(), StorageError> {
        self.store
            .del(&[keys::pr_hot_state(pr_id), keys::pr_agent(pr_id), keys::pr_hot_state_timestamp(pr_id)])
            .await?;
        Ok(())
    }

    pub async fn read_hot_state(&self, pr_id: &str) -> Result<Option<String>, StorageError> {
        Ok(self.store.get(&keys::pr_hot_state(pr_id)).await?)
    }

    pub async fn read_hot_agent(&self, pr_id: &str) -> Result<Option<String>, StorageError> {
        Ok(self.store.get(&keys::pr_agent(pr_id)).await?)
    }

    /// Cold-state cache: no TTL, reconstructible from the cold store at any
    /// time (§4.13).
    pub async fn update_cold_state_cache(&self, pr_id: &str, cold_state: &str) -> Result<(), StorageError> {
        self.store.set(&keys::pr_cold_state(pr_id), cold_state, None).await?;
        Ok(())
    }

    pub async fn read_cold_state_cache(&self, pr_id: &str) -> Result<Option<String>, StorageError> {
        Ok(self.store.get(&keys::pr_cold_state(pr_id)).await?)
    }

    /// All PR ids currently carrying a hot state (§4.13 `getAllHotStates`).
    pub async fn get_all_hot_states(&self) -> Result<HashMap<String, String>, StorageError> {
        let keys = self.store.scan_match("pr:*:hot_state").await?;
        let mut out = HashMap::new();
        for key in keys {
            // "pr:<id>:hot_state" -> <id>
            if let Some(id) = key.strip_prefix("pr:").and_then(|s| s.strip_suffix(":hot_state")) {
                if let Some(state) = self.store.get(&key).await? {
                    out.insert(id.to_string(), state);
                }
            }
        }
        Ok(out)
    }

    /// Write the cold cache + dependency set for every PR in the task list
    /// (§4.13 `hydrateFromTaskList`).
    #[instrument(skip(self, prs))]
    pub async fn hydrate_from_task_list(&self, prs: &HashMap<String, PrColdState>) -> Result<(), StorageError> {
        for (pr_id, pr) in prs {
            self.update_cold_state_cache(pr_id, &pr.cold_state.to_string()).await?;
            let dep_key = keys::pr_dependencies(pr_id);
            for dep in &pr.dependencies {
                self.store.sadd(&dep_key, dep).await?;
            }
        }
        Ok(())
    }

    /// Delete every key for a PR id not present in `valid_ids` (§4.13
    /// `clearOrphanedStates`).
    #[instrument(skip(self, valid_ids))]
    pub async fn clear_orphaned_states(&self, valid_ids: &HashSet<String>) -> Result<Vec<String>, StorageError> {
        let mut orphans = Vec::new();
        let all_hot = self.get_all_hot_states().await?;
        let cache_keys = self.store.scan_match("pr:*:cold_state").await?;
        let mut candidate_ids: HashSet<String> = all_hot.keys().cloned().collect();
        for key in &cache_keys {
            if let Some(id) = key.strip_prefix("pr:").and_then(|s| s.strip_suffix(":cold_state")) {
                candidate_ids.insert(id.to_string());
            }
        }
        for id in candidate_ids {
            if !valid_ids.contains(&id) {
                self.clear_hot_state(&id).await?;
                self.store.del(&[keys::pr_cold_state(&id), keys::pr_dependencies(&id)]).await?;
                orphans.push(id);
            }
        }
        Ok(orphans)
    }

    /// Scan `agent:*:heartbeat`, remove entries older than 5 min, and clear
    /// the hot state of whichever PR that agent was assigned (§4.13
    /// `clearExpiredHeartbeats`).
    #[instrument(skip(self))]
    pub async fn clear_expired_heartbeats(&self, now_ms: u64) -> Result<Vec<String>, StorageError> {
        const STALE_MS: u64 = 5 * 60 * 1000;
        let mut expired_agents = Vec::new();
        let keys = self.store.scan_match("agent:*:heartbeat").await?;
        for key in keys {
            let Some(value) = self.store.get(&key).await? else { continue };
            let Ok(last) = value.parse::<u64>() else { continue };
            if now_ms.saturating_sub(last) <= STALE_MS {
                continue;
            }
            let Some(agent_id) = key.strip_prefix("agent:").and_then(|s| s.strip_suffix(":heartbeat")) else { continue };
            self.store.del(&[key.clone()]).await?;
            // Clear the hot state of whichever PR this agent was assigned.
            let assigned_prs = self.store.scan_match("pr:*:agent").await?;
            for pr_agent_key in assigned_prs {
                if self.store.get(&pr_agent_key).await?.as_deref() == Some(agent_id) {
                    if let Some(pr_id) = pr_agent_key.strip_prefix("pr:").and_then(|s| s.strip_suffix(":agent")) {
                        self.clear_hot_state(pr_id).await?;
                    }
                }
            }
            expired_agents.push(agent_id.to_string());
        }
        Ok(expired_agents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_hotstore::fake::FakeHotStore;

    fn store() -> HotStoreOps {
        HotStoreOps::new(Arc::new(FakeHotStore::new()))
    }

    #[tokio::test]
    async fn write_then_clear_hot_state_round_trips() {
        let ops = store();
        ops.write_hot_state("PR-1", "in-progress", "agt-1", 1000).await.unwrap();
        assert_eq!(ops.read_hot_state("PR-1").await.unwrap(), Some("in-progress".to_string()));
        assert_eq!(ops.read_hot_agent("PR-1").await.unwrap(), Some("agt-1".to_string()));
        ops.clear_hot_state("PR-1").await.unwrap();
        assert_eq!(ops.read_hot_state("PR-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn get_all_hot_states_scans_every_pr() {
        let ops = store();
        ops.write_hot_state("PR-1", "planning", "agt-1", 0).await.unwrap();
        ops.write_hot_state("PR-2", "investigating", "agt-2", 0).await.unwrap();
        let all = ops.get_all_hot_states().await.unwrap();
        assert_eq!(all.get("PR-1").map(String::as_str), Some("planning"));
        assert_eq!(all.get("PR-2").map(String::as_str), Some("investigating"));
    }

    #[tokio::test]
    async fn clear_orphaned_states_removes_ids_outside_valid_set() {
        let ops = store();
        ops.update_cold_state_cache("PR-1", "ready").await.unwrap();
        ops.update_cold_state_cache("PR-2", "ready").await.unwrap();
        let valid = HashSet::from(["PR-1".to_string()]);
        let orphans = ops.clear_orphaned_states(&valid).await.unwrap();
        assert_eq!(orphans, vec!["PR-2".to_string()]);
        assert_eq!(ops.read_cold_state_cache("PR-2").await.unwrap(), None);
        assert_eq!(ops.read_cold_state_cache("PR-1").await.unwrap(), Some("ready".to_string()));
    }
}
