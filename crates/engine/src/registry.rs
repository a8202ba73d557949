// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent registry + heartbeat monitor (§4.16, component P): registration,
//! heartbeat handling, crash detection, and lease reclamation on crash.

use crate::config::HeartbeatConfig;
use crate::events::EventSink;
use crate::lease::LeaseManager;
use conclave_core::{AgentId, AgentRecord, AgentRole, AgentStatus, Event};
use conclave_hotstore::{keys, HotStore};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Agent registry (§4.16). Keeps an in-memory mirror of every `agent:<id>`
/// hash so crash-scanning doesn't require a full `hgetall` round trip per
/// tick; the hot store remains the durable record.
pub struct AgentRegistry {
    store: Arc<dyn HotStore>,
    events: Arc<EventSink>,
    lease_manager: Arc<LeaseManager>,
    config: HeartbeatConfig,
    agents: RwLock<HashMap<String, AgentRecord>>,
}

impl AgentRegistry {
    pub fn new(store: Arc<dyn HotStore>, events: Arc<EventSink>, lease_manager: Arc<LeaseManager>, config: HeartbeatConfig) -> Self {
        Self { store, events, lease_manager, config, agents: RwLock::new(HashMap::new()) }
    }

    #[instrument(skip(self), fields(agent_id = %agent_id, role = %role))]
    pub async fn register(&self, agent_id: AgentId, role: AgentRole, pid: u32, now_ms: u64) -> Result<(), conclave_hotstore::HotStoreError> {
        let record = AgentRecord::new(agent_id, role, pid, now_ms);
        self.persist(&record).await?;
        self.agents.write().insert(record.agent_id.as_str().to_string(), record);
        info!("agent registered");
        Ok(())
    }

    pub async fn deregister(&self, agent_id: &str) -> Result<(), conclave_hotstore::HotStoreError> {
        self.store.del(&[keys::agent(agent_id)]).await?;
        self.agents.write().remove(agent_id);
        Ok(())
    }

    async fn persist(&self, record: &AgentRecord) -> Result<(), conclave_hotstore::HotStoreError> {
        let fields = vec![
            ("role".to_string(), record.role.to_string()),
            ("status".to_string(), record.status.to_string()),
            ("last_heartbeat_ms".to_string(), record.last_heartbeat_ms.to_string()),
            ("pid".to_string(), record.pid.to_string()),
            ("started_at_ms".to_string(), record.started_at_ms.to_string()),
        ];
        self.store.hset_all(&keys::agent(record.agent_id.as_str()), &fields).await
    }

    /// `handleHeartbeat` (§4.16): revives a crashed agent to active and
    /// refreshes its heartbeat timestamp.
    #[instrument(skip(self), fields(agent_id))]
    pub async fn handle_heartbeat(&self, agent_id: &str, now_ms: u64) -> Result<(), conclave_hotstore::HotStoreError> {
        let mut agents = self.agents.write();
        let Some(record) = agents.get_mut(agent_id) else {
            warn!(agent_id, "heartbeat for an unregistered agent");
            return Ok(());
        };
        let was_crashed = record.status == AgentStatus::Crashed;
        record.last_heartbeat_ms = now_ms;
        if was_crashed {
            record.status = AgentStatus::Idle;
            info!(agent_id, "agent revived from crashed state");
        }
        let record = record.clone();
        drop(agents);
        self.persist(&record).await
    }

    pub fn assign(&self, agent_id: &str, pr_id: &str) {
        if let Some(record) = self.agents.write().get_mut(agent_id) {
            record.status = AgentStatus::Working;
            record.assigned_pr = Some(pr_id.to_string());
        }
    }

    pub fn unassign(&self, agent_id: &str) {
        if let Some(record) = self.agents.write().get_mut(agent_id) {
            record.status = AgentStatus::Idle;
            record.assigned_pr = None;
        }
    }

    pub fn agents(&self) -> Vec<AgentRecord> {
        self.agents.read().values().cloned().collect()
    }

    /// `checkForCrashedAgents` (§4.16): scans for stale heartbeats, marks
    /// them crashed, reclaims their leases (F), and emits `agent-crashed`.
    #[instrument(skip(self))]
    pub async fn check_for_crashed_agents(&self, now_ms: u64) -> Vec<String> {
        let crashed: Vec<AgentRecord> = {
            let agents = self.agents.read();
            agents.values().filter(|a| a.status != AgentStatus::Crashed && a.is_crashed(now_ms, self.config.timeout_ms)).cloned().collect()
        };

        let mut crashed_ids = Vec::new();
        for mut record in crashed {
            warn!(agent_id = %record.agent_id, "agent crashed: heartbeat timeout exceeded");
            record.status = AgentStatus::Crashed;
            if let Some(pr_id) = &record.assigned_pr {
                let _ = self.lease_manager.release(None, record.agent_id.as_str(), now_ms).await;
                info!(agent_id = %record.agent_id, pr_id, "reclaimed leases from crashed agent");
            }
            let _ = self.persist(&record).await;
            self.agents.write().insert(record.agent_id.as_str().to_string(), record.clone());
            self.events.emit(Event::AgentCrashed { agent_id: record.agent_id.as_str().to_string() }, now_ms).await;
            crashed_ids.push(record.agent_id.as_str().to_string());
        }
        crashed_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LeaseConfig, PairedLockingConfig};
    use conclave_hotstore::fake::FakeHotStore;

    fn registry() -> AgentRegistry {
        let store: Arc<dyn HotStore> = Arc::new(FakeHotStore::new());
        let events = Arc::new(EventSink::new(store.clone()));
        let lease_manager = Arc::new(LeaseManager::new(store.clone(), events.clone(), LeaseConfig::default(), PairedLockingConfig { enabled: false, ..PairedLockingConfig::default() }, None));
        AgentRegistry::new(store, events, lease_manager, HeartbeatConfig { interval_ms: 1000, timeout_ms: 5000 })
    }

    #[tokio::test]
    async fn register_then_heartbeat_updates_last_seen() {
        let registry = registry();
        registry.register(AgentId::from_string("agt-1"), AgentRole::Worker, 1, 0).await.unwrap();
        registry.handle_heartbeat("agt-1", 1000).await.unwrap();
        let agent = registry.agents().into_iter().find(|a| a.agent_id.as_str() == "agt-1").unwrap();
        assert_eq!(agent.last_heartbeat_ms, 1000);
    }

    #[tokio::test]
    async fn stale_heartbeat_marks_agent_crashed_and_emits_event() {
        let registry = registry();
        registry.register(AgentId::from_string("agt-1"), AgentRole::Worker, 1, 0).await.unwrap();
        let crashed = registry.check_for_crashed_agents(10_000).await;
        assert_eq!(crashed, vec!["agt-1".to_string()]);
        let agent = registry.agents().into_iter().find(|a| a.agent_id.as_str() == "agt-1").unwrap();
        assert_eq!(agent.status, AgentStatus::Crashed);
    }

    #[tokio::test]
    async fn heartbeat_revives_a_crashed_agent() {
        let registry = registry();
        registry.register(AgentId::from_string("agt-1"), AgentRole::Worker, 1, 0).await.unwrap();
        registry.check_for_crashed_agents(10_000).await;
        registry.handle_heartbeat("agt-1", 11_000).await.unwrap();
        let agent = registry.agents().into_iter().find(|a| a.agent_id.as_str() == "agt-1").unwrap();
        assert_eq!(agent.status, AgentStatus::Idle);
    }
}
