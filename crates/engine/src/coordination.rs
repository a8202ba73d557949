// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordination-mode manager (§4.11, component K): DISTRIBUTED / DEGRADED /
//! ISOLATED, with cooldown-gated transitions and edge-specific snapshot /
//! rehydrate / notify actions.

use crate::config::CoordinationConfig;
use crate::events::EventSink;
use conclave_core::Event;
use conclave_hotstore::{keys, ConnectionState, Health, HotStore};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Distributed,
    Degraded,
    Isolated,
}

conclave_core::simple_display! {
    Mode {
        Distributed => "distributed",
        Degraded => "degraded",
        Isolated => "isolated",
    }
}

#[derive(Debug, Clone)]
pub struct ModeTransition {
    pub from: Mode,
    pub to: Mode,
    pub reason: String,
    pub at_ms: u64,
}

/// §6's `coordination:mode_change` pub/sub payload shape, published (or
/// written to the isolated-mode fallback file) on every mode switch.
#[derive(Debug, Serialize, Deserialize)]
struct ModeChangeNotification {
    action: String,
    #[serde(rename = "newMode")]
    new_mode: Mode,
    timestamp: u64,
}

const HISTORY_CAPACITY: usize = 50;

#[derive(Debug, Serialize, Deserialize)]
enum SnapshotValue {
    String(String),
    Set(Vec<String>),
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    taken_at_ms: u64,
    entries: HashMap<String, SnapshotValue>,
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    #[error("mode transition cooldown not yet elapsed ({remaining_ms}ms remaining)")]
    Cooldown { remaining_ms: u64 },
    #[error(transparent)]
    HotStore(#[from] conclave_hotstore::HotStoreError),
    #[error("isolated snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("isolated snapshot (de)serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

struct State {
    mode: Mode,
    last_transition_ms: u64,
    consecutive_health_failures: u32,
    history: VecDeque<ModeTransition>,
}

/// Coordination-mode manager (§4.11).
pub struct ModeManager {
    store: Arc<dyn HotStore>,
    events: Arc<EventSink>,
    config: CoordinationConfig,
    state: Mutex<State>,
}

impl ModeManager {
    pub fn new(store: Arc<dyn HotStore>, events: Arc<EventSink>, config: CoordinationConfig, now_ms: u64) -> Self {
        Self {
            store,
            events,
            config,
            state: Mutex::new(State { mode: Mode::Distributed, last_transition_ms: now_ms, consecutive_health_failures: 0, history: VecDeque::with_capacity(HISTORY_CAPACITY) }),
        }
    }

    pub fn current(&self) -> Mode {
        self.state.lock().mode
    }

    pub fn history(&self) -> Vec<ModeTransition> {
        self.state.lock().history.iter().cloned().collect()
    }

    /// §4.11: probe connection + health to classify the mode that fits
    /// current conditions, independent of whether we've switched to it yet.
    pub fn detect_mode(&self, connection_state: ConnectionState, health: Health, local_hotstore_reachable: bool) -> Mode {
        if connection_state == ConnectionState::Connected && health == Health::Healthy {
            Mode::Distributed
        } else if local_hotstore_reachable {
            Mode::Degraded
        } else {
            Mode::Isolated
        }
    }

    /// Periodic tick (§4.11): automatic promotion only on a healthy tick,
    /// automatic demotion after `health_degradation_threshold` consecutive
    /// non-healthy ticks.
    pub async fn tick(&self, connection_state: ConnectionState, health: Health, local_hotstore_reachable: bool, now_ms: u64) -> Result<(), CoordinationError> {
        let detected = self.detect_mode(connection_state, health, local_hotstore_reachable);
        let current = self.current();

        if health == Health::Healthy {
            self.state.lock().consecutive_health_failures = 0;
            if detected != current && promotion_rank(detected) > promotion_rank(current) {
                return self.switch_mode(detected, "automatic promotion on healthy tick", now_ms).await;
            }
            return Ok(());
        }

        let failures = {
            let mut s = self.state.lock();
            s.consecutive_health_failures += 1;
            s.consecutive_health_failures
        };
        if failures >= self.config.health_degradation_threshold && detected != current {
            return self.switch_mode(detected, format!("automatic demotion after {failures} non-healthy ticks"), now_ms).await;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, reason), fields(reason = %reason.as_ref()))]
    pub async fn switch_mode(&self, to: Mode, reason: impl AsRef<str>, now_ms: u64) -> Result<(), CoordinationError> {
        let reason = reason.as_ref().to_string();
        let from = {
            let state = self.state.lock();
            if now_ms.saturating_sub(state.last_transition_ms) < self.config.transition_cooldown_ms && state.mode != to {
                return Err(CoordinationError::Cooldown { remaining_ms: self.config.transition_cooldown_ms - now_ms.saturating_sub(state.last_transition_ms) });
            }
            state.mode
        };
        if from == to {
            return Ok(());
        }

        info!(%from, %to, %reason, "mode transition started");
        let result = self.edge_action(from, to).await;

        match result {
            Ok(()) => {
                let mut state = self.state.lock();
                state.mode = to;
                state.last_transition_ms = now_ms;
                if state.history.len() == HISTORY_CAPACITY {
                    state.history.pop_front();
                }
                state.history.push_back(ModeTransition { from, to, reason: reason.clone(), at_ms: now_ms });
                drop(state);

                self.notify(from, to, now_ms).await;
                self.events.emit(Event::ModeChanged { from: from.to_string(), to: to.to_string(), reason, at_ms: now_ms }, now_ms).await;
                info!(%from, %to, "mode transition complete");
                Ok(())
            }
            Err(e) => {
                error!(%from, %to, error = %e, "mode transition failed");
                Err(e)
            }
        }
    }

    async fn edge_action(&self, from: Mode, to: Mode) -> Result<(), CoordinationError> {
        use Mode::*;
        match (from, to) {
            (Distributed, Degraded) | (Degraded, Distributed) => Ok(()),
            (Degraded, Isolated) | (Distributed, Isolated) => self.snapshot_to_file().await,
            (Isolated, Degraded) | (Isolated, Distributed) => self.rehydrate_from_file().await,
            _ => Ok(()),
        }
    }

    async fn notify(&self, from: Mode, to: Mode, now_ms: u64) {
        let action = match (from, to) {
            (Mode::Distributed, Mode::Degraded) => "SWITCH_TO_BRANCHES",
            (Mode::Degraded, Mode::Distributed) => "MERGE_TO_MAIN",
            (Mode::Degraded, Mode::Isolated) | (Mode::Distributed, Mode::Isolated) => "WORK_ISOLATED",
            (Mode::Isolated, Mode::Degraded) | (Mode::Isolated, Mode::Distributed) => "RESUME",
            _ => return,
        };
        let payload = ModeChangeNotification { action: action.to_string(), new_mode: to, timestamp: now_ms };
        let Ok(message) = serde_json::to_string(&payload) else {
            warn!(action, "failed to serialize mode-change notification payload");
            return;
        };
        if self.store.publish(keys::COORDINATION_MODE_CHANGE_CHANNEL, &message).await.is_err() {
            warn!(action, "mode-change pub/sub unavailable, falling back to isolated notification file");
            let _ = self.write_notification_file(&message).await;
        }
    }

    async fn write_notification_file(&self, message: &str) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.config.isolated_state_dir).await?;
        tokio::fs::write(self.config.isolated_state_dir.join("notification.txt"), message).await
    }

    async fn snapshot_to_file(&self) -> Result<(), CoordinationError> {
        let mut entries = HashMap::new();
        for pattern in ["pr:*:cold_state", "pr:*:hot_state", "pr:*:agent", "agent:*:heartbeat"] {
            for key in self.store.scan_match(pattern).await? {
                if let Some(value) = self.store.get(&key).await? {
                    entries.insert(key, SnapshotValue::String(value));
                }
            }
        }
        for pattern in ["agent:*:leases", "lease:pr:*"] {
            for key in self.store.scan_match(pattern).await? {
                let members = self.store.smembers(&key).await?;
                if !members.is_empty() {
                    entries.insert(key, SnapshotValue::Set(members.into_iter().collect()));
                }
            }
        }

        let snapshot = Snapshot { taken_at_ms: 0, entries };
        tokio::fs::create_dir_all(&self.config.isolated_state_dir).await?;
        let path = self.config.isolated_state_dir.join("snapshot.json");
        tokio::fs::write(path, serde_json::to_vec_pretty(&snapshot)?).await?;
        Ok(())
    }

    async fn rehydrate_from_file(&self) -> Result<(), CoordinationError> {
        let path = self.config.isolated_state_dir.join("snapshot.json");
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("no isolated snapshot found to rehydrate from");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let snapshot: Snapshot = serde_json::from_slice(&raw)?;
        for (key, value) in snapshot.entries {
            match value {
                SnapshotValue::String(v) => self.store.set(&key, &v, None).await?,
                SnapshotValue::Set(members) => {
                    for member in members {
                        self.store.sadd(&key, &member).await?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn promotion_rank(mode: Mode) -> u8 {
    match mode {
        Mode::Isolated => 0,
        Mode::Degraded => 1,
        Mode::Distributed => 2,
    }
}
