// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration (§6 "Configuration knobs"). Loaded from a single
//! TOML file with `serde` + `toml`. Unknown keys are rejected outright.

use crate::scheduler::Algorithm;
use conclave_core::PairedPattern;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    pub redis: RedisConfig,
    pub lease: LeaseConfig,
    pub paired_locking: PairedLockingConfig,
    pub heartbeat: HeartbeatConfig,
    pub shutdown: ShutdownConfig,
    pub scheduler: SchedulerConfig,
    pub assignment: AssignmentConfig,
    pub coordination: CoordinationConfig,
    pub health: HealthConfig,
    pub sync: SyncConfig,
    pub dispatch: DispatchConfig,
    /// Path to the canonical task-list document, relative to `repo_root`
    /// unless absolute (§6: "default: docs/task-list.md").
    pub document_path: PathBuf,
    /// Root of the git repository the document and its commits live in.
    pub repo_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis: RedisConfig::default(),
            lease: LeaseConfig::default(),
            paired_locking: PairedLockingConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            shutdown: ShutdownConfig::default(),
            scheduler: SchedulerConfig::default(),
            assignment: AssignmentConfig::default(),
            coordination: CoordinationConfig::default(),
            health: HealthConfig::default(),
            sync: SyncConfig::default(),
            dispatch: DispatchConfig::default(),
            document_path: PathBuf::from("docs/task-list.md"),
            repo_root: PathBuf::from("."),
        }
    }
}

impl Config {
    pub fn load(path: &std::path::Path) -> Result<Self, crate::EngineError> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| crate::EngineError::Config(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub factor: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 5, initial_delay_ms: 100, max_delay_ms: 5_000, factor: 2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct RedisConfig {
    pub url: String,
    pub connect_timeout_ms: u64,
    pub retry: RetryConfig,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self { url: "redis://127.0.0.1:6379".to_string(), connect_timeout_ms: 2_000, retry: RetryConfig::default() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct LeaseConfig {
    pub default_ttl_secs: u64,
    pub heartbeat_interval_ms: u64,
    pub grace_period_secs: u64,
    pub track_sets: bool,
    pub max_files_per_request: usize,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self { default_ttl_secs: 300, heartbeat_interval_ms: 30_000, grace_period_secs: 30, track_sets: true, max_files_per_request: 50 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct PairedLockingConfig {
    pub enabled: bool,
    pub patterns: Vec<PairedPattern>,
    pub check_exists: bool,
    pub require_tests: bool,
}

impl Default for PairedLockingConfig {
    fn default() -> Self {
        Self { enabled: true, patterns: conclave_core::default_patterns(), check_exists: true, require_tests: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct HeartbeatConfig {
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { interval_ms: 30_000, timeout_ms: 120_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct ShutdownConfig {
    pub timeout_ms: u64,
    pub graceful: bool,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { timeout_ms: 10_000, graceful: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct SchedulerConfig {
    pub max_scheduling_time_ms: u64,
    pub enable_caching: bool,
    pub cache_ttl_ms: u64,
    pub use_priority: bool,
    pub use_complexity: bool,
    pub max_parallel_prs: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { max_scheduling_time_ms: 100, enable_caching: true, cache_ttl_ms: 5_000, use_priority: true, use_complexity: true, max_parallel_prs: 5 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStrategy {
    FirstAvailable,
    LoadBalanced,
    CapabilityMatched,
    RoundRobin,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct AssignmentConfig {
    pub strategy: AssignmentStrategy,
    pub use_specialization: bool,
    pub max_assignments_per_agent: usize,
    pub min_assignment_interval_ms: u64,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self { strategy: AssignmentStrategy::CapabilityMatched, use_specialization: true, max_assignments_per_agent: 3, min_assignment_interval_ms: 5_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct CoordinationConfig {
    pub mode_check_interval_ms: u64,
    pub transition_cooldown_ms: u64,
    pub isolated_state_dir: PathBuf,
    pub auto_reconcile: bool,
    pub health_degradation_threshold: u32,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            mode_check_interval_ms: 10_000,
            transition_cooldown_ms: 5_000,
            isolated_state_dir: PathBuf::from(".conclave/isolated"),
            auto_reconcile: true,
            health_degradation_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct HealthConfig {
    pub interval_ms: u64,
    pub timeout_ms: u64,
    pub failure_threshold: u32,
    pub degraded_latency_threshold_ms: u64,
    pub auto_reconnect: bool,
    pub reconnect_delay_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { interval_ms: 10_000, timeout_ms: 2_000, failure_threshold: 3, degraded_latency_threshold_ms: 200, auto_reconnect: true, reconnect_delay_ms: 1_000 }
    }
}

impl HealthConfig {
    pub fn to_monitor_config(&self) -> conclave_hotstore::health::HealthConfig {
        conclave_hotstore::health::HealthConfig {
            interval: std::time::Duration::from_millis(self.interval_ms),
            timeout: std::time::Duration::from_millis(self.timeout_ms),
            failure_threshold: self.failure_threshold,
            degraded_latency_threshold: std::time::Duration::from_millis(self.degraded_latency_threshold_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct SyncConfig {
    pub display_sync_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { display_sync_interval_ms: 30_000 }
    }
}

/// Drives the dispatch tick (§2's G+H+I+J+D data flow), run once per
/// `interval_ms` across every [`conclave_core::WorkType`] in turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct DispatchConfig {
    pub interval_ms: u64,
    pub algorithm: Algorithm,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { interval_ms: 2_000, algorithm: Algorithm::GreedyOrdered }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let reparsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(config, reparsed);
    }

    #[test]
    fn unknown_top_level_key_is_rejected() {
        let text = format!("{}\nbogus = true\n", toml::to_string_pretty(&Config::default()).unwrap());
        let err = toml::from_str::<Config>(&text).unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn sync_display_interval_defaults_to_30s() {
        assert_eq!(SyncConfig::default().display_sync_interval_ms, 30_000);
    }
}
