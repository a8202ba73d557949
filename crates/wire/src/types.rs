// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! DTOs shared by the daemon and CLI (§6 "CLI surface", `status --json`).
//!
//! These mirror the in-process types in `conclave-core`/`conclave-engine`
//! but are kept separate and always-serializable, so the wire format
//! doesn't accidentally couple to engine internals.

use serde::{Deserialize, Serialize};

/// `status`'s full structured report (§6: "prints mode, agent count,
/// available PRs, last sync times"), extended per the supplemented
/// `--json`/`--verbose` surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusReport {
    pub mode: String,
    pub agent_count: usize,
    pub available_pr_count: usize,
    pub last_display_sync_ms: Option<u64>,
    pub last_reconcile_ms: Option<u64>,
    pub sync_count: u64,
    pub reconcile_count: u64,
    pub error_count: u64,
    pub uptime_secs: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agents: Vec<AgentSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_prs: Vec<PrSummary>,
    /// Only populated for `status --verbose`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_event_failures: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSummary {
    pub agent_id: String,
    pub role: String,
    pub status: String,
    pub assigned_pr: Option<String>,
    pub last_heartbeat_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrSummary {
    pub pr_id: String,
    pub title: String,
    pub cold_state: String,
    pub hot_state: Option<String>,
    pub priority: String,
}
