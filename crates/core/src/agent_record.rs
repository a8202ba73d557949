// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent record — the data model for a registered worker process (§3 "Agent record", §4.16).
//!
//! Agent records live in the hot store and are recreated by the registry on
//! restart; this module only defines the shape, not the storage.

use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Unique identifier for a registered agent process.
    pub struct AgentId("agt-");
}

/// The role an agent plays, used to filter which PRs it is eligible for
/// (§4.7 `getAvailableForWork`, §4.10 assignment eligibility).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Planning,
    Worker,
    Qc,
    Review,
}

crate::simple_display! {
    AgentRole {
        Planning => "planning",
        Worker => "worker",
        Qc => "qc",
        Review => "review",
    }
}

/// Lifecycle status of a registered agent (§4.16).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Working,
    Crashed,
}

crate::simple_display! {
    AgentStatus {
        Idle => "idle",
        Working => "working",
        Crashed => "crashed",
    }
}

/// A registered agent worker process.
///
/// Created on registration, marked [`AgentStatus::Crashed`] after
/// `heartbeat_timeout` elapses without a heartbeat, removed on explicit
/// deregistration or after its work is reclaimed (§4.16).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: AgentId,
    pub role: AgentRole,
    pub status: AgentStatus,
    pub last_heartbeat_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_pr: Option<String>,
    pub pid: u32,
    pub started_at_ms: u64,
}

impl AgentRecord {
    pub fn new(agent_id: AgentId, role: AgentRole, pid: u32, now_ms: u64) -> Self {
        Self {
            agent_id,
            role,
            status: AgentStatus::Idle,
            last_heartbeat_ms: now_ms,
            assigned_pr: None,
            pid,
            started_at_ms: now_ms,
        }
    }

    /// Has this agent missed its heartbeat deadline?
    pub fn is_crashed(&self, now_ms: u64, heartbeat_timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_heartbeat_ms) > heartbeat_timeout_ms
    }
}

impl fmt::Display for AgentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.agent_id, self.role, self.status)
    }
}

#[cfg(test)]
#[path = "agent_record_tests.rs"]
mod tests;
