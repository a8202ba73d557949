// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Assembles [`conclave_wire::StatusReport`] from live supervisor state
//! (§6 "status", with `--json`/`--verbose` output modes).

use conclave_core::{DependencyGraph, PrNode, WorkType};
use conclave_engine::Supervisor;
use conclave_wire::{AgentSummary, PrSummary, StatusReport};
use std::collections::HashSet;

pub async fn build(supervisor: &Supervisor, verbose: bool, uptime_secs: u64) -> StatusReport {
    let counters = supervisor.sync_coordinator.counters();
    let agents = supervisor.registry.agents();

    let (available_pr_count, available_prs) = match available_prs(supervisor).await {
        Ok(prs) => (prs.len(), prs),
        Err(_) => (0, Vec::new()),
    };

    StatusReport {
        mode: supervisor.mode_manager.current().to_string(),
        agent_count: agents.len(),
        available_pr_count,
        last_display_sync_ms: counters.last_display_sync_ms,
        last_reconcile_ms: counters.last_reconcile_ms,
        sync_count: counters.sync_count,
        reconcile_count: counters.reconciliation_count,
        error_count: counters.error_count,
        uptime_secs,
        agents: if verbose { agents.iter().map(agent_summary).collect() } else { Vec::new() },
        available_prs: if verbose { available_prs } else { Vec::new() },
        recent_event_failures: if verbose {
            supervisor.events.recent_failures().iter().map(|f| format!("{} ({}) at {}", f.event_name, f.reason, f.at_ms)).collect()
        } else {
            Vec::new()
        },
    }
}

fn agent_summary(agent: &conclave_core::AgentRecord) -> AgentSummary {
    AgentSummary {
        agent_id: agent.agent_id.as_str().to_string(),
        role: agent.role.to_string(),
        status: agent.status.to_string(),
        assigned_pr: agent.assigned_pr.clone(),
        last_heartbeat_ms: Some(agent.last_heartbeat_ms),
    }
}

async fn available_prs(supervisor: &Supervisor) -> Result<Vec<PrSummary>, conclave_storage::StorageError> {
    let doc = supervisor.cold.load_task_list().await?;

    let mut graph = DependencyGraph::new();
    let nodes: Vec<PrNode> = doc.prs.iter().map(|fm| PrNode::new(fm.pr_id.clone(), fm.cold_state, fm.dependencies.iter().cloned().collect())).collect();
    if graph.build_from_task_list(nodes).is_err() {
        return Ok(Vec::new());
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for work_type in [WorkType::Planning, WorkType::Implementation, WorkType::Qc, WorkType::Review] {
        for node in graph.get_available_for_work(work_type) {
            if !seen.insert(node.id.clone()) {
                continue;
            }
            if let Some(fm) = doc.pr(&node.id) {
                out.push(PrSummary {
                    pr_id: fm.pr_id.clone(),
                    title: fm.title.clone(),
                    cold_state: fm.cold_state.to_string(),
                    hot_state: None,
                    priority: fm.priority.to_string(),
                });
            }
        }
    }
    Ok(out)
}
