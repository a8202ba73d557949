// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The dispatch tick: the end-to-end data flow sketched in §2.
//!
//! Given the current population of PRs, this ties the dependency graph
//! (G), the MIS scheduler (I, which owns the conflict detector H
//! internally), the assignment manager (J), and the state machine (D) into
//! a single step: compute the eligible set, schedule a conflict-free
//! parallel batch, match it to idle agents, and transition each matched PR
//! into its active hot state. Everything else (leases, heartbeats, mode
//! management) is driven by the supervisor's other timers.

use crate::assignment::{AssignmentBatch, AssignmentManager};
use crate::registry::AgentRegistry;
use crate::scheduler::{Algorithm, Scheduler, SchedulerResult};
use crate::transitions::TransitionRunner;
use conclave_core::{AgentRecord, ColdState, DependencyGraph, HotState, Pr, PrNode, PrState, WorkType};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    pub scheduled: SchedulerResult,
    pub assignments: AssignmentBatch,
    /// PR ids successfully transitioned into their active hot state.
    pub transitioned: Vec<String>,
    /// PR id -> error message, for transitions that were matched but
    /// failed to apply (§7: surfaced, never silently dropped).
    pub transition_errors: Vec<(String, String)>,
}

/// The cold_state an assignment's entry hot state corresponds to (§4.4's
/// cold->hot edges, restricted to the ones `role_fits` in the assignment
/// manager actually produces): `new|ready -> investigating`,
/// `planned -> in-progress`, `completed -> under-review`.
fn entry_hot_state(cold_state: ColdState) -> Option<HotState> {
    match cold_state {
        ColdState::New | ColdState::Ready => Some(HotState::Investigating),
        ColdState::Planned => Some(HotState::InProgress),
        ColdState::Completed => Some(HotState::UnderReview),
        ColdState::Blocked | ColdState::Approved | ColdState::Broken => None,
    }
}

pub struct DispatchTick {
    scheduler: Arc<Scheduler>,
    assignment_manager: Arc<AssignmentManager>,
    registry: Arc<AgentRegistry>,
    transitions: Arc<TransitionRunner>,
}

impl DispatchTick {
    pub fn new(scheduler: Arc<Scheduler>, assignment_manager: Arc<AssignmentManager>, registry: Arc<AgentRegistry>, transitions: Arc<TransitionRunner>) -> Self {
        Self { scheduler, assignment_manager, registry, transitions }
    }

    /// Run one full dispatch cycle over the given PR population (§2's data
    /// flow from "graph (G) + conflicts (H)" through "transitions to an
    /// active hot state").
    #[instrument(skip(self, prs, assignment_counts, last_assigned_ms), fields(n_prs = prs.len()))]
    pub async fn run_once(
        &self,
        prs: &[Pr],
        work_type: WorkType,
        algorithm: Algorithm,
        assignment_counts: &HashMap<String, usize>,
        last_assigned_ms: &HashMap<String, u64>,
        now_ms: u64,
    ) -> Result<DispatchOutcome, crate::EngineError> {
        let mut graph = DependencyGraph::new();
        let nodes: Vec<PrNode> = prs
            .iter()
            .map(|p| PrNode::new(p.id.as_str(), p.cold_state, p.dependencies.iter().map(|id| id.as_str().to_string()).collect()))
            .collect();
        graph.build_from_task_list(nodes)?;

        let available_ids: std::collections::HashSet<&str> = graph.get_available_for_work(work_type).into_iter().map(|n| n.id.as_str()).collect();
        let by_id: HashMap<&str, &Pr> = prs.iter().map(|p| (p.id.as_str(), p)).collect();
        let eligible: Vec<&Pr> = available_ids.iter().filter_map(|id| by_id.get(id).copied()).collect();

        let scheduled = self.scheduler.schedule(&eligible, algorithm, now_ms);

        let selected: Vec<&Pr> = scheduled.selected_prs.iter().filter_map(|id| by_id.get(id.as_str()).copied()).collect();
        let pool: Vec<AgentRecord> = self.registry.agents();
        let assignments = self.assignment_manager.assign(&selected, &pool, assignment_counts, last_assigned_ms, now_ms);

        let mut transitioned = Vec::new();
        let mut transition_errors = Vec::new();

        for assignment in &assignments.assignments {
            let Some(pr) = by_id.get(assignment.pr_id.as_str()) else { continue };
            let Some(target) = entry_hot_state(pr.cold_state) else {
                warn!(pr_id = %assignment.pr_id, cold_state = %pr.cold_state, "scheduler selected a PR with no entry hot state");
                continue;
            };
            match self
                .transitions
                .apply(&assignment.pr_id, PrState::Cold(pr.cold_state), PrState::Hot(target), Some(assignment.agent_id.clone()), None, now_ms)
                .await
            {
                Ok(outcome) if outcome.success => {
                    self.registry.assign(&assignment.agent_id, &assignment.pr_id);
                    transitioned.push(assignment.pr_id.clone());
                }
                Ok(outcome) => {
                    transition_errors.push((assignment.pr_id.clone(), format!("transition did not succeed: {:?}", outcome.new_state)));
                }
                Err(e) => {
                    transition_errors.push((assignment.pr_id.clone(), e.to_string()));
                }
            }
        }

        info!(selected = scheduled.selected_prs.len(), assigned = assignments.assignments.len(), transitioned = transitioned.len(), "dispatch tick complete");

        Ok(DispatchOutcome { scheduled, assignments, transitioned, transition_errors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AssignmentConfig, SchedulerConfig};
    use crate::events::EventSink;
    use conclave_core::{AgentId, AgentRole, Complexity, FileAction, FileEntry, PrId, Priority};
    use conclave_hotstore::fake::FakeHotStore;
    use conclave_storage::ColdStore;

    fn pr(id: &str, cold_state: ColdState, files: &[&str]) -> Pr {
        let mut p = Pr::new(
            PrId::from_string(id),
            id,
            Priority::Medium,
            Complexity { score: 2, estimated_minutes: 20, suggested_model: "default".to_string(), rationale: String::new() },
        );
        p.cold_state = cold_state;
        p.estimated_files = files.iter().map(|f| FileEntry { path: f.to_string(), action: FileAction::Modify, description: String::new() }).collect();
        p
    }

    fn init_repo(dir: &std::path::Path, body: &str) {
        std::fs::create_dir_all(dir.join("docs")).unwrap();
        std::fs::write(dir.join("docs/task-list.md"), body).unwrap();
        for args in [vec!["init"], vec!["config", "user.email", "t@example.com"], vec!["config", "user.name", "t"], vec!["add", "."], vec!["commit", "-m", "init"]] {
            std::process::Command::new("git").args(&args).current_dir(dir).output().unwrap();
        }
    }

    #[tokio::test]
    async fn dispatches_an_eligible_pr_to_an_idle_agent() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(
            dir.path(),
            "# Task List\n\n---\npr_id = \"PR-001\"\ntitle = \"Widget\"\ncold_state = \"ready\"\npriority = \"medium\"\ndependencies = []\n\n[complexity]\nscore = 2\nestimated_minutes = 20\nsuggested_model = \"default\"\nrationale = \"\"\n---\n",
        );

        let store: Arc<dyn conclave_hotstore::HotStore> = Arc::new(FakeHotStore::new());
        let events = Arc::new(EventSink::new(store.clone()));
        let lease_manager = Arc::new(crate::lease::LeaseManager::new(
            store.clone(),
            events.clone(),
            crate::config::LeaseConfig::default(),
            crate::config::PairedLockingConfig { enabled: false, ..crate::config::PairedLockingConfig::default() },
            None,
        ));
        let registry = Arc::new(AgentRegistry::new(store.clone(), events.clone(), lease_manager, crate::config::HeartbeatConfig::default()));
        registry.register(AgentId::from_string("agt-1"), AgentRole::Planning, 1, 0).await.unwrap();

        let scheduler = Arc::new(Scheduler::new(SchedulerConfig::default()));
        let assignment_manager = Arc::new(AssignmentManager::new(AssignmentConfig::default()));
        let cold = Arc::new(ColdStore::new("docs/task-list.md", dir.path().to_path_buf()));
        let transitions = Arc::new(TransitionRunner::new(cold, events));
        let tick = DispatchTick::new(scheduler, assignment_manager, registry, transitions);

        let prs = vec![pr("PR-001", ColdState::Ready, &["src/a.rs"])];
        let outcome = tick.run_once(&prs, WorkType::Planning, Algorithm::GreedyOrdered, &HashMap::new(), &HashMap::new(), 0).await.unwrap();

        assert_eq!(outcome.scheduled.selected_prs, vec!["PR-001".to_string()]);
        assert_eq!(outcome.transitioned, vec!["PR-001".to_string()]);
        assert!(outcome.transition_errors.is_empty());
    }

    #[tokio::test]
    async fn a_dependency_cycle_aborts_the_tick() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path(), "# Task List\n");
        let store: Arc<dyn conclave_hotstore::HotStore> = Arc::new(FakeHotStore::new());
        let events = Arc::new(EventSink::new(store.clone()));
        let lease_manager = Arc::new(crate::lease::LeaseManager::new(
            store.clone(),
            events.clone(),
            crate::config::LeaseConfig::default(),
            crate::config::PairedLockingConfig { enabled: false, ..crate::config::PairedLockingConfig::default() },
            None,
        ));
        let registry = Arc::new(AgentRegistry::new(store.clone(), events.clone(), lease_manager, crate::config::HeartbeatConfig::default()));
        let scheduler = Arc::new(Scheduler::new(SchedulerConfig::default()));
        let assignment_manager = Arc::new(AssignmentManager::new(AssignmentConfig::default()));
        let cold = Arc::new(ColdStore::new("docs/task-list.md", dir.path().to_path_buf()));
        let transitions = Arc::new(TransitionRunner::new(cold, events));
        let tick = DispatchTick::new(scheduler, assignment_manager, registry, transitions);

        let mut a = pr("PR-A", ColdState::Ready, &[]);
        a.dependencies.insert(PrId::from_string("PR-B"));
        let mut b = pr("PR-B", ColdState::Ready, &[]);
        b.dependencies.insert(PrId::from_string("PR-A"));

        let err = tick.run_once(&[a, b], WorkType::Planning, Algorithm::GreedyOrdered, &HashMap::new(), &HashMap::new(), 0).await.unwrap_err();
        assert!(matches!(err, crate::EngineError::Graph(conclave_core::GraphError::CyclesDetected)));
    }
}
