// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency graph (§4.7).
//!
//! A finite DAG over PR ids; edges mean "target depends on source". Nodes
//! are stored in a flat arena keyed by id rather than linked by pointer, so
//! the reverse-edge (dependents) cache can never create an ownership cycle
//! between a node and its dependents (§9).

use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("dependency cycle detected")]
    CyclesDetected,
}

/// The kind of work being scheduled, used by [`DependencyGraph::available_for_work`]
/// to additionally filter on cold_state (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkType {
    Planning,
    Implementation,
    Qc,
    Review,
}

#[derive(Debug, Clone)]
pub struct PrNode {
    pub id: String,
    pub cold_state: crate::pr::ColdState,
    pub dependencies: HashSet<String>,
    /// Reverse-edge cache, always consistent with `dependencies` across the
    /// whole population.
    pub dependents: HashSet<String>,
}

impl PrNode {
    pub fn new(id: impl Into<String>, cold_state: crate::pr::ColdState, dependencies: HashSet<String>) -> Self {
        Self { id: id.into(), cold_state, dependencies, dependents: HashSet::new() }
    }
}

#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: HashMap<String, PrNode>,
    completed: HashSet<String>,
    working: HashSet<String>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node, wiring forward edges from its `dependencies` and
    /// transactionally updating the dependents cache of existing nodes so
    /// the invariant holds after every mutation.
    pub fn add_node(&mut self, node: PrNode) {
        for dep in &node.dependencies {
            if let Some(dep_node) = self.nodes.get_mut(dep) {
                dep_node.dependents.insert(node.id.clone());
            }
        }
        self.nodes.insert(node.id.clone(), node);
    }

    /// Rebuild the reverse-edge cache from the current forward edges.
    fn consolidate_reverse_edges(&mut self) {
        for node in self.nodes.values_mut() {
            node.dependents.clear();
        }
        let forward: Vec<(String, HashSet<String>)> =
            self.nodes.values().map(|n| (n.id.clone(), n.dependencies.clone())).collect();
        for (id, deps) in forward {
            for dep in deps {
                if let Some(dep_node) = self.nodes.get_mut(&dep) {
                    dep_node.dependents.insert(id.clone());
                }
            }
        }
    }

    /// Clear, insert all nodes, consolidate reverse edges, then reject with
    /// [`GraphError::CyclesDetected`] if a DFS finds a back edge.
    pub fn build_from_task_list(&mut self, nodes: Vec<PrNode>) -> Result<(), GraphError> {
        self.nodes.clear();
        self.completed.clear();
        self.working.clear();
        for node in nodes {
            self.nodes.insert(node.id.clone(), node);
        }
        self.consolidate_reverse_edges();
        if self.has_cycle() {
            self.nodes.clear();
            return Err(GraphError::CyclesDetected);
        }
        Ok(())
    }

    fn has_cycle(&self) -> bool {
        #[derive(PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }
        let mut marks: HashMap<&str, Mark> = HashMap::new();

        fn visit<'a>(id: &'a str, nodes: &'a HashMap<String, PrNode>, marks: &mut HashMap<&'a str, Mark>) -> bool {
            match marks.get(id) {
                Some(Mark::Done) => return false,
                Some(Mark::Visiting) => return true,
                None => {}
            }
            marks.insert(id, Mark::Visiting);
            if let Some(node) = nodes.get(id) {
                for dep in &node.dependencies {
                    if visit(dep, nodes, marks) {
                        return true;
                    }
                }
            }
            marks.insert(id, Mark::Done);
            false
        }

        for id in self.nodes.keys() {
            if visit(id, &self.nodes, &mut marks) {
                return true;
            }
        }
        false
    }

    pub fn node(&self, id: &str) -> Option<&PrNode> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PrNode> {
        self.nodes.values()
    }

    /// A PR is available iff not completed/approved, not marked working,
    /// and all its dependencies are completed.
    pub fn get_available(&self) -> Vec<&PrNode> {
        self.nodes
            .values()
            .filter(|n| self.is_available(n))
            .collect()
    }

    fn is_available(&self, node: &PrNode) -> bool {
        use crate::pr::ColdState::*;
        if matches!(node.cold_state, Completed | Approved) {
            return false;
        }
        if self.working.contains(&node.id) {
            return false;
        }
        node.dependencies.iter().all(|d| self.completed.contains(d))
    }

    /// §4.7: additionally filters on cold_state appropriate for the work
    /// type; qc/review skip the dependency check entirely.
    pub fn get_available_for_work(&self, work_type: WorkType) -> Vec<&PrNode> {
        use crate::pr::ColdState::*;
        self.nodes
            .values()
            .filter(|n| {
                if self.working.contains(&n.id) {
                    return false;
                }
                match work_type {
                    WorkType::Planning => matches!(n.cold_state, New | Ready) && n.dependencies.iter().all(|d| self.completed.contains(d)),
                    WorkType::Implementation => matches!(n.cold_state, Planned) && n.dependencies.iter().all(|d| self.completed.contains(d)),
                    WorkType::Qc | WorkType::Review => matches!(n.cold_state, Completed),
                }
            })
            .collect()
    }

    pub fn mark_working(&mut self, id: &str) {
        self.working.insert(id.to_string());
    }

    pub fn mark_not_working(&mut self, id: &str) {
        self.working.remove(id);
    }

    /// Marking complete makes dependents eligible implicitly, since
    /// availability is always recomputed from `completed`.
    pub fn mark_complete(&mut self, id: &str) {
        self.completed.insert(id.to_string());
        self.working.remove(id);
    }

    pub fn mark_failed(&mut self, id: &str) {
        self.working.remove(id);
    }

    pub fn dependents_of(&self, id: &str) -> &HashSet<String> {
        static EMPTY: HashSet<String> = HashSet::new();
        self.nodes.get(id).map(|n| &n.dependents).unwrap_or(&EMPTY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pr::ColdState;
    use std::collections::HashSet;

    fn node(id: &str, state: ColdState, deps: &[&str]) -> PrNode {
        PrNode::new(id, state, deps.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn cycle_rejects_graph_load() {
        let mut g = DependencyGraph::new();
        let nodes = vec![
            node("PR-1", ColdState::Ready, &["PR-3"]),
            node("PR-2", ColdState::Ready, &["PR-1"]),
            node("PR-3", ColdState::Ready, &["PR-2"]),
        ];
        let err = g.build_from_task_list(nodes).unwrap_err();
        assert_eq!(err, GraphError::CyclesDetected);
        assert_eq!(g.nodes().count(), 0);
    }

    #[test]
    fn dependents_cache_is_consistent_after_load() {
        let mut g = DependencyGraph::new();
        g.build_from_task_list(vec![
            node("PR-1", ColdState::Ready, &[]),
            node("PR-2", ColdState::Ready, &["PR-1"]),
        ])
        .unwrap();
        assert!(g.dependents_of("PR-1").contains("PR-2"));
    }

    #[test]
    fn available_excludes_working_and_completed_and_unsatisfied_deps() {
        let mut g = DependencyGraph::new();
        g.build_from_task_list(vec![
            node("PR-1", ColdState::Ready, &[]),
            node("PR-2", ColdState::Ready, &["PR-1"]),
            node("PR-3", ColdState::Approved, &[]),
        ])
        .unwrap();
        let available: HashSet<&str> = g.get_available().iter().map(|n| n.id.as_str()).collect();
        assert!(available.contains("PR-1"));
        assert!(!available.contains("PR-2")); // PR-1 not completed yet
        assert!(!available.contains("PR-3")); // already approved

        g.mark_complete("PR-1");
        let available: HashSet<&str> = g.get_available().iter().map(|n| n.id.as_str()).collect();
        assert!(available.contains("PR-2"));
    }

    #[test]
    fn marking_complete_unblocks_dependents() {
        let mut g = DependencyGraph::new();
        g.build_from_task_list(vec![node("PR-1", ColdState::Ready, &[]), node("PR-2", ColdState::Ready, &["PR-1"])]).unwrap();
        g.mark_working("PR-2");
        assert!(g.get_available().iter().all(|n| n.id != "PR-2"));
        g.mark_complete("PR-1");
        g.mark_not_working("PR-2");
        assert!(g.get_available().iter().any(|n| n.id == "PR-2"));
    }

    #[test]
    fn review_work_type_skips_dependency_check() {
        let mut g = DependencyGraph::new();
        g.build_from_task_list(vec![
            node("PR-1", ColdState::Completed, &["PR-missing"]),
        ])
        .unwrap();
        let available = g.get_available_for_work(WorkType::Review);
        assert_eq!(available.len(), 1);
    }

    #[test]
    fn planning_work_type_filters_new_and_ready() {
        let mut g = DependencyGraph::new();
        g.build_from_task_list(vec![
            node("PR-1", ColdState::New, &[]),
            node("PR-2", ColdState::Planned, &[]),
        ])
        .unwrap();
        let available = g.get_available_for_work(WorkType::Planning);
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].id, "PR-1");
    }
}
