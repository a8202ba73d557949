// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Assignment manager (§4.10, component J): maps scheduler output to
//! eligible agents under one of four strategies.

use crate::config::{AssignmentConfig, AssignmentStrategy};
use conclave_core::{AgentId, AgentRecord, AgentRole, AgentStatus, ColdState, Pr, Priority};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{info, instrument};

/// Per-agent capability profile (§4.10), defaulted by role and
/// overridable per agent.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityProfile {
    pub max_complexity: u8,
    pub preferred_model: String,
    pub avg_minutes_per_complexity_point: f64,
    pub success_rate: f64,
    pub specialization_bonus: f64,
}

impl CapabilityProfile {
    pub fn default_for_role(role: AgentRole) -> Self {
        match role {
            AgentRole::Planning => Self { max_complexity: 10, preferred_model: "default".to_string(), avg_minutes_per_complexity_point: 5.0, success_rate: 0.9, specialization_bonus: 0.0 },
            AgentRole::Worker => Self { max_complexity: 8, preferred_model: "default".to_string(), avg_minutes_per_complexity_point: 15.0, success_rate: 0.85, specialization_bonus: 0.0 },
            AgentRole::Qc => Self { max_complexity: 10, preferred_model: "default".to_string(), avg_minutes_per_complexity_point: 8.0, success_rate: 0.9, specialization_bonus: 0.0 },
            AgentRole::Review => Self { max_complexity: 10, preferred_model: "default".to_string(), avg_minutes_per_complexity_point: 6.0, success_rate: 0.92, specialization_bonus: 0.0 },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub pr_id: String,
    pub agent_id: String,
    pub assigned_at_ms: u64,
    pub estimated_duration_minutes: f64,
    pub priority: Priority,
    pub complexity: u8,
}

#[derive(Debug, Clone, Default)]
pub struct AssignmentBatch {
    pub assignments: Vec<Assignment>,
    pub unassigned_prs: Vec<String>,
}

/// Roles eligible to pick up work for a given cold state (§4.7, §4.10).
fn role_fits(role: AgentRole, cold_state: ColdState) -> bool {
    match role {
        AgentRole::Planning => matches!(cold_state, ColdState::New | ColdState::Ready),
        AgentRole::Worker => matches!(cold_state, ColdState::Planned),
        AgentRole::Qc | AgentRole::Review => matches!(cold_state, ColdState::Completed),
    }
}

/// Assignment manager (§4.10). Holds the capability-profile overrides; the
/// agent pool itself (records, last-assignment times, counts) is supplied
/// per call so it composes with the agent registry (P) rather than
/// duplicating its bookkeeping.
pub struct AssignmentManager {
    config: AssignmentConfig,
    profiles: Mutex<HashMap<String, CapabilityProfile>>,
    round_robin_cursor: Mutex<usize>,
}

impl AssignmentManager {
    pub fn new(config: AssignmentConfig) -> Self {
        Self { config, profiles: Mutex::new(HashMap::new()), round_robin_cursor: Mutex::new(0) }
    }

    pub fn set_profile(&self, agent_id: &str, profile: CapabilityProfile) {
        self.profiles.lock().insert(agent_id.to_string(), profile);
    }

    fn profile_for(&self, agent: &AgentRecord) -> CapabilityProfile {
        self.profiles.lock().get(agent.agent_id.as_str()).cloned().unwrap_or_else(|| CapabilityProfile::default_for_role(agent.role))
    }

    fn is_eligible(&self, agent: &AgentRecord, assignment_counts: &HashMap<String, usize>, last_assigned_ms: &HashMap<String, u64>, now_ms: u64) -> bool {
        if agent.status != AgentStatus::Idle {
            return false;
        }
        let count = assignment_counts.get(agent.agent_id.as_str()).copied().unwrap_or(0);
        if count >= self.config.max_assignments_per_agent {
            return false;
        }
        if let Some(&last) = last_assigned_ms.get(agent.agent_id.as_str()) {
            if now_ms.saturating_sub(last) < self.config.min_assignment_interval_ms {
                return false;
            }
        }
        true
    }

    fn fits(&self, agent: &AgentRecord, pr: &Pr) -> bool {
        if !role_fits(agent.role, pr.cold_state) {
            return false;
        }
        self.profile_for(agent).max_complexity >= pr.complexity.score
    }

    fn score(&self, agent: &AgentRecord, pr: &Pr) -> f64 {
        let profile = self.profile_for(agent);
        let complexity_term = (10.0 - (profile.max_complexity as f64 - pr.complexity.score as f64).abs()) * 2.0;
        let model_term = if self.config.use_specialization && profile.preferred_model == pr.complexity.suggested_model { 5.0 } else { 0.0 };
        let mut score = (complexity_term + model_term + profile.specialization_bonus) * profile.success_rate;
        score *= match pr.priority {
            Priority::Critical => 1.5,
            Priority::High => 1.2,
            Priority::Medium | Priority::Low => 1.0,
        };
        score
    }

    /// Maps `selected` PRs (in scheduler order) to eligible agents from
    /// `pool`, per `strategy` (§4.10).
    #[instrument(skip(self, selected, pool, assignment_counts, last_assigned_ms), fields(n_prs = selected.len(), n_agents = pool.len()))]
    pub fn assign(
        &self,
        selected: &[&Pr],
        pool: &[AgentRecord],
        assignment_counts: &HashMap<String, usize>,
        last_assigned_ms: &HashMap<String, u64>,
        now_ms: u64,
    ) -> AssignmentBatch {
        let mut remaining: Vec<AgentRecord> = pool
            .iter()
            .filter(|a| self.is_eligible(a, assignment_counts, last_assigned_ms, now_ms))
            .cloned()
            .collect();

        let mut batch = AssignmentBatch::default();

        for pr in selected {
            let candidates: Vec<usize> = remaining.iter().enumerate().filter(|(_, a)| self.fits(a, pr)).map(|(i, _)| i).collect();
            if candidates.is_empty() {
                batch.unassigned_prs.push(pr.id.as_str().to_string());
                continue;
            }

            let chosen_idx = match self.config.strategy {
                AssignmentStrategy::FirstAvailable => candidates[0],
                AssignmentStrategy::RoundRobin => {
                    let mut cursor = self.round_robin_cursor.lock();
                    let idx = candidates[*cursor % candidates.len()];
                    *cursor = cursor.wrapping_add(1);
                    idx
                }
                AssignmentStrategy::LoadBalanced => candidates
                    .iter()
                    .copied()
                    .min_by_key(|&i| assignment_counts.get(remaining[i].agent_id.as_str()).copied().unwrap_or(0))
                    .unwrap_or(candidates[0]),
                AssignmentStrategy::CapabilityMatched => candidates
                    .iter()
                    .copied()
                    .max_by(|&a, &b| {
                        self.score(&remaining[a], pr)
                            .partial_cmp(&self.score(&remaining[b], pr))
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .unwrap_or(candidates[0]),
            };

            let agent = remaining.remove(chosen_idx);
            let profile = self.profile_for(&agent);
            let estimated_duration_minutes = pr.complexity.score as f64 * profile.avg_minutes_per_complexity_point;

            info!(pr_id = %pr.id, agent_id = %agent.agent_id, "assigned");
            batch.assignments.push(Assignment {
                pr_id: pr.id.as_str().to_string(),
                agent_id: agent.agent_id.as_str().to_string(),
                assigned_at_ms: now_ms,
                estimated_duration_minutes,
                priority: pr.priority,
                complexity: pr.complexity.score,
            });
        }

        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_core::{Complexity, PrId};

    fn pr(id: &str, priority: Priority, complexity: u8, cold_state: ColdState) -> Pr {
        let mut p = Pr::new(PrId::from_string(id), id, priority, Complexity { score: complexity, estimated_minutes: 10, suggested_model: "default".to_string(), rationale: String::new() });
        p.cold_state = cold_state;
        p
    }

    fn agent(id: &str, role: AgentRole) -> AgentRecord {
        AgentRecord::new(AgentId::from_string(id), role, 1, 0)
    }

    #[test]
    fn first_available_picks_first_eligible_agent() {
        let manager = AssignmentManager::new(AssignmentConfig { strategy: AssignmentStrategy::FirstAvailable, ..AssignmentConfig::default() });
        let pr = pr("pr--aaaaaaaa", Priority::Medium, 3, ColdState::Planned);
        let pool = vec![agent("agt-1", AgentRole::Worker), agent("agt-2", AgentRole::Worker)];
        let batch = manager.assign(&[&pr], &pool, &HashMap::new(), &HashMap::new(), 0);
        assert_eq!(batch.assignments.len(), 1);
        assert_eq!(batch.assignments[0].agent_id, "agt-1");
    }

    #[test]
    fn role_mismatch_leaves_pr_unassigned() {
        let manager = AssignmentManager::new(AssignmentConfig::default());
        let pr = pr("pr--aaaaaaaa", Priority::Medium, 3, ColdState::New);
        let pool = vec![agent("agt-1", AgentRole::Worker)];
        let batch = manager.assign(&[&pr], &pool, &HashMap::new(), &HashMap::new(), 0);
        assert!(batch.assignments.is_empty());
        assert_eq!(batch.unassigned_prs, vec!["pr--aaaaaaaa".to_string()]);
    }

    #[test]
    fn agent_over_capacity_is_not_eligible() {
        let manager = AssignmentManager::new(AssignmentConfig { max_assignments_per_agent: 1, ..AssignmentConfig::default() });
        let pr = pr("pr--aaaaaaaa", Priority::Medium, 3, ColdState::Planned);
        let pool = vec![agent("agt-1", AgentRole::Worker)];
        let mut counts = HashMap::new();
        counts.insert("agt-1".to_string(), 1);
        let batch = manager.assign(&[&pr], &pool, &counts, &HashMap::new(), 0);
        assert!(batch.assignments.is_empty());
    }

    #[test]
    fn capability_matched_prefers_closer_complexity_fit() {
        let manager = AssignmentManager::new(AssignmentConfig { strategy: AssignmentStrategy::CapabilityMatched, ..AssignmentConfig::default() });
        manager.set_profile("agt-close", CapabilityProfile { max_complexity: 3, preferred_model: "default".to_string(), avg_minutes_per_complexity_point: 10.0, success_rate: 1.0, specialization_bonus: 0.0 });
        manager.set_profile("agt-far", CapabilityProfile { max_complexity: 9, preferred_model: "default".to_string(), avg_minutes_per_complexity_point: 10.0, success_rate: 1.0, specialization_bonus: 0.0 });
        let pr = pr("pr--aaaaaaaa", Priority::Medium, 3, ColdState::Planned);
        let pool = vec![agent("agt-close", AgentRole::Worker), agent("agt-far", AgentRole::Worker)];
        let batch = manager.assign(&[&pr], &pool, &HashMap::new(), &HashMap::new(), 0);
        assert_eq!(batch.assignments[0].agent_id, "agt-close");
    }
}
