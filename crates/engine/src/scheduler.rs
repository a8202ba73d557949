// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! MIS scheduler (§4.9, component I): greedy-ordered and maximal-by-degree
//! algorithms over the conflict graph (H), restricted to the
//! dependency-satisfied nodes exposed by the dependency graph (G).

use crate::config::SchedulerConfig;
use conclave_core::{ConflictDetector, HasFiles, Pr, Priority};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{hash_map::DefaultHasher, HashMap};
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    GreedyOrdered,
    MaximalByDegree,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerResult {
    pub selected_prs: Vec<String>,
    pub blocked_prs: Vec<String>,
    pub block_reasons: HashMap<String, String>,
    pub timestamp_ms: u64,
    pub scheduling_time_ms: u64,
}

struct CacheEntry {
    key: u64,
    result: SchedulerResult,
    computed_at: Instant,
}

/// MIS scheduler (§4.9). Stateless across calls except for the small
/// positive-result cache, matching the conflict detector's own
/// memoization style.
pub struct Scheduler {
    config: SchedulerConfig,
    cache: Mutex<Option<CacheEntry>>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config, cache: Mutex::new(None) }
    }

    /// Drop the cache; called after `markComplete`/`markFailed` upstream (§4.9).
    pub fn invalidate_cache(&self) {
        *self.cache.lock() = None;
    }

    fn cache_key(eligible: &[&Pr]) -> u64 {
        let mut ids: Vec<&str> = eligible.iter().map(|pr| pr.id.as_str()).collect();
        ids.sort_unstable();
        let mut hasher = DefaultHasher::new();
        ids.hash(&mut hasher);
        hasher.finish()
    }

    #[instrument(skip(self, eligible), fields(n = eligible.len()))]
    pub fn schedule(&self, eligible: &[&Pr], algorithm: Algorithm, now_ms: u64) -> SchedulerResult {
        let key = Self::cache_key(eligible);
        if self.config.enable_caching {
            let cached = self.cache.lock();
            if let Some(entry) = cached.as_ref() {
                if entry.key == key && entry.computed_at.elapsed() < Duration::from_millis(self.config.cache_ttl_ms) {
                    return entry.result.clone();
                }
            }
        }

        let started = Instant::now();
        let budget = Duration::from_millis(self.config.max_scheduling_time_ms);

        let mut conflicts = ConflictDetector::new();
        conflicts.detect_conflicts(eligible.iter().copied());

        let ordered = self.order(eligible, algorithm);

        let mut selected: Vec<String> = Vec::new();
        let mut blocked: Vec<String> = Vec::new();
        let mut reasons: HashMap<String, String> = HashMap::new();

        for pr in ordered {
            if started.elapsed() >= budget {
                blocked.push(pr.id.as_str().to_string());
                reasons.insert(pr.id.as_str().to_string(), "scheduling budget exhausted".to_string());
                continue;
            }
            if selected.len() >= self.config.max_parallel_prs {
                blocked.push(pr.id.as_str().to_string());
                reasons.insert(pr.id.as_str().to_string(), "capacity reached".to_string());
                continue;
            }
            let conflicting = selected.iter().find(|s| conflicts.has_conflict(s, pr.id.as_str()));
            if let Some(other) = conflicting {
                let files = conflicts.conflicting_files(other, pr.id.as_str());
                let mut files: Vec<&str> = files.iter().map(String::as_str).collect();
                files.sort_unstable();
                blocked.push(pr.id.as_str().to_string());
                reasons.insert(pr.id.as_str().to_string(), format!("conflicts with {other} on files {{{}}}", files.join(", ")));
                continue;
            }
            selected.push(pr.id.as_str().to_string());
        }

        let scheduling_time_ms = started.elapsed().as_millis() as u64;
        if scheduling_time_ms >= budget.as_millis() as u64 {
            info!(scheduling_time_ms, "scheduling exceeded budget, returning best partial result");
        }

        let result = SchedulerResult { selected_prs: selected, blocked_prs: blocked, block_reasons: reasons, timestamp_ms: now_ms, scheduling_time_ms };

        if self.config.enable_caching {
            *self.cache.lock() = Some(CacheEntry { key, result: result.clone(), computed_at: Instant::now() });
        }

        result
    }

    fn order<'a>(&self, eligible: &[&'a Pr], algorithm: Algorithm) -> Vec<&'a Pr> {
        let mut ordered: Vec<&Pr> = eligible.to_vec();
        match algorithm {
            Algorithm::GreedyOrdered => {
                ordered.sort_by(|a, b| {
                    if self.config.use_priority {
                        let by_priority = priority_rank(a.priority).cmp(&priority_rank(b.priority));
                        if by_priority != std::cmp::Ordering::Equal {
                            return by_priority;
                        }
                    }
                    if self.config.use_complexity {
                        let by_complexity = a.complexity.score.cmp(&b.complexity.score);
                        if by_complexity != std::cmp::Ordering::Equal {
                            return by_complexity;
                        }
                    }
                    a.id.as_str().cmp(b.id.as_str())
                });
                ordered
            }
            Algorithm::MaximalByDegree => {
                let mut detector = ConflictDetector::new();
                detector.detect_conflicts(ordered.iter().copied());
                ordered.sort_by_key(|pr| detector.conflicting_prs(pr.id.as_str()).len());
                ordered
            }
        }
    }
}

/// `critical < high < medium < low` (§4.9: ascending priority order).
fn priority_rank(p: Priority) -> u8 {
    match p {
        Priority::Critical => 0,
        Priority::High => 1,
        Priority::Medium => 2,
        Priority::Low => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_core::{Complexity, FileAction, FileEntry, PrId};

    fn pr(id: &str, priority: Priority, complexity: u8, files: &[&str]) -> Pr {
        let mut p = Pr::new(
            PrId::from_string(id),
            id,
            priority,
            Complexity { score: complexity, estimated_minutes: 10, suggested_model: "default".to_string(), rationale: String::new() },
        );
        p.estimated_files = files.iter().map(|f| FileEntry { path: f.to_string(), action: FileAction::Modify, description: String::new() }).collect();
        p
    }

    #[test]
    fn selects_conflict_free_prs_and_blocks_the_overlapping_one() {
        let a = pr("pr--aaaaaaaa", Priority::Medium, 2, &["a", "b"]);
        let b = pr("pr--bbbbbbbb", Priority::Medium, 2, &["c"]);
        let c = pr("pr--cccccccc", Priority::Medium, 2, &["b", "d"]);
        let eligible = vec![&a, &b, &c];

        let scheduler = Scheduler::new(SchedulerConfig { max_parallel_prs: 3, ..SchedulerConfig::default() });
        let result = scheduler.schedule(&eligible, Algorithm::GreedyOrdered, 0);

        assert_eq!(result.selected_prs, vec!["pr--aaaaaaaa".to_string(), "pr--bbbbbbbb".to_string()]);
        assert_eq!(result.blocked_prs, vec!["pr--cccccccc".to_string()]);
        assert!(result.block_reasons["pr--cccccccc"].contains("pr--aaaaaaaa"));
    }

    #[test]
    fn respects_max_parallel_prs_capacity() {
        let a = pr("pr--aaaaaaaa", Priority::Medium, 1, &["a"]);
        let b = pr("pr--bbbbbbbb", Priority::Medium, 1, &["b"]);
        let eligible = vec![&a, &b];

        let scheduler = Scheduler::new(SchedulerConfig { max_parallel_prs: 1, ..SchedulerConfig::default() });
        let result = scheduler.schedule(&eligible, Algorithm::GreedyOrdered, 0);

        assert_eq!(result.selected_prs.len(), 1);
        assert_eq!(result.block_reasons.values().next().unwrap(), "capacity reached");
    }

    #[test]
    fn critical_priority_is_scheduled_before_low_at_equal_complexity() {
        let low = pr("pr--aaaaaaaa", Priority::Low, 1, &["a"]);
        let critical = pr("pr--bbbbbbbb", Priority::Critical, 1, &["b"]);
        let eligible = vec![&low, &critical];

        let scheduler = Scheduler::new(SchedulerConfig { max_parallel_prs: 1, ..SchedulerConfig::default() });
        let result = scheduler.schedule(&eligible, Algorithm::GreedyOrdered, 0);

        assert_eq!(result.selected_prs, vec!["pr--bbbbbbbb".to_string()]);
    }

    #[test]
    fn identical_inputs_yield_identical_outputs() {
        let a = pr("pr--aaaaaaaa", Priority::Medium, 2, &["a"]);
        let b = pr("pr--bbbbbbbb", Priority::Medium, 2, &["b"]);
        let eligible = vec![&a, &b];

        let scheduler = Scheduler::new(SchedulerConfig::default());
        let first = scheduler.schedule(&eligible, Algorithm::GreedyOrdered, 0);
        let second = scheduler.schedule(&eligible, Algorithm::GreedyOrdered, 0);
        assert_eq!(first, second);
    }

    #[test]
    fn cache_is_invalidated_explicitly() {
        let a = pr("pr--aaaaaaaa", Priority::Medium, 2, &["a"]);
        let eligible = vec![&a];

        let scheduler = Scheduler::new(SchedulerConfig::default());
        let first = scheduler.schedule(&eligible, Algorithm::GreedyOrdered, 0);
        scheduler.invalidate_cache();
        let second = scheduler.schedule(&eligible, Algorithm::GreedyOrdered, 100);
        assert_eq!(first.selected_prs, second.selected_prs);
    }

    #[test]
    fn maximal_by_degree_excludes_conflicting_neighbors_of_a_selected_hub() {
        // `c` conflicts with both `a` and `b` (shares "x" with each) and has the
        // highest degree, so low-degree `a`/`b` sort first and get selected,
        // excluding `c` once either of them is taken.
        let a = pr("pr--aaaaaaaa", Priority::Medium, 2, &["x"]);
        let b = pr("pr--bbbbbbbb", Priority::Medium, 2, &["y"]);
        let c = pr("pr--cccccccc", Priority::Medium, 2, &["x", "y"]);
        let eligible = vec![&a, &b, &c];

        let scheduler = Scheduler::new(SchedulerConfig { max_parallel_prs: 3, ..SchedulerConfig::default() });
        let result = scheduler.schedule(&eligible, Algorithm::MaximalByDegree, 0);

        assert_eq!(result.selected_prs.len(), 2);
        assert!(!result.selected_prs.contains(&"pr--cccccccc".to_string()));
    }
}
