// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The PR (work item) data model (§3).
//!
//! A PR's cold state is always present and is the only part that survives a
//! crash; its hot state is present only while an agent is actively working it
//! and is discarded on recovery.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

crate::define_id! {
    /// Unique identifier for a PR (work item). The noun is historical — the
    /// engine is agnostic to what a PR represents.
    pub struct PrId("pr--");
}

/// Durable state — survives a crash. Always present on a PR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColdState {
    New,
    Ready,
    Blocked,
    Planned,
    Completed,
    Approved,
    Broken,
}

crate::simple_display! {
    ColdState {
        New => "new",
        Ready => "ready",
        Blocked => "blocked",
        Planned => "planned",
        Completed => "completed",
        Approved => "approved",
        Broken => "broken",
    }
}

impl ColdState {
    pub const ALL: [ColdState; 7] = [
        ColdState::New,
        ColdState::Ready,
        ColdState::Blocked,
        ColdState::Planned,
        ColdState::Completed,
        ColdState::Approved,
        ColdState::Broken,
    ];

    /// `approved` is the only terminal cold state.
    pub fn is_terminal(self) -> bool {
        matches!(self, ColdState::Approved)
    }

    /// Completed or approved — the threshold a dependency must clear.
    pub fn satisfies_dependency(self) -> bool {
        matches!(self, ColdState::Completed | ColdState::Approved)
    }
}

/// Ephemeral coordination state — exists only in the hot store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HotState {
    Investigating,
    Planning,
    InProgress,
    UnderReview,
}

crate::simple_display! {
    HotState {
        Investigating => "investigating",
        Planning => "planning",
        InProgress => "in-progress",
        UnderReview => "under-review",
    }
}

impl HotState {
    pub const ALL: [HotState; 4] = [
        HotState::Investigating,
        HotState::Planning,
        HotState::InProgress,
        HotState::UnderReview,
    ];
}

/// Either a cold or a hot state, used as the uniform `from`/`to` argument to
/// the transition rules and state machine (§4.3, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrState {
    Cold(ColdState),
    Hot(HotState),
}

impl PrState {
    pub fn is_cold(self) -> bool {
        matches!(self, PrState::Cold(_))
    }

    pub fn is_hot(self) -> bool {
        matches!(self, PrState::Hot(_))
    }

    pub fn as_cold(self) -> Option<ColdState> {
        match self {
            PrState::Cold(s) => Some(s),
            PrState::Hot(_) => None,
        }
    }

    pub fn as_hot(self) -> Option<HotState> {
        match self {
            PrState::Hot(s) => Some(s),
            PrState::Cold(_) => None,
        }
    }
}

impl From<ColdState> for PrState {
    fn from(s: ColdState) -> Self {
        PrState::Cold(s)
    }
}

impl From<HotState> for PrState {
    fn from(s: HotState) -> Self {
        PrState::Hot(s)
    }
}

impl std::fmt::Display for PrState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrState::Cold(s) => write!(f, "{s}"),
            PrState::Hot(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

crate::simple_display! {
    Priority {
        Critical => "critical",
        High => "high",
        Medium => "medium",
        Low => "low",
    }
}

/// File action recorded against an estimated or actual file entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    Create,
    Modify,
    Delete,
}

crate::simple_display! {
    FileAction {
        Create => "create",
        Modify => "modify",
        Delete => "delete",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub action: FileAction,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Complexity {
    pub score: u8,
    pub estimated_minutes: u32,
    pub suggested_model: String,
    #[serde(default)]
    pub rationale: String,
}

/// A work item tracked by the orchestration engine (§3).
///
/// Invariants enforced by construction/mutation helpers here:
/// (i) exactly one of `{hot_state set, hot_state unset}`;
/// (ii) `hot_state.is_some()` implies the PR counts as "in progress"
///      regardless of `cold_state`;
/// (iii) the dependency set is acyclic across the whole population —
///       enforced at graph load (see [`crate::dependency_graph`]), not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pr {
    pub id: PrId,
    pub title: String,
    pub cold_state: ColdState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hot_state: Option<HotState>,
    pub priority: Priority,
    pub complexity: Complexity,
    pub dependencies: HashSet<PrId>,
    #[serde(default)]
    pub estimated_files: Vec<FileEntry>,
    #[serde(default)]
    pub actual_files: Vec<FileEntry>,
    #[serde(default)]
    pub held_leases: HashSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent: Option<String>,
    #[serde(default)]
    pub last_transition_ms: u64,
}

impl Pr {
    pub fn new(id: PrId, title: impl Into<String>, priority: Priority, complexity: Complexity) -> Self {
        Self {
            id,
            title: title.into(),
            cold_state: ColdState::New,
            hot_state: None,
            priority,
            complexity,
            dependencies: HashSet::new(),
            estimated_files: Vec::new(),
            actual_files: Vec::new(),
            held_leases: HashSet::new(),
            assigned_agent: None,
            last_transition_ms: 0,
        }
    }

    /// Invariant (ii): a PR is "in progress" whenever it has a hot state,
    /// independent of its cold state.
    pub fn is_in_progress(&self) -> bool {
        self.hot_state.is_some()
    }

    /// The file paths this PR is expected (or known) to touch, used by the
    /// conflict detector (§4.8). Prefers actual files when any are recorded.
    pub fn files(&self) -> HashSet<&str> {
        let source = if self.actual_files.is_empty() {
            &self.estimated_files
        } else {
            &self.actual_files
        };
        source.iter().map(|f| f.path.as_str()).collect()
    }

    pub fn current_state(&self) -> PrState {
        match self.hot_state {
            Some(h) => PrState::Hot(h),
            None => PrState::Cold(self.cold_state),
        }
    }
}

impl crate::conflict::HasFiles for Pr {
    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn files(&self) -> HashSet<&str> {
        Pr::files(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complexity(score: u8) -> Complexity {
        Complexity {
            score,
            estimated_minutes: score as u32 * 10,
            suggested_model: "default".to_string(),
            rationale: String::new(),
        }
    }

    #[test]
    fn new_pr_has_no_hot_state_and_is_not_in_progress() {
        let pr = Pr::new(PrId::from_string("pr--001"), "Title", Priority::Medium, complexity(3));
        assert_eq!(pr.cold_state, ColdState::New);
        assert!(pr.hot_state.is_none());
        assert!(!pr.is_in_progress());
    }

    #[test]
    fn hot_state_marks_in_progress_regardless_of_cold_state() {
        let mut pr = Pr::new(PrId::from_string("pr--001"), "Title", Priority::Medium, complexity(3));
        pr.cold_state = ColdState::Completed;
        pr.hot_state = Some(HotState::UnderReview);
        assert!(pr.is_in_progress());
    }

    #[test]
    fn files_prefers_actual_over_estimated() {
        let mut pr = Pr::new(PrId::from_string("pr--001"), "Title", Priority::Medium, complexity(3));
        pr.estimated_files.push(FileEntry {
            path: "src/a.rs".to_string(),
            action: FileAction::Modify,
            description: String::new(),
        });
        pr.actual_files.push(FileEntry {
            path: "src/b.rs".to_string(),
            action: FileAction::Create,
            description: String::new(),
        });
        let files = pr.files();
        assert!(files.contains("src/b.rs"));
        assert!(!files.contains("src/a.rs"));
    }

    #[test]
    fn cold_state_satisfies_dependency_only_for_completed_or_approved() {
        assert!(ColdState::Completed.satisfies_dependency());
        assert!(ColdState::Approved.satisfies_dependency());
        assert!(!ColdState::Ready.satisfies_dependency());
        assert!(!ColdState::Blocked.satisfies_dependency());
    }

    #[test]
    fn approved_is_the_only_terminal_state() {
        for s in ColdState::ALL {
            assert_eq!(s.is_terminal(), s == ColdState::Approved);
        }
    }
}
