// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transition rules & state guards (§4.3, §4.4's authoritative table).
//!
//! The table is data, not branching code: every other engine (validation,
//! availability, commit-required) derives from the same `TRANSITION_TABLE`
//! slice (§9 "Transition table as data").

use crate::pr::{ColdState, HotState, PrState};
use std::collections::HashMap;
use std::sync::OnceLock;

/// One row of the closed transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub from: PrState,
    pub to: PrState,
    pub requires_commit: bool,
    pub description: &'static str,
}

macro_rules! cold { ($s:ident) => { PrState::Cold(ColdState::$s) }; }
macro_rules! hot { ($s:ident) => { PrState::Hot(HotState::$s) }; }

/// The closed, ordered transition table from spec §4.4.
pub static TRANSITION_TABLE: &[TransitionRule] = &[
    // cold -> cold (commit)
    TransitionRule { from: cold!(New), to: cold!(Ready), requires_commit: true, description: "Ready for planning" },
    TransitionRule { from: cold!(New), to: cold!(Blocked), requires_commit: true, description: "Blocked before planning" },
    TransitionRule { from: cold!(Blocked), to: cold!(Ready), requires_commit: true, description: "Unblocked, ready again" },
    TransitionRule { from: cold!(Ready), to: cold!(Blocked), requires_commit: true, description: "Blocked while ready" },
    TransitionRule { from: cold!(Planned), to: cold!(Blocked), requires_commit: true, description: "Blocked after planning" },
    TransitionRule { from: cold!(Completed), to: cold!(Approved), requires_commit: true, description: "Approved after review" },
    TransitionRule { from: cold!(Completed), to: cold!(Broken), requires_commit: true, description: "Found broken after completion" },
    TransitionRule { from: cold!(Approved), to: cold!(Broken), requires_commit: true, description: "Regression found after approval" },
    TransitionRule { from: cold!(Broken), to: cold!(Planned), requires_commit: true, description: "Repair planned" },
    // hot -> hot (no commit)
    TransitionRule { from: hot!(Investigating), to: hot!(Planning), requires_commit: false, description: "Investigation complete, planning" },
    TransitionRule { from: hot!(Planning), to: hot!(InProgress), requires_commit: false, description: "Plan ready, work started" },
    TransitionRule { from: hot!(InProgress), to: hot!(UnderReview), requires_commit: false, description: "Work complete, under review" },
    // cold -> hot (no commit)
    TransitionRule { from: cold!(Ready), to: hot!(Investigating), requires_commit: false, description: "Investigation started" },
    TransitionRule { from: cold!(Ready), to: hot!(InProgress), requires_commit: false, description: "Work started directly" },
    TransitionRule { from: cold!(Planned), to: hot!(InProgress), requires_commit: false, description: "Implementation started" },
    TransitionRule { from: cold!(Planned), to: hot!(Investigating), requires_commit: false, description: "Re-investigation of a planned PR" },
    TransitionRule { from: cold!(Completed), to: hot!(UnderReview), requires_commit: false, description: "Review started" },
    TransitionRule { from: cold!(Broken), to: hot!(Investigating), requires_commit: false, description: "Investigating a repair" },
    // hot -> cold (commit)
    TransitionRule { from: hot!(Investigating), to: cold!(Planned), requires_commit: true, description: "Investigation concluded with a plan" },
    TransitionRule { from: hot!(Planning), to: cold!(Planned), requires_commit: true, description: "Planning complete" },
    TransitionRule { from: hot!(InProgress), to: cold!(Completed), requires_commit: true, description: "Implementation complete" },
    TransitionRule { from: hot!(UnderReview), to: cold!(Approved), requires_commit: true, description: "Review passed" },
    TransitionRule { from: hot!(UnderReview), to: cold!(Broken), requires_commit: true, description: "Review found it broken" },
];

struct Indexes {
    by_pair: HashMap<(PrState, PrState), TransitionRule>,
    by_from: HashMap<PrState, Vec<PrState>>,
}

fn indexes() -> &'static Indexes {
    static INDEXES: OnceLock<Indexes> = OnceLock::new();
    INDEXES.get_or_init(|| {
        let mut by_pair = HashMap::new();
        let mut by_from: HashMap<PrState, Vec<PrState>> = HashMap::new();
        for rule in TRANSITION_TABLE {
            by_pair.insert((rule.from, rule.to), *rule);
            by_from.entry(rule.from).or_default().push(rule.to);
        }
        Indexes { by_pair, by_from }
    })
}

/// Structured result of [`validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub error: Option<String>,
    pub rule: Option<TransitionRule>,
}

/// A synthesized self-loop rule: always valid, never requires a commit.
fn self_loop_rule(state: PrState) -> TransitionRule {
    TransitionRule { from: state, to: state, requires_commit: false, description: "No-op self transition" }
}

/// Validate a `(from, to)` transition against the table. Self-loops are
/// always valid (§4.3).
pub fn validate(from: PrState, to: PrState) -> ValidationResult {
    if from == to {
        return ValidationResult { valid: true, error: None, rule: Some(self_loop_rule(from)) };
    }
    match indexes().by_pair.get(&(from, to)) {
        Some(rule) => ValidationResult { valid: true, error: None, rule: Some(*rule) },
        None => ValidationResult {
            valid: false,
            error: Some(format!("no transition rule from {from} to {to}")),
            rule: None,
        },
    }
}

pub fn is_valid_transition(from: PrState, to: PrState) -> bool {
    validate(from, to).valid
}

/// `requires_commit(from, to) ⇔ to is cold`, for any valid non-self-loop
/// transition (§8 testable property).
pub fn requires_commit(from: PrState, to: PrState) -> bool {
    validate(from, to).rule.map(|r| r.requires_commit).unwrap_or(false)
}

/// All states reachable in one step from `from`.
pub fn targets_from(from: PrState) -> &'static [PrState] {
    indexes().by_from.get(&from).map(|v| v.as_slice()).unwrap_or(&[])
}

pub fn is_hot(s: PrState) -> bool {
    s.is_hot()
}

pub fn is_cold(s: PrState) -> bool {
    s.is_cold()
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[test]
    fn self_loops_are_always_valid_and_never_commit() {
        for s in ColdState::ALL.map(PrState::Cold) {
            let r = validate(s, s);
            assert!(r.valid);
            assert!(!r.rule.unwrap().requires_commit);
        }
        for s in HotState::ALL.map(PrState::Hot) {
            let r = validate(s, s);
            assert!(r.valid);
            assert!(!r.rule.unwrap().requires_commit);
        }
    }

    #[parameterized(
        new_to_ready = { ColdState::New, ColdState::Ready, true },
        ready_to_blocked = { ColdState::Ready, ColdState::Blocked, true },
        completed_to_approved = { ColdState::Completed, ColdState::Approved, true },
        broken_to_planned = { ColdState::Broken, ColdState::Planned, true },
    )]
    fn cold_to_cold_transitions_require_commit(from: ColdState, to: ColdState, expect_valid: bool) {
        let r = validate(PrState::Cold(from), PrState::Cold(to));
        assert_eq!(r.valid, expect_valid);
        assert!(r.rule.unwrap().requires_commit);
    }

    #[test]
    fn hot_to_hot_transitions_never_require_commit() {
        let r = validate(PrState::Hot(HotState::Investigating), PrState::Hot(HotState::Planning));
        assert!(r.valid);
        assert!(!r.rule.unwrap().requires_commit);
    }

    #[test]
    fn cold_to_hot_transitions_never_require_commit() {
        let r = validate(PrState::Cold(ColdState::Ready), PrState::Hot(HotState::Investigating));
        assert!(r.valid);
        assert!(!r.rule.unwrap().requires_commit);
    }

    #[test]
    fn hot_to_cold_transitions_require_commit() {
        let r = validate(PrState::Hot(HotState::InProgress), PrState::Cold(ColdState::Completed));
        assert!(r.valid);
        assert!(r.rule.unwrap().requires_commit);
    }

    #[test]
    fn unlisted_pair_is_invalid() {
        let r = validate(PrState::Cold(ColdState::New), PrState::Cold(ColdState::Approved));
        assert!(!r.valid);
        assert!(r.error.is_some());
    }

    #[test]
    fn requires_commit_iff_target_is_cold_for_any_valid_non_self_loop() {
        for rule in TRANSITION_TABLE {
            assert_eq!(rule.requires_commit, rule.to.is_cold());
        }
    }

    #[test]
    fn approved_to_broken_is_structurally_legal() {
        // Open question (§9): business policy may restrict this to QC agents;
        // this engine validates structure only.
        let r = validate(PrState::Cold(ColdState::Approved), PrState::Cold(ColdState::Broken));
        assert!(r.valid);
    }
}
