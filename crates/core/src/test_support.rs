// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

// ── Proptest strategies ─────────────────────────────────────────────────

/// Proptest strategies for the PR state types (§3, §4.3).
pub mod strategies {
    use crate::pr::{ColdState, FileAction, FileEntry, HotState, PrState, Priority};
    use proptest::prelude::*;

    pub fn arb_cold_state() -> impl Strategy<Value = ColdState> {
        prop_oneof![
            Just(ColdState::New),
            Just(ColdState::Ready),
            Just(ColdState::Blocked),
            Just(ColdState::Planned),
            Just(ColdState::Completed),
            Just(ColdState::Approved),
            Just(ColdState::Broken),
        ]
    }

    pub fn arb_hot_state() -> impl Strategy<Value = HotState> {
        prop_oneof![
            Just(HotState::Investigating),
            Just(HotState::Planning),
            Just(HotState::InProgress),
            Just(HotState::UnderReview),
        ]
    }

    pub fn arb_pr_state() -> impl Strategy<Value = PrState> {
        prop_oneof![arb_cold_state().prop_map(PrState::Cold), arb_hot_state().prop_map(PrState::Hot)]
    }

    pub fn arb_priority() -> impl Strategy<Value = Priority> {
        prop_oneof![Just(Priority::Critical), Just(Priority::High), Just(Priority::Medium), Just(Priority::Low)]
    }

    pub fn arb_file_action() -> impl Strategy<Value = FileAction> {
        prop_oneof![Just(FileAction::Create), Just(FileAction::Modify), Just(FileAction::Delete)]
    }

    /// A file path drawn from a small fixed alphabet so generated conflict
    /// graphs actually collide some of the time, matching the shape of
    /// §8's scheduler-correctness property (pairwise conflict-freedom over
    /// small, overlapping file sets).
    pub fn arb_path() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("src/a.ts".to_string()),
            Just("src/b.ts".to_string()),
            Just("src/c.ts".to_string()),
            Just("src/d.ts".to_string()),
            Just("src/e.ts".to_string()),
        ]
    }

    pub fn arb_file_entry() -> impl Strategy<Value = FileEntry> {
        (arb_path(), arb_file_action()).prop_map(|(path, action)| FileEntry { path, action, description: String::new() })
    }
}

// ── PR front-matter factory helpers ─────────────────────────────────────

use crate::pr::{ColdState, Complexity, FileEntry, Pr, PrId, Priority};

pub fn pr(id: &str, priority: Priority, complexity_score: u8) -> Pr {
    Pr::new(PrId::new(id), format!("PR {id}"), priority, Complexity { score: complexity_score, estimated_minutes: 30, suggested_model: "default".to_string(), rationale: String::new() })
}

pub fn pr_with_files(id: &str, cold_state: ColdState, files: Vec<FileEntry>) -> Pr {
    let mut p = pr(id, Priority::Medium, 3);
    p.cold_state = cold_state;
    p.estimated_files = files;
    p
}
