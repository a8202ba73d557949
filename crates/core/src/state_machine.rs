// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The PR state machine operator (§4.4).
//!
//! This module is the *stateless* half of component D: it validates and
//! plans a transition, but performs no I/O. The engine crate's runtime glue
//! emits the planned event, invokes the actual cold-store committer when a
//! commit is required, and calls [`finalize`] with the commit outcome to
//! produce the final [`TransitionOutcome`] — matching §5's ordering
//! guarantee that event emission happens-before the cold commit, and that a
//! commit failure rolls the transition back with no visible state change.

use crate::pr::PrState;
use crate::transition::{validate, TransitionRule};
use serde::{Deserialize, Serialize};

/// A transition that failed structural validation (§7 `InvalidTransition`).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition for {pr_id}: {from} -> {to}: {reason}")]
pub struct InvalidTransition {
    pub pr_id: String,
    pub from: PrState,
    pub to: PrState,
    pub reason: String,
}

/// The recorded fact of a transition, independent of whether it was
/// ultimately committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub pr_id: String,
    pub from: PrState,
    pub to: PrState,
    pub agent_id: Option<String>,
    pub reason: Option<String>,
    pub at_ms: u64,
}

/// Arbitrary key/value metadata attached to a commit message (§4.4, §6).
pub type CommitMetadata = Vec<(String, String)>;

/// A validated, not-yet-executed transition plan.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionPlan {
    pub record: TransitionRecord,
    pub rule: TransitionRule,
    pub requires_commit: bool,
    /// Present iff `requires_commit` — the formatted milestone commit message.
    pub commit_message: Option<String>,
    pub commit_metadata: CommitMetadata,
}

/// Final result of a transition attempt, after any required commit has run.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub success: bool,
    pub new_state: PrState,
    pub committed: bool,
    pub transition: TransitionRecord,
}

/// Step 1+2 of §4.4: validate structurally and construct the transition
/// record and (if required) the commit message. Does not touch the event
/// bus or the committer — the caller does that with the returned plan.
pub fn prepare(
    pr_id: &str,
    from: PrState,
    to: PrState,
    agent_id: Option<String>,
    reason: Option<String>,
    now_ms: u64,
) -> Result<TransitionPlan, InvalidTransition> {
    let validation = validate(from, to);
    let Some(rule) = validation.rule.filter(|_| validation.valid) else {
        return Err(InvalidTransition {
            pr_id: pr_id.to_string(),
            from,
            to,
            reason: validation.error.unwrap_or_else(|| "no matching rule".to_string()),
        });
    };

    let record = TransitionRecord {
        pr_id: pr_id.to_string(),
        from,
        to,
        agent_id: agent_id.clone(),
        reason: reason.clone(),
        at_ms: now_ms,
    };

    let (commit_message, commit_metadata) = if rule.requires_commit {
        (Some(format_commit_message(&record, &rule)), build_metadata(&record))
    } else {
        (None, Vec::new())
    };

    Ok(TransitionPlan { record, rule, requires_commit: rule.requires_commit, commit_message, commit_metadata })
}

/// Step 5 of §4.4: given the plan and whether the commit (if any) actually
/// landed, produce the final outcome. A commit failure reverts `new_state`
/// to the original `from` state and marks the transition unsuccessful.
pub fn finalize(plan: &TransitionPlan, commit_succeeded: bool) -> TransitionOutcome {
    if plan.requires_commit && !commit_succeeded {
        return TransitionOutcome {
            success: false,
            new_state: plan.record.from,
            committed: false,
            transition: plan.record.clone(),
        };
    }
    TransitionOutcome {
        success: true,
        new_state: plan.record.to,
        committed: plan.requires_commit,
        transition: plan.record.clone(),
    }
}

fn format_commit_message(record: &TransitionRecord, rule: &TransitionRule) -> String {
    let mut msg = format!("{}: {} \u{2192} {}\n\n{}", record.pr_id, record.from, record.to, rule.description);
    if let Some(reason) = &record.reason {
        msg.push_str(&format!("\n\nReason: {reason}"));
    }
    msg
}

fn build_metadata(record: &TransitionRecord) -> CommitMetadata {
    vec![
        ("From".to_string(), record.from.to_string()),
        ("To".to_string(), record.to.to_string()),
        ("Timestamp".to_string(), record.at_ms.to_string()),
    ]
}
