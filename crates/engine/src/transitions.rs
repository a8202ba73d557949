// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The I/O-bearing half of the state machine (component D): wires the pure
//! `conclave_core::state_machine` planner to the event bus and the cold
//! committer, preserving §5's ordering guarantee — event emission
//! happens-before the cold commit, and a commit failure rolls the
//! transition back with no visible state change.

use crate::events::EventSink;
use conclave_core::state_machine::{finalize, prepare, InvalidTransition, TransitionOutcome};
use conclave_core::{ColdState, Event, PrState};
use conclave_storage::{finalize_commit_message, ColdStore, StorageError};
use std::sync::Arc;
use tracing::{info, instrument};

/// Applying a transition fails either because it was structurally invalid
/// (never reached the committer) or because the required cold commit
/// failed (§7 `CommitFailure`).
#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error(transparent)]
    Invalid(#[from] InvalidTransition),
    #[error("commit failed for {pr_id}: {source}")]
    Commit { pr_id: String, #[source] source: StorageError },
}

/// Runtime glue for component D (§4.4). Holds the cold store (L) and the
/// event sink; has no state of its own beyond those two handles.
pub struct TransitionRunner {
    cold: Arc<ColdStore>,
    events: Arc<EventSink>,
}

impl TransitionRunner {
    pub fn new(cold: Arc<ColdStore>, events: Arc<EventSink>) -> Self {
        Self { cold, events }
    }

    /// Validate, emit, commit (if required), and finalize a single
    /// transition (§4.4 steps 1-5).
    #[instrument(skip(self, reason), fields(pr_id, %from, %to))]
    pub async fn apply(
        &self,
        pr_id: &str,
        from: PrState,
        to: PrState,
        agent_id: Option<String>,
        reason: Option<String>,
        now_ms: u64,
    ) -> Result<TransitionOutcome, TransitionError> {
        let plan = prepare(pr_id, from, to, agent_id.clone(), reason, now_ms)?;

        // Step 3: emit before the commit, so observers see the intent even
        // if the commit subsequently fails.
        self.events
            .emit(
                Event::StateTransitioned {
                    pr_id: pr_id.to_string(),
                    from,
                    to,
                    agent_id: agent_id.clone(),
                    committed: plan.requires_commit,
                    at_ms: now_ms,
                },
                now_ms,
            )
            .await;

        let commit_succeeded = if plan.requires_commit {
            // Every committing transition's target is cold by construction
            // (§4.4: "any transition whose target is a cold state requires
            // a commit"), so `to` always unwraps to a `ColdState` here.
            let Some(new_cold_state) = to.as_cold() else {
                return Err(TransitionError::Commit {
                    pr_id: pr_id.to_string(),
                    source: StorageError::DocumentParse(format!("commit-required transition to non-cold state {to}")),
                });
            };
            // §6: every landed milestone commit carries the full
            // `Agent:`/`Metadata:` sections on top of the core planner's
            // simpler `<pr_id>: <from> -> <to>` + description/reason form.
            let base_message = plan.commit_message.as_deref().unwrap_or_default();
            let full_message = finalize_commit_message(base_message, agent_id.as_deref(), &plan.commit_metadata);
            match self.commit(pr_id, new_cold_state, &full_message).await {
                Ok(()) => true,
                Err(e) => {
                    return Err(TransitionError::Commit { pr_id: pr_id.to_string(), source: e });
                }
            }
        } else {
            false
        };

        let outcome = finalize(&plan, commit_succeeded);
        info!(success = outcome.success, committed = outcome.committed, "transition applied");
        Ok(outcome)
    }

    async fn commit(&self, pr_id: &str, new_cold_state: ColdState, message: &str) -> Result<(), StorageError> {
        self.cold.commit(pr_id, new_cold_state, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_core::HotState;
    use conclave_hotstore::fake::FakeHotStore;

    fn runner(repo_root: &std::path::Path) -> TransitionRunner {
        let store: Arc<dyn conclave_hotstore::HotStore> = Arc::new(FakeHotStore::new());
        let events = Arc::new(EventSink::new(store));
        let cold = Arc::new(ColdStore::new("docs/task-list.md", repo_root.to_path_buf()));
        TransitionRunner::new(cold, events)
    }

    fn init_repo(dir: &std::path::Path) {
        std::fs::create_dir_all(dir.join("docs")).unwrap();
        std::fs::write(
            dir.join("docs/task-list.md"),
            "# Task List\n\n---\npr_id = \"PR-001\"\ntitle = \"Widget\"\ncold_state = \"ready\"\npriority = \"medium\"\ndependencies = []\n\n[complexity]\nscore = 3\nestimated_minutes = 30\nsuggested_model = \"default\"\nrationale = \"\"\n---\n",
        )
        .unwrap();
        std::process::Command::new("git").arg("init").current_dir(dir).output().unwrap();
        std::process::Command::new("git").args(["config", "user.email", "test@example.com"]).current_dir(dir).output().unwrap();
        std::process::Command::new("git").args(["config", "user.name", "test"]).current_dir(dir).output().unwrap();
        std::process::Command::new("git").args(["add", "."]).current_dir(dir).output().unwrap();
        std::process::Command::new("git").args(["commit", "-m", "init"]).current_dir(dir).output().unwrap();
    }

    #[tokio::test]
    async fn hot_to_hot_transition_applies_without_committing() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let runner = runner(dir.path());
        let outcome = runner
            .apply("PR-001", PrState::Hot(HotState::Investigating), PrState::Hot(HotState::Planning), Some("agt-1".to_string()), None, 0)
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(!outcome.committed);
    }

    #[tokio::test]
    async fn milestone_transition_commits_to_the_cold_store() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let runner = runner(dir.path());
        let outcome = runner
            .apply("PR-001", PrState::Hot(HotState::InProgress), PrState::Cold(ColdState::Completed), Some("agt-1".to_string()), None, 0)
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(outcome.committed);
        assert_eq!(outcome.new_state, PrState::Cold(ColdState::Completed));

        let doc = runner.cold.load_task_list().await.unwrap();
        assert_eq!(doc.pr("PR-001").unwrap().cold_state, ColdState::Completed);
    }

    #[tokio::test]
    async fn milestone_commit_message_carries_agent_and_metadata_sections() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let runner = runner(dir.path());
        runner
            .apply("PR-001", PrState::Hot(HotState::InProgress), PrState::Cold(ColdState::Completed), Some("agt-1".to_string()), None, 1000)
            .await
            .unwrap();

        let log = std::process::Command::new("git").args(["log", "-1", "--pretty=%B"]).current_dir(dir.path()).output().unwrap();
        let message = String::from_utf8_lossy(&log.stdout);
        assert!(message.contains("Agent: agt-1"), "commit message missing Agent section: {message}");
        assert!(message.contains("Metadata:"), "commit message missing Metadata section: {message}");
        assert!(message.contains("- From: in-progress"), "commit message missing From metadata: {message}");
        assert!(message.contains("- To: completed"), "commit message missing To metadata: {message}");
    }

    #[tokio::test]
    async fn invalid_transition_never_reaches_the_committer() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let runner = runner(dir.path());
        let err = runner
            .apply("PR-001", PrState::Cold(ColdState::New), PrState::Cold(ColdState::Approved), None, None, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::Invalid(_)));
    }
}
