// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash reconciliation (§4.14, component N): after a daemon restart the
//! cold-store document is ground truth, but the previous process may have
//! crashed mid-write and left the hot store in any of four inconsistent
//! shapes relative to it. `reconcile_after_crash` walks both sides once and
//! repairs each; `validate_consistency` performs the same comparison
//! without mutating anything, for `status --verbose` reporting.

use crate::cold_store::ColdStore;
use crate::error::StorageError;
use crate::hot_ops::HotStoreOps;
use conclave_core::ColdState;
use std::collections::HashSet;
use tracing::{info, instrument, warn};

/// One inconsistency found between the cold document and the hot store
/// (§4.14).
#[derive(Debug, Clone, PartialEq)]
pub enum Discrepancy {
    /// A PR carries a hot state in redis but its cold state is terminal
    /// (`approved`) — the crash happened after the milestone commit
    /// landed but before the hot state was cleared.
    HotStateOnTerminalPr { pr_id: String },
    /// The cold-state cache key disagrees with the document.
    ColdCacheMismatch { pr_id: String, cached: String, actual: ColdState },
    /// The document has a PR with no cold-state cache entry at all.
    MissingColdCache { pr_id: String },
    /// Hot-store keys reference a `pr_id` absent from the document entirely.
    OrphanedPr { pr_id: String },
    /// An agent's heartbeat is older than the staleness window.
    ExpiredHeartbeat { agent_id: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub discrepancies: Vec<Discrepancy>,
    pub cleared_hot_states: usize,
    pub refreshed_cold_caches: usize,
    pub cleared_orphans: usize,
    pub cleared_heartbeats: usize,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

/// Compare the hot store against the cold document and repair every
/// discrepancy found (§4.14 "On daemon startup ... reconcile before
/// accepting work").
#[instrument(skip(cold, hot))]
pub async fn reconcile_after_crash(cold: &ColdStore, hot: &HotStoreOps, now_ms: u64) -> Result<ReconcileReport, StorageError> {
    let mut report = ReconcileReport::default();
    let cold_state = cold.reconstruct_state().await?;
    let valid_ids: HashSet<String> = cold_state.keys().cloned().collect();

    // §4.14: hot state never survives a crash, so every hot state is
    // cleared unconditionally here, not only the ones sitting on a
    // terminal PR (that narrower check belongs to `validate_consistency`,
    // which runs against a live, non-crashed process and treats a hot
    // state on a terminal PR as the anomaly worth flagging).
    let hot_states = hot.get_all_hot_states().await?;
    for (pr_id, pr) in &cold_state {
        if hot_states.contains_key(pr_id) {
            if pr.cold_state.is_terminal() {
                report.discrepancies.push(Discrepancy::HotStateOnTerminalPr { pr_id: pr_id.clone() });
            }
            hot.clear_hot_state(pr_id).await?;
            report.cleared_hot_states += 1;
            warn!(pr_id, "cleared hot state during post-crash reconciliation");
        }

        match hot.read_cold_state_cache(pr_id).await? {
            Some(cached) if cached == pr.cold_state.to_string() => {}
            Some(cached) => {
                report.discrepancies.push(Discrepancy::ColdCacheMismatch { pr_id: pr_id.clone(), cached, actual: pr.cold_state });
                hot.update_cold_state_cache(pr_id, &pr.cold_state.to_string()).await?;
                report.refreshed_cold_caches += 1;
            }
            None => {
                report.discrepancies.push(Discrepancy::MissingColdCache { pr_id: pr_id.clone() });
                hot.update_cold_state_cache(pr_id, &pr.cold_state.to_string()).await?;
                report.refreshed_cold_caches += 1;
            }
        }
    }

    let orphans = hot.clear_orphaned_states(&valid_ids).await?;
    for pr_id in orphans {
        report.discrepancies.push(Discrepancy::OrphanedPr { pr_id });
        report.cleared_orphans += 1;
    }

    let expired_agents = hot.clear_expired_heartbeats(now_ms).await?;
    for agent_id in expired_agents {
        report.discrepancies.push(Discrepancy::ExpiredHeartbeat { agent_id });
        report.cleared_heartbeats += 1;
    }

    info!(
        discrepancies = report.discrepancies.len(),
        cleared_hot_states = report.cleared_hot_states,
        refreshed_cold_caches = report.refreshed_cold_caches,
        cleared_orphans = report.cleared_orphans,
        cleared_heartbeats = report.cleared_heartbeats,
        "crash reconciliation complete"
    );
    Ok(report)
}

/// Read-only counterpart of [`reconcile_after_crash`], used by `status
/// --verbose` to surface drift without repairing it.
#[instrument(skip(cold, hot))]
pub async fn validate_consistency(cold: &ColdStore, hot: &HotStoreOps) -> Result<Vec<Discrepancy>, StorageError> {
    let mut found = Vec::new();
    let cold_state = cold.reconstruct_state().await?;
    let valid_ids: HashSet<String> = cold_state.keys().cloned().collect();
    let hot_states = hot.get_all_hot_states().await?;

    for (pr_id, pr) in &cold_state {
        if hot_states.contains_key(pr_id) && pr.cold_state.is_terminal() {
            found.push(Discrepancy::HotStateOnTerminalPr { pr_id: pr_id.clone() });
        }
        match hot.read_cold_state_cache(pr_id).await? {
            Some(cached) if cached != pr.cold_state.to_string() => {
                found.push(Discrepancy::ColdCacheMismatch { pr_id: pr_id.clone(), cached, actual: pr.cold_state });
            }
            None => found.push(Discrepancy::MissingColdCache { pr_id: pr_id.clone() }),
            _ => {}
        }
    }
    for pr_id in hot_states.keys() {
        if !valid_ids.contains(pr_id) {
            found.push(Discrepancy::OrphanedPr { pr_id: pr_id.clone() });
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{self, file_entry, ColdDocument, PrFrontMatter};
    use conclave_core::{Complexity, FileAction, Priority};
    use conclave_hotstore::fake::FakeHotStore;
    use std::path::Path;
    use std::process::Command as StdCommand;
    use std::sync::Arc;

    fn init_repo() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let run = |args: &[&str]| {
            StdCommand::new("git").args(args).current_dir(&root).env_remove("GIT_DIR").env_remove("GIT_WORK_TREE").output().unwrap();
        };
        run(&["init"]);
        run(&["config", "user.email", "test@example.com"]);
        run(&["config", "user.name", "Test"]);
        (dir, root)
    }

    fn sample_pr(id: &str, state: ColdState) -> PrFrontMatter {
        PrFrontMatter {
            pr_id: id.to_string(),
            title: "Sample".to_string(),
            cold_state: state,
            priority: Priority::Medium,
            complexity: Complexity { score: 1, estimated_minutes: 10, suggested_model: "default".to_string(), rationale: String::new() },
            dependencies: Vec::new(),
            estimated_files: vec![file_entry("src/a.rs", FileAction::Modify, "")],
            actual_files: Vec::new(),
        }
    }

    async fn write_doc(root: &Path, doc_path: &Path, prs: Vec<PrFrontMatter>) {
        let doc = ColdDocument { header: "# Tasks".to_string(), prs, footer: String::new(), display_block: None };
        let text = document::render(&doc).unwrap();
        tokio::fs::write(doc_path, text).await.unwrap();
        let rel = doc_path.strip_prefix(root).unwrap().to_string_lossy().to_string();
        StdCommand::new("git").args(["add", &rel]).current_dir(root).output().unwrap();
        StdCommand::new("git").args(["commit", "-m", "init"]).current_dir(root).output().unwrap();
    }

    #[tokio::test]
    async fn clears_hot_state_left_on_a_terminal_pr() {
        let (_dir, root) = init_repo();
        let doc_path = root.join("task-list.md");
        write_doc(&root, &doc_path, vec![sample_pr("PR-1", ColdState::Approved)]).await;
        let cold = ColdStore::new(&doc_path, &root);
        let hot = HotStoreOps::new(Arc::new(FakeHotStore::new()));
        hot.write_hot_state("PR-1", "under-review", "agt-1", 0).await.unwrap();

        let report = reconcile_after_crash(&cold, &hot, 0).await.unwrap();

        assert_eq!(report.cleared_hot_states, 1);
        assert_eq!(hot.read_hot_state("PR-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn clears_hot_state_left_on_a_non_terminal_pr_too() {
        // §4.14: hot state does not survive a crash regardless of which
        // cold state the PR was in when the process died.
        let (_dir, root) = init_repo();
        let doc_path = root.join("task-list.md");
        write_doc(&root, &doc_path, vec![sample_pr("PR-1", ColdState::Planned)]).await;
        let cold = ColdStore::new(&doc_path, &root);
        let hot = HotStoreOps::new(Arc::new(FakeHotStore::new()));
        hot.write_hot_state("PR-1", "in-progress", "agt-1", 0).await.unwrap();

        let report = reconcile_after_crash(&cold, &hot, 0).await.unwrap();

        assert_eq!(report.cleared_hot_states, 1);
        assert_eq!(hot.read_hot_state("PR-1").await.unwrap(), None);
        assert!(!report.discrepancies.contains(&Discrepancy::HotStateOnTerminalPr { pr_id: "PR-1".to_string() }));
    }

    #[tokio::test]
    async fn refreshes_missing_and_stale_cold_cache_entries() {
        let (_dir, root) = init_repo();
        let doc_path = root.join("task-list.md");
        write_doc(&root, &doc_path, vec![sample_pr("PR-1", ColdState::Ready), sample_pr("PR-2", ColdState::Blocked)]).await;
        let cold = ColdStore::new(&doc_path, &root);
        let hot = HotStoreOps::new(Arc::new(FakeHotStore::new()));
        hot.update_cold_state_cache("PR-2", "ready").await.unwrap();

        let report = reconcile_after_crash(&cold, &hot, 0).await.unwrap();

        assert_eq!(report.refreshed_cold_caches, 2);
        assert_eq!(hot.read_cold_state_cache("PR-1").await.unwrap(), Some("ready".to_string()));
        assert_eq!(hot.read_cold_state_cache("PR-2").await.unwrap(), Some("blocked".to_string()));
    }

    #[tokio::test]
    async fn clears_orphaned_pr_left_over_from_a_removed_task() {
        let (_dir, root) = init_repo();
        let doc_path = root.join("task-list.md");
        write_doc(&root, &doc_path, vec![sample_pr("PR-1", ColdState::Ready)]).await;
        let cold = ColdStore::new(&doc_path, &root);
        let hot = HotStoreOps::new(Arc::new(FakeHotStore::new()));
        hot.update_cold_state_cache("PR-99", "ready").await.unwrap();

        let report = reconcile_after_crash(&cold, &hot, 0).await.unwrap();

        assert_eq!(report.cleared_orphans, 1);
        assert!(report.discrepancies.contains(&Discrepancy::OrphanedPr { pr_id: "PR-99".to_string() }));
    }

    #[tokio::test]
    async fn clean_state_reports_no_discrepancies() {
        let (_dir, root) = init_repo();
        let doc_path = root.join("task-list.md");
        write_doc(&root, &doc_path, vec![sample_pr("PR-1", ColdState::Ready)]).await;
        let cold = ColdStore::new(&doc_path, &root);
        let hot = HotStoreOps::new(Arc::new(FakeHotStore::new()));
        hot.update_cold_state_cache("PR-1", "ready").await.unwrap();

        let report = reconcile_after_crash(&cold, &hot, 0).await.unwrap();
        assert!(report.is_clean());
    }
}
