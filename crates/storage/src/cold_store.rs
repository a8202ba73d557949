// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cold-store operations (§4.12, component L): parse/update the canonical
//! task-list document and commit milestones to the backing git repository.
//!
//! `commit` is the committer interface the state machine's engine-side glue
//! calls when a transition requires one (§4.4 step 4); `commit_display_sync`
//! is the periodic 30s flush (§4.15), guarded by `has_recent_commit` so a
//! milestone commit always wins a race with a display sync (§5, §9).

use crate::document::{self, ColdDocument, PrFrontMatter};
use crate::error::StorageError;
use conclave_core::ColdState;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{info, instrument, warn};

/// A cold-only snapshot of a PR's state, as reconstructed from the document
/// (§4.12 `reconstructState`): only cold fields populated, lease/hot fields
/// always empty.
#[derive(Debug, Clone, PartialEq)]
pub struct PrColdState {
    pub pr_id: String,
    pub title: String,
    pub cold_state: ColdState,
    pub dependencies: Vec<String>,
    pub files: Vec<String>,
}

impl From<&PrFrontMatter> for PrColdState {
    fn from(fm: &PrFrontMatter) -> Self {
        Self {
            pr_id: fm.pr_id.clone(),
            title: fm.title.clone(),
            cold_state: fm.cold_state,
            dependencies: fm.dependencies.clone(),
            files: fm.files().into_iter().map(str::to_string).collect(),
        }
    }
}

/// One hot-state row as rendered into the periodic display-sync block
/// (§4.12 `commitDisplaySync`, §6 commit message format).
#[derive(Debug, Clone)]
pub struct DisplayUpdate {
    pub pr_id: String,
    pub hot_state: String,
    pub agent_id: Option<String>,
}

/// Handle on the canonical task-list document and its backing git repo.
///
/// Writes are serialised per-process by the internal mutex (§5 "The
/// cold-store document is a single file; all writes route through (L)
/// which serialises them per process").
pub struct ColdStore {
    doc_path: PathBuf,
    repo_root: PathBuf,
    last_commit_at: Mutex<Option<Instant>>,
}

impl ColdStore {
    pub fn new(doc_path: impl Into<PathBuf>, repo_root: impl Into<PathBuf>) -> Self {
        Self { doc_path: doc_path.into(), repo_root: repo_root.into(), last_commit_at: Mutex::new(None) }
    }

    pub fn doc_path(&self) -> &Path {
        &self.doc_path
    }

    /// Read and validate the task-list document (§4.12 `loadTaskList`).
    #[instrument(skip(self))]
    pub async fn load_task_list(&self) -> Result<ColdDocument, StorageError> {
        let text = tokio::fs::read_to_string(&self.doc_path).await?;
        document::parse(&text)
    }

    /// `reconstructState`: cold fields only, no lease/hot fields (§4.12).
    pub async fn reconstruct_state(&self) -> Result<HashMap<String, PrColdState>, StorageError> {
        let doc = self.load_task_list().await?;
        Ok(doc.prs.iter().map(|fm| (fm.pr_id.clone(), PrColdState::from(fm))).collect())
    }

    /// Has a commit (milestone or display sync) landed within `window`?
    /// Used by the 5s `hasRecentCommit` guard (§4.12, §9).
    pub fn has_recent_commit(&self, window: Duration) -> bool {
        match *self.last_commit_at.lock().unwrap_or_else(|e| e.into_inner()) {
            Some(at) => at.elapsed() < window,
            None => false,
        }
    }

    fn record_commit(&self) {
        *self.last_commit_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }

    /// The committer the state machine calls when a transition requires one
    /// (§4.4 step 4). Rewrites the PR's cold_state in the document, stages
    /// it, and records a repository commit with `message`.
    #[instrument(skip(self, message), fields(pr_id = %pr_id, to = %new_cold_state))]
    pub async fn commit(&self, pr_id: &str, new_cold_state: ColdState, message: &str) -> Result<(), StorageError> {
        let mut doc = self.load_task_list().await?;
        let pr = doc
            .pr_mut(pr_id)
            .ok_or_else(|| StorageError::CommitFailed(format!("unknown pr_id: {pr_id}")))?;
        pr.cold_state = new_cold_state;
        let rendered = document::render(&doc)?;
        tokio::fs::write(&self.doc_path, rendered).await?;
        self.git_commit(message).await?;
        self.record_commit();
        info!("milestone commit landed");
        Ok(())
    }

    /// Periodic flush of the hot-state snapshot into the display block
    /// (§4.12, §4.15). Deferred (not failed) when a milestone commit landed
    /// within the last 5s.
    #[instrument(skip(self, updates))]
    pub async fn commit_display_sync(&self, updates: &[DisplayUpdate]) -> Result<(), StorageError> {
        if self.has_recent_commit(Duration::from_secs(5)) {
            warn!("skipping display sync, a milestone commit landed recently");
            return Ok(());
        }
        if updates.is_empty() {
            return Ok(());
        }
        let mut doc = self.load_task_list().await?;
        doc.display_block = Some(render_display_block(updates));
        let rendered = document::render(&doc)?;
        tokio::fs::write(&self.doc_path, rendered).await?;
        let message = format_display_sync_message(updates);
        self.git_commit(&message).await?;
        self.record_commit();
        Ok(())
    }

    async fn git_commit(&self, message: &str) -> Result<(), StorageError> {
        let rel = self
            .doc_path
            .strip_prefix(&self.repo_root)
            .unwrap_or(&self.doc_path)
            .to_string_lossy()
            .to_string();
        let add = run_git(&self.repo_root, &["add", &rel]).await?;
        if !add.status.success() {
            return Err(StorageError::CommitFailed(format!("git add failed: {}", stderr(&add))));
        }
        let commit = run_git(&self.repo_root, &["commit", "-m", message]).await?;
        if !commit.status.success() {
            return Err(StorageError::CommitFailed(format!("git commit failed: {}", stderr(&commit))));
        }
        Ok(())
    }
}

async fn run_git(repo_root: &Path, args: &[&str]) -> Result<std::process::Output, StorageError> {
    Command::new("git")
        .args(args)
        .current_dir(repo_root)
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE")
        .output()
        .await
        .map_err(StorageError::Io)
}

fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

/// Build the `<!-- HOT STATE DISPLAY -->` block body (§4.12, §6).
fn render_display_block(updates: &[DisplayUpdate]) -> String {
    let mut lines = Vec::with_capacity(updates.len());
    for u in updates {
        match &u.agent_id {
            Some(agent) => lines.push(format!("- {}: {} ({})", u.pr_id, u.hot_state, agent)),
            None => lines.push(format!("- {}: {}", u.pr_id, u.hot_state)),
        }
    }
    lines.join("\n")
}

/// §6: `[Display Sync] Update hot state visibility\n\nUpdated display for:\n- <pr_id>: <hot_state> (<agent>)…`
fn format_display_sync_message(updates: &[DisplayUpdate]) -> String {
    let mut msg = String::from("[Display Sync] Update hot state visibility\n\nUpdated display for:\n");
    msg.push_str(&render_display_block(updates));
    msg
}

/// Append the §6 "Agent/Reason/Metadata" sections to the base message the
/// core state machine already formatted (§4.4's simpler form), producing
/// the fuller milestone commit message.
pub fn finalize_commit_message(
    base_message: &str,
    agent_id: Option<&str>,
    metadata: &[(String, String)],
) -> String {
    let mut msg = base_message.to_string();
    if let Some(agent) = agent_id {
        msg.push_str(&format!("\n\nAgent: {agent}"));
    }
    if !metadata.is_empty() {
        msg.push_str("\nMetadata:");
        for (k, v) in metadata {
            msg.push_str(&format!("\n- {k}: {v}"));
        }
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_core::{Complexity, Priority};
    use std::process::Command as StdCommand;

    fn init_repo() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let run = |args: &[&str]| {
            let out = StdCommand::new("git")
                .args(args)
                .current_dir(&root)
                .env_remove("GIT_DIR")
                .env_remove("GIT_WORK_TREE")
                .output()
                .unwrap();
            assert!(out.status.success(), "git {:?} failed: {}", args, String::from_utf8_lossy(&out.stderr));
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
            complexity: Complexity { score: 2, estimated_minutes: 20, suggested_model: "default".to_string(), rationale: String::new() },
            dependencies: Vec::new(),
            estimated_files: vec![document::file_entry("src/a.rs", conclave_core::FileAction::Modify, "")],
            actual_files: Vec::new(),
        }
    }

    async fn write_initial_doc(root: &Path, doc_path: &Path) {
        let doc = ColdDocument { header: "# Tasks".to_string(), prs: vec![sample_pr("PR-001", ColdState::Ready)], footer: String::new(), display_block: None };
        let text = document::render(&doc).unwrap();
        tokio::fs::write(doc_path, text).await.unwrap();
        let rel = doc_path.strip_prefix(root).unwrap().to_string_lossy().to_string();
        StdCommand::new("git").args(["add", &rel]).current_dir(root).output().unwrap();
        StdCommand::new("git").args(["commit", "-m", "init"]).current_dir(root).output().unwrap();
    }

    #[tokio::test]
    async fn commit_rewrites_cold_state_and_lands_a_commit() {
        let (_dir, root) = init_repo();
        let doc_path = root.join("task-list.md");
        write_initial_doc(&root, &doc_path).await;

        let store = ColdStore::new(&doc_path, &root);
        store.commit("PR-001", ColdState::Planned, "PR-001: ready -> planned").await.unwrap();

        let state = store.reconstruct_state().await.unwrap();
        assert_eq!(state["PR-001"].cold_state, ColdState::Planned);
        assert!(store.has_recent_commit(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn display_sync_is_skipped_after_a_recent_milestone_commit() {
        let (_dir, root) = init_repo();
        let doc_path = root.join("task-list.md");
        write_initial_doc(&root, &doc_path).await;

        let store = ColdStore::new(&doc_path, &root);
        store.commit("PR-001", ColdState::Planned, "milestone").await.unwrap();

        let updates = vec![DisplayUpdate { pr_id: "PR-001".to_string(), hot_state: "in-progress".to_string(), agent_id: Some("agt-1".to_string()) }];
        store.commit_display_sync(&updates).await.unwrap();

        let doc = store.load_task_list().await.unwrap();
        assert!(doc.display_block.is_none(), "display sync should have been deferred by the recent-commit guard");
    }

    #[test]
    fn finalize_commit_message_appends_agent_and_metadata() {
        let base = "PR-001: ready -> planned\n\nSome description";
        let msg = finalize_commit_message(base, Some("agt-1"), &[("From".to_string(), "ready".to_string())]);
        assert!(msg.contains("Agent: agt-1"));
        assert!(msg.contains("- From: ready"));
    }
}
