// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The canonical cold-store document (§6 "Cold store document"): a single
//! text file with a free-form header, one `---`/`---` fenced TOML block per
//! PR, and a `<!-- HOT STATE DISPLAY -->`/`<!-- END HOT STATE DISPLAY -->`
//! block rewritten in place by the periodic display sync.
//!
//! Parsing/rendering is a pure, I/O-free round trip; [`crate::cold_store`]
//! is the layer that reads/writes the file and drives git commits.

use crate::error::StorageError;
use conclave_core::{ColdState, Complexity, FileAction, FileEntry, Priority};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const DISPLAY_BLOCK_START: &str = "<!-- HOT STATE DISPLAY -->";
pub const DISPLAY_BLOCK_END: &str = "<!-- END HOT STATE DISPLAY -->";

/// TOML-serializable mirror of the cold fields of [`conclave_core::Pr`].
/// The hot-store cache and hot state never round-trip through this
/// document — only cold fields do (§3: "only cold states survive a
/// crash").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrFrontMatter {
    pub pr_id: String,
    pub title: String,
    pub cold_state: ColdState,
    pub priority: Priority,
    pub complexity: Complexity,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub estimated_files: Vec<FileEntry>,
    #[serde(default)]
    pub actual_files: Vec<FileEntry>,
}

impl PrFrontMatter {
    pub fn files(&self) -> HashSet<&str> {
        let source = if self.actual_files.is_empty() { &self.estimated_files } else { &self.actual_files };
        source.iter().map(|f| f.path.as_str()).collect()
    }
}

/// Lift a parsed frontmatter block into the in-engine `Pr` the
/// dependency graph, scheduler, and assignment manager operate on.
/// `hot_state`/`held_leases`/`assigned_agent` are always empty — those are
/// hot-store-only fields that never round-trip through the document.
impl From<&PrFrontMatter> for conclave_core::Pr {
    fn from(fm: &PrFrontMatter) -> Self {
        let mut pr = conclave_core::Pr::new(conclave_core::PrId::from_string(&fm.pr_id), fm.title.clone(), fm.priority, fm.complexity.clone());
        pr.cold_state = fm.cold_state;
        pr.dependencies = fm.dependencies.iter().map(|d| conclave_core::PrId::from_string(d)).collect();
        pr.estimated_files = fm.estimated_files.clone();
        pr.actual_files = fm.actual_files.clone();
        pr
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColdDocument {
    /// Free-form text preceding the first PR block (orchestration metadata,
    /// human-facing description). Preserved verbatim.
    pub header: String,
    pub prs: Vec<PrFrontMatter>,
    /// Free-form text between the last PR block and the display block (or
    /// end of document if there is none). Usually empty.
    pub footer: String,
    /// Raw content of the display block, if present, excluding the markers.
    pub display_block: Option<String>,
}

impl ColdDocument {
    pub fn pr(&self, pr_id: &str) -> Option<&PrFrontMatter> {
        self.prs.iter().find(|p| p.pr_id == pr_id)
    }

    pub fn pr_mut(&mut self, pr_id: &str) -> Option<&mut PrFrontMatter> {
        self.prs.iter_mut().find(|p| p.pr_id == pr_id)
    }
}

/// Parse a cold-store document (§6). Extracts the display block first (by
/// its HTML-comment markers) so fence-splitting never sees its contents,
/// then splits the remainder on `---` fence lines.
pub fn parse(text: &str) -> Result<ColdDocument, StorageError> {
    let (body, display_block) = extract_display_block(text)?;

    let mut prs = Vec::new();
    let mut header_lines: Vec<&str> = Vec::new();
    let mut footer_lines: Vec<&str> = Vec::new();
    let mut in_block = false;
    let mut block_lines: Vec<&str> = Vec::new();
    let mut seen_any_block = false;

    for line in body.lines() {
        if line.trim() == "---" {
            if in_block {
                let toml_text = block_lines.join("\n");
                let fm: PrFrontMatter = toml::from_str(&toml_text)
                    .map_err(|e| StorageError::DocumentParse(format!("PR block: {e}")))?;
                prs.push(fm);
                block_lines.clear();
                in_block = false;
                seen_any_block = true;
            } else {
                in_block = true;
            }
            continue;
        }
        if in_block {
            block_lines.push(line);
        } else if seen_any_block {
            footer_lines.push(line);
        } else {
            header_lines.push(line);
        }
    }

    if in_block {
        return Err(StorageError::DocumentParse("unterminated PR fence block".to_string()));
    }

    let mut ids = HashSet::new();
    for pr in &prs {
        if !ids.insert(pr.pr_id.clone()) {
            return Err(StorageError::DocumentParse(format!("duplicate pr_id: {}", pr.pr_id)));
        }
    }

    Ok(ColdDocument {
        header: header_lines.join("\n"),
        prs,
        footer: footer_lines.join("\n"),
        display_block,
    })
}

fn extract_display_block(text: &str) -> Result<(String, Option<String>), StorageError> {
    let Some(start) = text.find(DISPLAY_BLOCK_START) else {
        return Ok((text.to_string(), None));
    };
    let after_start = start + DISPLAY_BLOCK_START.len();
    let Some(end_rel) = text[after_start..].find(DISPLAY_BLOCK_END) else {
        return Err(StorageError::DocumentParse("unterminated HOT STATE DISPLAY block".to_string()));
    };
    let end = after_start + end_rel;
    let content = text[after_start..end].trim_matches('\n').to_string();
    let mut body = String::with_capacity(text.len());
    body.push_str(&text[..start]);
    body.push_str(&text[end + DISPLAY_BLOCK_END.len()..]);
    Ok((body, Some(content)))
}

/// Render a document back to text. Each PR block is re-serialized from its
/// (possibly mutated) frontmatter, so a commit always reflects the current
/// in-memory state rather than a text patch.
pub fn render(doc: &ColdDocument) -> Result<String, StorageError> {
    let mut out = String::new();
    out.push_str(doc.header.trim_end_matches('\n'));
    out.push('\n');
    for pr in &doc.prs {
        let toml_text = toml::to_string_pretty(pr).map_err(|e| StorageError::DocumentParse(e.to_string()))?;
        out.push_str("\n---\n");
        out.push_str(&toml_text);
        out.push_str("---\n");
    }
    if !doc.footer.trim().is_empty() {
        out.push_str(doc.footer.trim_end_matches('\n'));
        out.push('\n');
    }
    if let Some(block) = &doc.display_block {
        out.push('\n');
        out.push_str(DISPLAY_BLOCK_START);
        out.push('\n');
        out.push_str(block.trim_matches('\n'));
        out.push('\n');
        out.push_str(DISPLAY_BLOCK_END);
        out.push('\n');
    }
    Ok(out)
}

pub fn file_entry(path: impl Into<String>, action: FileAction, description: impl Into<String>) -> FileEntry {
    FileEntry { path: path.into(), action, description: description.into() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_doc() -> String {
        r#"# Task List

Orchestration metadata lives here.

---
pr_id = "PR-001"
title = "Add widget"
cold_state = "ready"
priority = "medium"
dependencies = []

[complexity]
score = 3
estimated_minutes = 30
suggested_model = "default"
rationale = ""

[[estimated_files]]
path = "src/a.rs"
action = "modify"
description = ""
---
"#
        .to_string()
    }

    #[test]
    fn parses_header_and_single_pr_block() {
        let doc = parse(&sample_doc()).unwrap();
        assert!(doc.header.contains("Task List"));
        assert_eq!(doc.prs.len(), 1);
        assert_eq!(doc.prs[0].pr_id, "PR-001");
        assert_eq!(doc.prs[0].cold_state, ColdState::Ready);
    }

    #[test]
    fn round_trip_preserves_pr_fields_modulo_whitespace() {
        let original = sample_doc();
        let doc = parse(&original).unwrap();
        let rendered = render(&doc).unwrap();
        let reparsed = parse(&rendered).unwrap();
        assert_eq!(doc.prs, reparsed.prs);
    }

    #[test]
    fn duplicate_pr_id_is_rejected() {
        let text = format!("{}\n{}", sample_doc(), sample_doc());
        let err = parse(&text).unwrap_err();
        assert!(matches!(err, StorageError::DocumentParse(_)));
    }

    #[test]
    fn display_block_round_trips_and_is_excluded_from_fence_scan() {
        let mut text = sample_doc();
        text.push_str("\n<!-- HOT STATE DISPLAY -->\nPR-001: in-progress (agt-1)\n<!-- END HOT STATE DISPLAY -->\n");
        let doc = parse(&text).unwrap();
        assert_eq!(doc.prs.len(), 1);
        assert_eq!(doc.display_block.as_deref(), Some("PR-001: in-progress (agt-1)"));

        let rendered = render(&doc).unwrap();
        assert!(rendered.contains(DISPLAY_BLOCK_START));
        let reparsed = parse(&rendered).unwrap();
        assert_eq!(reparsed.display_block, doc.display_block);
    }

    #[test]
    fn unterminated_fence_is_a_parse_error() {
        let text = "header\n---\npr_id = \"PR-1\"\n";
        let err = parse(text).unwrap_err();
        assert!(matches!(err, StorageError::DocumentParse(_)));
    }

    mod properties {
        use super::*;
        use conclave_core::test_support::strategies::{arb_cold_state, arb_file_entry, arb_priority};
        use proptest::prelude::*;

        fn arb_front_matter(id: String) -> impl Strategy<Value = PrFrontMatter> {
            (arb_cold_state(), arb_priority(), proptest::collection::vec(arb_file_entry(), 0..4)).prop_map(
                move |(cold_state, priority, estimated_files)| PrFrontMatter {
                    pr_id: id.clone(),
                    title: format!("PR {id}"),
                    cold_state,
                    priority,
                    complexity: Complexity { score: 3, estimated_minutes: 30, suggested_model: "default".to_string(), rationale: String::new() },
                    dependencies: Vec::new(),
                    estimated_files,
                    actual_files: Vec::new(),
                },
            )
        }

        proptest! {
            // §8: parseTaskList(write(parseTaskList(doc))) == parseTaskList(doc) modulo whitespace.
            #[test]
            fn parse_render_parse_round_trips(fm in arb_front_matter("PR-001".to_string())) {
                let doc = ColdDocument { header: "# Task List".to_string(), prs: vec![fm], footer: String::new(), display_block: None };
                let rendered = render(&doc).unwrap();
                let reparsed = parse(&rendered).unwrap();
                prop_assert_eq!(doc.prs, reparsed.prs);
            }
        }
    }
}
