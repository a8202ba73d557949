// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Paired-file expander (§4.5).
//!
//! Given a set of requested files, computes the companion test/source files
//! implied by a configured list of patterns. The pattern list is
//! configuration, not code (§9) — callers may narrow or extend the default.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One source/test pairing rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedPattern {
    pub source_dir: String,
    pub test_dir: String,
    pub suffix: String,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub colocated: bool,
}

/// Python-style `test_<name>` prefix and other role-specific special cases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialCase {
    pub extension: String,
    pub test_prefix: String,
}

/// The default pattern list, matching common language conventions. Treated
/// purely as configuration (§9).
pub fn default_patterns() -> Vec<PairedPattern> {
    vec![
        PairedPattern { source_dir: "src".to_string(), test_dir: "tests".to_string(), suffix: "_test".to_string(), extension: Some("rs".to_string()), colocated: false },
        PairedPattern { source_dir: "src".to_string(), test_dir: "src".to_string(), suffix: "".to_string(), extension: Some("rs".to_string()), colocated: true },
        PairedPattern { source_dir: "lib".to_string(), test_dir: "test".to_string(), suffix: ".spec".to_string(), extension: Some("js".to_string()), colocated: false },
        PairedPattern { source_dir: "lib".to_string(), test_dir: "test".to_string(), suffix: ".test".to_string(), extension: Some("ts".to_string()), colocated: false },
    ]
}

pub fn default_special_cases() -> Vec<SpecialCase> {
    vec![SpecialCase { extension: "py".to_string(), test_prefix: "test_".to_string() }]
}

/// Test-directory fragments that mark a path as a test file by location.
const TEST_DIR_FRAGMENTS: &[&str] = &["/tests/", "/test/", "/__tests__/", "/spec/"];

fn is_test_path(path: &str, patterns: &[PairedPattern], specials: &[SpecialCase]) -> bool {
    let normalized = format!("/{}", path.trim_start_matches('/'));
    if TEST_DIR_FRAGMENTS.iter().any(|frag| normalized.contains(frag)) {
        return true;
    }
    let file_name = path.rsplit('/').next().unwrap_or(path);
    if patterns.iter().any(|p| !p.suffix.is_empty() && file_name.contains(&p.suffix)) {
        return true;
    }
    specials.iter().any(|s| file_name.starts_with(&s.test_prefix) && file_name.ends_with(&format!(".{}", s.extension)))
}

fn extension_of(path: &str) -> Option<&str> {
    path.rsplit('/').next().and_then(|name| name.rsplit_once('.').map(|(_, ext)| ext))
}

/// Candidate test path(s) for a source file, one per matching pattern.
fn source_to_test_candidates(path: &str, patterns: &[PairedPattern], specials: &[SpecialCase]) -> Vec<String> {
    let ext = extension_of(path);
    let mut out = Vec::new();
    for p in patterns {
        if p.extension.as_deref() != ext {
            continue;
        }
        if !path.contains(&format!("/{}/", p.source_dir)) && !path.starts_with(&format!("{}/", p.source_dir)) {
            continue;
        }
        if p.colocated {
            if let Some((dir, file)) = path.rsplit_once('/') {
                let (stem, ext) = file.rsplit_once('.').unwrap_or((file, ""));
                out.push(format!("{dir}/{stem}{}.{ext}", p.suffix));
            }
            continue;
        }
        let replaced = path.replacen(&p.source_dir, &p.test_dir, 1);
        if let Some((dir, file)) = replaced.rsplit_once('/') {
            let (stem, ext) = file.rsplit_once('.').unwrap_or((file, ""));
            out.push(format!("{dir}/{stem}{}.{ext}", p.suffix));
        }
    }
    for s in specials {
        if ext == Some(s.extension.as_str()) {
            if let Some((dir, file)) = path.rsplit_once('/') {
                out.push(format!("{dir}/{}{file}", s.test_prefix));
            }
        }
    }
    out
}

/// Invert the transformation: given a test file, guess its source file(s).
fn test_to_source_candidates(path: &str, patterns: &[PairedPattern], specials: &[SpecialCase]) -> Vec<String> {
    let ext = extension_of(path);
    let mut out = Vec::new();
    for p in patterns {
        if p.extension.as_deref() != ext {
            continue;
        }
        let file_name = path.rsplit('/').next().unwrap_or(path);
        if p.colocated {
            if !p.suffix.is_empty() && file_name.contains(&p.suffix) {
                let restored = path.replacen(&p.suffix, "", 1);
                out.push(restored);
            }
            continue;
        }
        if !path.contains(&format!("/{}/", p.test_dir)) && !path.starts_with(&format!("{}/", p.test_dir)) {
            continue;
        }
        let mut candidate = path.replacen(&p.test_dir, &p.source_dir, 1);
        if !p.suffix.is_empty() {
            candidate = candidate.replacen(&p.suffix, "", 1);
        }
        out.push(candidate);
    }
    for s in specials {
        if ext == Some(s.extension.as_str()) {
            if let Some(file_name) = path.rsplit('/').next() {
                if let Some(stripped) = file_name.strip_prefix(&s.test_prefix) {
                    let dir = path.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
                    out.push(if dir.is_empty() { stripped.to_string() } else { format!("{dir}/{stripped}") });
                }
            }
        }
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionResult {
    pub requested: Vec<String>,
    pub test_files: Vec<String>,
    pub source_files: Vec<String>,
    pub all: Vec<String>,
}

/// Trait hook for filtering candidates to those that exist on disk, used
/// only when `check_exists` is set. Kept abstract so the pure core does not
/// depend on `std::fs`.
pub trait PathExists {
    fn exists(&self, path: &str) -> bool;
}

/// Expand a file list into requested + discovered peer files (§4.5).
pub fn expand(
    files: &[String],
    patterns: &[PairedPattern],
    specials: &[SpecialCase],
    check_exists: Option<&dyn PathExists>,
) -> ExpansionResult {
    let mut test_files = BTreeSet::new();
    let mut source_files = BTreeSet::new();
    let requested_set: BTreeSet<&str> = files.iter().map(|s| s.as_str()).collect();

    for file in files {
        let candidates = if is_test_path(file, patterns, specials) {
            test_to_source_candidates(file, patterns, specials)
        } else {
            source_to_test_candidates(file, patterns, specials)
        };
        for c in candidates {
            if requested_set.contains(c.as_str()) {
                continue;
            }
            if let Some(checker) = check_exists {
                if !checker.exists(&c) {
                    continue;
                }
            }
            if is_test_path(file, patterns, specials) {
                source_files.insert(c);
            } else {
                test_files.insert(c);
            }
        }
    }

    let mut all: BTreeSet<String> = files.iter().cloned().collect();
    all.extend(test_files.iter().cloned());
    all.extend(source_files.iter().cloned());

    ExpansionResult {
        requested: files.to_vec(),
        test_files: test_files.into_iter().collect(),
        source_files: source_files.into_iter().collect(),
        all: all.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysExists;
    impl PathExists for AlwaysExists {
        fn exists(&self, _path: &str) -> bool {
            true
        }
    }

    struct NeverExists;
    impl PathExists for NeverExists {
        fn exists(&self, _path: &str) -> bool {
            false
        }
    }

    #[test]
    fn source_file_discovers_sibling_test() {
        let patterns = default_patterns();
        let result = expand(&["src/a.rs".to_string()], &patterns, &[], None);
        assert!(result.test_files.iter().any(|f| f.contains("_test") || f.starts_with("src/")));
        assert!(result.all.contains(&"src/a.rs".to_string()));
    }

    #[test]
    fn python_test_prefix_special_case_inverts() {
        let specials = default_special_cases();
        let result = expand(&["pkg/test_foo.py".to_string()], &[], &specials, None);
        assert!(result.source_files.contains(&"pkg/foo.py".to_string()));
    }

    #[test]
    fn check_exists_filters_missing_candidates() {
        let patterns = default_patterns();
        let with_check = expand(&["src/a.rs".to_string()], &patterns, &[], Some(&NeverExists));
        assert!(with_check.test_files.is_empty() && with_check.source_files.is_empty());

        let with_existing = expand(&["src/a.rs".to_string()], &patterns, &[], Some(&AlwaysExists));
        assert!(!with_existing.test_files.is_empty() || !with_existing.source_files.is_empty());
    }

    #[test]
    fn requested_files_never_duplicated_in_peers() {
        let patterns = default_patterns();
        let result = expand(&["src/a.rs".to_string(), "src/a_test.rs".to_string()], &patterns, &[], None);
        assert!(!result.test_files.contains(&"src/a_test.rs".to_string()));
    }

    #[test]
    fn all_is_union_of_requested_and_peers() {
        let patterns = default_patterns();
        let result = expand(&["src/a.rs".to_string()], &patterns, &[], None);
        for f in &result.test_files {
            assert!(result.all.contains(f));
        }
        assert!(result.all.contains(&"src/a.rs".to_string()));
    }
}
