// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Keyspace helpers (§6). All keys are colon-delimited; building them here
//! keeps the literal layout in one place instead of scattered `format!`s.

/// Replace backslashes with `/`, preserve case, strip a trailing slash.
pub fn normalize_path(path: &str) -> String {
    let replaced = path.replace('\\', "/");
    replaced.strip_suffix('/').map(str::to_string).unwrap_or(replaced)
}

pub fn lease_file(path: &str) -> String {
    format!("lease:file:{}", normalize_path(path))
}

pub fn lease_agent(agent_id: &str) -> String {
    format!("lease:agent:{agent_id}")
}

pub fn lease_pr(pr_id: &str) -> String {
    format!("lease:pr:{pr_id}")
}

pub fn pr(pr_id: &str) -> String {
    format!("pr:{pr_id}")
}

pub fn pr_cold_state(pr_id: &str) -> String {
    format!("pr:{pr_id}:cold_state")
}

pub fn pr_hot_state(pr_id: &str) -> String {
    format!("pr:{pr_id}:hot_state")
}

pub fn pr_agent(pr_id: &str) -> String {
    format!("pr:{pr_id}:agent")
}

pub fn pr_hot_state_timestamp(pr_id: &str) -> String {
    format!("pr:{pr_id}:hot_state_timestamp")
}

pub fn pr_dependencies(pr_id: &str) -> String {
    format!("pr:{pr_id}:dependencies")
}

pub fn agent(agent_id: &str) -> String {
    format!("agent:{agent_id}")
}

pub fn agent_leases(agent_id: &str) -> String {
    format!("agent:{agent_id}:leases")
}

pub fn agent_heartbeat(agent_id: &str) -> String {
    format!("agent:{agent_id}:heartbeat")
}

pub const COORDINATION_MODE: &str = "coordination:mode";
pub const COORDINATION_HISTORY: &str = "coordination:history";
pub const COORDINATION_MODE_CHANGE_CHANNEL: &str = "coordination:mode_change";
pub const HUB_BROADCAST_CHANNEL: &str = "hub-broadcast";

/// TTL, in seconds, for the hot-state cache keys (§6: "TTL 5 min").
pub const HOT_STATE_TTL_SECS: u64 = 5 * 60;

pub fn agent_channel_pattern(agent_id: &str) -> String {
    format!("agent:{agent_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_path_converts_backslashes() {
        assert_eq!(normalize_path(r"src\a.rs"), "src/a.rs");
    }

    #[test]
    fn normalize_path_strips_trailing_slash() {
        assert_eq!(normalize_path("src/dir/"), "src/dir");
    }

    #[test]
    fn normalize_path_preserves_case() {
        assert_eq!(normalize_path("Src/A.rs"), "Src/A.rs");
    }

    #[test]
    fn lease_file_key_uses_normalized_path() {
        assert_eq!(lease_file(r"src\a.rs"), "lease:file:src/a.rs");
    }

    #[test]
    fn pr_key_family_share_the_id_prefix() {
        assert_eq!(pr("PR-1"), "pr:PR-1");
        assert_eq!(pr_cold_state("PR-1"), "pr:PR-1:cold_state");
        assert_eq!(pr_hot_state("PR-1"), "pr:PR-1:hot_state");
        assert_eq!(pr_agent("PR-1"), "pr:PR-1:agent");
        assert_eq!(pr_hot_state_timestamp("PR-1"), "pr:PR-1:hot_state_timestamp");
        assert_eq!(pr_dependencies("PR-1"), "pr:PR-1:dependencies");
    }

    #[test]
    fn agent_key_family_share_the_id_prefix() {
        assert_eq!(agent("agt-1"), "agent:agt-1");
        assert_eq!(agent_leases("agt-1"), "agent:agt-1:leases");
        assert_eq!(agent_heartbeat("agt-1"), "agent:agt-1:heartbeat");
    }
}
