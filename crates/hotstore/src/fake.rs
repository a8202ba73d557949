// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory [`HotStore`] for downstream crates' tests, gated behind
//! the `test-support` feature.

use crate::backoff::RetryConfig;
use crate::client::{AcquireOutcome, ConnectionState, HotStore};
use crate::error::HotStoreError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Minimal `*`-only glob, matching Redis's `SCAN ... MATCH` semantics
/// closely enough for test fixtures (no `?`/`[...]` support).
fn glob_match(pattern: &str, candidate: &str) -> bool {
    let segments: Vec<&str> = pattern.split('*').collect();
    if segments.len() == 1 {
        return pattern == candidate;
    }
    let mut rest = candidate;
    for (i, segment) in segments.iter().enumerate() {
        if i == 0 {
            if !rest.starts_with(segment) {
                return false;
            }
            rest = &rest[segment.len()..];
        } else if i == segments.len() - 1 {
            return rest.ends_with(segment);
        } else if let Some(pos) = rest.find(segment) {
            rest = &rest[pos + segment.len()..];
        } else {
            return false;
        }
    }
    true
}

#[derive(Default)]
struct Inner {
    strings: HashMap<String, String>,
    hashes: HashMap<String, HashMap<String, String>>,
    sets: HashMap<String, HashSet<String>>,
    sorted_sets: HashMap<String, Vec<(String, f64)>>,
    published: Vec<(String, String)>,
}

/// In-memory stand-in for [`RedisHotStore`](crate::client::RedisHotStore).
/// TTLs are accepted but not enforced — tests that care about expiry drive
/// it explicitly rather than waiting on a real clock.
pub struct FakeHotStore {
    inner: Mutex<Inner>,
    state: Mutex<ConnectionState>,
}

impl Default for FakeHotStore {
    fn default() -> Self {
        Self { inner: Mutex::new(Inner::default()), state: Mutex::new(ConnectionState::Connected) }
    }
}

impl FakeHotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connection_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.inner.lock().published.clone()
    }
}

#[async_trait]
impl HotStore for FakeHotStore {
    fn connection_state(&self) -> ConnectionState {
        *self.state.lock()
    }

    async fn ping(&self) -> Result<Duration, HotStoreError> {
        if *self.state.lock() != ConnectionState::Connected {
            return Err(HotStoreError::OperationOnUnconnectedClient);
        }
        Ok(Duration::from_millis(1))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, HotStoreError> {
        Ok(self.inner.lock().strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str, _ttl: Option<Duration>) -> Result<(), HotStoreError> {
        self.inner.lock().strings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64, HotStoreError> {
        let mut inner = self.inner.lock();
        let mut count = 0;
        for key in keys {
            if inner.strings.remove(key).is_some() { count += 1; }
            if inner.hashes.remove(key).is_some() { count += 1; }
            if inner.sets.remove(key).is_some() { count += 1; }
            if inner.sorted_sets.remove(key).is_some() { count += 1; }
        }
        Ok(count)
    }

    async fn exists(&self, key: &str) -> Result<bool, HotStoreError> {
        let inner = self.inner.lock();
        Ok(inner.strings.contains_key(key) || inner.hashes.contains_key(key) || inner.sets.contains_key(key))
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<bool, HotStoreError> {
        Ok(true)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, HotStoreError> {
        Ok(self.inner.lock().hashes.get(key).and_then(|h| h.get(field).cloned()))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), HotStoreError> {
        self.inner.lock().hashes.entry(key.to_string()).or_default().insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hset_all(&self, key: &str, fields: &[(String, String)]) -> Result<(), HotStoreError> {
        let mut inner = self.inner.lock();
        let entry = inner.hashes.entry(key.to_string()).or_default();
        for (f, v) in fields {
            entry.insert(f.clone(), v.clone());
        }
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, HotStoreError> {
        Ok(self.inner.lock().hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<(), HotStoreError> {
        if let Some(h) = self.inner.lock().hashes.get_mut(key) {
            h.remove(field);
        }
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), HotStoreError> {
        self.inner.lock().sets.entry(key.to_string()).or_default().insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), HotStoreError> {
        if let Some(s) = self.inner.lock().sets.get_mut(key) {
            s.remove(member);
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<HashSet<String>, HotStoreError> {
        Ok(self.inner.lock().sets.get(key).cloned().unwrap_or_default())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), HotStoreError> {
        let mut inner = self.inner.lock();
        let entries = inner.sorted_sets.entry(key.to_string()).or_default();
        entries.retain(|(m, _)| m != member);
        entries.push((member.to_string(), score));
        entries.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(())
    }

    async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, HotStoreError> {
        let inner = self.inner.lock();
        let Some(entries) = inner.sorted_sets.get(key) else { return Ok(Vec::new()) };
        let len = entries.len() as isize;
        let normalize = |i: isize| -> usize {
            if i < 0 { (len + i).max(0) as usize } else { i.min(len) as usize }
        };
        let (start, stop) = (normalize(start), normalize(stop));
        if start > stop || entries.is_empty() {
            return Ok(Vec::new());
        }
        let end = (stop + 1).min(entries.len());
        Ok(entries[start.min(end)..end].iter().map(|(m, _)| m.clone()).collect())
    }

    async fn scan_match(&self, pattern: &str) -> Result<Vec<String>, HotStoreError> {
        let inner = self.inner.lock();
        let mut out: Vec<String> = inner.strings.keys().chain(inner.hashes.keys()).chain(inner.sets.keys())
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        out.sort();
        out.dedup();
        Ok(out)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), HotStoreError> {
        self.inner.lock().published.push((channel.to_string(), payload.to_string()));
        Ok(())
    }

    async fn acquire_if_absent(
        &self,
        entries: &[(String, String)],
        _ttl: Duration,
        _retry: RetryConfig,
    ) -> Result<AcquireOutcome, HotStoreError> {
        let mut inner = self.inner.lock();
        let held: Vec<String> = entries.iter().filter(|(k, _)| inner.strings.contains_key(k)).map(|(k, _)| k.clone()).collect();
        if !held.is_empty() {
            return Ok(AcquireOutcome::AlreadyHeld(held));
        }
        for (k, v) in entries {
            inner.strings.insert(k.clone(), v.clone());
        }
        Ok(AcquireOutcome::Acquired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_if_absent_blocks_on_existing_key() {
        let store = FakeHotStore::new();
        store.set("lease:file:a.rs", "holder-1", None).await.unwrap();
        let result = store
            .acquire_if_absent(&[("lease:file:a.rs".to_string(), "holder-2".to_string())], Duration::from_secs(30), RetryConfig::default())
            .await
            .unwrap();
        assert_eq!(result, AcquireOutcome::AlreadyHeld(vec!["lease:file:a.rs".to_string()]));
    }

    #[tokio::test]
    async fn acquire_if_absent_succeeds_when_all_keys_free() {
        let store = FakeHotStore::new();
        let result = store
            .acquire_if_absent(
                &[("lease:file:a.rs".to_string(), "holder-1".to_string()), ("lease:file:b.rs".to_string(), "holder-1".to_string())],
                Duration::from_secs(30),
                RetryConfig::default(),
            )
            .await
            .unwrap();
        assert_eq!(result, AcquireOutcome::Acquired);
        assert_eq!(store.get("lease:file:a.rs").await.unwrap(), Some("holder-1".to_string()));
    }

    #[tokio::test]
    async fn scan_match_filters_by_prefix() {
        let store = FakeHotStore::new();
        store.set("pr:PR-1", "x", None).await.unwrap();
        store.set("pr:PR-2", "x", None).await.unwrap();
        store.set("agent:agt-1", "x", None).await.unwrap();
        let mut keys = store.scan_match("pr:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["pr:PR-1".to_string(), "pr:PR-2".to_string()]);
    }

    #[tokio::test]
    async fn publish_records_channel_and_payload() {
        let store = FakeHotStore::new();
        store.publish("hub-broadcast", "hello").await.unwrap();
        assert_eq!(store.published(), vec![("hub-broadcast".to_string(), "hello".to_string())]);
    }
}
