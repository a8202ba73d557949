// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hot-store client (§4.1): connection lifecycle over a Redis-compatible
//! service, a dedicated publisher connection, and the optimistic
//! watch/multi/exec transaction primitive leases are built on.

use crate::backoff::RetryConfig;
use crate::error::HotStoreError;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tracing::{info, instrument, warn};

/// Connection lifecycle state (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
    Closing,
    Closed,
}

conclave_core::simple_display! {
    ConnectionState {
        Disconnected => "disconnected",
        Connecting => "connecting",
        Connected => "connected",
        Reconnecting => "reconnecting",
        Error => "error",
        Closing => "closing",
        Closed => "closed",
    }
}

/// Outcome of an atomic multi-key "set-if-absent" attempt (§4.6 step 4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired,
    /// Keys that already held a value when the transaction committed.
    AlreadyHeld(Vec<String>),
}

/// Operations the lease manager, hot-store ops, and health monitor need.
/// Kept dyn-safe (no generics) so it can be faked in higher-crate tests,
/// matching the `WorkspaceAdapter`-style trait seam used elsewhere in this
/// codebase.
#[async_trait]
pub trait HotStore: Send + Sync {
    fn connection_state(&self) -> ConnectionState;

    async fn ping(&self) -> Result<Duration, HotStoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, HotStoreError>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), HotStoreError>;
    async fn del(&self, keys: &[String]) -> Result<u64, HotStoreError>;
    async fn exists(&self, key: &str) -> Result<bool, HotStoreError>;
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, HotStoreError>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, HotStoreError>;
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), HotStoreError>;
    async fn hset_all(&self, key: &str, fields: &[(String, String)]) -> Result<(), HotStoreError>;
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, HotStoreError>;
    async fn hdel(&self, key: &str, field: &str) -> Result<(), HotStoreError>;

    async fn sadd(&self, key: &str, member: &str) -> Result<(), HotStoreError>;
    async fn srem(&self, key: &str, member: &str) -> Result<(), HotStoreError>;
    async fn smembers(&self, key: &str) -> Result<HashSet<String>, HotStoreError>;

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), HotStoreError>;
    async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, HotStoreError>;

    async fn scan_match(&self, pattern: &str) -> Result<Vec<String>, HotStoreError>;

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), HotStoreError>;

    /// Atomic multi-key "set if absent" with the TTL applied to every key.
    /// Retries transient watch-conflicts per `retry`, returning
    /// `WatchConflict` once exhausted.
    async fn acquire_if_absent(
        &self,
        entries: &[(String, String)],
        ttl: Duration,
        retry: RetryConfig,
    ) -> Result<AcquireOutcome, HotStoreError>;
}

/// Redis-backed [`HotStore`]. Wraps a primary `ConnectionManager` (which
/// reconnects on its own) plus a dedicated publisher connection, so a slow
/// publish never blocks ordinary reads/writes.
pub struct RedisHotStore {
    client: redis::Client,
    manager: Mutex<Option<ConnectionManager>>,
    publisher: Mutex<Option<ConnectionManager>>,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl RedisHotStore {
    pub fn new(url: &str) -> Result<Self, HotStoreError> {
        let client = redis::Client::open(url).map_err(HotStoreError::Redis)?;
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        Ok(Self { client, manager: Mutex::new(None), publisher: Mutex::new(None), state_tx, state_rx })
    }

    /// Subscribe to connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    fn set_state(&self, state: ConnectionState) {
        let prev = *self.state_tx.borrow();
        if prev != state {
            info!(from = %prev, to = %state, "hot store connection state change");
        }
        let _ = self.state_tx.send(state);
    }

    #[instrument(skip(self), fields(url = %self.client.get_connection_info().addr))]
    pub async fn connect(&self) -> Result<(), HotStoreError> {
        self.set_state(ConnectionState::Connecting);
        let manager = self.client.get_tokio_connection_manager().await;
        let publisher = self.client.get_tokio_connection_manager().await;
        match (manager, publisher) {
            (Ok(m), Ok(p)) => {
                *self.manager.lock().await = Some(m);
                *self.publisher.lock().await = Some(p);
                self.set_state(ConnectionState::Connected);
                Ok(())
            }
            (Err(e), _) | (_, Err(e)) => {
                self.set_state(ConnectionState::Error);
                Err(HotStoreError::ConnectionRefused(e.to_string()))
            }
        }
    }

    /// Reconnect with exponential backoff, giving up after `retry.max_attempts`.
    #[instrument(skip(self, retry))]
    pub async fn reconnect(&self, retry: RetryConfig) -> Result<(), HotStoreError> {
        self.set_state(ConnectionState::Reconnecting);
        for attempt in 0..retry.max_attempts {
            if self.connect().await.is_ok() {
                return Ok(());
            }
            warn!(attempt, "hot store reconnect attempt failed");
            tokio::time::sleep(retry.delay_for(attempt)).await;
        }
        self.set_state(ConnectionState::Error);
        Err(HotStoreError::ConnectionRefused(format!("exhausted {} reconnect attempts", retry.max_attempts)))
    }

    pub async fn close(&self) {
        self.set_state(ConnectionState::Closing);
        *self.manager.lock().await = None;
        *self.publisher.lock().await = None;
        self.set_state(ConnectionState::Closed);
    }

    /// Open a fresh subscriber connection (§4.1: "a separate publisher and
    /// subscriber connection are maintained"). Each call yields an
    /// independent `PubSub` so a slow subscriber never blocks the primary.
    pub async fn subscriber(&self) -> Result<redis::aio::PubSub, HotStoreError> {
        let conn = self.client.get_async_connection().await.map_err(HotStoreError::Redis)?;
        Ok(conn.into_pubsub())
    }

    async fn manager(&self) -> Result<ConnectionManager, HotStoreError> {
        self.manager.lock().await.clone().ok_or(HotStoreError::OperationOnUnconnectedClient)
    }

    async fn publisher_conn(&self) -> Result<ConnectionManager, HotStoreError> {
        self.publisher.lock().await.clone().ok_or(HotStoreError::OperationOnUnconnectedClient)
    }
}

#[async_trait]
impl HotStore for RedisHotStore {
    fn connection_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    async fn ping(&self) -> Result<Duration, HotStoreError> {
        let mut conn = self.manager().await?;
        let start = Instant::now();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(start.elapsed())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, HotStoreError> {
        let mut conn = self.manager().await?;
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), HotStoreError> {
        let mut conn = self.manager().await?;
        match ttl {
            Some(ttl) => conn.set_ex(key, value, ttl.as_secs().max(1)).await?,
            None => conn.set(key, value).await?,
        }
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64, HotStoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.manager().await?;
        Ok(conn.del(keys).await?)
    }

    async fn exists(&self, key: &str) -> Result<bool, HotStoreError> {
        let mut conn = self.manager().await?;
        Ok(conn.exists(key).await?)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, HotStoreError> {
        let mut conn = self.manager().await?;
        Ok(conn.expire(key, ttl.as_secs().max(1) as i64).await?)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, HotStoreError> {
        let mut conn = self.manager().await?;
        Ok(conn.hget(key, field).await?)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), HotStoreError> {
        let mut conn = self.manager().await?;
        conn.hset(key, field, value).await?;
        Ok(())
    }

    async fn hset_all(&self, key: &str, fields: &[(String, String)]) -> Result<(), HotStoreError> {
        let mut conn = self.manager().await?;
        conn.hset_multiple(key, fields).await?;
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, HotStoreError> {
        let mut conn = self.manager().await?;
        Ok(conn.hgetall(key).await?)
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<(), HotStoreError> {
        let mut conn = self.manager().await?;
        conn.hdel(key, field).await?;
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), HotStoreError> {
        let mut conn = self.manager().await?;
        conn.sadd(key, member).await?;
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), HotStoreError> {
        let mut conn = self.manager().await?;
        conn.srem(key, member).await?;
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<HashSet<String>, HotStoreError> {
        let mut conn = self.manager().await?;
        Ok(conn.smembers(key).await?)
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), HotStoreError> {
        let mut conn = self.manager().await?;
        conn.zadd(key, member, score).await?;
        Ok(())
    }

    async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, HotStoreError> {
        let mut conn = self.manager().await?;
        Ok(conn.zrange(key, start, stop).await?)
    }

    async fn scan_match(&self, pattern: &str) -> Result<Vec<String>, HotStoreError> {
        let mut conn = self.manager().await?;
        let mut cursor: u64 = 0;
        let mut out = Vec::new();
        loop {
            let (next_cursor, mut batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await?;
            out.append(&mut batch);
            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }
        Ok(out)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), HotStoreError> {
        let mut conn = self.publisher_conn().await?;
        conn.publish(channel, payload).await?;
        Ok(())
    }

    #[instrument(skip(self, entries, retry), fields(keys = entries.len()))]
    async fn acquire_if_absent(
        &self,
        entries: &[(String, String)],
        ttl: Duration,
        retry: RetryConfig,
    ) -> Result<AcquireOutcome, HotStoreError> {
        let keys: Vec<&String> = entries.iter().map(|(k, _)| k).collect();
        let mut conn = self.manager().await?;
        for attempt in 0..retry.max_attempts {
            redis::cmd("WATCH").arg(&keys).query_async::<_, ()>(&mut conn).await?;
            let existing: Vec<Option<String>> = redis::cmd("MGET").arg(&keys).query_async(&mut conn).await?;
            if existing.iter().any(Option::is_some) {
                redis::cmd("UNWATCH").query_async::<_, ()>(&mut conn).await?;
                let held: Vec<String> = keys
                    .iter()
                    .zip(existing.iter())
                    .filter(|(_, v)| v.is_some())
                    .map(|(k, _)| (*k).clone())
                    .collect();
                return Ok(AcquireOutcome::AlreadyHeld(held));
            }

            let mut pipe = redis::pipe();
            pipe.atomic();
            for (key, value) in entries {
                pipe.cmd("SET").arg(key).arg(value).arg("EX").arg(ttl.as_secs().max(1)).arg("NX").ignore();
            }
            let result: Option<()> = pipe.query_async(&mut conn).await?;
            if result.is_some() {
                return Ok(AcquireOutcome::Acquired);
            }
            warn!(attempt, "watch conflict on lease acquisition, retrying");
            tokio::time::sleep(retry.delay_for(attempt)).await;
        }
        Err(HotStoreError::WatchConflict { attempts: retry.max_attempts })
    }
}
