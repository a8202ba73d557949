// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health monitor (§4.2): one periodic task, pinging the hot store and
//! classifying latency. `unhealthy` is hysteretic — it only becomes
//! official after `failure_threshold` consecutive non-healthy ticks, and
//! a single healthy tick resets the streak.

use crate::client::HotStore;
use crate::error::HotStoreError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Degraded,
    Unhealthy,
}

conclave_core::simple_display! {
    Health {
        Healthy => "healthy",
        Degraded => "degraded",
        Unhealthy => "unhealthy",
    }
}

#[derive(Debug, Clone)]
pub enum HealthEvent {
    HealthChange { from: Health, to: Health },
    Healthy,
    Degraded { latency: Duration },
    Unhealthy { error: String },
    Recovering,
}

#[derive(Debug, Clone, Copy)]
pub struct HealthConfig {
    pub interval: Duration,
    pub timeout: Duration,
    pub failure_threshold: u32,
    pub degraded_latency_threshold: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(2),
            failure_threshold: 3,
            degraded_latency_threshold: Duration::from_millis(200),
        }
    }
}

/// The outcome of a single ping, already timed and with any error
/// collapsed into `None` — the monitor does not distinguish timeout from
/// connection error for classification purposes, only for the event
/// payload.
pub enum TickOutcome {
    Replied(Duration),
    Failed(String),
}

/// Pure hysteresis state, separated from the async driver so the streak
/// logic is unit-testable without a clock or a real connection.
#[derive(Debug)]
pub struct HealthMonitor {
    config: HealthConfig,
    current: Health,
    consecutive_non_healthy: u32,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig) -> Self {
        Self { config, current: Health::Healthy, consecutive_non_healthy: 0 }
    }

    pub fn current(&self) -> Health {
        self.current
    }

    fn classify(&self, outcome: &TickOutcome) -> Health {
        match outcome {
            TickOutcome::Failed(_) => Health::Unhealthy,
            TickOutcome::Replied(latency) if *latency > self.config.degraded_latency_threshold => Health::Degraded,
            TickOutcome::Replied(_) => Health::Healthy,
        }
    }

    /// Feed one tick's outcome through the hysteresis rule, returning the
    /// events to emit (possibly none, possibly a `HealthChange` plus the
    /// tick's own classification event).
    pub fn record_tick(&mut self, outcome: TickOutcome) -> Vec<HealthEvent> {
        let classified = self.classify(&outcome);
        let mut events = Vec::new();

        if classified == Health::Healthy {
            let was_recovering = self.consecutive_non_healthy > 0;
            self.consecutive_non_healthy = 0;
            if was_recovering && self.current != Health::Healthy {
                events.push(HealthEvent::Recovering);
            }
            events.push(HealthEvent::Healthy);
            self.transition_if_needed(Health::Healthy, &mut events);
            return events;
        }

        self.consecutive_non_healthy += 1;

        match &outcome {
            TickOutcome::Replied(latency) => events.push(HealthEvent::Degraded { latency: *latency }),
            TickOutcome::Failed(err) => events.push(HealthEvent::Unhealthy { error: err.clone() }),
        }

        let official = if self.consecutive_non_healthy >= self.config.failure_threshold {
            classified
        } else {
            self.current
        };
        self.transition_if_needed(official, &mut events);
        events
    }

    fn transition_if_needed(&mut self, new: Health, events: &mut Vec<HealthEvent>) {
        if new != self.current {
            events.push(HealthEvent::HealthChange { from: self.current, to: new });
            self.current = new;
        }
    }

    /// Whether a reconnect should be triggered: the streak just reached
    /// `failure_threshold` on a non-healthy tick.
    pub fn should_trigger_reconnect(&self) -> bool {
        self.consecutive_non_healthy == self.config.failure_threshold
    }
}

/// Run the periodic ping loop against `store`, forwarding events on `tx`
/// until the channel closes. `#[instrument]` spans this at tick
/// granularity per the logging conventions used throughout this crate.
#[instrument(skip(store, monitor, tx))]
pub async fn run(store: Arc<dyn HotStore>, mut monitor: HealthMonitor, tx: mpsc::Sender<HealthEvent>) {
    let mut interval = tokio::time::interval(monitor.config.interval);
    loop {
        interval.tick().await;
        if store.connection_state() != crate::client::ConnectionState::Connected {
            continue;
        }
        let outcome = match tokio::time::timeout(monitor.config.timeout, store.ping()).await {
            Ok(Ok(latency)) => TickOutcome::Replied(latency),
            Ok(Err(err)) => TickOutcome::Failed(err.to_string()),
            Err(_) => TickOutcome::Failed(
                HotStoreError::Timeout(monitor.config.timeout).to_string(),
            ),
        };
        let should_reconnect = {
            let events = monitor.record_tick(outcome);
            let trigger = monitor.should_trigger_reconnect();
            for event in events {
                match &event {
                    HealthEvent::HealthChange { from, to } => info!(%from, %to, "health change"),
                    HealthEvent::Unhealthy { error } => warn!(%error, "hot store unhealthy"),
                    _ => {}
                }
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            trigger
        };
        if should_reconnect {
            warn!("failure threshold reached, reconnect should be triggered by caller");
        }
    }
}
