// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event emission (§4.4, §9 "Cross-component events"): publishes the
//! shared [`Event`] enum over the hot store's broadcast channel, recording
//! (never propagating) publish failures into the bounded ring buffer.

use conclave_core::{EmissionFailure, Event, EventFailureRing};
use conclave_hotstore::{keys, HotStore};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::warn;

/// Emits events best-effort: a publish failure is recorded in the ring
/// buffer, never returned as an error to the caller (§4.4).
pub struct EventSink {
    store: Arc<dyn HotStore>,
    failures: Mutex<EventFailureRing>,
}

impl EventSink {
    pub fn new(store: Arc<dyn HotStore>) -> Self {
        Self { store, failures: Mutex::new(EventFailureRing::new()) }
    }

    pub async fn emit(&self, event: Event, now_ms: u64) {
        let name = event.name();
        let payload = match serde_json::to_string(&event) {
            Ok(p) => p,
            Err(e) => {
                self.record_failure(name, e.to_string(), now_ms);
                return;
            }
        };
        if let Err(e) = self.store.publish(keys::HUB_BROADCAST_CHANNEL, &payload).await {
            self.record_failure(name, e.to_string(), now_ms);
        }
    }

    fn record_failure(&self, event_name: &'static str, reason: String, at_ms: u64) {
        warn!(event_name, %reason, "event emission failed");
        self.failures.lock().push(EmissionFailure { event_name, reason, at_ms });
    }

    pub fn recent_failures(&self) -> Vec<EmissionFailure> {
        self.failures.lock().recent().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_hotstore::fake::FakeHotStore;

    #[tokio::test]
    async fn successful_emit_leaves_the_failure_ring_empty() {
        let sink = EventSink::new(Arc::new(FakeHotStore::new()));
        sink.emit(Event::AgentCrashed { agent_id: "agt-1".to_string() }, 0).await;
        assert!(sink.recent_failures().is_empty());
    }
}
