// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The typed event enum shared across components (§9 "Cross-component events").
//!
//! The state machine and lease manager emit these; the sync coordinator and
//! agent registry consume them. A bounded ring buffer records emission
//! failures without ever failing the operation that produced the event
//! (§4.4, §7 `EventEmissionFailure`).

use crate::pr::PrState;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Capacity of the event-emission-failure ring buffer (§4.4).
pub const EVENT_RING_BUFFER_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    StateTransitioned {
        pr_id: String,
        from: PrState,
        to: PrState,
        agent_id: Option<String>,
        committed: bool,
        at_ms: u64,
    },
    LeaseAcquired {
        pr_id: String,
        agent_id: String,
        files: Vec<String>,
    },
    LeaseReleased {
        agent_id: String,
        files: Vec<String>,
    },
    LeaseConflict {
        agent_id: String,
        file: String,
        holder_agent_id: String,
    },
    HeartbeatFailed {
        agent_id: String,
        reason: String,
    },
    AgentCrashed {
        agent_id: String,
    },
    ModeChanged {
        from: String,
        to: String,
        reason: String,
        at_ms: u64,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::StateTransitioned { .. } => "state:transitioned",
            Event::LeaseAcquired { .. } => "lease:acquired",
            Event::LeaseReleased { .. } => "lease:released",
            Event::LeaseConflict { .. } => "lease:conflict",
            Event::HeartbeatFailed { .. } => "heartbeat:failed",
            Event::AgentCrashed { .. } => "agent:crashed",
            Event::ModeChanged { .. } => "mode:changed",
        }
    }
}

/// A failed event emission, recorded for operator inspection (§4.4, §7).
#[derive(Debug, Clone)]
pub struct EmissionFailure {
    pub event_name: &'static str,
    pub reason: String,
    pub at_ms: u64,
}

/// Fixed-capacity ring buffer of the most recent emission failures.
/// Never causes the underlying transition or lease operation to fail.
#[derive(Debug, Default)]
pub struct EventFailureRing {
    entries: VecDeque<EmissionFailure>,
}

impl EventFailureRing {
    pub fn new() -> Self {
        Self { entries: VecDeque::with_capacity(EVENT_RING_BUFFER_CAPACITY) }
    }

    pub fn push(&mut self, failure: EmissionFailure) {
        if self.entries.len() == EVENT_RING_BUFFER_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(failure);
    }

    pub fn recent(&self) -> impl Iterator<Item = &EmissionFailure> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
