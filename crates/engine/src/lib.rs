// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestration engine: lease manager (F), scheduler (I), assignment
//! manager (J), coordination-mode manager (K), sync coordinator (O),
//! agent registry (P), and the supervisor (§5) that wires them together.

pub mod assignment;
pub mod config;
pub mod coordination;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod lease;
pub mod registry;
pub mod scheduler;
pub mod supervisor;
pub mod sync;
pub mod transitions;

pub use assignment::{Assignment, AssignmentBatch, AssignmentManager, CapabilityProfile};
pub use config::Config;
pub use coordination::{CoordinationError, Mode, ModeManager, ModeTransition};
pub use dispatch::{DispatchOutcome, DispatchTick};
pub use error::EngineError;
pub use events::EventSink;
pub use lease::{LeaseConflict, LeaseManager, LeaseResult};
pub use registry::AgentRegistry;
pub use scheduler::{Algorithm, Scheduler, SchedulerResult};
pub use supervisor::Supervisor;
pub use sync::{SyncCoordinator, SyncCounters};
pub use transitions::{TransitionError, TransitionRunner};
