// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Global supervisor (§5 "Global state with lifecycle"). A single
//! process-scoped instance owning every component, wired in dependency
//! order on `start()` and unwound in reverse on `stop()`.

use crate::assignment::AssignmentManager;
use crate::config::Config;
use crate::coordination::ModeManager;
use crate::dispatch::{DispatchOutcome, DispatchTick};
use crate::events::EventSink;
use crate::lease::LeaseManager;
use crate::registry::AgentRegistry;
use crate::scheduler::{Algorithm, Scheduler};
use crate::sync::SyncCoordinator;
use crate::transitions::TransitionRunner;
use conclave_core::{Clock, SystemClock, WorkType};
use conclave_hotstore::health::{self, HealthEvent, HealthMonitor};
use conclave_hotstore::HotStore;
use conclave_storage::{ColdStore, DisplayUpdate, HotStoreOps};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Process-scoped singleton wiring every component (§5). Construct with
/// [`Supervisor::new`], call [`Supervisor::start`] once, and
/// [`Supervisor::stop`] on shutdown.
pub struct Supervisor<C: Clock = SystemClock> {
    config: Config,
    store: Arc<dyn HotStore>,
    clock: C,
    pub events: Arc<EventSink>,
    pub mode_manager: Arc<ModeManager>,
    pub lease_manager: Arc<LeaseManager>,
    pub sync_coordinator: Arc<SyncCoordinator>,
    pub registry: Arc<AgentRegistry>,
    pub scheduler: Arc<Scheduler>,
    pub assignment_manager: Arc<AssignmentManager>,
    pub cold: Arc<ColdStore>,
    pub dispatch: Arc<DispatchTick>,
    /// Per-agent assignment bookkeeping carried across dispatch ticks
    /// (§4.10's `min_assignment_interval_ms`/`max_assignments_per_agent`
    /// guards need history the stateless `AssignmentManager::assign` call
    /// doesn't keep itself).
    assignment_counts: Arc<Mutex<HashMap<String, usize>>>,
    last_assigned_ms: Arc<Mutex<HashMap<String, u64>>>,
    cancellation: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Supervisor<SystemClock> {
    /// Wires every component in dependency order using the real wall clock.
    /// Prefer this over [`Supervisor::new_with_clock`] outside tests.
    pub fn new(config: Config, store: Arc<dyn HotStore>, now_ms: u64) -> Self {
        Self::new_with_clock(config, store, SystemClock, now_ms)
    }
}

impl<C: Clock + 'static> Supervisor<C> {
    /// Wires every component in dependency order (client → health → mode →
    /// state-machine → lease → sync → registry → scheduler). The hot-store
    /// `client` itself must already be connected by the caller (the daemon
    /// crate owns that connect-before-construct step); the state machine
    /// (D) is the stateless `conclave_core::state_machine` module and has
    /// no runtime object to wire in here. `clock` drives every periodic
    /// timer's `now_ms` (§4.10, §9); tests substitute `FakeClock` here.
    pub fn new_with_clock(config: Config, store: Arc<dyn HotStore>, clock: C, now_ms: u64) -> Self {
        let events = Arc::new(EventSink::new(store.clone()));
        let mode_manager = Arc::new(ModeManager::new(store.clone(), events.clone(), config.coordination.clone(), now_ms));
        let fs_root = Some(config.repo_root.clone());
        let lease_manager = Arc::new(LeaseManager::new(store.clone(), events.clone(), config.lease.clone(), config.paired_locking.clone(), fs_root));
        let cold = Arc::new(ColdStore::new(config.document_path.clone(), config.repo_root.clone()));
        let hot_ops = Arc::new(HotStoreOps::new(store.clone()));
        let sync_coordinator = Arc::new(SyncCoordinator::new(cold.clone(), hot_ops, config.sync.clone()));
        let registry = Arc::new(AgentRegistry::new(store.clone(), events.clone(), lease_manager.clone(), config.heartbeat.clone()));
        let scheduler = Arc::new(Scheduler::new(config.scheduler.clone()));
        let assignment_manager = Arc::new(AssignmentManager::new(config.assignment.clone()));
        let transitions = Arc::new(TransitionRunner::new(cold.clone(), events.clone()));
        let dispatch = Arc::new(DispatchTick::new(scheduler.clone(), assignment_manager.clone(), registry.clone(), transitions));

        Self {
            config,
            store,
            clock,
            events,
            mode_manager,
            lease_manager,
            sync_coordinator,
            registry,
            scheduler,
            assignment_manager,
            cold,
            dispatch,
            assignment_counts: Arc::new(Mutex::new(HashMap::new())),
            last_assigned_ms: Arc::new(Mutex::new(HashMap::new())),
            cancellation: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the health monitor, the periodic mode-check, display-sync,
    /// and crash-scan timers, and the signal handlers. Installs signal
    /// handling exactly once per `start()` call; `stop()` removes it.
    pub async fn start(&self) {
        info!("supervisor starting");
        let mut tasks = self.tasks.lock();

        let (tx, mut rx) = tokio::sync::mpsc::channel::<HealthEvent>(32);
        let monitor = HealthMonitor::new(self.config.health.to_monitor_config());
        let health_store = self.store.clone();
        tasks.push(tokio::spawn(async move {
            health::run(health_store, monitor, tx).await;
        }));
        let registry = self.registry.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let HealthEvent::Unhealthy { error } = event {
                    warn!(error, "hot store health degraded");
                }
                let _ = &registry;
            }
        }));

        let mode_manager = self.mode_manager.clone();
        let store = self.store.clone();
        let mode_check_interval = std::time::Duration::from_millis(self.config.coordination.mode_check_interval_ms);
        let cancellation = self.cancellation.clone();
        let clock = self.clock.clone();
        tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(mode_check_interval);
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => break,
                    _ = interval.tick() => {
                        let now_ms = clock.epoch_ms();
                        let connection_state = store.connection_state();
                        let health = conclave_hotstore::Health::Healthy;
                        if mode_manager.tick(connection_state, health, true, now_ms).await.is_err() {
                            warn!("mode tick failed");
                        }
                    }
                }
            }
        }));

        let sync_coordinator = self.sync_coordinator.clone();
        let display_interval = self.sync_coordinator.display_sync_interval();
        let cancellation = self.cancellation.clone();
        let clock = self.clock.clone();
        tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(display_interval);
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => break,
                    _ = interval.tick() => {
                        let updates: Vec<DisplayUpdate> = Vec::new();
                        if let Err(e) = sync_coordinator.display_sync_tick(&updates, clock.epoch_ms()).await {
                            warn!(error = %e, "display sync tick failed");
                        }
                    }
                }
            }
        }));

        let registry = self.registry.clone();
        let crash_check_interval = std::time::Duration::from_millis(self.config.heartbeat.interval_ms);
        let cancellation = self.cancellation.clone();
        let clock = self.clock.clone();
        tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(crash_check_interval);
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => break,
                    _ = interval.tick() => {
                        registry.check_for_crashed_agents(clock.epoch_ms()).await;
                    }
                }
            }
        }));

        let cold = self.cold.clone();
        let dispatch = self.dispatch.clone();
        let dispatch_interval = std::time::Duration::from_millis(self.config.dispatch.interval_ms);
        let algorithm = self.config.dispatch.algorithm;
        let assignment_counts = self.assignment_counts.clone();
        let last_assigned_ms = self.last_assigned_ms.clone();
        let cancellation = self.cancellation.clone();
        let clock = self.clock.clone();
        tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(dispatch_interval);
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => break,
                    _ = interval.tick() => {
                        let now_ms = clock.epoch_ms();
                        if let Err(e) = run_dispatch_tick(&cold, &dispatch, algorithm, &assignment_counts, &last_assigned_ms, now_ms).await {
                            warn!(error = %e, "dispatch tick failed");
                        }
                    }
                }
            }
        }));

        let cancellation = self.cancellation.clone();
        tasks.push(tokio::spawn(async move {
            install_signal_handlers(cancellation).await;
        }));

        info!("supervisor started");
    }

    /// Runs one dispatch tick (§2's data flow) across every work type,
    /// outside of the timer loop spawned by [`Supervisor::start`]. Useful
    /// for driving a tick on demand (tests, a manual CLI trigger).
    pub async fn run_dispatch_tick(&self, now_ms: u64) -> Result<Vec<DispatchOutcome>, crate::EngineError> {
        run_dispatch_tick(&self.cold, &self.dispatch, self.config.dispatch.algorithm, &self.assignment_counts, &self.last_assigned_ms, now_ms).await
    }

    /// Unwinds every background task started by [`Supervisor::start`] and
    /// removes the signal handlers, in reverse dependency order.
    pub async fn stop(&self) {
        info!("supervisor stopping");
        self.cancellation.cancel();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for handle in handles {
            handle.abort();
        }
        info!("supervisor stopped");
    }
}

/// Loads the cold document, lifts its PRs into the in-engine type, and
/// runs [`DispatchTick::run_once`] once per [`WorkType`] (§2's data flow).
/// Assignment bookkeeping accumulates across calls so the per-agent
/// cooldown and cap in §4.10 hold across ticks, not just within one.
async fn run_dispatch_tick(
    cold: &ColdStore,
    dispatch: &DispatchTick,
    algorithm: Algorithm,
    assignment_counts: &Mutex<HashMap<String, usize>>,
    last_assigned_ms: &Mutex<HashMap<String, u64>>,
    now_ms: u64,
) -> Result<Vec<DispatchOutcome>, crate::EngineError> {
    let doc = cold.load_task_list().await?;
    let prs: Vec<conclave_core::Pr> = doc.prs.iter().map(conclave_core::Pr::from).collect();

    let mut outcomes = Vec::new();
    for work_type in [WorkType::Planning, WorkType::Implementation, WorkType::Qc, WorkType::Review] {
        let counts = assignment_counts.lock().clone();
        let last_assigned = last_assigned_ms.lock().clone();
        let outcome = dispatch.run_once(&prs, work_type, algorithm, &counts, &last_assigned, now_ms).await?;

        if !outcome.assignments.assignments.is_empty() {
            let mut counts = assignment_counts.lock();
            let mut last_assigned = last_assigned_ms.lock();
            for assignment in &outcome.assignments.assignments {
                *counts.entry(assignment.agent_id.clone()).or_insert(0) += 1;
                last_assigned.insert(assignment.agent_id.clone(), now_ms);
            }
        }
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

async fn install_signal_handlers(cancellation: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to install SIGINT handler");
                return;
            }
        };
        tokio::select! {
            _ = cancellation.cancelled() => {}
            _ = sigterm.recv() => {
                info!("received SIGTERM");
                cancellation.cancel();
            }
            _ = sigint.recv() => {
                info!("received SIGINT");
                cancellation.cancel();
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = cancellation.cancelled().await;
    }
}
