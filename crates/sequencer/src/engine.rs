// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The sequence engine: owns the loaded script and the single active run.

use std::sync::{Arc, Weak};
use std::time::Duration;

use li_config::ConfigStore;
use li_core::{Clock, Event, Fault, NodeId, ProgressEvent, RunId};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::info;

use crate::action::ActionAdapter;
use crate::node::TaskNode;
use crate::script::Script;
use crate::walker::{ProgressSink, Walker};

/// Terminal or live status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

li_core::simple_display! {
    RunStatus {
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

/// Counters kept per run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub visited: u64,
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub retried: u64,
}

/// Live engine configuration; changeable while a run is active.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub tick_period: Duration,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(25),
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(30),
        }
    }
}

/// Answer to `task:status`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSnapshot {
    pub run_id: Option<RunId>,
    pub status: Option<RunStatus>,
    pub cursor: Option<NodeId>,
    pub stats: RunStats,
    pub tree_id: Option<String>,
}

struct ActiveRun {
    run_id: RunId,
    cancel: tokio_util::sync::CancellationToken,
    interrupt_tx: mpsc::Sender<TaskNode>,
    cursor: Arc<Mutex<Option<NodeId>>>,
    stats: Arc<Mutex<RunStats>>,
}

#[derive(Default)]
struct EngineInner {
    script: Option<(Script, String)>,
    active: Option<ActiveRun>,
    last: Option<(RunId, RunStatus, RunStats)>,
}

/// Tree-structured sequence executor. One run at a time.
pub struct SequenceEngine<C: Clock> {
    clock: C,
    adapter: Arc<dyn ActionAdapter>,
    config: Arc<ConfigStore>,
    event_tx: mpsc::Sender<Event>,
    progress_tx: broadcast::Sender<ProgressEvent>,
    options_tx: watch::Sender<EngineOptions>,
    state: Mutex<EngineInner>,
    self_weak: Weak<Self>,
}

impl<C: Clock> SequenceEngine<C> {
    pub fn new(
        clock: C,
        adapter: Arc<dyn ActionAdapter>,
        config: Arc<ConfigStore>,
        event_tx: mpsc::Sender<Event>,
        options: EngineOptions,
    ) -> Arc<Self> {
        let (progress_tx, _) = broadcast::channel(256);
        let (options_tx, _) = watch::channel(options);
        Arc::new_cyclic(|self_weak| Self {
            clock,
            adapter,
            config,
            event_tx,
            progress_tx,
            options_tx,
            state: Mutex::new(EngineInner::default()),
            self_weak: self_weak.clone(),
        })
    }

    /// Load a validated script. Returns its stable tree id. Refused while a
    /// run is active.
    pub fn load(&self, script: Script) -> Result<String, Fault> {
        script
            .tree
            .validate()
            .map_err(|e| Fault::invalid_argument(e.to_string()))?;
        let tree_id = script.tree_id();
        let mut state = self.state.lock();
        if state.active.is_some() {
            return Err(Fault::conflict("cannot load a script while a run is active"));
        }
        state.script = Some((script, tree_id.clone()));
        Ok(tree_id)
    }

    pub fn loaded_tree_id(&self) -> Option<String> {
        self.state.lock().script.as_ref().map(|(_, id)| id.clone())
    }

    /// Start a run of the loaded script. Exactly one run may be active;
    /// concurrent start is refused.
    pub fn start(&self) -> Result<RunId, Fault> {
        let mut state = self.state.lock();
        if state.active.is_some() {
            return Err(Fault::conflict("a run is already active"));
        }
        let (script, tree_id) = state
            .script
            .as_ref()
            .ok_or_else(|| Fault::conflict("no script loaded"))?
            .clone();

        let run_id = RunId::generate("run");
        let cancel = tokio_util::sync::CancellationToken::new();
        let (interrupt_tx, interrupt_rx) = mpsc::channel(8);
        let cursor = Arc::new(Mutex::new(None));
        let stats = Arc::new(Mutex::new(RunStats::default()));

        let walker = Walker {
            sink: ProgressSink {
                clock: self.clock.clone(),
                run_id: run_id.clone(),
                broadcast: self.progress_tx.clone(),
                events: self.event_tx.clone(),
                cursor: Arc::clone(&cursor),
                stats: Arc::clone(&stats),
            },
            adapter: Arc::clone(&self.adapter),
            config: Arc::clone(&self.config),
            cancel: cancel.clone(),
            interrupts: Some(interrupt_rx),
            options: self.options_tx.subscribe(),
        };

        state.active = Some(ActiveRun {
            run_id: run_id.clone(),
            cancel,
            interrupt_tx,
            cursor,
            stats,
        });
        drop(state);

        let engine = self.self_weak.clone();
        let task_run_id = run_id.clone();
        tokio::spawn(async move {
            let status = walker.run(&script.tree, script.error_behavior).await;
            if let Some(engine) = engine.upgrade() {
                engine.finish(&task_run_id, status);
            }
        });

        info!(run = %run_id, tree = %tree_id, "run started");
        Ok(run_id)
    }

    /// Cancel the active run. Idempotent: cancelling an already-cancelled
    /// (or absent) run is a no-op. Returns whether a run was signalled.
    pub fn stop(&self) -> bool {
        let state = self.state.lock();
        match &state.active {
            Some(active) => {
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Route an interrupt request into the active run. It diverts the
    /// nearest interrupt-accepting scope currently executing.
    pub fn interrupt(&self, subtree: TaskNode) -> Result<(), Fault> {
        let state = self.state.lock();
        let active = state
            .active
            .as_ref()
            .ok_or_else(|| Fault::conflict("no active run to interrupt"))?;
        active
            .interrupt_tx
            .try_send(subtree)
            .map_err(|_| Fault::conflict("interrupt queue full"))
    }

    pub fn status(&self) -> RunSnapshot {
        let state = self.state.lock();
        let tree_id = state.script.as_ref().map(|(_, id)| id.clone());
        match &state.active {
            Some(active) => RunSnapshot {
                run_id: Some(active.run_id.clone()),
                status: Some(RunStatus::Running),
                cursor: active.cursor.lock().clone(),
                stats: *active.stats.lock(),
                tree_id,
            },
            None => match &state.last {
                Some((run_id, status, stats)) => RunSnapshot {
                    run_id: Some(run_id.clone()),
                    status: Some(*status),
                    cursor: None,
                    stats: *stats,
                    tree_id,
                },
                None => RunSnapshot {
                    run_id: None,
                    status: None,
                    cursor: None,
                    stats: RunStats::default(),
                    tree_id,
                },
            },
        }
    }

    pub fn run_active(&self) -> bool {
        self.state.lock().active.is_some()
    }

    /// Live progress stream. Slow subscribers observe `Lagged` rather than
    /// blocking the run.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress_tx.subscribe()
    }

    /// Change the tick cadence while running. Existing awaits are not
    /// dropped; only future pacing changes.
    pub fn set_tick_period(&self, period: Duration) {
        self.options_tx.send_modify(|options| options.tick_period = period);
    }

    /// Cancel any active run and wait for it to settle.
    pub async fn shutdown(&self) {
        self.stop();
        for _ in 0..200 {
            if !self.run_active() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn finish(&self, run_id: &RunId, status: RunStatus) {
        {
            let mut state = self.state.lock();
            let current = state.active.as_ref().is_some_and(|a| &a.run_id == run_id);
            if !current {
                return;
            }
            let Some(active) = state.active.take() else {
                return;
            };
            state.last = Some((active.run_id, status, *active.stats.lock()));
        }
        let _ = self.event_tx.try_send(Event::RunFinished {
            run_id: run_id.clone(),
            status: status.to_string(),
        });
        info!(run = %run_id, status = %status, "run finished");
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
