// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The tree walker: one logical executor task per run.
//!
//! Depth-first pre-order, except Loop (repeat children) and Group(parallel)
//! (sub-runners sharing the run's cancellation token, joined by the outer
//! walker). Every attempt paces on the engine tick so cadence stays
//! configurable while a run is live; changing the period never drops an
//! existing await.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use li_config::ConfigStore;
use li_core::{
    Clock, ConfigValue, ErrorKind, Event, Fault, NodeId, ProgressEvent, ProgressKind, RunId,
};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::action::{ActionAdapter, StepAction};
use crate::engine::{EngineOptions, RunStats, RunStatus};
use crate::node::{Condition, ConditionTest, ErrorBehavior, GroupMode, NodeKind, TaskNode};

/// How one node ended.
#[derive(Debug)]
pub(crate) enum NodeOutcome {
    Completed,
    Skipped,
    /// Failed, run continues with the next sibling.
    Failed(Fault),
    /// Failed, run aborts.
    Abort(Fault),
    Cancelled,
}

enum ConditionCheck {
    Pass,
    Skip,
    FailRequired(Fault),
}

/// Progress fan-out shared by the walker and its parallel sub-runners.
pub(crate) struct ProgressSink<C: Clock> {
    pub clock: C,
    pub run_id: RunId,
    pub broadcast: broadcast::Sender<ProgressEvent>,
    pub events: mpsc::Sender<Event>,
    pub cursor: Arc<Mutex<Option<NodeId>>>,
    pub stats: Arc<Mutex<RunStats>>,
}

impl<C: Clock> Clone for ProgressSink<C> {
    fn clone(&self) -> Self {
        Self {
            clock: self.clock.clone(),
            run_id: self.run_id.clone(),
            broadcast: self.broadcast.clone(),
            events: self.events.clone(),
            cursor: Arc::clone(&self.cursor),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<C: Clock> ProgressSink<C> {
    pub fn emit(&self, node_id: &NodeId, kind: ProgressKind) {
        let event = ProgressEvent::new(self.clock.epoch_ms(), node_id.clone(), kind);
        // Slow broadcast subscribers lag rather than block us.
        let _ = self.broadcast.send(event.clone());
        let _ = self.events.try_send(Event::TaskProgress {
            run_id: self.run_id.clone(),
            progress: event,
        });
    }

    fn set_cursor(&self, node_id: &NodeId) {
        *self.cursor.lock() = Some(node_id.clone());
    }
}

pub(crate) struct Walker<C: Clock> {
    pub sink: ProgressSink<C>,
    pub adapter: Arc<dyn ActionAdapter>,
    pub config: Arc<ConfigStore>,
    pub cancel: CancellationToken,
    /// Present only on the main walker; parallel sub-runners and hook
    /// runners do not receive interrupts.
    pub interrupts: Option<mpsc::Receiver<TaskNode>>,
    pub options: watch::Receiver<EngineOptions>,
}

type BoxedOutcome<'a> = Pin<Box<dyn Future<Output = NodeOutcome> + Send + 'a>>;

impl<C: Clock> Walker<C> {
    /// Run a whole tree to a terminal status.
    pub async fn run(mut self, tree: &TaskNode, root_behavior: ErrorBehavior) -> RunStatus {
        let outcome = self.run_node(tree, root_behavior, false).await;
        *self.sink.cursor.lock() = None;
        match outcome {
            NodeOutcome::Completed | NodeOutcome::Skipped => RunStatus::Completed,
            NodeOutcome::Failed(_) | NodeOutcome::Abort(_) => RunStatus::Failed,
            NodeOutcome::Cancelled => RunStatus::Cancelled,
        }
    }

    fn run_node<'a>(
        &'a mut self,
        node: &'a TaskNode,
        inherited: ErrorBehavior,
        interruptible: bool,
    ) -> BoxedOutcome<'a> {
        Box::pin(async move {
            let behavior = node.error_behavior.unwrap_or(inherited);
            let interruptible = interruptible || node.accept_interrupts;
            let mut attempts_used: u32 = 0;

            let outcome = loop {
                match self.attempt_node(node, behavior, interruptible).await {
                    Ok(outcome) => break outcome,
                    Err(fault) => {
                        attempts_used += 1;
                        self.sink
                            .emit(&node.id, ProgressKind::StepFailed { fault: fault.clone() });
                        self.sink.stats.lock().failed += 1;

                        if fault.kind == ErrorKind::Cancelled {
                            break NodeOutcome::Cancelled;
                        }
                        let retries_left = attempts_used < node.attempt_limit;
                        let retrying = matches!(
                            behavior,
                            ErrorBehavior::RetryThenSkip | ErrorBehavior::RetryThenStop
                        );
                        if retrying && retries_left {
                            self.sink.stats.lock().retried += 1;
                            if !self.backoff(attempts_used).await {
                                break NodeOutcome::Cancelled;
                            }
                            continue;
                        }
                        break match behavior {
                            ErrorBehavior::SkipNode | ErrorBehavior::RetryThenSkip => {
                                NodeOutcome::Failed(fault)
                            }
                            ErrorBehavior::StopRun | ErrorBehavior::RetryThenStop => {
                                NodeOutcome::Abort(fault)
                            }
                        };
                    }
                }
            };

            if matches!(
                outcome,
                NodeOutcome::Failed(_) | NodeOutcome::Abort(_) | NodeOutcome::Cancelled
            ) {
                if let Some(hook) = node.triggers.on_error.as_deref() {
                    self.run_hook(hook).await;
                }
            }
            outcome
        })
    }

    /// One attempt at a node. `Err` means this node itself failed and the
    /// attempt/error-behavior machinery decides what happens next.
    async fn attempt_node(
        &mut self,
        node: &TaskNode,
        behavior: ErrorBehavior,
        interruptible: bool,
    ) -> Result<NodeOutcome, Fault> {
        if self.cancel.is_cancelled() {
            return Ok(NodeOutcome::Cancelled);
        }
        self.sink.set_cursor(&node.id);
        if !self.pace().await {
            return Ok(NodeOutcome::Cancelled);
        }

        match self.check_conditions(node) {
            ConditionCheck::Pass => {}
            ConditionCheck::Skip => {
                self.sink.emit(&node.id, ProgressKind::StepSkipped);
                self.sink.stats.lock().skipped += 1;
                return Ok(NodeOutcome::Skipped);
            }
            ConditionCheck::FailRequired(fault) => return Err(fault),
        }

        if let Some(hook) = node.triggers.before_start.as_deref() {
            self.run_hook(hook).await;
        }

        self.sink.emit(&node.id, ProgressKind::StepStarted);
        self.sink.stats.lock().visited += 1;

        let outcome = match &node.kind {
            NodeKind::Loop { count, while_condition } => {
                self.run_loop(node, *count, while_condition.as_deref(), behavior, interruptible)
                    .await?
            }
            NodeKind::Group { mode: GroupMode::Sequential } => {
                self.run_sequential(node, behavior, interruptible).await?
            }
            NodeKind::Group { mode: GroupMode::Parallel } => {
                self.run_parallel(node, behavior).await?
            }
            _leaf => {
                self.execute_leaf(node, interruptible).await?;
                NodeOutcome::Completed
            }
        };

        if matches!(outcome, NodeOutcome::Completed) {
            self.sink.emit(&node.id, ProgressKind::StepCompleted);
            self.sink.stats.lock().completed += 1;
            if let Some(hook) = node.triggers.after_complete.as_deref() {
                self.run_hook(hook).await;
            }
        }
        Ok(outcome)
    }

    async fn run_loop(
        &mut self,
        node: &TaskNode,
        count: Option<u64>,
        while_condition: Option<&Condition>,
        behavior: ErrorBehavior,
        interruptible: bool,
    ) -> Result<NodeOutcome, Fault> {
        let mut iteration: u64 = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Ok(NodeOutcome::Cancelled);
            }
            if let Some(count) = count {
                if iteration >= count {
                    break;
                }
            }
            if let Some(condition) = while_condition {
                if !self.evaluate(&condition.test) {
                    break;
                }
            }
            iteration += 1;
            self.sink.emit(&node.id, ProgressKind::LoopIteration { iteration });

            for child in &node.children {
                match self.run_node(child, behavior, interruptible).await {
                    NodeOutcome::Completed | NodeOutcome::Skipped | NodeOutcome::Failed(_) => {}
                    NodeOutcome::Cancelled => return Ok(NodeOutcome::Cancelled),
                    NodeOutcome::Abort(fault) => return Ok(NodeOutcome::Abort(fault)),
                }
            }
        }
        Ok(NodeOutcome::Completed)
    }

    async fn run_sequential(
        &mut self,
        node: &TaskNode,
        behavior: ErrorBehavior,
        interruptible: bool,
    ) -> Result<NodeOutcome, Fault> {
        for child in &node.children {
            match self.run_node(child, behavior, interruptible).await {
                NodeOutcome::Completed | NodeOutcome::Skipped | NodeOutcome::Failed(_) => {}
                NodeOutcome::Cancelled => return Ok(NodeOutcome::Cancelled),
                NodeOutcome::Abort(fault) => return Ok(NodeOutcome::Abort(fault)),
            }
        }
        Ok(NodeOutcome::Completed)
    }

    /// Parallel group: N sub-runners sharing the run's cancellation token
    /// (through a child token so strict groups can stop siblings), joined
    /// here. Strict policy (abort-flavored behavior) fails the group on the
    /// first child failure.
    async fn run_parallel(
        &mut self,
        node: &TaskNode,
        behavior: ErrorBehavior,
    ) -> Result<NodeOutcome, Fault> {
        let strict = matches!(behavior, ErrorBehavior::StopRun | ErrorBehavior::RetryThenStop);
        let group_cancel = self.cancel.child_token();
        let mut set: JoinSet<NodeOutcome> = JoinSet::new();

        for child in node.children.clone() {
            let sub = Walker {
                sink: self.sink.clone(),
                adapter: Arc::clone(&self.adapter),
                config: Arc::clone(&self.config),
                cancel: group_cancel.clone(),
                interrupts: None,
                options: self.options.clone(),
            };
            set.spawn(sub.run_owned(child, behavior));
        }

        let mut first_fault: Option<Fault> = None;
        let mut aborted: Option<Fault> = None;
        let mut cancelled = false;
        while let Some(joined) = set.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e, "parallel child panicked or was aborted");
                    NodeOutcome::Failed(Fault::internal("parallel child aborted"))
                }
            };
            match outcome {
                NodeOutcome::Completed | NodeOutcome::Skipped => {}
                NodeOutcome::Failed(fault) => {
                    if first_fault.is_none() {
                        first_fault = Some(fault);
                    }
                    if strict {
                        group_cancel.cancel();
                    }
                }
                NodeOutcome::Abort(fault) => {
                    aborted.get_or_insert(fault);
                    group_cancel.cancel();
                }
                NodeOutcome::Cancelled => cancelled = true,
            }
        }

        if self.cancel.is_cancelled() {
            return Ok(NodeOutcome::Cancelled);
        }
        if let Some(fault) = aborted {
            return Ok(NodeOutcome::Abort(fault));
        }
        match (strict, first_fault, cancelled) {
            (true, Some(fault), _) => Err(fault),
            (false, _, true) => Ok(NodeOutcome::Cancelled),
            _ => Ok(NodeOutcome::Completed),
        }
    }

    /// Consume self to produce a `'static` future for JoinSet spawning.
    fn run_owned(
        mut self,
        node: TaskNode,
        behavior: ErrorBehavior,
    ) -> impl Future<Output = NodeOutcome> + Send
    where
        C: Clock,
    {
        async move { self.run_node(&node, behavior, false).await }
    }

    /// Execute a leaf, restarting from scratch when an interrupt diverts it.
    async fn execute_leaf(&mut self, node: &TaskNode, interruptible: bool) -> Result<(), Fault> {
        loop {
            let leaf_cancel = self.cancel.child_token();
            let work = self.leaf_future(node, &leaf_cancel)?;

            let receiver = if interruptible { self.interrupts.take() } else { None };
            let Some(mut rx) = receiver else {
                return work.await.map(drop);
            };

            enum Sel {
                Done(Result<ConfigValue, Fault>),
                Interrupt(Option<TaskNode>),
            }
            let sel = tokio::select! {
                result = work => Sel::Done(result),
                request = rx.recv() => Sel::Interrupt(request),
            };

            match sel {
                Sel::Done(result) => {
                    self.interrupts = Some(rx);
                    return result.map(drop);
                }
                Sel::Interrupt(Some(subtree)) => {
                    self.interrupts = Some(rx);
                    // Suspend: abort the in-flight device call, run the
                    // interrupting subtree, then retry the leaf from the
                    // beginning. No attempt is consumed.
                    self.sink.emit(&node.id, ProgressKind::StepInterrupted);
                    leaf_cancel.cancel();
                    self.run_interrupt(&subtree).await;
                    continue;
                }
                Sel::Interrupt(None) => {
                    // Interrupt source gone for good; plain execution from
                    // here on.
                    self.interrupts = None;
                    continue;
                }
            }
        }
    }

    /// Build the leaf's work future without borrowing self.
    fn leaf_future(
        &self,
        node: &TaskNode,
        leaf_cancel: &CancellationToken,
    ) -> Result<Pin<Box<dyn Future<Output = Result<ConfigValue, Fault>> + Send>>, Fault> {
        if let NodeKind::Wait { seconds } = &node.kind {
            let cancel = self.cancel.clone();
            let duration = Duration::from_secs_f64(seconds.max(0.0));
            return Ok(Box::pin(async move {
                tokio::select! {
                    _ = tokio::time::sleep(duration) => Ok(ConfigValue::Null),
                    _ = cancel.cancelled() => Err(Fault::cancelled("wait cancelled")),
                }
            }));
        }

        let action = StepAction::from_kind(&node.kind)
            .ok_or_else(|| Fault::internal(format!("node {} is not executable", node.id)))?;
        let adapter = Arc::clone(&self.adapter);
        let cancel = leaf_cancel.clone();
        Ok(Box::pin(async move { adapter.perform(&action, &cancel).await }))
    }

    /// Run the interrupting subtree to completion in the run's context.
    async fn run_interrupt(&self, subtree: &TaskNode) {
        let sub = Walker {
            sink: self.sink.clone(),
            adapter: Arc::clone(&self.adapter),
            config: Arc::clone(&self.config),
            cancel: self.cancel.clone(),
            interrupts: None,
            options: self.options.clone(),
        };
        let outcome = sub.run_owned(subtree.clone(), ErrorBehavior::SkipNode).await;
        if let NodeOutcome::Failed(fault) | NodeOutcome::Abort(fault) = outcome {
            warn!(node = %subtree.id, error = %fault, "interrupt subtree failed");
        }
    }

    /// Run a trigger hook. Hooks execute in the run context but never
    /// cascade failures, and they run even while the run is unwinding from
    /// cancellation (fresh token).
    async fn run_hook(&self, hook: &TaskNode) {
        let sub = Walker {
            sink: self.sink.clone(),
            adapter: Arc::clone(&self.adapter),
            config: Arc::clone(&self.config),
            cancel: CancellationToken::new(),
            interrupts: None,
            options: self.options.clone(),
        };
        let outcome = sub.run_owned(hook.clone(), ErrorBehavior::SkipNode).await;
        if let NodeOutcome::Failed(fault) | NodeOutcome::Abort(fault) = outcome {
            warn!(node = %hook.id, error = %fault, "trigger hook failed");
        }
    }

    fn check_conditions(&self, node: &TaskNode) -> ConditionCheck {
        for condition in &node.conditions {
            if self.evaluate(&condition.test) {
                continue;
            }
            if condition.required {
                return ConditionCheck::FailRequired(Fault::conflict(format!(
                    "required condition on {} not met",
                    node.id
                )));
            }
            return ConditionCheck::Skip;
        }
        ConditionCheck::Pass
    }

    fn evaluate(&self, test: &ConditionTest) -> bool {
        match test {
            ConditionTest::PropertyEquals { device, name, value } => {
                self.adapter.cached_property(device, name).as_ref() == Some(value)
            }
            ConditionTest::PropertyAtMost { device, name, max } => self
                .adapter
                .cached_property(device, name)
                .and_then(|v| v.as_real())
                .is_some_and(|v| v <= *max),
            ConditionTest::PropertyAtLeast { device, name, min } => self
                .adapter
                .cached_property(device, name)
                .and_then(|v| v.as_real())
                .is_some_and(|v| v >= *min),
            ConditionTest::ConfigEquals { path, value } => {
                self.config.get(path).as_ref() == Some(value)
            }
        }
    }

    /// One engine tick. Returns false when cancelled while pacing.
    async fn pace(&self) -> bool {
        let period = self.options.borrow().tick_period;
        tokio::select! {
            _ = tokio::time::sleep(period) => true,
            _ = self.cancel.cancelled() => false,
        }
    }

    /// Exponential backoff before a retry: base × 2^attempts, capped.
    /// Returns false when cancelled while waiting.
    async fn backoff(&self, attempts_used: u32) -> bool {
        let (base, cap) = {
            let options = self.options.borrow();
            (options.backoff_base, options.backoff_cap)
        };
        let factor = 2u32.saturating_pow(attempts_used.min(16));
        let delay = base.saturating_mul(factor).min(cap);
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.cancel.cancelled() => false,
        }
    }
}
