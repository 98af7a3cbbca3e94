// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! li-sequencer: the tree-structured acquisition sequence engine.
//!
//! A run walks the task tree depth-first under a single logical executor
//! task: device calls are awaited with timeouts, cancellation is
//! cooperative through one token per run, and every observable change
//! emits a progress event.

mod action;
mod engine;
mod node;
mod script;
mod walker;

pub use action::{ActionAdapter, DeviceActionAdapter, StepAction};
pub use engine::{EngineOptions, RunSnapshot, RunStats, RunStatus, SequenceEngine};
pub use node::{
    Condition, ConditionTest, ErrorBehavior, FrameKind, GroupMode, NodeKind, TaskNode,
    TreeError, TriggerHooks,
};
pub use script::{Script, ScriptError, ScriptStore};

#[cfg(any(test, feature = "test-support"))]
pub use action::FakeAction;
