// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Progress events emitted by the sequence engine.

use crate::error::Fault;
use crate::value::ConfigValue;
use crate::NodeId;
use serde::{Deserialize, Serialize};

/// What happened at a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ProgressKind {
    StepStarted,
    StepCompleted,
    StepFailed { fault: Fault },
    StepInterrupted,
    StepSkipped,
    LoopIteration { iteration: u64 },
    ProgressHint { hint: ConfigValue },
}

/// One observable change in a running sequence.
///
/// Events for a single node are strictly ordered; ordering across unrelated
/// nodes is unspecified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub timestamp_ms: u64,
    pub node_id: NodeId,
    #[serde(flatten)]
    pub kind: ProgressKind,
}

impl ProgressEvent {
    pub fn new(timestamp_ms: u64, node_id: NodeId, kind: ProgressKind) -> Self {
        Self { timestamp_ms, node_id, kind }
    }
}
