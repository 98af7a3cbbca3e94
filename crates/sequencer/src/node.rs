// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The task tree: nodes, conditions, trigger hooks, and error behavior.

use li_core::{ConfigPath, ConfigValue, DeviceId, NodeId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TreeError {
    #[error("duplicate node id {0:?}")]
    DuplicateId(NodeId),

    #[error("node {0:?} has attempt_limit 0; the minimum is 1")]
    ZeroAttempts(NodeId),

    #[error("loop node {0:?} has no children")]
    EmptyLoop(NodeId),
}

/// What to do when a node fails. Cascades parent-to-child; a child's own
/// declaration overrides the inherited one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorBehavior {
    /// Abort the entire run.
    StopRun,
    /// Mark the node failed, continue with the next sibling.
    SkipNode,
    /// Retry up to the attempt limit, then skip.
    RetryThenSkip,
    /// Retry up to the attempt limit, then abort.
    #[default]
    RetryThenStop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum GroupMode {
    #[default]
    Sequential,
    Parallel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FrameKind {
    #[default]
    Light,
    Dark,
    Flat,
    Bias,
}

/// A predicate attached to a node. Unmet conditions skip the node unless
/// `required`, in which case the node fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(flatten)]
    pub test: ConditionTest,
    #[serde(default)]
    pub required: bool,
}

/// Condition predicates. Device reads go through the property cache only;
/// evaluation never blocks on I/O.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "test", rename_all = "kebab-case")]
pub enum ConditionTest {
    PropertyEquals { device: DeviceId, name: String, value: ConfigValue },
    PropertyAtMost { device: DeviceId, name: String, max: f64 },
    PropertyAtLeast { device: DeviceId, name: String, min: f64 },
    ConfigEquals { path: ConfigPath, value: ConfigValue },
}

/// Hook subtrees run at lifecycle boundaries of a node. They execute in
/// the same run context but do not advance the main cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TriggerHooks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_start: Option<Box<TaskNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_complete: Option<Box<TaskNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<Box<TaskNode>>,
}

impl TriggerHooks {
    pub fn is_empty(&self) -> bool {
        self.before_start.is_none() && self.after_complete.is_none() && self.on_error.is_none()
    }
}

/// Step types. The tag plus its fields flatten into the node document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum NodeKind {
    TakeExposure {
        device: DeviceId,
        seconds: f64,
        #[serde(default)]
        frame: FrameKind,
    },
    SwitchFilter {
        device: DeviceId,
        slot: i64,
    },
    Focus {
        device: DeviceId,
        position: i64,
    },
    Dither {
        device: DeviceId,
        #[serde(default)]
        amount: f64,
    },
    Wait {
        seconds: f64,
    },
    SetProperty {
        device: DeviceId,
        name: String,
        value: ConfigValue,
    },
    /// Repeat children while the condition holds, capped by `count`.
    Loop {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<u64>,
        #[serde(default, rename = "while", skip_serializing_if = "Option::is_none")]
        while_condition: Option<Box<Condition>>,
    },
    Group {
        #[serde(default)]
        mode: GroupMode,
    },
}

impl NodeKind {
    pub fn is_leaf(&self) -> bool {
        !matches!(self, NodeKind::Loop { .. } | NodeKind::Group { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::TakeExposure { .. } => "take-exposure",
            NodeKind::SwitchFilter { .. } => "switch-filter",
            NodeKind::Focus { .. } => "focus",
            NodeKind::Dither { .. } => "dither",
            NodeKind::Wait { .. } => "wait",
            NodeKind::SetProperty { .. } => "set-property",
            NodeKind::Loop { .. } => "loop",
            NodeKind::Group { .. } => "group",
        }
    }
}

fn default_attempts() -> u32 {
    1
}

/// One element of a task tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: NodeId,
    #[serde(flatten)]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TaskNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "TriggerHooks::is_empty")]
    pub triggers: TriggerHooks,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_behavior: Option<ErrorBehavior>,
    #[serde(default = "default_attempts")]
    pub attempt_limit: u32,
    /// Whether interrupt requests may divert execution inside this subtree.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub accept_interrupts: bool,
}

impl TaskNode {
    pub fn new(id: impl Into<NodeId>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            children: Vec::new(),
            conditions: Vec::new(),
            triggers: TriggerHooks::default(),
            error_behavior: None,
            attempt_limit: 1,
            accept_interrupts: false,
        }
    }

    pub fn with_children(mut self, children: Vec<TaskNode>) -> Self {
        self.children = children;
        self
    }

    /// Validate structural invariants over the whole tree.
    pub fn validate(&self) -> Result<(), TreeError> {
        let mut seen = std::collections::HashSet::new();
        self.validate_inner(&mut seen)
    }

    fn validate_inner<'a>(
        &'a self,
        seen: &mut std::collections::HashSet<&'a NodeId>,
    ) -> Result<(), TreeError> {
        if !seen.insert(&self.id) {
            return Err(TreeError::DuplicateId(self.id.clone()));
        }
        if self.attempt_limit == 0 {
            return Err(TreeError::ZeroAttempts(self.id.clone()));
        }
        if matches!(self.kind, NodeKind::Loop { .. }) && self.children.is_empty() {
            return Err(TreeError::EmptyLoop(self.id.clone()));
        }
        for child in &self.children {
            child.validate_inner(seen)?;
        }
        for hook in [
            self.triggers.before_start.as_deref(),
            self.triggers.after_complete.as_deref(),
            self.triggers.on_error.as_deref(),
        ]
        .into_iter()
        .flatten()
        {
            hook.validate_inner(seen)?;
        }
        Ok(())
    }

    /// Find a node anywhere in this subtree.
    pub fn find(&self, id: &NodeId) -> Option<&TaskNode> {
        if &self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
