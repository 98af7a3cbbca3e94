// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! System events fanned out to external subscribers.
//!
//! Serializes with `{"type": "scope:name", ...fields}` format. Each event
//! maps to a subscription topic via [`Event::topic`].

use crate::error::Fault;
use crate::path::ConfigPath;
use crate::progress::ProgressEvent;
use crate::value::ConfigValue;
use crate::{DeviceId, RunId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- device --
    /// A device session changed state (`connected`, `faulted`, ...).
    #[serde(rename = "device:state")]
    DeviceState { device_id: DeviceId, state: String },

    /// A property value was observed (reply or unsolicited update).
    #[serde(rename = "device:property")]
    DeviceProperty { device_id: DeviceId, name: String, value: ConfigValue },

    /// A session transitioned to Faulted.
    #[serde(rename = "device:fault")]
    DeviceFault { device_id: DeviceId, fault: Fault },

    // -- component --
    /// A component bundle changed state (`loaded`, `failed`, ...).
    #[serde(rename = "component:state")]
    ComponentState {
        name: String,
        state: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    // -- task --
    /// Progress in the active run.
    #[serde(rename = "task:progress")]
    TaskProgress { run_id: RunId, progress: ProgressEvent },

    /// A run reached a terminal status.
    #[serde(rename = "task:run-finished")]
    RunFinished { run_id: RunId, status: String },

    // -- config --
    /// A config leaf changed; `value` is `None` for deletions.
    #[serde(rename = "config:changed")]
    ConfigChanged {
        path: ConfigPath,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<ConfigValue>,
    },
}

impl Event {
    /// The subscription topic this event publishes under.
    ///
    /// Topics form a dotted hierarchy; a subscription matches any topic it
    /// prefixes at a segment boundary.
    pub fn topic(&self) -> String {
        match self {
            Event::DeviceState { device_id, .. } => format!("device.{device_id}.state"),
            Event::DeviceProperty { device_id, name, .. } => {
                format!("device.{device_id}.property.{name}")
            }
            Event::DeviceFault { device_id, .. } => format!("device.{device_id}.fault"),
            Event::ComponentState { name, .. } => format!("component.{name}"),
            Event::TaskProgress { .. } => "task.progress".to_string(),
            Event::RunFinished { .. } => "task.run".to_string(),
            Event::ConfigChanged { path, .. } => format!("config.{path}"),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
