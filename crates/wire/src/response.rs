// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command-surface responses and the subscriber event frame.

use li_core::{ConfigValue, DeviceId, Fault, NodeId, RunId};
use serde::{Deserialize, Serialize};

/// One device row in `device:list`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceEntry {
    pub id: DeviceId,
    pub kind: String,
    pub driver: String,
    pub state: String,
    /// Number of cached properties.
    pub properties: usize,
}

/// One bundle row in `component:list`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentEntry {
    pub name: String,
    pub version: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Per-device outcome of `device:connect-profile`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectResult {
    pub id: DeviceId,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<Fault>,
}

/// Active-run summary for `task:status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<NodeId>,
}

/// Response from the daemon to a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    /// Generic success
    #[serde(rename = "ok")]
    Ok,

    #[serde(rename = "pong")]
    Pong,

    #[serde(rename = "hello")]
    Hello { version: String },

    #[serde(rename = "shutting-down")]
    ShuttingDown,

    #[serde(rename = "status")]
    Status {
        uptime_secs: u64,
        devices_connected: usize,
        components_loaded: usize,
        run_active: bool,
    },

    /// A config or property value; `None` when absent.
    #[serde(rename = "value")]
    Value {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<ConfigValue>,
    },

    #[serde(rename = "devices")]
    Devices { devices: Vec<DeviceEntry> },

    #[serde(rename = "components")]
    Components { components: Vec<ComponentEntry> },

    #[serde(rename = "names")]
    Names { names: Vec<String> },

    #[serde(rename = "profile-connect")]
    ProfileConnect { outcome: String, results: Vec<ConnectResult> },

    #[serde(rename = "task-started")]
    TaskStarted { run_id: RunId },

    #[serde(rename = "task-status")]
    TaskStatus { run: RunSummary },

    /// Subscription acknowledged; event frames follow on this connection.
    #[serde(rename = "subscribed")]
    Subscribed { topics: Vec<String> },

    /// One pushed event on a subscribed connection.
    #[serde(rename = "event")]
    Event { topic: String, payload: serde_json::Value },

    /// The subscriber fell behind and missed `skipped` events.
    #[serde(rename = "lagged")]
    Lagged { skipped: u64 },

    /// Failure: `{ok: false, kind, message, context}` per the error taxonomy.
    #[serde(rename = "error")]
    Error {
        #[serde(flatten)]
        fault: Fault,
    },
}

impl Response {
    pub fn error(fault: Fault) -> Self {
        Response::Error { fault }
    }
}
