// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command-surface requests.

use li_core::{ConfigPath, ConfigValue, DeviceId};
use serde::{Deserialize, Serialize};

/// Request from a client to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check ping
    #[serde(rename = "ping")]
    Ping,

    /// Version handshake
    #[serde(rename = "hello")]
    Hello { version: String },

    /// Request daemon shutdown
    #[serde(rename = "shutdown")]
    Shutdown,

    /// Get daemon status
    #[serde(rename = "status")]
    Status,

    /// Upgrade this connection to an event stream for the given topics.
    /// Topic prefixes match at segment boundaries, e.g. `device.cam1`.
    #[serde(rename = "subscribe")]
    Subscribe { topics: Vec<String> },

    // -- device --
    #[serde(rename = "device:connect")]
    DeviceConnect { id: DeviceId },

    #[serde(rename = "device:disconnect")]
    DeviceDisconnect { id: DeviceId },

    /// Open every device listed in a connection profile, in declaration
    /// order, tolerating individual failures.
    #[serde(rename = "device:connect-profile")]
    ConnectProfile { name: String },

    #[serde(rename = "device:get-property")]
    GetProperty {
        id: DeviceId,
        name: String,
        /// Accept a cached value at most this old; omit for the default bound.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_age_ms: Option<u64>,
    },

    #[serde(rename = "device:set-property")]
    SetProperty { id: DeviceId, name: String, value: ConfigValue },

    #[serde(rename = "device:invoke")]
    InvokeAction {
        id: DeviceId,
        action: String,
        #[serde(default)]
        args: ConfigValue,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },

    #[serde(rename = "device:list")]
    ListDevices,

    // -- component --
    #[serde(rename = "component:rescan")]
    Rescan,

    #[serde(rename = "component:load")]
    ComponentLoad { name: String },

    #[serde(rename = "component:unload")]
    ComponentUnload {
        name: String,
        /// Poison outstanding capability handles instead of refusing.
        #[serde(default)]
        force: bool,
    },

    #[serde(rename = "component:enable")]
    ComponentEnable { name: String },

    #[serde(rename = "component:disable")]
    ComponentDisable { name: String },

    #[serde(rename = "component:list")]
    ListComponents,

    // -- task --
    #[serde(rename = "task:load-script")]
    LoadScript { name: String },

    #[serde(rename = "task:save-script")]
    SaveScript {
        name: String,
        /// Full task tree document; validated by the sequencer.
        tree: serde_json::Value,
    },

    #[serde(rename = "task:delete-script")]
    DeleteScript { name: String },

    #[serde(rename = "task:list-scripts")]
    ListScripts,

    #[serde(rename = "task:start")]
    TaskStart,

    #[serde(rename = "task:stop")]
    TaskStop,

    #[serde(rename = "task:status")]
    TaskStatus,

    // -- config --
    #[serde(rename = "config:get")]
    ConfigGet { path: ConfigPath },

    #[serde(rename = "config:set")]
    ConfigSet { path: ConfigPath, value: ConfigValue },

    #[serde(rename = "config:load-profile")]
    LoadProfile { name: String },

    #[serde(rename = "config:save-profile")]
    SaveProfile { name: String },

    #[serde(rename = "config:list-profiles")]
    ListProfiles,

    #[serde(rename = "config:delete-profile")]
    DeleteProfile { name: String },
}
