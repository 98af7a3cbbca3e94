// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RPC frames between the component runtime and an out-of-process host.
//!
//! Requests flow runtime → host, replies host → runtime, correlated by a
//! non-zero `id`. Unsolicited event frames from the host use `id = 0`.

use li_core::{ConfigValue, Event, Fault};
use serde::{Deserialize, Serialize};

/// The id reserved for unsolicited event frames.
pub const RPC_EVENT_ID: u64 = 0;

/// Capability invocation sent to a host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcRequest {
    pub id: u64,
    pub op: String,
    #[serde(default)]
    pub args: ConfigValue,
}

/// Reply to one [`RpcRequest`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcReply {
    pub id: u64,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ConfigValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Fault>,
}

impl RpcReply {
    pub fn ok(id: u64, result: ConfigValue) -> Self {
        Self { id, ok: true, result: Some(result), error: None }
    }

    pub fn err(id: u64, fault: Fault) -> Self {
        Self { id, ok: false, result: None, error: Some(fault) }
    }
}

/// Unsolicited event pushed by a host (`id = 0`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcEvent {
    pub id: u64,
    pub event: Event,
}

impl RpcEvent {
    pub fn new(event: Event) -> Self {
        Self { id: RPC_EVENT_ID, event }
    }
}

/// Any frame a host may send to the runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum HostMessage {
    Reply(RpcReply),
    Event(RpcEvent),
}
