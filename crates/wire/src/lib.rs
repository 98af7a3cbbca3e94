// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol for the control daemon.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload. The same
//! framing carries the command surface (client ↔ daemon) and the RPC stream
//! between the runtime and out-of-process component hosts.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod frame;
mod request;
mod response;
mod rpc;

pub use frame::{
    decode, encode, read_frame, read_message, write_frame, write_message, WireError, MAX_FRAME,
};
pub use request::Request;
pub use response::{ComponentEntry, ConnectResult, DeviceEntry, Response, RunSummary};
pub use rpc::{HostMessage, RpcEvent, RpcReply, RpcRequest, RPC_EVENT_ID};
