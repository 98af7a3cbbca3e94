// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! li-daemon: the Lithium control daemon.
//!
//! Wires the config store, component runtime, device manager, and sequence
//! engine together, and serves the framed command surface on a Unix socket
//! (plus optional TCP).

pub mod dispatch;
pub mod env;
pub mod kernel;
pub mod lifecycle;
pub mod listener;

pub use kernel::{Kernel, KernelOptions};
pub use lifecycle::{startup, Config as DaemonConfig, DaemonState, LifecycleError};
