// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The driver abstraction every transport implements.

use async_trait::async_trait;
use li_core::{ConfigValue, Fault};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::descriptor::DeviceDescriptor;

/// Out-of-band events a session pushes to the manager.
///
/// Sessions do not know their device id; the manager tags the merged
/// stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A property value was observed (reply or unsolicited update).
    Property { name: String, value: ConfigValue, writable: bool },
    /// The transport died; the manager faults the session.
    Lost { fault: Fault },
}

/// One transport/vendor implementation.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Stable driver name referenced by connection profiles.
    fn name(&self) -> &str;

    /// Cheap reachability check; `None` when nothing answers at `address`.
    async fn probe(&self, address: &str) -> Option<DeviceDescriptor>;

    /// Open a session. `events` outlives the session and carries
    /// unsolicited updates plus the loss notification.
    async fn open(
        &self,
        descriptor: &DeviceDescriptor,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Box<dyn DriverSession>, Fault>;
}

/// A live connection to one device.
///
/// Callers (the manager) serialize requests per session; implementations
/// may assume no concurrent calls.
#[async_trait]
pub trait DriverSession: Send + Sync {
    async fn get_property(&self, name: &str) -> Result<ConfigValue, Fault>;

    /// Write a property. Returns the refreshed value from the reply.
    async fn set_property(&self, name: &str, value: &ConfigValue) -> Result<ConfigValue, Fault>;

    /// Invoke a named action. Cancellation is best-effort and surfaces as
    /// a `cancelled` fault.
    async fn invoke(
        &self,
        action: &str,
        args: &ConfigValue,
        cancel: &CancellationToken,
    ) -> Result<ConfigValue, Fault>;

    /// Release the transport. Idempotent.
    async fn close(&self);
}

impl std::fmt::Debug for dyn DriverSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverSession").finish_non_exhaustive()
    }
}
