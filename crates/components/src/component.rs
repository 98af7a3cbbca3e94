// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The component contract: what a loaded plug-in exposes to the runtime.

use std::sync::Arc;

use li_config::ConfigStore;
use li_core::{ConfigValue, DeviceId, Fault};

/// A named operation a component instance exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    pub name: String,
    pub description: String,
}

impl Capability {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self { name: name.into(), description: description.into() }
    }
}

/// Restricted read-only view of the device manager handed to components.
///
/// Components never get session handles; they observe ids and cached
/// property values only.
pub trait DeviceDirectory: Send + Sync {
    fn device_ids(&self) -> Vec<DeviceId>;
    fn cached_property(&self, id: &DeviceId, name: &str) -> Option<ConfigValue>;
}

/// Capabilities granted to a component at initialization.
#[derive(Clone)]
pub struct InitContext {
    pub config: Arc<ConfigStore>,
    pub devices: Arc<dyn DeviceDirectory>,
}

/// The contract implemented by every component, whether statically linked,
/// loaded from a shared library, or proxied from an out-of-process host.
///
/// The entry symbol named by a bundle's manifest has the signature
/// `fn() -> Box<dyn Component>`.
pub trait Component: Send + Sync {
    /// One-time setup with access to the granted context.
    fn initialize(&self, ctx: &InitContext) -> Result<(), Fault>;

    /// Transition to Running. Default is a no-op for passive components.
    fn start(&self) -> Result<(), Fault> {
        Ok(())
    }

    /// Transition out of Running. Must be idempotent.
    fn stop(&self) {}

    /// The capability set this instance exposes.
    fn capabilities(&self) -> Vec<Capability>;

    /// Invoke one capability by name.
    fn invoke(&self, capability: &str, args: ConfigValue) -> Result<ConfigValue, Fault>;
}

/// Entry-point signature resolved from a bundle's shared library.
pub type ComponentEntry = fn() -> Box<dyn Component>;
