// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reference-counted capability handles with a stale bit.
//!
//! A handle keeps the backing library mapped (through the instance it
//! weakly references being kept alive by the runtime) for as long as the
//! runtime allows. Force-unload poisons outstanding handles; poisoned
//! handles fail every call with `stale-handle` and never touch the
//! component again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use li_core::{ConfigValue, Fault};

use crate::runtime::Instance;

#[derive(Debug)]
pub(crate) struct HandleInner {
    pub(crate) component: String,
    pub(crate) capability: String,
    pub(crate) stale: AtomicBool,
    pub(crate) instance: Weak<Instance>,
}

/// A caller's grip on one `(component, capability)` pair.
#[derive(Clone, Debug)]
pub struct CapabilityHandle {
    inner: Arc<HandleInner>,
}

impl CapabilityHandle {
    pub(crate) fn new(component: &str, capability: &str, instance: &Arc<Instance>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                component: component.to_string(),
                capability: capability.to_string(),
                stale: AtomicBool::new(false),
                instance: Arc::downgrade(instance),
            }),
        }
    }

    pub(crate) fn ledger_entry(&self) -> Weak<HandleInner> {
        Arc::downgrade(&self.inner)
    }

    pub fn component(&self) -> &str {
        &self.inner.component
    }

    pub fn capability(&self) -> &str {
        &self.inner.capability
    }

    pub fn is_stale(&self) -> bool {
        self.inner.stale.load(Ordering::Acquire)
    }

    /// Invoke the capability.
    ///
    /// Fails with `stale-handle` once the handle is poisoned or the
    /// component instance is gone.
    pub async fn call(&self, args: ConfigValue) -> Result<ConfigValue, Fault> {
        if self.is_stale() {
            return Err(Fault::stale_handle(format!(
                "capability {}:{} was force-unloaded",
                self.inner.component, self.inner.capability
            )));
        }
        let instance = self.inner.instance.upgrade().ok_or_else(|| {
            Fault::stale_handle(format!(
                "component {} is no longer loaded",
                self.inner.component
            ))
        })?;
        instance.invoke(&self.inner.capability, args).await
    }
}

pub(crate) fn poison(entries: &[Weak<HandleInner>]) {
    for entry in entries {
        if let Some(inner) = entry.upgrade() {
            inner.stale.store(true, Ordering::Release);
        }
    }
}

/// Count ledger entries whose handles are still held by callers.
pub(crate) fn live_count(entries: &[Weak<HandleInner>]) -> usize {
    entries.iter().filter(|w| w.strong_count() > 0).count()
}
