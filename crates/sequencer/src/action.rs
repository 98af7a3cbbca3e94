// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The seam between the engine and the device manager.
//!
//! The walker turns leaf nodes into [`StepAction`]s and hands them to an
//! [`ActionAdapter`]. Production wires [`DeviceActionAdapter`]; engine
//! tests run on [`FakeAction`] without any devices.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use li_core::{Clock, ConfigValue, DeviceId, Fault};
use li_devices::DeviceManager;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::node::{FrameKind, NodeKind};

/// One device-facing operation derived from a leaf node.
#[derive(Debug, Clone, PartialEq)]
pub enum StepAction {
    Expose { device: DeviceId, seconds: f64, frame: FrameKind },
    SwitchFilter { device: DeviceId, slot: i64 },
    Focus { device: DeviceId, position: i64 },
    Dither { device: DeviceId, amount: f64 },
    SetProperty { device: DeviceId, name: String, value: ConfigValue },
}

impl StepAction {
    /// Derive the action for a leaf node. `None` for composites and for
    /// `Wait`, which the walker times out itself.
    pub fn from_kind(kind: &NodeKind) -> Option<StepAction> {
        match kind {
            NodeKind::TakeExposure { device, seconds, frame } => Some(StepAction::Expose {
                device: device.clone(),
                seconds: *seconds,
                frame: *frame,
            }),
            NodeKind::SwitchFilter { device, slot } => {
                Some(StepAction::SwitchFilter { device: device.clone(), slot: *slot })
            }
            NodeKind::Focus { device, position } => {
                Some(StepAction::Focus { device: device.clone(), position: *position })
            }
            NodeKind::Dither { device, amount } => {
                Some(StepAction::Dither { device: device.clone(), amount: *amount })
            }
            NodeKind::SetProperty { device, name, value } => Some(StepAction::SetProperty {
                device: device.clone(),
                name: name.clone(),
                value: value.clone(),
            }),
            NodeKind::Wait { .. } | NodeKind::Loop { .. } | NodeKind::Group { .. } => None,
        }
    }

    pub fn device(&self) -> &DeviceId {
        match self {
            StepAction::Expose { device, .. }
            | StepAction::SwitchFilter { device, .. }
            | StepAction::Focus { device, .. }
            | StepAction::Dither { device, .. }
            | StepAction::SetProperty { device, .. } => device,
        }
    }

    /// Short key for logs and fake planning, e.g. `expose:cam1`.
    pub fn key(&self) -> String {
        let name = match self {
            StepAction::Expose { .. } => "expose",
            StepAction::SwitchFilter { .. } => "switch-filter",
            StepAction::Focus { .. } => "focus",
            StepAction::Dither { .. } => "dither",
            StepAction::SetProperty { .. } => "set-property",
        };
        format!("{name}:{}", self.device())
    }
}

/// Performs step actions and serves cached reads for condition evaluation.
#[async_trait]
pub trait ActionAdapter: Send + Sync {
    async fn perform(
        &self,
        action: &StepAction,
        cancel: &CancellationToken,
    ) -> Result<ConfigValue, Fault>;

    /// Cached property read; never blocks on device I/O.
    fn cached_property(&self, device: &DeviceId, name: &str) -> Option<ConfigValue>;
}

/// Production adapter: acquires the device per step through the manager and
/// releases it when the call returns.
pub struct DeviceActionAdapter<C: Clock> {
    manager: Arc<DeviceManager<C>>,
    step_timeout: Duration,
}

impl<C: Clock> DeviceActionAdapter<C> {
    pub fn new(manager: Arc<DeviceManager<C>>, step_timeout: Duration) -> Self {
        Self { manager, step_timeout }
    }
}

#[async_trait]
impl<C: Clock> ActionAdapter for DeviceActionAdapter<C> {
    async fn perform(
        &self,
        action: &StepAction,
        cancel: &CancellationToken,
    ) -> Result<ConfigValue, Fault> {
        let timeout = Some(self.step_timeout);
        match action {
            StepAction::Expose { device, seconds, frame } => {
                let args: ConfigValue =
                    serde_json::from_value(json!({ "seconds": seconds, "frame": frame }))
                        .map_err(|e| Fault::internal(e.to_string()))?;
                self.manager.invoke(device, "expose", &args, timeout, cancel).await
            }
            StepAction::SwitchFilter { device, slot } => {
                self.manager
                    .set_property(device, "filter", ConfigValue::Int(*slot), timeout)
                    .await?;
                Ok(ConfigValue::Null)
            }
            StepAction::Focus { device, position } => {
                self.manager
                    .set_property(device, "focus_position", ConfigValue::Int(*position), timeout)
                    .await?;
                Ok(ConfigValue::Null)
            }
            StepAction::Dither { device, amount } => {
                let args: ConfigValue = serde_json::from_value(json!({ "amount": amount }))
                    .map_err(|e| Fault::internal(e.to_string()))?;
                self.manager.invoke(device, "dither", &args, timeout, cancel).await
            }
            StepAction::SetProperty { device, name, value } => {
                self.manager.set_property(device, name, value.clone(), timeout).await?;
                Ok(ConfigValue::Null)
            }
        }
    }

    fn cached_property(&self, device: &DeviceId, name: &str) -> Option<ConfigValue> {
        self.manager.cached_property(device, name).map(|c| c.value)
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeAction;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};

    /// Scripted outcome for one action key.
    enum Planned {
        Ok(ConfigValue),
        Fail(Fault),
        /// Park until cancelled (or interrupted).
        Hang,
    }

    /// Test adapter: records every performed action and plays back planned
    /// outcomes per action key (default success).
    #[derive(Default)]
    pub struct FakeAction {
        performed: Mutex<Vec<StepAction>>,
        plans: Mutex<HashMap<String, VecDeque<Planned>>>,
        props: Mutex<HashMap<(String, String), ConfigValue>>,
        delay: Mutex<Option<Duration>>,
    }

    impl FakeAction {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Every perform sleeps this long first (drive with a paused runtime).
        pub fn with_delay(self: &Arc<Self>, delay: Duration) -> Arc<Self> {
            *self.delay.lock() = Some(delay);
            Arc::clone(self)
        }

        pub fn plan_ok(&self, key: &str, result: ConfigValue) {
            self.plans.lock().entry(key.to_string()).or_default().push_back(Planned::Ok(result));
        }

        pub fn plan_fail(&self, key: &str, fault: Fault) {
            self.plans.lock().entry(key.to_string()).or_default().push_back(Planned::Fail(fault));
        }

        /// Next call on `key` parks until its token cancels.
        pub fn plan_hang(&self, key: &str) {
            self.plans.lock().entry(key.to_string()).or_default().push_back(Planned::Hang);
        }

        pub fn set_cached(&self, device: &str, name: &str, value: ConfigValue) {
            self.props.lock().insert((device.to_string(), name.to_string()), value);
        }

        pub fn performed(&self) -> Vec<StepAction> {
            self.performed.lock().clone()
        }

        pub fn performed_keys(&self) -> Vec<String> {
            self.performed.lock().iter().map(StepAction::key).collect()
        }

        pub fn count(&self, key: &str) -> usize {
            self.performed.lock().iter().filter(|a| a.key() == key).count()
        }
    }

    #[async_trait]
    impl ActionAdapter for FakeAction {
        async fn perform(
            &self,
            action: &StepAction,
            cancel: &CancellationToken,
        ) -> Result<ConfigValue, Fault> {
            let delay = *self.delay.lock();
            if let Some(delay) = delay {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        return Err(Fault::cancelled(format!("{} cancelled", action.key())));
                    }
                }
            }

            let planned = self.plans.lock().get_mut(&action.key()).and_then(VecDeque::pop_front);
            let outcome = match planned {
                None => Ok(ConfigValue::Null),
                Some(Planned::Ok(value)) => Ok(value),
                Some(Planned::Fail(fault)) => Err(fault),
                Some(Planned::Hang) => {
                    cancel.cancelled().await;
                    Err(Fault::cancelled(format!("{} cancelled", action.key())))
                }
            };
            // Record only attempts that actually reached the device.
            self.performed.lock().push(action.clone());
            outcome
        }

        fn cached_property(&self, device: &DeviceId, name: &str) -> Option<ConfigValue> {
            self.props.lock().get(&(device.to_string(), name.to_string())).cloned()
        }
    }
}
