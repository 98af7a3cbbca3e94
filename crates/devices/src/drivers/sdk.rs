// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Vendor SDK wrapper: implements the driver abstraction by calling an
//! in-process vendor library through its bindings. There is no wire format,
//! only a function-call boundary. Vendor error codes map into the taxonomy
//! with the raw code preserved as context.

use std::sync::Arc;

use async_trait::async_trait;
use li_core::{ConfigValue, ErrorKind, Fault};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::descriptor::{DeviceDescriptor, DeviceKind};
use crate::driver::{Driver, DriverSession, SessionEvent};

/// Raw error from the vendor bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorError {
    pub code: i32,
    pub message: String,
}

impl VendorError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// Well-known vendor status codes.
pub mod codes {
    pub const CANCELLED: i32 = -3;
    pub const IO: i32 = -2;
    pub const LINK_LOST: i32 = -1;
    pub const UNKNOWN_PROPERTY: i32 = 1;
    pub const UNSUPPORTED: i32 = 2;
    pub const BAD_VALUE: i32 = 3;
    pub const READ_ONLY: i32 = 4;
    pub const BUSY: i32 = 5;
}

fn map_vendor_error(e: VendorError) -> Fault {
    let kind = match e.code {
        codes::CANCELLED => ErrorKind::Cancelled,
        codes::IO => ErrorKind::Transport,
        codes::LINK_LOST => ErrorKind::Disconnected,
        codes::UNKNOWN_PROPERTY => ErrorKind::NotFound,
        codes::UNSUPPORTED | codes::READ_ONLY => ErrorKind::NotSupported,
        codes::BAD_VALUE => ErrorKind::InvalidArgument,
        codes::BUSY => ErrorKind::Conflict,
        _ => ErrorKind::Faulted,
    };
    Fault::new(kind, e.message).with_context(format!("vendor code {}", e.code))
}

/// The vendor binding surface the wrapper drives.
#[async_trait]
pub trait VendorApi: Send + Sync {
    async fn connect(&self, address: &str) -> Result<(), VendorError>;
    async fn disconnect(&self);
    async fn read(&self, name: &str) -> Result<ConfigValue, VendorError>;
    async fn write(&self, name: &str, value: &ConfigValue) -> Result<ConfigValue, VendorError>;
    async fn perform(
        &self,
        action: &str,
        args: &ConfigValue,
        cancel: &CancellationToken,
    ) -> Result<ConfigValue, VendorError>;
    fn writable(&self, name: &str) -> bool;
}

/// Driver adapter over one vendor library.
pub struct SdkDriver {
    name: String,
    vendor: Arc<dyn VendorApi>,
}

impl SdkDriver {
    pub fn new(name: impl Into<String>, vendor: Arc<dyn VendorApi>) -> Self {
        Self { name: name.into(), vendor }
    }
}

#[async_trait]
impl Driver for SdkDriver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self, address: &str) -> Option<DeviceDescriptor> {
        self.vendor.connect(address).await.ok()?;
        self.vendor.disconnect().await;
        Some(DeviceDescriptor::new(
            address.replace([':', '.', '/'], "-"),
            DeviceKind::Other,
            self.name.clone(),
            address,
        ))
    }

    async fn open(
        &self,
        descriptor: &DeviceDescriptor,
        _events: mpsc::Sender<SessionEvent>,
    ) -> Result<Box<dyn DriverSession>, Fault> {
        self.vendor.connect(&descriptor.address).await.map_err(map_vendor_error)?;
        Ok(Box::new(SdkSession { vendor: Arc::clone(&self.vendor) }))
    }
}

struct SdkSession {
    vendor: Arc<dyn VendorApi>,
}

#[async_trait]
impl DriverSession for SdkSession {
    async fn get_property(&self, name: &str) -> Result<ConfigValue, Fault> {
        self.vendor.read(name).await.map_err(map_vendor_error)
    }

    async fn set_property(&self, name: &str, value: &ConfigValue) -> Result<ConfigValue, Fault> {
        if !self.vendor.writable(name) {
            return Err(Fault::not_supported(format!("property {name} is read-only"))
                .with_context(format!("vendor code {}", codes::READ_ONLY)));
        }
        self.vendor.write(name, value).await.map_err(map_vendor_error)
    }

    async fn invoke(
        &self,
        action: &str,
        args: &ConfigValue,
        cancel: &CancellationToken,
    ) -> Result<ConfigValue, Fault> {
        self.vendor.perform(action, args, cancel).await.map_err(map_vendor_error)
    }

    async fn close(&self) {
        self.vendor.disconnect().await;
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use sim::SimVendor;

#[cfg(any(test, feature = "test-support"))]
mod sim {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Simulated vendor library: one camera-ish device with a filter wheel
    /// and focuser mixed in, enough surface for engine and scenario tests.
    pub struct SimVendor {
        props: Mutex<HashMap<String, (ConfigValue, bool)>>,
        exposure_delay: Duration,
        reachable: bool,
        connected: AtomicBool,
    }

    impl SimVendor {
        pub fn camera() -> Self {
            let mut props = HashMap::new();
            props.insert("temperature".to_string(), (ConfigValue::Real(-10.0), false));
            props.insert("exposure_count".to_string(), (ConfigValue::Int(0), false));
            props.insert("gain".to_string(), (ConfigValue::Int(100), true));
            props.insert("filter".to_string(), (ConfigValue::Int(1), true));
            props.insert("focus_position".to_string(), (ConfigValue::Int(5_000), true));
            Self {
                props: Mutex::new(props),
                exposure_delay: Duration::from_millis(10),
                reachable: true,
                connected: AtomicBool::new(false),
            }
        }

        /// A camera whose exposures take `delay` (for cancellation and
        /// interrupt tests under a paused runtime).
        pub fn slow_camera(delay: Duration) -> Self {
            let mut sim = Self::camera();
            sim.exposure_delay = delay;
            sim
        }

        /// A vendor that refuses every connection attempt.
        pub fn unreachable() -> Self {
            let mut sim = Self::camera();
            sim.reachable = false;
            sim
        }

        pub fn exposure_count(&self) -> i64 {
            self.props
                .lock()
                .get("exposure_count")
                .and_then(|(v, _)| v.as_int())
                .unwrap_or(0)
        }

        pub fn set_prop(&self, name: &str, value: ConfigValue, writable: bool) {
            self.props.lock().insert(name.to_string(), (value, writable));
        }
    }

    #[async_trait]
    impl VendorApi for SimVendor {
        async fn connect(&self, address: &str) -> Result<(), VendorError> {
            if !self.reachable {
                return Err(VendorError::new(
                    codes::IO,
                    format!("no device answers at {address}"),
                ));
            }
            self.connected.store(true, Ordering::Release);
            Ok(())
        }

        async fn disconnect(&self) {
            self.connected.store(false, Ordering::Release);
        }

        async fn read(&self, name: &str) -> Result<ConfigValue, VendorError> {
            if !self.connected.load(Ordering::Acquire) {
                return Err(VendorError::new(codes::LINK_LOST, "not connected"));
            }
            self.props
                .lock()
                .get(name)
                .map(|(v, _)| v.clone())
                .ok_or_else(|| VendorError::new(codes::UNKNOWN_PROPERTY, format!("no property {name}")))
        }

        async fn write(&self, name: &str, value: &ConfigValue) -> Result<ConfigValue, VendorError> {
            if !self.connected.load(Ordering::Acquire) {
                return Err(VendorError::new(codes::LINK_LOST, "not connected"));
            }
            let mut props = self.props.lock();
            match props.get_mut(name) {
                Some((_, false)) => {
                    Err(VendorError::new(codes::READ_ONLY, format!("{name} is read-only")))
                }
                Some((slot, true)) => {
                    *slot = value.clone();
                    Ok(value.clone())
                }
                None => {
                    Err(VendorError::new(codes::UNKNOWN_PROPERTY, format!("no property {name}")))
                }
            }
        }

        async fn perform(
            &self,
            action: &str,
            args: &ConfigValue,
            cancel: &CancellationToken,
        ) -> Result<ConfigValue, VendorError> {
            if !self.connected.load(Ordering::Acquire) {
                return Err(VendorError::new(codes::LINK_LOST, "not connected"));
            }
            match action {
                "expose" => {
                    let seconds = args.get("seconds").and_then(|v| v.as_real()).unwrap_or(0.0);
                    if seconds < 0.0 {
                        return Err(VendorError::new(codes::BAD_VALUE, "negative exposure"));
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(self.exposure_delay) => {}
                        _ = cancel.cancelled() => {
                            return Err(VendorError::new(codes::CANCELLED, "exposure aborted"));
                        }
                    }
                    let mut props = self.props.lock();
                    if let Some((ConfigValue::Int(count), _)) = props.get_mut("exposure_count") {
                        *count += 1;
                    }
                    Ok(ConfigValue::Bool(true))
                }
                "abort" => Ok(ConfigValue::Null),
                other => {
                    Err(VendorError::new(codes::UNSUPPORTED, format!("no action {other}")))
                }
            }
        }

        fn writable(&self, name: &str) -> bool {
            self.props.lock().get(name).map(|(_, w)| *w).unwrap_or(false)
        }
    }
}

#[cfg(test)]
#[path = "sdk_tests.rs"]
mod tests;
