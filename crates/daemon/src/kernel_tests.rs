// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use li_devices::drivers::{SdkDriver, SimVendor};
use li_devices::DeviceDescriptor;
use tempfile::TempDir;
use yare::parameterized;

async fn kernel() -> (TempDir, Kernel) {
    let dir = TempDir::new().unwrap();
    let kernel = Kernel::start(KernelOptions::new(dir.path())).await;
    (dir, kernel)
}

#[parameterized(
    exact = { "device.cam1.state", "device.cam1.state", true },
    ancestor = { "device.cam1", "device.cam1.state", true },
    root = { "device", "device.cam1.property.temperature", true },
    not_boundary = { "device.cam", "device.cam1.state", false },
    different = { "task", "device.cam1.state", false },
)]
fn topic_prefixes_match_on_segments(prefix: &str, topic: &str, expected: bool) {
    assert_eq!(topic_matches(prefix, topic), expected);
}

#[tokio::test]
async fn config_changes_fan_out_with_topic() {
    let (_dir, kernel) = kernel().await;
    let mut events = kernel.subscribe();

    kernel
        .config
        .set(&ConfigPath::parse("site.latitude").unwrap(), ConfigValue::Real(47.3))
        .unwrap();

    let (topic, payload) = events.recv().await.unwrap();
    assert_eq!(topic, "config.site.latitude");
    assert_eq!(payload["type"], "config:changed");
    assert_eq!(payload["value"], 47.3);
}

#[tokio::test]
async fn device_lifecycle_events_fan_out() {
    let (_dir, kernel) = kernel().await;
    kernel
        .devices
        .register_driver(Arc::new(SdkDriver::new("sim", Arc::new(SimVendor::camera()))));
    kernel.devices.register_device(DeviceDescriptor::new(
        "cam1",
        li_devices::DeviceKind::Camera,
        "sim",
        "usb:0",
    ));

    let mut events = kernel.subscribe();
    kernel.devices.connect(&DeviceId::new("cam1")).await.unwrap();

    let (topic, payload) = events.recv().await.unwrap();
    assert_eq!(topic, "device.cam1.state");
    assert_eq!(payload["state"], "connecting");
    let (_, payload) = events.recv().await.unwrap();
    assert_eq!(payload["state"], "connected");
}

#[tokio::test]
async fn builtin_drivers_are_registered_at_startup() {
    let (_dir, kernel) = kernel().await;
    // The line and rest drivers exist; opening against nothing fails with
    // transport, not driver-not-found.
    kernel.devices.register_device(DeviceDescriptor::new(
        "d1",
        li_devices::DeviceKind::Other,
        "line",
        "127.0.0.1:1",
    ));
    let err = kernel.devices.connect(&DeviceId::new("d1")).await.unwrap_err();
    assert_eq!(err.kind, li_core::ErrorKind::Transport);
}

#[tokio::test]
async fn shutdown_is_clean_with_live_devices() {
    let (_dir, kernel) = kernel().await;
    kernel
        .devices
        .register_driver(Arc::new(SdkDriver::new("sim", Arc::new(SimVendor::camera()))));
    kernel.devices.register_device(DeviceDescriptor::new(
        "cam1",
        li_devices::DeviceKind::Camera,
        "sim",
        "usb:0",
    ));
    kernel.devices.connect(&DeviceId::new("cam1")).await.unwrap();

    kernel.shutdown().await;
    assert_eq!(kernel.devices.connected_count(), 0);
    assert!(!kernel.engine.run_active());
}
