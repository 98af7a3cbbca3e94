// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request/response mapping tests against a live in-process kernel.

use super::*;
use crate::kernel::KernelOptions;
use li_core::{ConfigPath, ConfigValue, DeviceId};
use li_devices::drivers::{SdkDriver, SimVendor};
use li_devices::DeviceDescriptor;
use li_wire::Request;
use std::sync::Arc;
use tempfile::TempDir;

async fn kernel() -> (TempDir, Kernel) {
    let dir = TempDir::new().unwrap();
    let kernel = Kernel::start(KernelOptions::new(dir.path())).await;
    (dir, kernel)
}

async fn kernel_with_camera() -> (TempDir, Kernel) {
    let (dir, kernel) = kernel().await;
    kernel
        .devices
        .register_driver(Arc::new(SdkDriver::new("sim", Arc::new(SimVendor::camera()))));
    kernel.devices.register_device(DeviceDescriptor::new(
        "cam1",
        li_devices::DeviceKind::Camera,
        "sim",
        "usb:0",
    ));
    (dir, kernel)
}

fn path(s: &str) -> ConfigPath {
    ConfigPath::parse(s).unwrap()
}

#[tokio::test]
async fn ping_pongs() {
    let (_dir, kernel) = kernel().await;
    assert_eq!(dispatch(&kernel, Request::Ping).await, Response::Pong);
}

#[tokio::test]
async fn config_set_then_get() {
    let (_dir, kernel) = kernel().await;
    let set = Request::ConfigSet { path: path("site.name"), value: "backyard".into() };
    assert_eq!(dispatch(&kernel, set).await, Response::Ok);

    let get = Request::ConfigGet { path: path("site.name") };
    assert_eq!(
        dispatch(&kernel, get).await,
        Response::Value { value: Some("backyard".into()) }
    );

    let missing = Request::ConfigGet { path: path("site.ghost") };
    assert_eq!(dispatch(&kernel, missing).await, Response::Value { value: None });
}

#[tokio::test]
async fn device_errors_surface_with_taxonomy_kind() {
    let (_dir, kernel) = kernel().await;
    let response = dispatch(&kernel, Request::DeviceConnect { id: DeviceId::new("ghost") }).await;
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["type"], "error");
    assert_eq!(json["kind"], "not-found");
}

#[tokio::test]
async fn device_connect_get_set_invoke_list() {
    let (_dir, kernel) = kernel_with_camera().await;
    let id = DeviceId::new("cam1");

    assert_eq!(dispatch(&kernel, Request::DeviceConnect { id: id.clone() }).await, Response::Ok);

    let get = Request::GetProperty { id: id.clone(), name: "temperature".into(), max_age_ms: None };
    assert_eq!(
        dispatch(&kernel, get).await,
        Response::Value { value: Some(ConfigValue::Real(-10.0)) }
    );

    let set = Request::SetProperty { id: id.clone(), name: "gain".into(), value: ConfigValue::Int(42) };
    assert_eq!(dispatch(&kernel, set).await, Response::Ok);

    let invoke = Request::InvokeAction {
        id: id.clone(),
        action: "expose".into(),
        args: serde_json::from_value(serde_json::json!({"seconds": 0.001})).unwrap(),
        timeout_ms: None,
    };
    assert_eq!(
        dispatch(&kernel, invoke).await,
        Response::Value { value: Some(ConfigValue::Bool(true)) }
    );

    match dispatch(&kernel, Request::ListDevices).await {
        Response::Devices { devices } => {
            assert_eq!(devices.len(), 1);
            assert_eq!(devices[0].state, "connected");
            assert_eq!(devices[0].kind, "camera");
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn profile_save_load_round_trip_through_commands() {
    let (_dir, kernel) = kernel().await;
    kernel.config.set(&path("profiles.deep.exposure"), ConfigValue::Real(300.0)).unwrap();

    assert_eq!(
        dispatch(&kernel, Request::SaveProfile { name: "night1".into() }).await,
        Response::Ok
    );
    kernel.config.set(&path("profiles.deep.exposure"), ConfigValue::Real(60.0)).unwrap();
    assert_eq!(
        dispatch(&kernel, Request::LoadProfile { name: "night1".into() }).await,
        Response::Ok
    );
    assert_eq!(
        kernel.config.get(&path("profiles.deep.exposure")),
        Some(ConfigValue::Real(300.0))
    );

    assert_eq!(
        dispatch(&kernel, Request::ListProfiles).await,
        Response::Names { names: vec!["night1".to_string()] }
    );
    assert_eq!(
        dispatch(&kernel, Request::DeleteProfile { name: "night1".into() }).await,
        Response::Ok
    );
    let gone = dispatch(&kernel, Request::LoadProfile { name: "night1".into() }).await;
    let json = serde_json::to_value(&gone).unwrap();
    assert_eq!(json["kind"], "not-found");
}

#[tokio::test]
async fn script_save_load_start_status() {
    let (_dir, kernel) = kernel_with_camera().await;
    kernel.devices.connect(&DeviceId::new("cam1")).await.unwrap();

    let tree = serde_json::json!({
        "tree": {
            "id": "loop1", "kind": "loop", "count": 2,
            "children": [
                {"id": "exp1", "kind": "take-exposure", "device": "cam1", "seconds": 0.001, "frame": "dark"}
            ]
        }
    });
    assert_eq!(
        dispatch(&kernel, Request::SaveScript { name: "darks".into(), tree }).await,
        Response::Ok
    );
    assert_eq!(
        dispatch(&kernel, Request::ListScripts).await,
        Response::Names { names: vec!["darks".to_string()] }
    );

    // Loading returns the stable tree id.
    let loaded = dispatch(&kernel, Request::LoadScript { name: "darks".into() }).await;
    let first_id = match &loaded {
        Response::Value { value: Some(ConfigValue::Str(id)) } => id.clone(),
        other => panic!("unexpected response: {other:?}"),
    };
    let again = dispatch(&kernel, Request::LoadScript { name: "darks".into() }).await;
    match again {
        Response::Value { value: Some(ConfigValue::Str(id)) } => assert_eq!(id, first_id),
        other => panic!("unexpected response: {other:?}"),
    }

    let started = dispatch(&kernel, Request::TaskStart).await;
    assert!(matches!(started, Response::TaskStarted { .. }));

    // Second start while running is refused.
    let conflict = dispatch(&kernel, Request::TaskStart).await;
    let json = serde_json::to_value(&conflict).unwrap();
    if json["type"] == "error" {
        assert_eq!(json["kind"], "conflict");
    }

    for _ in 0..500 {
        if !kernel.engine.run_active() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    match dispatch(&kernel, Request::TaskStatus).await {
        Response::TaskStatus { run } => {
            assert_eq!(run.status, "completed");
            assert_eq!(run.cursor, None);
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn bad_script_document_is_invalid_argument() {
    let (_dir, kernel) = kernel().await;
    let response = dispatch(
        &kernel,
        Request::SaveScript { name: "bad".into(), tree: serde_json::json!({"nope": true}) },
    )
    .await;
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["kind"], "invalid-argument");
}

#[tokio::test]
async fn status_reports_counts() {
    let (_dir, kernel) = kernel_with_camera().await;
    kernel.devices.connect(&DeviceId::new("cam1")).await.unwrap();

    match dispatch(&kernel, Request::Status).await {
        Response::Status { devices_connected, run_active, .. } => {
            assert_eq!(devices_connected, 1);
            assert!(!run_active);
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn stop_without_run_is_ok() {
    let (_dir, kernel) = kernel().await;
    assert_eq!(dispatch(&kernel, Request::TaskStop).await, Response::Ok);
}

#[tokio::test]
async fn list_components_is_empty_without_bundles() {
    let (_dir, kernel) = kernel().await;
    assert_eq!(
        dispatch(&kernel, Request::ListComponents).await,
        Response::Components { components: Vec::new() }
    );
}
