// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Manager tests over the SDK driver and the simulated vendor.

use super::*;
use crate::descriptor::DeviceKind;
use crate::drivers::{SdkDriver, SimVendor, VendorApi};
use crate::profiles::ConnectOutcome;
use li_config::ConfigStore;
use li_core::{ConfigPath, FakeClock};
use std::time::Duration as StdDuration;
use tokio::sync::mpsc::Receiver;

struct Fixture {
    manager: Arc<DeviceManager<FakeClock>>,
    clock: FakeClock,
    vendor: Arc<SimVendor>,
    events: Receiver<Event>,
}

fn cam_id() -> DeviceId {
    DeviceId::new("cam1")
}

fn fixture() -> Fixture {
    fixture_with(SimVendor::camera())
}

fn fixture_with(vendor: SimVendor) -> Fixture {
    let clock = FakeClock::at(1_000_000);
    let (event_tx, events) = mpsc::channel(256);
    let manager = DeviceManager::new(clock.clone(), event_tx, ManagerOptions::default());
    let vendor = Arc::new(vendor);
    manager.register_driver(Arc::new(SdkDriver::new(
        "sim",
        Arc::clone(&vendor) as Arc<dyn VendorApi>,
    )));
    manager.register_device(DeviceDescriptor::new(
        cam_id(),
        DeviceKind::Camera,
        "sim",
        "usb:0",
    ));
    Fixture { manager, clock, vendor, events }
}

fn drain_states(events: &mut Receiver<Event>) -> Vec<String> {
    let mut states = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let Event::DeviceState { state, .. } = event {
            states.push(state);
        }
    }
    states
}

#[tokio::test]
async fn connect_walks_the_lifecycle() {
    let mut fx = fixture();
    assert_eq!(fx.manager.session_state(&cam_id()), Some(SessionState::Disconnected));

    fx.manager.connect(&cam_id()).await.unwrap();
    assert_eq!(fx.manager.session_state(&cam_id()), Some(SessionState::Connected));
    assert_eq!(drain_states(&mut fx.events), vec!["connecting", "connected"]);

    fx.manager.disconnect(&cam_id()).await.unwrap();
    assert_eq!(fx.manager.session_state(&cam_id()), Some(SessionState::Disconnected));
    assert_eq!(drain_states(&mut fx.events), vec!["disconnecting", "disconnected"]);
}

#[tokio::test]
async fn connect_twice_is_a_conflict() {
    let fx = fixture();
    fx.manager.connect(&cam_id()).await.unwrap();
    let err = fx.manager.connect(&cam_id()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
}

#[tokio::test]
async fn unknown_device_is_not_found() {
    let fx = fixture();
    let err = fx.manager.connect(&DeviceId::new("ghost")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn failed_open_faults_the_session() {
    let mut fx = fixture_with(SimVendor::unreachable());
    let err = fx.manager.connect(&cam_id()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Transport);
    assert_eq!(fx.manager.session_state(&cam_id()), Some(SessionState::Faulted));
    assert_eq!(fx.manager.last_error(&cam_id()).map(|f| f.kind), Some(ErrorKind::Transport));

    let mut saw_fault_event = false;
    while let Ok(event) = fx.events.try_recv() {
        if matches!(event, Event::DeviceFault { .. }) {
            saw_fault_event = true;
        }
    }
    assert!(saw_fault_event);
}

#[tokio::test]
async fn reads_prefer_fresh_cache() {
    let fx = fixture();
    fx.manager.connect(&cam_id()).await.unwrap();

    // First read goes live and caches.
    let v = fx.manager.get_property(&cam_id(), "temperature", None, None).await.unwrap();
    assert_eq!(v, ConfigValue::Real(-10.0));

    // Mutate behind the cache's back; a fresh read must not see it.
    fx.vendor.set_prop("temperature", ConfigValue::Real(-5.0), false);
    let v = fx.manager.get_property(&cam_id(), "temperature", None, None).await.unwrap();
    assert_eq!(v, ConfigValue::Real(-10.0), "cache is authoritative within the bound");

    // Advance past the staleness bound; the live value appears.
    fx.clock.advance(StdDuration::from_secs(5));
    let v = fx.manager.get_property(&cam_id(), "temperature", None, None).await.unwrap();
    assert_eq!(v, ConfigValue::Real(-5.0));
}

#[tokio::test]
async fn max_age_zero_always_reads_live() {
    let fx = fixture();
    fx.manager.connect(&cam_id()).await.unwrap();

    fx.manager.get_property(&cam_id(), "temperature", None, None).await.unwrap();
    fx.vendor.set_prop("temperature", ConfigValue::Real(-7.5), false);
    fx.clock.advance(StdDuration::from_millis(1));

    let v = fx
        .manager
        .get_property(&cam_id(), "temperature", Some(StdDuration::ZERO), None)
        .await
        .unwrap();
    assert_eq!(v, ConfigValue::Real(-7.5));
}

#[tokio::test]
async fn write_refreshes_cache_from_reply() {
    let fx = fixture();
    fx.manager.connect(&cam_id()).await.unwrap();

    fx.manager.get_property(&cam_id(), "gain", None, None).await.unwrap();
    fx.manager.set_property(&cam_id(), "gain", ConfigValue::Int(250), None).await.unwrap();

    let cached = fx.manager.cached_property(&cam_id(), "gain").unwrap();
    assert_eq!(cached.value, ConfigValue::Int(250));
}

#[tokio::test]
async fn write_to_cached_read_only_property_is_rejected_locally() {
    let fx = fixture();
    fx.manager.connect(&cam_id()).await.unwrap();
    fx.manager.get_property(&cam_id(), "temperature", None, None).await.unwrap();

    let err = fx
        .manager
        .set_property(&cam_id(), "temperature", ConfigValue::Real(0.0), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotSupported);
}

#[tokio::test]
async fn calls_on_disconnected_device_fail_fast() {
    let fx = fixture();
    let err = fx.manager.get_property(&cam_id(), "temperature", None, None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn timeout_fails_the_call_but_not_the_session() {
    let fx = fixture_with(SimVendor::slow_camera(StdDuration::from_secs(60)));
    fx.manager.connect(&cam_id()).await.unwrap();

    let args: ConfigValue = serde_json::from_value(serde_json::json!({"seconds": 60.0})).unwrap();
    let err = fx
        .manager
        .invoke(
            &cam_id(),
            "expose",
            &args,
            Some(StdDuration::from_millis(100)),
            &tokio_util::sync::CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Timeout);
    assert_eq!(fx.manager.session_state(&cam_id()), Some(SessionState::Connected));
}

#[tokio::test]
async fn reopening_a_faulted_session_resets_the_cache() {
    let fx = fixture();
    fx.manager.connect(&cam_id()).await.unwrap();
    fx.manager.get_property(&cam_id(), "temperature", None, None).await.unwrap();
    assert!(fx.manager.cached_property(&cam_id(), "temperature").is_some());

    fx.manager.disconnect(&cam_id()).await.unwrap();
    fx.manager.connect(&cam_id()).await.unwrap();
    assert!(fx.manager.cached_property(&cam_id(), "temperature").is_none());
}

#[tokio::test]
async fn connect_profile_tolerates_partial_failure() {
    let clock = FakeClock::at(1_000_000);
    let (event_tx, mut events) = mpsc::channel(256);
    let manager = DeviceManager::new(clock, event_tx, ManagerOptions::default());
    manager.register_driver(Arc::new(SdkDriver::new("sim", Arc::new(SimVendor::camera()))));
    manager
        .register_driver(Arc::new(SdkDriver::new("sim-dead", Arc::new(SimVendor::unreachable()))));

    let config = ConfigStore::new();
    let devices: ConfigValue = serde_json::from_value(serde_json::json!([
        {"id": "d1", "kind": "camera", "driver": "sim", "address": "usb:0"},
        {"id": "d2", "kind": "focuser", "driver": "sim-dead", "address": "usb:9"},
    ]))
    .unwrap();
    config.set(&ConfigPath::parse("profiles.p.devices").unwrap(), devices).unwrap();

    let report = manager.connect_profile(&config, "p").await.unwrap();
    assert_eq!(report.outcome, ConnectOutcome::PartiallyConnected);
    assert_eq!(report.results.len(), 2);
    assert!(report.results[0].fault.is_none());
    assert!(report.results[1].fault.is_some());

    assert_eq!(manager.session_state(&DeviceId::new("d1")), Some(SessionState::Connected));
    assert_eq!(manager.session_state(&DeviceId::new("d2")), Some(SessionState::Faulted));

    let mut d2_faults = 0;
    while let Ok(event) = events.try_recv() {
        if let Event::DeviceFault { device_id, .. } = event {
            assert_eq!(device_id, DeviceId::new("d2"));
            d2_faults += 1;
        }
    }
    assert_eq!(d2_faults, 1);
}

#[tokio::test]
async fn connect_profile_missing_is_not_found() {
    let fx = fixture();
    let config = ConfigStore::new();
    let err = fx.manager.connect_profile(&config, "nope").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn list_reports_state_and_cache_size() {
    let fx = fixture();
    fx.manager.connect(&cam_id()).await.unwrap();
    fx.manager.get_property(&cam_id(), "temperature", None, None).await.unwrap();

    let rows = fx.manager.list();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].kind, "camera");
    assert_eq!(rows[0].state, SessionState::Connected);
    assert_eq!(rows[0].cached_properties, 1);
}
