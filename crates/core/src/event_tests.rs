// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event serialization and topic-mapping tests.

use super::*;
use yare::parameterized;

#[test]
fn tagged_serialization_uses_scoped_names() {
    let ev = Event::DeviceProperty {
        device_id: DeviceId::new("cam1"),
        name: "temperature".to_string(),
        value: ConfigValue::Real(-10.0),
    };
    let json = serde_json::to_value(&ev).unwrap();
    assert_eq!(json["type"], "device:property");
    assert_eq!(json["device_id"], "cam1");
    assert_eq!(json["value"], -10.0);
}

#[parameterized(
    state = {
        Event::DeviceState { device_id: DeviceId::new("cam1"), state: "connected".into() },
        "device.cam1.state"
    },
    property = {
        Event::DeviceProperty {
            device_id: DeviceId::new("cam1"),
            name: "temperature".into(),
            value: ConfigValue::Null,
        },
        "device.cam1.property.temperature"
    },
    fault = {
        Event::DeviceFault {
            device_id: DeviceId::new("d2"),
            fault: Fault::transport("connection refused"),
        },
        "device.d2.fault"
    },
    config = {
        Event::ConfigChanged { path: ConfigPath::parse("a.x").unwrap(), value: None },
        "config.a.x"
    },
)]
fn topics_follow_dotted_hierarchy(event: Event, topic: &str) {
    assert_eq!(event.topic(), topic);
}

#[test]
fn round_trip_through_json() {
    let ev = Event::ComponentState {
        name: "platesolver".to_string(),
        state: "failed".to_string(),
        reason: Some("entry symbol missing".to_string()),
    };
    let json = serde_json::to_string(&ev).unwrap();
    let back: Event = serde_json::from_str(&json).unwrap();
    assert_eq!(back, ev);
}
