// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line driver tests against an in-process TCP device fixture.

use super::*;
use li_core::DeviceId;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc::Receiver;

/// Minimal line-protocol device: answers get/set, pushes one unsolicited
/// property record when asked to "invoke" the `push` action, and closes the
/// stream on `die`.
async fn spawn_fixture() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let req: serde_json::Value = serde_json::from_str(&line).unwrap();
            let token = req["token"].as_str().unwrap_or_default().to_string();
            let reply = match req["op"].as_str().unwrap_or_default() {
                "get" => match req["name"].as_str().unwrap_or_default() {
                    "temperature" => {
                        serde_json::json!({"token": token, "ok": true, "value": -10.0})
                    }
                    missing => serde_json::json!({
                        "token": token,
                        "ok": false,
                        "error": {"kind": "not-found", "message": format!("no {missing}")}
                    }),
                },
                "set" => serde_json::json!({
                    "token": token, "ok": true, "value": req["value"]
                }),
                "invoke" => match req["action"].as_str().unwrap_or_default() {
                    "push" => {
                        let push = serde_json::json!({
                            "event": "property", "name": "filter", "value": 3, "writable": true
                        });
                        write_half
                            .write_all(format!("{push}\n").as_bytes())
                            .await
                            .unwrap();
                        serde_json::json!({"token": token, "ok": true, "value": null})
                    }
                    "die" => return,
                    _ => serde_json::json!({
                        "token": token, "ok": false,
                        "error": {"kind": "not-supported", "message": "unknown action"}
                    }),
                },
                _ => continue,
            };
            write_half.write_all(format!("{reply}\n").as_bytes()).await.unwrap();
        }
    });
    address
}

async fn open(address: &str) -> (Box<dyn DriverSession>, Receiver<SessionEvent>) {
    let descriptor =
        DeviceDescriptor::new(DeviceId::new("cam1"), DeviceKind::Camera, "line", address);
    let (tx, rx) = mpsc::channel(16);
    let session = LineDriver.open(&descriptor, tx).await.unwrap();
    (session, rx)
}

#[tokio::test]
async fn get_round_trips_over_tcp() {
    let address = spawn_fixture().await;
    let (session, _rx) = open(&address).await;
    let value = session.get_property("temperature").await.unwrap();
    assert_eq!(value, ConfigValue::Real(-10.0));
}

#[tokio::test]
async fn error_reply_carries_taxonomy_kind() {
    let address = spawn_fixture().await;
    let (session, _rx) = open(&address).await;
    let err = session.get_property("nonexistent").await.unwrap_err();
    assert_eq!(err.kind, li_core::ErrorKind::NotFound);
}

#[tokio::test]
async fn set_returns_refreshed_value() {
    let address = spawn_fixture().await;
    let (session, _rx) = open(&address).await;
    let refreshed = session.set_property("gain", &ConfigValue::Int(150)).await.unwrap();
    assert_eq!(refreshed, ConfigValue::Int(150));
}

#[tokio::test]
async fn unsolicited_records_become_property_events() {
    let address = spawn_fixture().await;
    let (session, mut rx) = open(&address).await;
    session.invoke("push", &ConfigValue::Null, &CancellationToken::new()).await.unwrap();

    let event = rx.recv().await.unwrap();
    assert_eq!(
        event,
        SessionEvent::Property {
            name: "filter".to_string(),
            value: ConfigValue::Int(3),
            writable: true
        }
    );
}

#[tokio::test]
async fn stream_death_fails_requests_and_reports_lost() {
    let address = spawn_fixture().await;
    let (session, mut rx) = open(&address).await;

    let err = session
        .invoke("die", &ConfigValue::Null, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind, li_core::ErrorKind::Disconnected);

    let event = rx.recv().await.unwrap();
    assert!(matches!(event, SessionEvent::Lost { .. }));

    // Subsequent requests short-circuit without touching the socket.
    let err = session.get_property("temperature").await.unwrap_err();
    assert_eq!(err.kind, li_core::ErrorKind::Disconnected);
}

#[tokio::test]
async fn probe_answers_only_for_listening_addresses() {
    let address = spawn_fixture().await;
    assert!(LineDriver.probe(&address).await.is_some());
    assert!(LineDriver.probe("127.0.0.1:1").await.is_none());
}
