// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! REST driver tests against an in-process HTTP/1.1 fixture.

use super::*;
use li_core::DeviceId;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serves a tiny device API under `/dev/cam1`. Handles several requests on
/// one connection (keep-alive) and drops the connection afterwards.
async fn spawn_fixture() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let host = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let mut held = String::new();
                loop {
                    let n = match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    held.push_str(&String::from_utf8_lossy(&buf[..n]));
                    // One request per read is enough for these tests.
                    let request_line = held.lines().next().unwrap_or_default().to_string();
                    held.clear();

                    let (status, body) = route(&request_line);
                    let response = format!(
                        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
                        body.len(),
                    );
                    if stream.write_all(response.as_bytes()).await.is_err() {
                        return;
                    }
                }
            });
        }
    });
    host
}

fn route(request_line: &str) -> (&'static str, String) {
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let path = parts.next().unwrap_or_default();
    match (method, path) {
        ("GET", "/dev/cam1/properties/temperature") => {
            ("200 OK", r#"{"value": -10.0}"#.to_string())
        }
        ("PUT", "/dev/cam1/properties/gain") => ("200 OK", r#"{"value": 150}"#.to_string()),
        ("POST", "/dev/cam1/actions/expose") => ("200 OK", r#"{"value": true}"#.to_string()),
        ("GET", _) => ("404 Not Found", r#"{"message": "no such property"}"#.to_string()),
        _ => ("405 Method Not Allowed", String::new()),
    }
}

async fn open(host: &str) -> Box<dyn DriverSession> {
    let descriptor = DeviceDescriptor::new(
        DeviceId::new("cam1"),
        DeviceKind::Camera,
        "rest",
        format!("{host}/dev/cam1"),
    );
    let (tx, _rx) = mpsc::channel(8);
    RestDriver.open(&descriptor, tx).await.unwrap()
}

#[tokio::test]
async fn get_maps_to_http_get() {
    let host = spawn_fixture().await;
    let session = open(&host).await;
    let value = session.get_property("temperature").await.unwrap();
    assert_eq!(value, ConfigValue::Real(-10.0));
}

#[tokio::test]
async fn set_maps_to_http_put_and_returns_refresh() {
    let host = spawn_fixture().await;
    let session = open(&host).await;
    let refreshed = session.set_property("gain", &ConfigValue::Int(150)).await.unwrap();
    assert_eq!(refreshed, ConfigValue::Int(150));
}

#[tokio::test]
async fn invoke_maps_to_http_post() {
    let host = spawn_fixture().await;
    let session = open(&host).await;
    let result = session
        .invoke("expose", &ConfigValue::Null, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result, ConfigValue::Bool(true));
}

#[tokio::test]
async fn http_404_maps_to_not_found() {
    let host = spawn_fixture().await;
    let session = open(&host).await;
    let err = session.get_property("warp").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn keep_alive_reuses_one_connection() {
    let host = spawn_fixture().await;
    let session = open(&host).await;
    for _ in 0..3 {
        session.get_property("temperature").await.unwrap();
    }
}

#[tokio::test]
async fn malformed_address_is_invalid_argument() {
    let descriptor = DeviceDescriptor::new(
        DeviceId::new("cam1"),
        DeviceKind::Camera,
        "rest",
        "no-prefix-here",
    );
    let (tx, _rx) = mpsc::channel(8);
    let err = RestDriver.open(&descriptor, tx).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn unreachable_host_is_transport() {
    let descriptor = DeviceDescriptor::new(
        DeviceId::new("cam1"),
        DeviceKind::Camera,
        "rest",
        "127.0.0.1:1/dev/cam1",
    );
    let (tx, _rx) = mpsc::channel(8);
    let err = RestDriver.open(&descriptor, tx).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Transport);
}
