// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP/REST driver: property reads are GETs, writes are PUTs, actions are
//! POSTs, under a per-device path prefix. One pooled keep-alive connection
//! per session, reconnected lazily; responses are read with Content-Length
//! framing rather than relying on connection close.
//!
//! Address form: `host:port/path/prefix`, e.g.
//! `localhost:8624/api/devices/cam1`.

use async_trait::async_trait;
use li_core::{ConfigValue, ErrorKind, Fault};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::descriptor::{DeviceDescriptor, DeviceKind};
use crate::driver::{Driver, DriverSession, SessionEvent};

pub struct RestDriver;

#[derive(Deserialize)]
struct ValueBody {
    #[serde(default)]
    value: Option<ConfigValue>,
}

#[async_trait]
impl Driver for RestDriver {
    fn name(&self) -> &str {
        "rest"
    }

    async fn probe(&self, address: &str) -> Option<DeviceDescriptor> {
        let (host, _prefix) = split_address(address).ok()?;
        let stream = TcpStream::connect(host).await.ok()?;
        drop(stream);
        Some(DeviceDescriptor::new(
            address.replace(['/', ':', '.'], "-"),
            DeviceKind::Other,
            "rest",
            address,
        ))
    }

    async fn open(
        &self,
        descriptor: &DeviceDescriptor,
        _events: mpsc::Sender<SessionEvent>,
    ) -> Result<Box<dyn DriverSession>, Fault> {
        let (host, prefix) = split_address(&descriptor.address)?;
        let stream = TcpStream::connect(host).await.map_err(|e| {
            Fault::transport(format!("connect {host} failed")).with_context(e.to_string())
        })?;
        Ok(Box::new(RestSession {
            host: host.to_string(),
            prefix: prefix.to_string(),
            conn: Mutex::new(Some(BufStream::new(stream))),
        }))
    }
}

fn split_address(address: &str) -> Result<(&str, &str), Fault> {
    match address.find('/') {
        Some(i) if i > 0 => Ok((&address[..i], &address[i..])),
        _ => Err(Fault::invalid_argument(format!(
            "REST address {address:?} must be host:port/prefix"
        ))),
    }
}

struct RestSession {
    host: String,
    prefix: String,
    conn: Mutex<Option<BufStream<TcpStream>>>,
}

impl RestSession {
    /// One request/response exchange on the pooled connection.
    ///
    /// The manager serializes calls per session, so holding the pool lock
    /// for the whole exchange costs nothing.
    async fn exchange(&self, method: &str, path: &str, body: Option<String>) -> Result<ConfigValue, Fault> {
        let mut conn = self.conn.lock().await;
        if conn.is_none() {
            let stream = TcpStream::connect(&self.host).await.map_err(|e| {
                Fault::transport(format!("reconnect {} failed", self.host))
                    .with_context(e.to_string())
            })?;
            *conn = Some(BufStream::new(stream));
        }
        let Some(stream) = conn.as_mut() else {
            return Err(Fault::internal("connection pool empty after fill"));
        };

        let body = body.unwrap_or_default();
        let request = format!(
            "{method} {}{path} HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: keep-alive\r\n\r\n{body}",
            self.prefix, self.host, body.len(),
        );

        let result = async {
            stream.write_all(request.as_bytes()).await?;
            stream.flush().await?;
            read_response(stream).await
        }
        .await;

        match result {
            Ok((status, body)) => {
                if status >= 400 {
                    return Err(status_fault(status, &body));
                }
                if body.is_empty() {
                    return Ok(ConfigValue::Null);
                }
                let parsed: ValueBody = serde_json::from_str(&body).map_err(|e| {
                    Fault::transport("unparseable response body").with_context(e.to_string())
                })?;
                Ok(parsed.value.unwrap_or(ConfigValue::Null))
            }
            Err(e) => {
                // The pooled connection is suspect; drop it so the next
                // call reconnects.
                *conn = None;
                Err(Fault::transport("request failed").with_context(e.to_string()))
            }
        }
    }
}

fn status_fault(status: u16, body: &str) -> Fault {
    let kind = match status {
        400 => ErrorKind::InvalidArgument,
        404 => ErrorKind::NotFound,
        405 => ErrorKind::NotSupported,
        408 => ErrorKind::Timeout,
        409 => ErrorKind::Conflict,
        _ => ErrorKind::Faulted,
    };
    Fault::new(kind, format!("device returned HTTP {status}"))
        .with_context(body.trim().to_string())
}

/// Read one HTTP/1.1 response; returns (status, body).
async fn read_response(stream: &mut BufStream<TcpStream>) -> std::io::Result<(u16, String)> {
    let mut status_line = String::new();
    stream.read_line(&mut status_line).await?;
    if status_line.is_empty() {
        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "closed"));
    }
    let status =
        status_line.split_whitespace().nth(1).and_then(|s| s.parse::<u16>().ok()).unwrap_or(0);

    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        stream.read_line(&mut line).await?;
        if line == "\r\n" || line == "\n" || line.is_empty() {
            break;
        }
        let lower = line.to_ascii_lowercase();
        if let Some(value) = lower.strip_prefix("content-length:") {
            content_length = value.trim().parse().unwrap_or(0);
        }
    }

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        stream.read_exact(&mut body).await?;
    }
    Ok((status, String::from_utf8_lossy(&body).into_owned()))
}

#[async_trait]
impl DriverSession for RestSession {
    async fn get_property(&self, name: &str) -> Result<ConfigValue, Fault> {
        self.exchange("GET", &format!("/properties/{name}"), None).await
    }

    async fn set_property(&self, name: &str, value: &ConfigValue) -> Result<ConfigValue, Fault> {
        let body = serde_json::json!({ "value": value }).to_string();
        self.exchange("PUT", &format!("/properties/{name}"), Some(body)).await
    }

    async fn invoke(
        &self,
        action: &str,
        args: &ConfigValue,
        cancel: &CancellationToken,
    ) -> Result<ConfigValue, Fault> {
        let body = serde_json::to_string(args)
            .map_err(|e| Fault::internal(format!("cannot encode args: {e}")))?;
        let path = format!("/actions/{action}");
        let exchange = self.exchange("POST", &path, Some(body));
        tokio::select! {
            result = exchange => result,
            _ = cancel.cancelled() => {
                // Drop the pooled connection; the server sees the abort as
                // a reset mid-request.
                *self.conn.lock().await = None;
                Err(Fault::cancelled(format!("action {action} cancelled")))
            }
        }
    }

    async fn close(&self) {
        *self.conn.lock().await = None;
    }
}

#[cfg(test)]
#[path = "rest_tests.rs"]
mod tests;
