// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Native line-oriented driver: UTF-8 JSON records, newline terminated,
//! over a long-lived TCP stream. One reader and one writer per session;
//! requests and replies correlate by a client-chosen token.
//!
//! Record shapes:
//! - request `{"token":"7","op":"get","name":"temperature"}`
//! - reply   `{"token":"7","ok":true,"value":-10.0}`
//! - push    `{"event":"property","name":"temperature","value":-10.0}`

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use li_core::{ConfigValue, Fault};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::descriptor::{DeviceDescriptor, DeviceKind};
use crate::driver::{Driver, DriverSession, SessionEvent};

pub struct LineDriver;

#[derive(Serialize)]
struct WireRequest<'a> {
    token: String,
    op: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a ConfigValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<&'a ConfigValue>,
}

#[derive(Deserialize)]
struct WireReply {
    token: String,
    ok: bool,
    #[serde(default)]
    value: Option<ConfigValue>,
    #[serde(default)]
    error: Option<Fault>,
}

#[derive(Deserialize)]
struct WirePush {
    event: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    value: Option<ConfigValue>,
    #[serde(default = "default_writable")]
    writable: bool,
}

fn default_writable() -> bool {
    true
}

#[async_trait]
impl Driver for LineDriver {
    fn name(&self) -> &str {
        "line"
    }

    async fn probe(&self, address: &str) -> Option<DeviceDescriptor> {
        let stream = TcpStream::connect(address).await.ok()?;
        drop(stream);
        Some(DeviceDescriptor::new(
            address.replace([':', '.'], "-"),
            DeviceKind::Other,
            "line",
            address,
        ))
    }

    async fn open(
        &self,
        descriptor: &DeviceDescriptor,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Box<dyn DriverSession>, Fault> {
        let stream = TcpStream::connect(&descriptor.address).await.map_err(|e| {
            Fault::transport(format!("connect {} failed", descriptor.address))
                .with_context(e.to_string())
        })?;
        let (read_half, write_half) = stream.into_split();

        let session = LineSession {
            writer: tokio::sync::Mutex::new(write_half),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_token: AtomicU64::new(1),
            lost: Arc::new(AtomicBool::new(false)),
        };
        spawn_reader(
            read_half,
            Arc::clone(&session.pending),
            Arc::clone(&session.lost),
            events,
        );
        Ok(Box::new(session))
    }
}

struct LineSession {
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    pending: Arc<Mutex<HashMap<String, oneshot::Sender<WireReply>>>>,
    next_token: AtomicU64,
    lost: Arc<AtomicBool>,
}

fn spawn_reader(
    read_half: OwnedReadHalf,
    pending: Arc<Mutex<HashMap<String, oneshot::Sender<WireReply>>>>,
    lost: Arc<AtomicBool>,
    events: mpsc::Sender<SessionEvent>,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Ok(reply) = serde_json::from_str::<WireReply>(&line) {
                        let tx = pending.lock().remove(&reply.token);
                        match tx {
                            Some(tx) => {
                                let _ = tx.send(reply);
                            }
                            None => debug!(token = %reply.token, "reply for unknown token"),
                        }
                    } else if let Ok(push) = serde_json::from_str::<WirePush>(&line) {
                        if push.event == "property" {
                            if let (Some(name), Some(value)) = (push.name, push.value) {
                                let _ = events
                                    .send(SessionEvent::Property {
                                        name,
                                        value,
                                        writable: push.writable,
                                    })
                                    .await;
                            }
                        }
                    } else {
                        warn!(line = %line, "unparseable record from device");
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }
        lost.store(true, Ordering::Release);
        let fault = Fault::disconnected("device closed the stream");
        for (_, tx) in pending.lock().drain() {
            let _ = tx.send(WireReply {
                token: String::new(),
                ok: false,
                value: None,
                error: Some(fault.clone()),
            });
        }
        let _ = events.send(SessionEvent::Lost { fault }).await;
    });
}

impl LineSession {
    async fn request(&self, request: WireRequest<'_>) -> Result<ConfigValue, Fault> {
        if self.lost.load(Ordering::Acquire) {
            return Err(Fault::disconnected("stream is closed"));
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request.token.clone(), tx);

        let mut line = serde_json::to_string(&request)
            .map_err(|e| Fault::internal(format!("cannot encode request: {e}")))?;
        line.push('\n');

        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                self.pending.lock().remove(&request.token);
                return Err(Fault::disconnected("write failed").with_context(e.to_string()));
            }
        }

        let reply = rx.await.map_err(|_| Fault::disconnected("stream closed mid-request"))?;
        if reply.ok {
            Ok(reply.value.unwrap_or(ConfigValue::Null))
        } else {
            Err(reply.error.unwrap_or_else(|| Fault::transport("device reported an error")))
        }
    }

    fn token(&self) -> String {
        self.next_token.fetch_add(1, Ordering::Relaxed).to_string()
    }
}

#[async_trait]
impl DriverSession for LineSession {
    async fn get_property(&self, name: &str) -> Result<ConfigValue, Fault> {
        self.request(WireRequest {
            token: self.token(),
            op: "get",
            name: Some(name),
            value: None,
            action: None,
            args: None,
        })
        .await
    }

    async fn set_property(&self, name: &str, value: &ConfigValue) -> Result<ConfigValue, Fault> {
        self.request(WireRequest {
            token: self.token(),
            op: "set",
            name: Some(name),
            value: Some(value),
            action: None,
            args: None,
        })
        .await
    }

    async fn invoke(
        &self,
        action: &str,
        args: &ConfigValue,
        cancel: &CancellationToken,
    ) -> Result<ConfigValue, Fault> {
        let request = WireRequest {
            token: self.token(),
            op: "invoke",
            name: None,
            value: None,
            action: Some(action),
            args: Some(args),
        };
        tokio::select! {
            result = self.request(request) => result,
            _ = cancel.cancelled() => {
                // Best-effort abort; the device may ignore it.
                let abort = WireRequest {
                    token: self.token(),
                    op: "abort",
                    name: None,
                    value: None,
                    action: Some(action),
                    args: None,
                };
                if let Ok(mut line) = serde_json::to_string(&abort) {
                    line.push('\n');
                    let mut writer = self.writer.lock().await;
                    let _ = writer.write_all(line.as_bytes()).await;
                }
                Err(Fault::cancelled(format!("action {action} cancelled")))
            }
        }
    }

    async fn close(&self) {
        self.lost.store(true, Ordering::Release);
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

#[cfg(test)]
#[path = "line_tests.rs"]
mod tests;
