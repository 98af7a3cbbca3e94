// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Out-of-process component hosting.
//!
//! A sandboxed component runs in a child process; the runtime speaks the
//! framed RPC protocol over the child's stdin/stdout. The transport is
//! transparent to callers: a remote instance exposes the same capability
//! surface as an in-process one.
//!
//! Reserved ops (`__initialize`, `__start`, `__stop`, `__capabilities`)
//! map onto the `Component` trait; every other op is a capability
//! invocation.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use li_core::{ConfigValue, Event, Fault};
use li_wire::{read_frame, write_frame, HostMessage, RpcReply, RpcRequest};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, warn};

use crate::component::{Capability, Component, DeviceDirectory, InitContext};

pub const OP_INITIALIZE: &str = "__initialize";
pub const OP_START: &str = "__start";
pub const OP_STOP: &str = "__stop";
pub const OP_CAPABILITIES: &str = "__capabilities";

/// What the runtime does when an out-of-process instance crashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisionPolicy {
    /// Leave the instance Faulted for the operator.
    Never,
    /// Respawn up to `max_restarts` times, then fault.
    RestartOnCrash { max_restarts: u32 },
}

struct Shared {
    pending: Mutex<HashMap<u64, oneshot::Sender<RpcReply>>>,
    crashed: AtomicBool,
    exited: Notify,
}

impl Shared {
    fn mark_crashed(&self) {
        self.crashed.store(true, Ordering::Release);
        let mut pending = self.pending.lock();
        for (_, tx) in pending.drain() {
            let _ = tx.send(RpcReply::err(
                0,
                Fault::faulted("component host exited"),
            ));
        }
        self.exited.notify_waiters();
    }
}

/// Runtime-side client for one hosted component.
pub struct HostClient {
    writer: tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    shared: Arc<Shared>,
    next_id: AtomicU64,
    child: Mutex<Option<Child>>,
}

impl HostClient {
    /// Spawn `host_command library entry` and speak RPC on its stdio.
    pub async fn spawn(
        host_command: &Path,
        library: &Path,
        entry: &str,
        event_tx: mpsc::Sender<Event>,
    ) -> Result<Self, Fault> {
        let mut child = Command::new(host_command)
            .arg("--component-host")
            .arg(library)
            .arg(entry)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Fault::faulted(format!(
                    "cannot spawn component host {}",
                    host_command.display()
                ))
                .with_context(e.to_string())
            })?;

        let stdin = child.stdin.take().ok_or_else(|| Fault::internal("host stdin missing"))?;
        let stdout =
            child.stdout.take().ok_or_else(|| Fault::internal("host stdout missing"))?;

        let client = Self::from_io(Box::new(stdout), Box::new(stdin), event_tx);
        *client.child.lock() = Some(child);
        Ok(client)
    }

    /// Build a client over arbitrary streams. Tests drive this with an
    /// in-memory duplex; `spawn` uses the child's pipes.
    pub fn from_io(
        reader: Box<dyn AsyncRead + Send + Unpin>,
        writer: Box<dyn AsyncWrite + Send + Unpin>,
        event_tx: mpsc::Sender<Event>,
    ) -> Self {
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            crashed: AtomicBool::new(false),
            exited: Notify::new(),
        });

        let reader_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            let mut reader = reader;
            loop {
                match read_frame::<_, HostMessage>(&mut reader).await {
                    Ok(HostMessage::Reply(reply)) => {
                        let tx = reader_shared.pending.lock().remove(&reply.id);
                        match tx {
                            Some(tx) => {
                                let _ = tx.send(reply);
                            }
                            None => warn!(id = reply.id, "reply for unknown request id"),
                        }
                    }
                    Ok(HostMessage::Event(event)) => {
                        if event_tx.send(event.event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "component host stream ended");
                        break;
                    }
                }
            }
            reader_shared.mark_crashed();
        });

        Self {
            writer: tokio::sync::Mutex::new(writer),
            shared,
            next_id: AtomicU64::new(1),
            child: Mutex::new(None),
        }
    }

    pub fn is_crashed(&self) -> bool {
        self.shared.crashed.load(Ordering::Acquire)
    }

    /// Resolves when the host's stream ends (crash or clean exit).
    pub async fn wait_exit(&self) {
        let notified = self.shared.exited.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a notify between the check
        // and the await cannot be missed.
        notified.as_mut().enable();
        if self.is_crashed() {
            return;
        }
        notified.await;
    }

    /// Invoke one op and await its correlated reply.
    pub async fn call(
        &self,
        op: &str,
        args: ConfigValue,
        timeout: Duration,
    ) -> Result<ConfigValue, Fault> {
        if self.is_crashed() {
            return Err(Fault::faulted("component host is not running"));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(id, tx);

        let request = RpcRequest { id, op: op.to_string(), args };
        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = write_frame(&mut *writer, &request).await {
                self.shared.pending.lock().remove(&id);
                return Err(Fault::transport("cannot write to component host")
                    .with_context(e.to_string()));
            }
        }

        let reply = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(Fault::faulted("component host exited")),
            Err(_) => {
                self.shared.pending.lock().remove(&id);
                return Err(Fault::timeout(format!("host op {op:?} timed out")));
            }
        };

        if reply.ok {
            Ok(reply.result.unwrap_or(ConfigValue::Null))
        } else {
            Err(reply.error.unwrap_or_else(|| Fault::internal("host error without fault")))
        }
    }

    /// Best-effort stop, then kill.
    pub async fn shutdown(&self) {
        let _ = self.call(OP_STOP, ConfigValue::Null, Duration::from_secs(2)).await;
        if let Some(mut child) = self.child.lock().take() {
            let _ = child.start_kill();
        }
    }
}

/// Shape of `__capabilities` results on the wire.
#[derive(Serialize, Deserialize)]
struct CapabilityRow {
    name: String,
    description: String,
}

/// Serve one component over the host side of the RPC stream.
///
/// This is the main loop of `lithiumd --component-host`; tests run it over
/// an in-memory duplex. Returns when the peer closes the stream.
pub async fn serve_component<R, W>(
    component: Box<dyn Component>,
    mut reader: R,
    mut writer: W,
) -> Result<(), Fault>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let request: RpcRequest = match read_frame(&mut reader).await {
            Ok(request) => request,
            Err(_) => return Ok(()),
        };

        let reply = match request.op.as_str() {
            OP_INITIALIZE => {
                let ctx = host_side_context(request.args);
                match component.initialize(&ctx) {
                    Ok(()) => RpcReply::ok(request.id, ConfigValue::Null),
                    Err(fault) => RpcReply::err(request.id, fault),
                }
            }
            OP_START => match component.start() {
                Ok(()) => RpcReply::ok(request.id, ConfigValue::Null),
                Err(fault) => RpcReply::err(request.id, fault),
            },
            OP_STOP => {
                component.stop();
                let reply = RpcReply::ok(request.id, ConfigValue::Null);
                let _ = write_frame(&mut writer, &reply).await;
                return Ok(());
            }
            OP_CAPABILITIES => {
                let rows: Vec<CapabilityRow> = component
                    .capabilities()
                    .into_iter()
                    .map(|c| CapabilityRow { name: c.name, description: c.description })
                    .collect();
                match serde_json::to_value(&rows)
                    .map_err(|e| Fault::internal(e.to_string()))
                    .and_then(|v| {
                        serde_json::from_value::<ConfigValue>(v)
                            .map_err(|e| Fault::internal(e.to_string()))
                    }) {
                    Ok(value) => RpcReply::ok(request.id, value),
                    Err(fault) => RpcReply::err(request.id, fault),
                }
            }
            op => match component.invoke(op, request.args) {
                Ok(result) => RpcReply::ok(request.id, result),
                Err(fault) => RpcReply::err(request.id, fault),
            },
        };

        write_frame(&mut writer, &reply)
            .await
            .map_err(|e| Fault::transport("cannot write host reply").with_context(e.to_string()))?;
    }
}

/// Entry point for the host side of an out-of-process bundle: map the
/// library, instantiate the component, and serve RPC on stdio until the
/// runtime closes the stream. This is what `lithiumd --component-host
/// <library> <entry>` runs.
pub async fn run_host(library: &Path, entry: &str) -> Result<(), Fault> {
    let library = crate::loader::LoadedLibrary::open(library)?;
    let component = library.instantiate(entry)?;
    serve_component(component, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Out-of-process instances cannot share the daemon's store; they get a
/// private store seeded from the snapshot the runtime sent, and no device
/// view.
fn host_side_context(config_snapshot: ConfigValue) -> InitContext {
    struct NoDevices;
    impl DeviceDirectory for NoDevices {
        fn device_ids(&self) -> Vec<li_core::DeviceId> {
            Vec::new()
        }
        fn cached_property(
            &self,
            _id: &li_core::DeviceId,
            _name: &str,
        ) -> Option<ConfigValue> {
            None
        }
    }

    let store = li_config::ConfigStore::new();
    if let (Ok(root), false) = (
        li_core::ConfigPath::parse("component"),
        config_snapshot.is_null(),
    ) {
        if let ConfigValue::Map(map) = config_snapshot {
            for (key, value) in map {
                if let Ok(path) = root.child(&key) {
                    let _ = store.set(&path, value);
                }
            }
        }
    }

    InitContext { config: Arc::new(store), devices: Arc::new(NoDevices) }
}

/// Parse `__capabilities` output back into capability rows.
pub(crate) fn parse_capability_rows(value: &ConfigValue) -> Vec<Capability> {
    let Some(rows) = value.as_list() else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            let name = row.get("name")?.as_str()?.to_string();
            let description =
                row.get("description").and_then(|d| d.as_str()).unwrap_or_default().to_string();
            Some(Capability { name, description })
        })
        .collect()
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
