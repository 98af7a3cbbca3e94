// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command dispatch: one request in, one response out.
//!
//! Every failure maps into the error taxonomy and reports as
//! `{ok: false, kind, message, context}`.

use std::time::Duration;

use li_config::{ConfigError, ProfileError};
use li_core::Fault;
use li_sequencer::{Script, ScriptError};
use li_wire::{ComponentEntry, ConnectResult, DeviceEntry, Request, Response, RunSummary};
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::env::PROTOCOL_VERSION;
use crate::kernel::Kernel;

/// Handle one command-surface request. `Subscribe` and `Shutdown` are
/// intercepted by the listener; here they only acknowledge.
pub async fn dispatch(kernel: &Kernel, request: Request) -> Response {
    match handle(kernel, request).await {
        Ok(response) => response,
        Err(fault) => {
            if fault.kind == li_core::ErrorKind::Internal {
                error!(error = %fault, "internal error in dispatch");
            }
            Response::error(fault)
        }
    }
}

async fn handle(kernel: &Kernel, request: Request) -> Result<Response, Fault> {
    match request {
        Request::Ping => Ok(Response::Pong),
        Request::Hello { .. } => {
            Ok(Response::Hello { version: PROTOCOL_VERSION.to_string() })
        }
        Request::Shutdown => Ok(Response::ShuttingDown),
        Request::Status => Ok(Response::Status {
            uptime_secs: kernel.uptime_secs(),
            devices_connected: kernel.devices.connected_count(),
            components_loaded: kernel.components.loaded_count(),
            run_active: kernel.engine.run_active(),
        }),
        Request::Subscribe { topics } => Ok(Response::Subscribed { topics }),

        // -- device --
        Request::DeviceConnect { id } => {
            kernel.devices.connect(&id).await?;
            Ok(Response::Ok)
        }
        Request::DeviceDisconnect { id } => {
            kernel.devices.disconnect(&id).await?;
            Ok(Response::Ok)
        }
        Request::ConnectProfile { name } => {
            let report = kernel.devices.connect_profile(&kernel.config, &name).await?;
            Ok(Response::ProfileConnect {
                outcome: report.outcome.to_string(),
                results: report
                    .results
                    .into_iter()
                    .map(|r| ConnectResult { id: r.id, ok: r.fault.is_none(), fault: r.fault })
                    .collect(),
            })
        }
        Request::GetProperty { id, name, max_age_ms } => {
            let max_age = max_age_ms.map(Duration::from_millis);
            let value = kernel.devices.get_property(&id, &name, max_age, None).await?;
            Ok(Response::Value { value: Some(value) })
        }
        Request::SetProperty { id, name, value } => {
            kernel.devices.set_property(&id, &name, value, None).await?;
            Ok(Response::Ok)
        }
        Request::InvokeAction { id, action, args, timeout_ms } => {
            let timeout = timeout_ms.map(Duration::from_millis);
            let cancel = CancellationToken::new();
            let value = kernel.devices.invoke(&id, &action, &args, timeout, &cancel).await?;
            Ok(Response::Value { value: Some(value) })
        }
        Request::ListDevices => {
            let devices = kernel
                .devices
                .list()
                .into_iter()
                .map(|row| DeviceEntry {
                    id: row.id,
                    kind: row.kind,
                    driver: row.driver,
                    state: row.state.to_string(),
                    properties: row.cached_properties,
                })
                .collect();
            Ok(Response::Devices { devices })
        }

        // -- component --
        Request::Rescan => {
            kernel.components.rescan().await;
            Ok(component_list(kernel))
        }
        Request::ComponentLoad { name } => {
            kernel.components.load(&name).await?;
            Ok(Response::Ok)
        }
        Request::ComponentUnload { name, force } => {
            kernel.components.unload(&name, force).await?;
            Ok(Response::Ok)
        }
        Request::ComponentEnable { name } => {
            kernel.components.enable(&name).await?;
            Ok(Response::Ok)
        }
        Request::ComponentDisable { name } => {
            kernel.components.disable(&name).await?;
            Ok(Response::Ok)
        }
        Request::ListComponents => Ok(component_list(kernel)),

        // -- task --
        Request::LoadScript { name } => {
            let script = kernel.scripts.load(&name).map_err(script_fault)?;
            let tree_id = kernel.engine.load(script)?;
            Ok(Response::Value { value: Some(tree_id.into()) })
        }
        Request::SaveScript { name, tree } => {
            let script: Script = serde_json::from_value(tree)
                .map_err(|e| Fault::invalid_argument(format!("bad script document: {e}")))?;
            kernel.scripts.save(&name, &script).map_err(script_fault)?;
            Ok(Response::Ok)
        }
        Request::DeleteScript { name } => {
            kernel.scripts.delete(&name).map_err(script_fault)?;
            Ok(Response::Ok)
        }
        Request::ListScripts => {
            Ok(Response::Names { names: kernel.scripts.list().map_err(script_fault)? })
        }
        Request::TaskStart => {
            let run_id = kernel.engine.start()?;
            Ok(Response::TaskStarted { run_id })
        }
        Request::TaskStop => {
            kernel.engine.stop();
            Ok(Response::Ok)
        }
        Request::TaskStatus => {
            let snapshot = kernel.engine.status();
            Ok(Response::TaskStatus {
                run: RunSummary {
                    run_id: snapshot.run_id,
                    status: snapshot
                        .status
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "idle".to_string()),
                    cursor: snapshot.cursor,
                },
            })
        }

        // -- config --
        Request::ConfigGet { path } => Ok(Response::Value { value: kernel.config.get(&path) }),
        Request::ConfigSet { path, value } => {
            kernel.config.set(&path, value).map_err(config_fault)?;
            Ok(Response::Ok)
        }
        Request::LoadProfile { name } => {
            kernel.profiles.load(&kernel.config, &name).map_err(profile_fault)?;
            Ok(Response::Ok)
        }
        Request::SaveProfile { name } => {
            kernel.profiles.save(&kernel.config, &name).map_err(profile_fault)?;
            Ok(Response::Ok)
        }
        Request::ListProfiles => {
            Ok(Response::Names { names: kernel.profiles.list().map_err(profile_fault)? })
        }
        Request::DeleteProfile { name } => {
            kernel.profiles.delete(&name).map_err(profile_fault)?;
            Ok(Response::Ok)
        }
    }
}

fn component_list(kernel: &Kernel) -> Response {
    let components = kernel
        .components
        .list()
        .into_iter()
        .map(|b| ComponentEntry {
            name: b.name,
            version: b.version,
            state: b.state.to_string(),
            reason: b.reason,
        })
        .collect();
    Response::Components { components }
}

fn config_fault(e: ConfigError) -> Fault {
    match &e {
        ConfigError::NotFound(_) => Fault::not_found(e.to_string()),
        ConfigError::InvalidPath(_) | ConfigError::NotAMap { .. } => {
            Fault::invalid_argument(e.to_string())
        }
        ConfigError::TypeLocked { .. } => Fault::conflict(e.to_string()),
    }
}

fn profile_fault(e: ProfileError) -> Fault {
    match &e {
        ProfileError::NotFound(_) => Fault::not_found(e.to_string()),
        ProfileError::InvalidName(_) => Fault::invalid_argument(e.to_string()),
        ProfileError::Store(inner) => config_fault_ref(inner, &e),
        ProfileError::Io(_) | ProfileError::Document(_) => Fault::faulted(e.to_string()),
    }
}

fn config_fault_ref(inner: &ConfigError, outer: &ProfileError) -> Fault {
    match inner {
        ConfigError::NotFound(_) => Fault::not_found(outer.to_string()),
        ConfigError::InvalidPath(_) | ConfigError::NotAMap { .. } => {
            Fault::invalid_argument(outer.to_string())
        }
        ConfigError::TypeLocked { .. } => Fault::conflict(outer.to_string()),
    }
}

fn script_fault(e: ScriptError) -> Fault {
    match &e {
        ScriptError::NotFound(_) => Fault::not_found(e.to_string()),
        ScriptError::InvalidName(_) | ScriptError::Tree(_) => {
            Fault::invalid_argument(e.to_string())
        }
        ScriptError::Io(_) | ScriptError::Document(_) => Fault::faulted(e.to_string()),
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
