// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection profiles: named records in the config store enumerating which
//! devices to declare and open.
//!
//! Profile shape, under `profiles.<name>.devices`, is an ordered list of
//! `{id, kind, driver, address}` maps. Devices open in declaration order;
//! individual failures never abort the profile.

use li_config::ConfigStore;
use li_core::{Clock, ConfigPath, DeviceId, Fault};
use serde::{Deserialize, Serialize};

use crate::descriptor::{DeviceDescriptor, DeviceKind};
use crate::manager::DeviceManager;

/// Final state of one profile connect pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectOutcome {
    FullyConnected,
    PartiallyConnected,
    Failed,
}

li_core::simple_display! {
    ConnectOutcome {
        FullyConnected => "fully-connected",
        PartiallyConnected => "partially-connected",
        Failed => "failed",
    }
}

/// Per-device connect result.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConnectResult {
    pub id: DeviceId,
    pub fault: Option<Fault>,
}

/// Everything one `connect-profile` produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileReport {
    pub outcome: ConnectOutcome,
    pub results: Vec<DeviceConnectResult>,
}

impl<C: Clock> DeviceManager<C> {
    /// Open every device a profile declares, in order.
    pub async fn connect_profile(
        &self,
        config: &ConfigStore,
        name: &str,
    ) -> Result<ProfileReport, Fault> {
        let path = ConfigPath::parse(&format!("profiles.{name}.devices"))
            .map_err(|e| Fault::invalid_argument(format!("bad profile name {name:?}: {e}")))?;
        let declared = config
            .get(&path)
            .ok_or_else(|| Fault::not_found(format!("connection profile {name:?}")))?;
        let entries = declared
            .as_list()
            .ok_or_else(|| {
                Fault::invalid_argument(format!("profile {name:?} devices must be a list"))
            })?
            .to_vec();

        let mut results = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let descriptor = match parse_device_entry(entry) {
                Ok(descriptor) => descriptor,
                Err(fault) => {
                    // Malformed entries report under a synthetic id so the
                    // caller still sees one result per declaration.
                    results.push(DeviceConnectResult {
                        id: DeviceId::new(format!("{name}#{index}")),
                        fault: Some(fault),
                    });
                    continue;
                }
            };
            let id = descriptor.id.clone();
            self.register_device(descriptor);
            let fault = self.connect(&id).await.err();
            results.push(DeviceConnectResult { id, fault });
        }

        let connected = results.iter().filter(|r| r.fault.is_none()).count();
        let outcome = if connected == results.len() && !results.is_empty() {
            ConnectOutcome::FullyConnected
        } else if connected > 0 {
            ConnectOutcome::PartiallyConnected
        } else {
            ConnectOutcome::Failed
        };
        Ok(ProfileReport { outcome, results })
    }
}

fn parse_device_entry(entry: &li_core::ConfigValue) -> Result<DeviceDescriptor, Fault> {
    let id = entry
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Fault::invalid_argument("device entry missing id"))?;
    let driver = entry
        .get("driver")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Fault::invalid_argument(format!("device {id:?} missing driver")))?;
    let address = entry
        .get("address")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Fault::invalid_argument(format!("device {id:?} missing address")))?;
    let kind = entry
        .get("kind")
        .and_then(|v| v.as_str())
        .and_then(DeviceKind::parse)
        .unwrap_or(DeviceKind::Other);
    Ok(DeviceDescriptor::new(id, kind, driver, address))
}
