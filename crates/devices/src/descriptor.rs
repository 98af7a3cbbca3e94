// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device descriptors: what a device claims to be before a session exists.

use li_core::DeviceId;
use serde::{Deserialize, Serialize};

/// Broad device category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceKind {
    Camera,
    Telescope,
    Focuser,
    FilterWheel,
    Guider,
    Switch,
    Dome,
    Rotator,
    Other,
}

li_core::simple_display! {
    DeviceKind {
        Camera => "camera",
        Telescope => "telescope",
        Focuser => "focuser",
        FilterWheel => "filter-wheel",
        Guider => "guider",
        Switch => "switch",
        Dome => "dome",
        Rotator => "rotator",
        Other => "other",
    }
}

impl DeviceKind {
    /// Parse the kebab-case form used in connection profiles.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "camera" => DeviceKind::Camera,
            "telescope" => DeviceKind::Telescope,
            "focuser" => DeviceKind::Focuser,
            "filter-wheel" => DeviceKind::FilterWheel,
            "guider" => DeviceKind::Guider,
            "switch" => DeviceKind::Switch,
            "dome" => DeviceKind::Dome,
            "rotator" => DeviceKind::Rotator,
            "other" => DeviceKind::Other,
            _ => return None,
        })
    }
}

/// Everything the manager knows about a device before opening it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: DeviceId,
    pub kind: DeviceKind,
    pub driver: String,
    pub address: String,
    /// Actions the device claims to support.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Properties the device claims to expose.
    #[serde(default)]
    pub properties: Vec<String>,
}

impl DeviceDescriptor {
    pub fn new(
        id: impl Into<DeviceId>,
        kind: DeviceKind,
        driver: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            driver: driver.into(),
            address: address.into(),
            capabilities: Vec::new(),
            properties: Vec::new(),
        }
    }
}
