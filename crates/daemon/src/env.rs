// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access. Everything lives under the
//! `LITHIUM_` prefix.

use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Resolve state directory: LITHIUM_STATE_DIR > XDG_STATE_HOME/lithium >
/// ~/.local/state/lithium
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("LITHIUM_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("lithium"));
    }
    let home = dirs::home_dir().ok_or(LifecycleError::NoStateDir)?;
    Ok(home.join(".local/state/lithium"))
}

/// Resolve config directory: LITHIUM_CONFIG_DIR > ~/.config/lithium
pub fn config_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("LITHIUM_CONFIG_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let base = dirs::config_dir().ok_or(LifecycleError::NoStateDir)?;
    Ok(base.join("lithium"))
}

/// Component scan roots: `LITHIUM_COMPONENT_PATH`, colon separated.
/// Defaults to `<config>/components`.
pub fn component_roots(config_dir: &std::path::Path) -> Vec<PathBuf> {
    match std::env::var("LITHIUM_COMPONENT_PATH") {
        Ok(paths) if !paths.is_empty() => {
            paths.split(':').filter(|p| !p.is_empty()).map(PathBuf::from).collect()
        }
        _ => vec![config_dir.join("components")],
    }
}

/// Optional TCP port in addition to the Unix socket.
pub fn tcp_port() -> Option<u16> {
    std::env::var("LITHIUM_TCP_PORT").ok().and_then(|s| s.parse::<u16>().ok())
}

/// Task engine tick period override.
pub fn tick_period() -> Option<Duration> {
    std::env::var("LITHIUM_TICK_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Tracing filter expression, e.g. `li_sequencer=debug,info`.
pub fn log_filter() -> String {
    std::env::var("LITHIUM_LOG").unwrap_or_else(|_| "info".to_string())
}
