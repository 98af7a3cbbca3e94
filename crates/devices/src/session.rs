// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session state and the per-device property cache.

use std::collections::HashMap;

use li_core::ConfigValue;
use serde::{Deserialize, Serialize};

/// Lifecycle of one device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    Faulted,
}

li_core::simple_display! {
    SessionState {
        Disconnected => "disconnected",
        Connecting => "connecting",
        Connected => "connected",
        Disconnecting => "disconnecting",
        Faulted => "faulted",
    }
}

/// One cached property value.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedProperty {
    pub value: ConfigValue,
    pub timestamp_ms: u64,
    pub writable: bool,
}

/// Per-session property cache.
///
/// Authoritative for reads within a staleness bound; timestamps per key
/// never decrease.
#[derive(Debug, Default)]
pub struct PropertyCache {
    entries: HashMap<String, CachedProperty>,
}

impl PropertyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&CachedProperty> {
        self.entries.get(name)
    }

    /// Record an observation. A stamp older than the cached one keeps the
    /// cached timestamp (the value still updates: replies arrive in order
    /// per session, so the newest write wins).
    pub fn observe(&mut self, name: &str, value: ConfigValue, timestamp_ms: u64, writable: bool) {
        match self.entries.get_mut(name) {
            Some(entry) => {
                entry.value = value;
                entry.timestamp_ms = entry.timestamp_ms.max(timestamp_ms);
                entry.writable = writable;
            }
            None => {
                self.entries.insert(
                    name.to_string(),
                    CachedProperty { value, timestamp_ms, writable },
                );
            }
        }
    }

    /// Drop one entry (write invalidation).
    pub fn invalidate(&mut self, name: &str) {
        self.entries.remove(name);
    }

    /// A cached value fresh enough for `max_age_ms`.
    pub fn fresh(&self, name: &str, now_ms: u64, max_age_ms: u64) -> Option<&CachedProperty> {
        self.entries
            .get(name)
            .filter(|entry| now_ms.saturating_sub(entry.timestamp_ms) <= max_age_ms)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
