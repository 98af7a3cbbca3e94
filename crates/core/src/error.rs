// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared across every subsystem.
//!
//! Subsystem error enums (`ConfigError`, `DeviceError`, ...) carry their own
//! context but always map into [`ErrorKind`] at the boundary. The command
//! surface and the event stream both report failures as a [`Fault`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed set of failure kinds reported across subsystem boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Caller supplied malformed input.
    InvalidArgument,
    /// Named entity does not exist.
    NotFound,
    /// Operation would violate an invariant.
    Conflict,
    /// Capability absent on the target device or component.
    NotSupported,
    /// Operation did not complete within its bound.
    Timeout,
    /// Operation was cancelled.
    Cancelled,
    /// Transient I/O failure; retry may succeed.
    Transport,
    /// Session left Connected during the call.
    Disconnected,
    /// Persistent failure requiring operator action.
    Faulted,
    /// Unresolvable component dependency graph.
    CyclicDependency,
    /// Capability handle outlived its component.
    StaleHandle,
    /// Invariant violation inside the core.
    Internal,
}

crate::simple_display! {
    ErrorKind {
        InvalidArgument => "invalid-argument",
        NotFound => "not-found",
        Conflict => "conflict",
        NotSupported => "not-supported",
        Timeout => "timeout",
        Cancelled => "cancelled",
        Transport => "transport",
        Disconnected => "disconnected",
        Faulted => "faulted",
        CyclicDependency => "cyclic-dependency",
        StaleHandle => "stale-handle",
        Internal => "internal",
    }
}

impl ErrorKind {
    /// Transient kinds may succeed on retry; everything else is settled.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::Transport | ErrorKind::Timeout)
    }
}

/// A classified failure with human-readable message and optional context
/// (e.g. the raw vendor error code that was mapped into the taxonomy).
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct Fault {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl Fault {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), context: None }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotSupported, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    pub fn disconnected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Disconnected, message)
    }

    pub fn faulted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Faulted, message)
    }

    pub fn stale_handle(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StaleHandle, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_kebab_case() {
        let json = serde_json::to_string(&ErrorKind::CyclicDependency).unwrap();
        assert_eq!(json, "\"cyclic-dependency\"");
        assert_eq!(ErrorKind::StaleHandle.to_string(), "stale-handle");
    }

    #[test]
    fn fault_display_includes_kind() {
        let f = Fault::not_found("device cam9").with_context("profile deep-sky");
        assert_eq!(f.to_string(), "not-found: device cam9");
        assert_eq!(f.context.as_deref(), Some("profile deep-sky"));
    }

    #[test]
    fn only_transport_and_timeout_are_transient() {
        assert!(ErrorKind::Transport.is_transient());
        assert!(ErrorKind::Timeout.is_transient());
        assert!(!ErrorKind::Cancelled.is_transient());
        assert!(!ErrorKind::Faulted.is_transient());
    }
}
