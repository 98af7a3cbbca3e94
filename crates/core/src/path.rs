// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Config path: a dot-separated key sequence addressing a node in the
//! configuration tree. Paths are canonical strings; equality is byte-wise
//! after normalization.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("empty path")]
    Empty,
    #[error("empty segment in path {0:?}")]
    EmptySegment(String),
}

/// A normalized config path such as `devices.cam1.address`.
///
/// Normalization strips leading/trailing dots and rejects empty segments,
/// so `a.b` constructed any way compares equal byte-wise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConfigPath(String);

impl ConfigPath {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let trimmed = raw.trim_matches('.');
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }
        if trimmed.split('.').any(str::is_empty) {
            return Err(PathError::EmptySegment(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// Number of segments; always at least one.
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// The final segment.
    pub fn leaf(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }

    /// The path with the final segment removed; `None` at the root level.
    pub fn parent(&self) -> Option<ConfigPath> {
        self.0.rfind('.').map(|i| ConfigPath(self.0[..i].to_string()))
    }

    /// Append a segment. The segment must itself be a valid path fragment.
    pub fn child(&self, segment: &str) -> Result<ConfigPath, PathError> {
        ConfigPath::parse(&format!("{}.{}", self.0, segment))
    }

    /// True when `self` is `other` or an ancestor of `other`, respecting
    /// segment boundaries: `a.b` prefixes `a.b.c` but not `a.bc`.
    pub fn is_prefix_of(&self, other: &ConfigPath) -> bool {
        let rest = match other.0.strip_prefix(&self.0) {
            Some(rest) => rest,
            None => return false,
        };
        rest.is_empty() || rest.starts_with('.')
    }
}

impl TryFrom<String> for ConfigPath {
    type Error = PathError;

    fn try_from(s: String) -> Result<Self, PathError> {
        ConfigPath::parse(&s)
    }
}

impl From<ConfigPath> for String {
    fn from(p: ConfigPath) -> String {
        p.0
    }
}

impl std::str::FromStr for ConfigPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, PathError> {
        ConfigPath::parse(s)
    }
}

impl std::fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[path = "path_tests.rs"]
mod tests;
