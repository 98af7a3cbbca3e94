// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Component bundle manifest.
//!
//! A bundle is a directory holding `manifest.toml` and one shared library.
//! Disabled bundles carry `manifest.toml.disabled` instead.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const MANIFEST_FILE: &str = "manifest.toml";
pub const DISABLED_SUFFIX: &str = ".disabled";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("cannot read manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("manifest is not valid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid component name {0:?}")]
    InvalidName(String),

    #[error("version {0:?} is not a three-number dotted string")]
    InvalidVersion(String),

    #[error("entry symbol must not be empty")]
    EmptyEntry,
}

/// How a component instance runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    #[default]
    InProcess,
    OutOfProcess,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    /// Symbol to resolve in the bundle's shared library.
    pub entry: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub run: RunMode,
    /// Restart cap for out-of-process crashes; `0` means never restart.
    #[serde(default)]
    pub max_restarts: u32,
}

impl Manifest {
    pub fn parse(raw: &str) -> Result<Self, ManifestError> {
        let manifest: Manifest = toml::from_str(raw)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn read(path: &Path) -> Result<Self, ManifestError> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    fn validate(&self) -> Result<(), ManifestError> {
        let name_ok = !self.name.is_empty()
            && self.name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !name_ok {
            return Err(ManifestError::InvalidName(self.name.clone()));
        }
        if !version_ok(&self.version) {
            return Err(ManifestError::InvalidVersion(self.version.clone()));
        }
        if self.entry.is_empty() {
            return Err(ManifestError::EmptyEntry);
        }
        Ok(())
    }
}

fn version_ok(version: &str) -> bool {
    let mut parts = 0;
    for part in version.split('.') {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
        parts += 1;
    }
    parts == 3
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
