// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Script storage: saved task trees as JSON documents, one per file.
//!
//! A script document carries the full tree plus root defaults. The tree id
//! is the hex SHA-256 of the canonical (compact) JSON encoding, so loading
//! the same document twice yields identical ids.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::node::{ErrorBehavior, TaskNode, TreeError};

pub const SCRIPT_EXT: &str = "json";

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script {0:?} not found")]
    NotFound(String),

    #[error("invalid script name {0:?}")]
    InvalidName(String),

    #[error("script I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("script document error: {0}")]
    Document(#[from] serde_json::Error),

    #[error("invalid tree: {0}")]
    Tree(#[from] TreeError),
}

/// A saved task tree with its root defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub tree: TaskNode,
    /// Root error behavior, cascading to every node without an override.
    #[serde(default)]
    pub error_behavior: ErrorBehavior,
}

impl Script {
    pub fn new(tree: TaskNode) -> Self {
        Self { tree, error_behavior: ErrorBehavior::default() }
    }

    /// Stable content hash of the canonical document.
    pub fn tree_id(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&canonical);
        let mut out = String::with_capacity(digest.len() * 2);
        for byte in digest {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }
}

/// On-disk script directory.
pub struct ScriptStore {
    dir: PathBuf,
}

impl ScriptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save(&self, name: &str, script: &Script) -> Result<(), ScriptError> {
        validate_name(name)?;
        script.tree.validate()?;
        std::fs::create_dir_all(&self.dir)?;

        let doc = serde_json::to_vec_pretty(script)?;
        let final_path = self.script_path(name);
        let tmp_path = final_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, doc)?;
        std::fs::rename(&tmp_path, &final_path)?;
        info!(script = name, "saved script");
        Ok(())
    }

    pub fn load(&self, name: &str) -> Result<Script, ScriptError> {
        validate_name(name)?;
        let raw = match std::fs::read(self.script_path(name)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ScriptError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let script: Script = serde_json::from_slice(&raw)?;
        script.tree.validate()?;
        Ok(script)
    }

    pub fn delete(&self, name: &str) -> Result<(), ScriptError> {
        validate_name(name)?;
        match std::fs::remove_file(self.script_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ScriptError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn list(&self) -> Result<Vec<String>, ScriptError> {
        let mut names = Vec::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(SCRIPT_EXT) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn script_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{SCRIPT_EXT}"))
    }
}

fn validate_name(name: &str) -> Result<(), ScriptError> {
    let ok = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(ScriptError::InvalidName(name.to_string()))
    }
}

#[cfg(test)]
#[path = "script_tests.rs"]
mod tests;
