// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named profiles: snapshots of a designated subtree persisted to disk.
//!
//! One JSON document per profile, `<name>.json` in the configured directory.
//! Writes go to a temp file first and are renamed into place, so a crashed
//! save never clobbers the previous document.

use std::path::{Path, PathBuf};

use li_core::{ConfigPath, ConfigValue};
use thiserror::Error;
use tracing::info;

use crate::store::{ConfigError, ConfigStore};

pub const PROFILE_EXT: &str = "json";

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile {0:?} not found")]
    NotFound(String),

    #[error("invalid profile name {0:?}")]
    InvalidName(String),

    #[error("store error: {0}")]
    Store(#[from] ConfigError),

    #[error("profile I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("profile document error: {0}")]
    Document(#[from] serde_json::Error),
}

/// Manages the on-disk profile directory for one designated subtree.
pub struct ProfileStore {
    dir: PathBuf,
    subtree: ConfigPath,
}

impl ProfileStore {
    pub fn new(dir: impl Into<PathBuf>, subtree: ConfigPath) -> Self {
        Self { dir: dir.into(), subtree }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist the designated subtree under `name`.
    pub fn save(&self, store: &ConfigStore, name: &str) -> Result<(), ProfileError> {
        validate_name(name)?;
        let subtree = store.get(&self.subtree).unwrap_or_else(ConfigValue::empty_map);
        std::fs::create_dir_all(&self.dir)?;

        let doc = serde_json::to_vec_pretty(&subtree)?;
        let final_path = self.profile_path(name);
        let tmp_path = final_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, doc)?;
        std::fs::rename(&tmp_path, &final_path)?;
        info!(profile = name, path = %final_path.display(), "saved profile");
        Ok(())
    }

    /// Replace the designated subtree with the named profile's contents.
    ///
    /// The replacement commits atomically; subscribers then receive one
    /// notification per changed leaf, in document order.
    pub fn load(&self, store: &ConfigStore, name: &str) -> Result<(), ProfileError> {
        validate_name(name)?;
        let path = self.profile_path(name);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProfileError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let subtree: ConfigValue = serde_json::from_slice(&raw)?;
        store.replace_subtree(&self.subtree, subtree)?;
        info!(profile = name, "loaded profile");
        Ok(())
    }

    pub fn delete(&self, name: &str) -> Result<(), ProfileError> {
        validate_name(name)?;
        let path = self.profile_path(name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ProfileError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Names of all stored profiles, sorted.
    pub fn list(&self) -> Result<Vec<String>, ProfileError> {
        let mut names = Vec::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(PROFILE_EXT) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn profile_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{PROFILE_EXT}"))
    }
}

/// Profile names become filenames; keep them to one safe path component.
fn validate_name(name: &str) -> Result<(), ProfileError> {
    let ok = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(ProfileError::InvalidName(name.to_string()))
    }
}

#[cfg(test)]
#[path = "profiles_tests.rs"]
mod tests;
