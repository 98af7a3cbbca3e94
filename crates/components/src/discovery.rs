// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bundle discovery: scan configured roots for component bundles.
//!
//! Malformed bundles are skipped and reported; they never abort discovery.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::manifest::{Manifest, DISABLED_SUFFIX, MANIFEST_FILE};

/// Shared-library extensions recognized inside a bundle directory.
const LIBRARY_EXTENSIONS: [&str; 3] = ["so", "dylib", "dll"];

/// One valid bundle found on disk.
#[derive(Debug, Clone)]
pub struct DiscoveredBundle {
    pub manifest: Manifest,
    pub dir: PathBuf,
    pub library_path: PathBuf,
    pub disabled: bool,
}

/// One directory that looked like a bundle but was rejected.
#[derive(Debug, Clone)]
pub struct SkippedBundle {
    pub dir: PathBuf,
    pub reason: String,
}

/// Everything one scan pass produced.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    pub bundles: Vec<DiscoveredBundle>,
    pub skipped: Vec<SkippedBundle>,
}

/// Scan every root for bundle directories.
///
/// Scan order is deterministic: roots in configured order, directories
/// sorted by name within each root.
pub fn scan(roots: &[PathBuf]) -> DiscoveryReport {
    let mut report = DiscoveryReport::default();
    for root in roots {
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "component root not readable");
                continue;
            }
        };
        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();
        for dir in dirs {
            inspect_bundle_dir(&dir, &mut report);
        }
    }
    report
}

fn inspect_bundle_dir(dir: &Path, report: &mut DiscoveryReport) {
    let manifest_path = dir.join(MANIFEST_FILE);
    let disabled_path = dir.join(format!("{MANIFEST_FILE}{DISABLED_SUFFIX}"));

    let (path, disabled) = if manifest_path.is_file() {
        (manifest_path, false)
    } else if disabled_path.is_file() {
        (disabled_path, true)
    } else {
        debug!(dir = %dir.display(), "no manifest, not a bundle");
        return;
    };

    let manifest = match Manifest::read(&path) {
        Ok(manifest) => manifest,
        Err(e) => {
            report
                .skipped
                .push(SkippedBundle { dir: dir.to_path_buf(), reason: e.to_string() });
            return;
        }
    };

    let library_path = match find_library(dir) {
        Ok(path) => path,
        Err(reason) => {
            report.skipped.push(SkippedBundle { dir: dir.to_path_buf(), reason });
            return;
        }
    };

    report.bundles.push(DiscoveredBundle {
        manifest,
        dir: dir.to_path_buf(),
        library_path,
        disabled,
    });
}

/// A bundle must contain exactly one shared library.
fn find_library(dir: &Path) -> Result<PathBuf, String> {
    let mut libs: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|ext| LIBRARY_EXTENSIONS.contains(&ext))
            })
            .collect(),
        Err(e) => return Err(format!("cannot read bundle dir: {e}")),
    };
    libs.sort();
    match libs.len() {
        0 => Err("no shared library in bundle".to_string()),
        1 => Ok(libs.remove(0)),
        n => Err(format!("{n} shared libraries in bundle, expected one")),
    }
}

#[cfg(test)]
#[path = "discovery_tests.rs"]
mod tests;
