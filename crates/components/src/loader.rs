// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared-library mapping and entry-symbol resolution.
//!
//! The only unsafe code in the workspace lives here. Safety rests on the
//! bundle contract: the entry symbol has the `ComponentEntry` signature and
//! the library was built against the same component ABI. The library stays
//! mapped for the lifetime of the owning [`LoadedLibrary`], which the
//! runtime keeps alive as long as the instance (and any in-flight call)
//! needs it.

use std::path::{Path, PathBuf};

use li_core::Fault;
use libloading::Library;
use tracing::debug;

use crate::component::{Component, ComponentEntry};

/// A mapped component library.
pub(crate) struct LoadedLibrary {
    lib: Library,
    path: PathBuf,
}

impl LoadedLibrary {
    /// Map the shared library at `path`.
    pub(crate) fn open(path: &Path) -> Result<Self, Fault> {
        // SAFETY: loading runs arbitrary library constructors; bundles are
        // operator-installed code, the same trust level as the daemon.
        let lib = unsafe { Library::new(path) }.map_err(|e| {
            Fault::faulted(format!("cannot open library {}", path.display()))
                .with_context(e.to_string())
        })?;
        debug!(path = %path.display(), "mapped component library");
        Ok(Self { lib, path: path.to_path_buf() })
    }

    /// Resolve the manifest's entry symbol and instantiate the component.
    pub(crate) fn instantiate(&self, entry: &str) -> Result<Box<dyn Component>, Fault> {
        // SAFETY: the symbol is declared by the manifest to have the
        // `ComponentEntry` signature; a mismatch is undefined behavior the
        // bundle author owns, same as any native plug-in system.
        let constructor = unsafe {
            self.lib.get::<ComponentEntry>(entry.as_bytes()).map_err(|e| {
                Fault::faulted(format!(
                    "entry symbol {entry:?} missing from {}",
                    self.path.display()
                ))
                .with_context(e.to_string())
            })?
        };
        Ok(constructor())
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for LoadedLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedLibrary").field("path", &self.path).finish()
    }
}
