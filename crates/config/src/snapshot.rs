// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Point-in-time read-only view of the config tree.

use std::sync::Arc;

use li_core::{ConfigPath, ConfigValue};

/// Immutable view returned by `ConfigStore::snapshot`.
///
/// Cheap to clone and safe to read without locking; later writes to the
/// store are not visible through it.
#[derive(Clone)]
pub struct ConfigSnapshot {
    tree: Arc<ConfigValue>,
}

impl ConfigSnapshot {
    pub(crate) fn new(tree: Arc<ConfigValue>) -> Self {
        Self { tree }
    }

    pub fn get(&self, path: &ConfigPath) -> Option<&ConfigValue> {
        let mut node = self.tree.as_ref();
        for seg in path.segments() {
            node = node.get(seg)?;
        }
        Some(node)
    }

    pub fn root(&self) -> &ConfigValue {
        &self.tree
    }
}
