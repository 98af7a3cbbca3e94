// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory config tree with change notification.
//!
//! Reads take a shared lock, writes take an exclusive lock. Notifications
//! are delivered synchronously on the mutator's thread after the mutation
//! commits, with no store lock held, through a single drain loop that
//! preserves global commit order. A handler may write to *other* paths;
//! those notifications queue behind the outer dispatch.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use li_core::{ConfigPath, ConfigValue, PathError, ValueKind};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::warn;

use crate::snapshot::ConfigSnapshot;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid path: {0}")]
    InvalidPath(#[from] PathError),

    /// An intermediate segment exists but is not a mapping node.
    #[error("path {path} blocked by non-map node at {blocked_at}")]
    NotAMap { path: ConfigPath, blocked_at: String },

    #[error("type lock on {path} expects {expected}, got {got}")]
    TypeLocked { path: ConfigPath, expected: ValueKind, got: ValueKind },

    #[error("no value at {0}")]
    NotFound(ConfigPath),
}

/// Identifier returned by [`ConfigStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Payload delivered to subscribers. `value` is `None` for deletions.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub path: ConfigPath,
    pub value: Option<ConfigValue>,
}

type Handler = Arc<dyn Fn(&ChangeEvent) -> Result<(), String> + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    /// `None` subscribes to the whole tree.
    prefix: Option<ConfigPath>,
    handler: Handler,
}

/// The hierarchical key/value tree backing every other subsystem.
pub struct ConfigStore {
    tree: RwLock<ConfigValue>,
    locks: RwLock<HashMap<ConfigPath, ValueKind>>,
    subs: RwLock<Vec<Subscriber>>,
    next_sub: AtomicU64,
    pending: Mutex<VecDeque<ChangeEvent>>,
    // try_lock gate: whichever thread holds it drains the pending queue,
    // so notifications are delivered in commit order even under contention.
    drain: Mutex<()>,
    /// Path whose notification is currently being dispatched; a write to
    /// this path from inside a handler is the re-entrancy error.
    dispatching: Mutex<Option<ConfigPath>>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(ConfigValue::empty_map()),
            locks: RwLock::new(HashMap::new()),
            subs: RwLock::new(Vec::new()),
            next_sub: AtomicU64::new(1),
            pending: Mutex::new(VecDeque::new()),
            drain: Mutex::new(()),
            dispatching: Mutex::new(None),
        }
    }

    /// Current value at `path`, or `None`. Never blocks on I/O.
    pub fn get(&self, path: &ConfigPath) -> Option<ConfigValue> {
        let tree = self.tree.read();
        lookup(&tree, path).cloned()
    }

    /// Set `path` to `value`, creating intermediate mapping nodes as needed.
    ///
    /// Rejects the write when a registered type lock disagrees with the
    /// value's kind, or when an existing non-map node blocks the descent.
    pub fn set(&self, path: &ConfigPath, value: ConfigValue) -> Result<(), ConfigError> {
        if let Some(expected) = self.locks.read().get(path) {
            if *expected != value.kind() {
                return Err(ConfigError::TypeLocked {
                    path: path.clone(),
                    expected: *expected,
                    got: value.kind(),
                });
            }
        }

        let changed = {
            let mut tree = self.tree.write();
            let slot = descend_mut(&mut tree, path)?;
            if *slot == value {
                None
            } else {
                *slot = value.clone();
                Some(ChangeEvent { path: path.clone(), value: Some(value) })
            }
        };

        if let Some(event) = changed {
            self.enqueue_and_drain(vec![event]);
        }
        Ok(())
    }

    /// Remove the value at `path`.
    pub fn delete(&self, path: &ConfigPath) -> Result<(), ConfigError> {
        let removed = {
            let mut tree = self.tree.write();
            remove(&mut tree, path)
        };
        match removed {
            Some(_) => {
                self.enqueue_and_drain(vec![ChangeEvent { path: path.clone(), value: None }]);
                Ok(())
            }
            None => Err(ConfigError::NotFound(path.clone())),
        }
    }

    /// Register a type lock: future writes to `path` must carry `kind`.
    pub fn lock_type(&self, path: ConfigPath, kind: ValueKind) {
        self.locks.write().insert(path, kind);
    }

    /// Subscribe to changes at or below `prefix`.
    ///
    /// The handler runs synchronously in the mutator's context after the
    /// mutation commits. It must not write the same path re-entrantly;
    /// doing so is logged as a warning and the write still lands. Writes
    /// elsewhere are permitted and their notifications are delivered after
    /// the current dispatch completes. Handler errors are logged and do not
    /// abort the mutation.
    pub fn subscribe<F>(&self, prefix: ConfigPath, handler: F) -> SubscriptionId
    where
        F: Fn(&ChangeEvent) -> Result<(), String> + Send + Sync + 'static,
    {
        self.subscribe_inner(Some(prefix), Arc::new(handler))
    }

    /// Subscribe to every change in the tree.
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ChangeEvent) -> Result<(), String> + Send + Sync + 'static,
    {
        self.subscribe_inner(None, Arc::new(handler))
    }

    fn subscribe_inner(&self, prefix: Option<ConfigPath>, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_sub.fetch_add(1, Ordering::Relaxed));
        self.subs.write().push(Subscriber { id, prefix, handler });
        id
    }

    /// Drop a subscription. Returns false when the id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subs.write();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    /// Point-in-time read-only view, usable without further locking.
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot::new(Arc::new(self.tree.read().clone()))
    }

    /// Replace the subtree at `root` wholesale, emitting one notification
    /// per changed leaf in document order. Used by profile loading.
    pub(crate) fn replace_subtree(
        &self,
        root: &ConfigPath,
        replacement: ConfigValue,
    ) -> Result<(), ConfigError> {
        let events = {
            let mut tree = self.tree.write();
            let slot = descend_mut(&mut tree, root)?;
            let old = std::mem::replace(slot, replacement.clone());
            diff_leaves(root, &old, &replacement)
        };
        if !events.is_empty() {
            self.enqueue_and_drain(events);
        }
        Ok(())
    }

    fn enqueue_and_drain(&self, events: Vec<ChangeEvent>) {
        // A handler must not write the path it is being notified about;
        // surface the violation rather than failing the (valid) mutation.
        {
            let dispatching = self.dispatching.lock();
            if let Some(current) = dispatching.as_ref() {
                for event in &events {
                    if event.path == *current {
                        warn!(
                            path = %event.path,
                            "re-entrant write to a path while its notification is dispatching"
                        );
                    }
                }
            }
        }

        self.pending.lock().extend(events);
        // If another frame (possibly our own caller, via a handler that
        // wrote elsewhere) is already draining, it will deliver ours too.
        let Some(_guard) = self.drain.try_lock() else {
            return;
        };
        loop {
            let Some(event) = self.pending.lock().pop_front() else {
                break;
            };
            *self.dispatching.lock() = Some(event.path.clone());
            self.dispatch(&event);
            *self.dispatching.lock() = None;
        }
    }

    fn dispatch(&self, event: &ChangeEvent) {
        let handlers: Vec<(SubscriptionId, Handler)> = {
            let subs = self.subs.read();
            subs.iter()
                .filter(|s| {
                    s.prefix.as_ref().is_none_or(|prefix| prefix.is_prefix_of(&event.path))
                })
                .map(|s| (s.id, Arc::clone(&s.handler)))
                .collect()
        };
        for (id, handler) in handlers {
            if let Err(e) = handler(event) {
                warn!(subscription = id.0, path = %event.path, error = %e, "config handler failed");
            }
        }
    }
}

/// Walk `path` through a map tree; `None` when any segment is missing or a
/// non-map intervenes.
fn lookup<'a>(tree: &'a ConfigValue, path: &ConfigPath) -> Option<&'a ConfigValue> {
    let mut node = tree;
    for seg in path.segments() {
        node = node.get(seg)?;
    }
    Some(node)
}

/// Walk to the slot for `path`, creating intermediate maps.
fn descend_mut<'a>(
    tree: &'a mut ConfigValue,
    path: &ConfigPath,
) -> Result<&'a mut ConfigValue, ConfigError> {
    let mut node = tree;
    let mut walked = String::new();
    let segments: Vec<&str> = path.segments().collect();
    let (leaf, parents) = match segments.split_last() {
        Some(split) => split,
        None => return Err(ConfigError::InvalidPath(PathError::Empty)),
    };

    for seg in parents {
        if !walked.is_empty() {
            walked.push('.');
        }
        walked.push_str(seg);
        let map = match node {
            ConfigValue::Map(m) => m,
            _ => {
                return Err(ConfigError::NotAMap { path: path.clone(), blocked_at: walked });
            }
        };
        node = map.entry(seg.to_string()).or_insert_with(ConfigValue::empty_map);
    }

    match node {
        ConfigValue::Map(m) => {
            Ok(m.entry(leaf.to_string()).or_insert(ConfigValue::Null))
        }
        _ => Err(ConfigError::NotAMap { path: path.clone(), blocked_at: walked }),
    }
}

fn remove(tree: &mut ConfigValue, path: &ConfigPath) -> Option<ConfigValue> {
    let parent = match path.parent() {
        Some(parent) => {
            let node = lookup_mut(tree, &parent)?;
            match node {
                ConfigValue::Map(m) => m,
                _ => return None,
            }
        }
        None => match tree {
            ConfigValue::Map(m) => m,
            _ => return None,
        },
    };
    parent.shift_remove(path.leaf())
}

fn lookup_mut<'a>(tree: &'a mut ConfigValue, path: &ConfigPath) -> Option<&'a mut ConfigValue> {
    let mut node = tree;
    for seg in path.segments() {
        node = match node {
            ConfigValue::Map(m) => m.get_mut(seg)?,
            _ => return None,
        };
    }
    Some(node)
}

/// Leaf-level diff between two subtrees, in replacement-document order.
/// Leaves present in `old` but absent from `new` become deletions.
fn diff_leaves(root: &ConfigPath, old: &ConfigValue, new: &ConfigValue) -> Vec<ChangeEvent> {
    let mut events = Vec::new();
    collect_changed(root, Some(old), new, &mut events);
    collect_deleted(root, old, new, &mut events);
    events
}

fn collect_changed(
    at: &ConfigPath,
    old: Option<&ConfigValue>,
    new: &ConfigValue,
    out: &mut Vec<ChangeEvent>,
) {
    match new {
        ConfigValue::Map(m) => {
            for (key, child) in m {
                let Ok(child_path) = at.child(key) else {
                    continue;
                };
                let old_child = old.and_then(|o| o.get(key));
                collect_changed(&child_path, old_child, child, out);
            }
        }
        leaf => {
            if old != Some(leaf) {
                out.push(ChangeEvent { path: at.clone(), value: Some(leaf.clone()) });
            }
        }
    }
}

fn collect_deleted(
    at: &ConfigPath,
    old: &ConfigValue,
    new: &ConfigValue,
    out: &mut Vec<ChangeEvent>,
) {
    if let ConfigValue::Map(old_map) = old {
        for (key, old_child) in old_map {
            let Ok(child_path) = at.child(key) else {
                continue;
            };
            match new.get(key) {
                Some(new_child) => collect_deleted(&child_path, old_child, new_child, out),
                None => {
                    // Entire branch removed; one deletion per old leaf.
                    deleted_leaves(&child_path, old_child, out);
                }
            }
        }
    }
}

fn deleted_leaves(at: &ConfigPath, old: &ConfigValue, out: &mut Vec<ChangeEvent>) {
    match old {
        ConfigValue::Map(m) => {
            for (key, child) in m {
                if let Ok(child_path) = at.child(key) {
                    deleted_leaves(&child_path, child, out);
                }
            }
        }
        _ => out.push(ChangeEvent { path: at.clone(), value: None }),
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
