// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Profile save/load/delete and notification tests.

use super::*;
use li_core::ValueKind;
use std::sync::{Arc, Mutex as StdMutex};
use tempfile::TempDir;

fn path(s: &str) -> ConfigPath {
    ConfigPath::parse(s).unwrap()
}

fn setup() -> (TempDir, ConfigStore, ProfileStore) {
    let dir = TempDir::new().unwrap();
    let store = ConfigStore::new();
    let profiles = ProfileStore::new(dir.path(), path("profile"));
    (dir, store, profiles)
}

#[test]
fn save_then_load_restores_subtree_exactly() {
    let (_dir, store, profiles) = setup();
    store.set(&path("profile.devices.cam1.address"), "localhost:7624".into()).unwrap();
    store.set(&path("profile.devices.cam1.driver"), "line".into()).unwrap();
    store.set(&path("profile.exposure.default"), ConfigValue::Real(5.0)).unwrap();

    profiles.save(&store, "deep-sky").unwrap();
    let before = serde_json::to_string(&store.get(&path("profile")).unwrap()).unwrap();

    // Mutate, then restore
    store.set(&path("profile.exposure.default"), ConfigValue::Real(30.0)).unwrap();
    store.delete(&path("profile.devices.cam1.driver")).unwrap();
    profiles.load(&store, "deep-sky").unwrap();

    let after = serde_json::to_string(&store.get(&path("profile")).unwrap()).unwrap();
    assert_eq!(after, before, "load must restore the subtree byte-for-byte");
}

#[test]
fn load_missing_profile_reports_not_found() {
    let (_dir, store, profiles) = setup();
    assert!(matches!(
        profiles.load(&store, "nope"),
        Err(ProfileError::NotFound(name)) if name == "nope"
    ));
}

#[test]
fn load_notifies_changed_leaves_only() {
    let (_dir, store, profiles) = setup();
    store.set(&path("profile.a"), ConfigValue::Int(1)).unwrap();
    store.set(&path("profile.b"), ConfigValue::Int(2)).unwrap();
    profiles.save(&store, "p").unwrap();

    store.set(&path("profile.a"), ConfigValue::Int(99)).unwrap();

    let seen = Arc::new(StdMutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    store.subscribe(path("profile"), move |ev| {
        sink.lock().unwrap().push(ev.path.clone());
        Ok(())
    });

    profiles.load(&store, "p").unwrap();
    // Only `a` differs from the stored document; `b` is untouched.
    assert_eq!(*seen.lock().unwrap(), vec![path("profile.a")]);
}

#[test]
fn load_emits_deletions_for_leaves_absent_from_document() {
    let (_dir, store, profiles) = setup();
    store.set(&path("profile.keep"), ConfigValue::Int(1)).unwrap();
    profiles.save(&store, "p").unwrap();

    store.set(&path("profile.extra.leaf"), ConfigValue::Int(2)).unwrap();

    let seen = Arc::new(StdMutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    store.subscribe(path("profile"), move |ev| {
        sink.lock().unwrap().push((ev.path.clone(), ev.value.is_none()));
        Ok(())
    });

    profiles.load(&store, "p").unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![(path("profile.extra.leaf"), true)]);
    assert_eq!(store.get(&path("profile.extra")), None);
}

#[test]
fn list_and_delete() {
    let (_dir, store, profiles) = setup();
    store.set(&path("profile.x"), ConfigValue::Int(1)).unwrap();
    profiles.save(&store, "beta").unwrap();
    profiles.save(&store, "alpha").unwrap();

    assert_eq!(profiles.list().unwrap(), vec!["alpha", "beta"]);
    profiles.delete("alpha").unwrap();
    assert_eq!(profiles.list().unwrap(), vec!["beta"]);
    assert!(matches!(profiles.delete("alpha"), Err(ProfileError::NotFound(_))));
}

#[test]
fn list_on_missing_dir_is_empty() {
    let dir = TempDir::new().unwrap();
    let profiles = ProfileStore::new(dir.path().join("never-created"), path("profile"));
    assert_eq!(profiles.list().unwrap(), Vec::<String>::new());
}

#[test]
fn profile_names_are_validated() {
    let (_dir, store, profiles) = setup();
    assert!(matches!(
        profiles.save(&store, "../escape"),
        Err(ProfileError::InvalidName(_))
    ));
    assert!(matches!(profiles.save(&store, ""), Err(ProfileError::InvalidName(_))));
}

#[test]
fn saving_missing_subtree_stores_empty_map() {
    let (_dir, store, profiles) = setup();
    profiles.save(&store, "empty").unwrap();
    profiles.load(&store, "empty").unwrap();
    assert_eq!(store.get(&path("profile")).map(|v| v.kind()), Some(ValueKind::Map));
}
