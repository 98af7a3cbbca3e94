// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store mutation, lookup, and notification-ordering tests.

use super::*;
use li_core::test_support::{path_strategy, value_strategy};
use proptest::prelude::*;
use std::sync::Mutex as StdMutex;

fn path(s: &str) -> ConfigPath {
    ConfigPath::parse(s).unwrap()
}

#[test]
fn set_then_get_round_trips() {
    let store = ConfigStore::new();
    store.set(&path("mount.park.alt"), ConfigValue::Real(15.5)).unwrap();
    assert_eq!(store.get(&path("mount.park.alt")), Some(ConfigValue::Real(15.5)));
}

#[test]
fn set_creates_intermediate_maps() {
    let store = ConfigStore::new();
    store.set(&path("a.b.c"), ConfigValue::Int(1)).unwrap();
    let a = store.get(&path("a")).unwrap();
    assert_eq!(a.kind(), ValueKind::Map);
    assert_eq!(a.get("b").and_then(|b| b.get("c")), Some(&ConfigValue::Int(1)));
}

#[test]
fn set_through_scalar_is_rejected() {
    let store = ConfigStore::new();
    store.set(&path("a.b"), ConfigValue::Int(1)).unwrap();
    let err = store.set(&path("a.b.c"), ConfigValue::Int(2)).unwrap_err();
    assert!(matches!(err, ConfigError::NotAMap { .. }));
    // Original leaf untouched
    assert_eq!(store.get(&path("a.b")), Some(ConfigValue::Int(1)));
}

#[test]
fn delete_removes_leaf_and_reports_missing() {
    let store = ConfigStore::new();
    store.set(&path("a.x"), ConfigValue::Int(1)).unwrap();
    store.delete(&path("a.x")).unwrap();
    assert_eq!(store.get(&path("a.x")), None);
    assert!(matches!(store.delete(&path("a.x")), Err(ConfigError::NotFound(_))));
}

#[test]
fn type_lock_rejects_mismatched_kind() {
    let store = ConfigStore::new();
    store.lock_type(path("camera.gain"), ValueKind::Int);
    store.set(&path("camera.gain"), ConfigValue::Int(120)).unwrap();

    let err = store.set(&path("camera.gain"), ConfigValue::Str("high".into())).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::TypeLocked { expected: ValueKind::Int, got: ValueKind::Str, .. }
    ));
    assert_eq!(store.get(&path("camera.gain")), Some(ConfigValue::Int(120)));
}

#[test]
fn subscriber_sees_prefix_writes_in_commit_order() {
    let store = ConfigStore::new();
    let seen = std::sync::Arc::new(StdMutex::new(Vec::new()));
    let sink = std::sync::Arc::clone(&seen);
    store.subscribe(path("a"), move |ev| {
        sink.lock().unwrap().push((ev.path.clone(), ev.value.clone()));
        Ok(())
    });

    store.set(&path("a.x"), ConfigValue::Int(1)).unwrap();
    store.set(&path("a.y"), ConfigValue::Int(2)).unwrap();
    store.set(&path("a.x"), ConfigValue::Int(3)).unwrap();
    store.set(&path("b.z"), ConfigValue::Int(4)).unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![
            (path("a.x"), Some(ConfigValue::Int(1))),
            (path("a.y"), Some(ConfigValue::Int(2))),
            (path("a.x"), Some(ConfigValue::Int(3))),
        ]
    );
}

#[test]
fn unchanged_write_does_not_notify() {
    let store = ConfigStore::new();
    let count = std::sync::Arc::new(StdMutex::new(0usize));
    let sink = std::sync::Arc::clone(&count);
    store.subscribe(path("a"), move |_| {
        *sink.lock().unwrap() += 1;
        Ok(())
    });

    store.set(&path("a.x"), ConfigValue::Int(1)).unwrap();
    store.set(&path("a.x"), ConfigValue::Int(1)).unwrap();
    assert_eq!(*count.lock().unwrap(), 1);
}

#[test]
fn all_ancestor_subscribers_are_notified() {
    let store = ConfigStore::new();
    let hits = std::sync::Arc::new(StdMutex::new(Vec::new()));

    for prefix in ["a", "a.b", "a.b.c"] {
        let sink = std::sync::Arc::clone(&hits);
        let label = prefix.to_string();
        store.subscribe(path(prefix), move |_| {
            sink.lock().unwrap().push(label.clone());
            Ok(())
        });
    }

    store.set(&path("a.b.c"), ConfigValue::Int(9)).unwrap();
    let mut hits = hits.lock().unwrap().clone();
    hits.sort();
    assert_eq!(hits, vec!["a", "a.b", "a.b.c"]);
}

#[test]
fn handler_error_does_not_abort_mutation() {
    let store = ConfigStore::new();
    store.subscribe(path("a"), |_| Err("handler exploded".to_string()));
    store.set(&path("a.x"), ConfigValue::Int(1)).unwrap();
    assert_eq!(store.get(&path("a.x")), Some(ConfigValue::Int(1)));
}

#[test]
fn handler_may_write_other_paths() {
    let store = std::sync::Arc::new(ConfigStore::new());
    let store2 = std::sync::Arc::clone(&store);
    store.subscribe(path("trigger"), move |ev| {
        if ev.value.is_some() {
            store2
                .set(&path("derived.mirror"), ev.value.clone().unwrap_or(ConfigValue::Null))
                .map_err(|e| e.to_string())?;
        }
        Ok(())
    });

    store.set(&path("trigger.go"), ConfigValue::Int(7)).unwrap();
    assert_eq!(store.get(&path("derived.mirror")), Some(ConfigValue::Int(7)));
}

#[test]
fn re_entrant_same_path_write_lands_and_converges() {
    // Writing the notified path from its own handler is a documented
    // programming error (warned, not rejected); the write must still land
    // and dispatch must not recurse or hang.
    let store = std::sync::Arc::new(ConfigStore::new());
    let calls = std::sync::Arc::new(StdMutex::new(0usize));
    let store2 = std::sync::Arc::clone(&store);
    let sink = std::sync::Arc::clone(&calls);
    store.subscribe(path("a"), move |ev| {
        *sink.lock().unwrap() += 1;
        if ev.value != Some(ConfigValue::Int(2)) {
            store2.set(&path("a.x"), ConfigValue::Int(2)).map_err(|e| e.to_string())?;
        }
        Ok(())
    });

    store.set(&path("a.x"), ConfigValue::Int(1)).unwrap();

    assert_eq!(store.get(&path("a.x")), Some(ConfigValue::Int(2)));
    // Once for the original write, once for the re-entrant one.
    assert_eq!(*calls.lock().unwrap(), 2);
}

#[test]
fn subscribe_all_sees_every_change() {
    let store = ConfigStore::new();
    let seen = std::sync::Arc::new(StdMutex::new(Vec::new()));
    let sink = std::sync::Arc::clone(&seen);
    store.subscribe_all(move |ev| {
        sink.lock().unwrap().push(ev.path.clone());
        Ok(())
    });

    store.set(&path("a.x"), ConfigValue::Int(1)).unwrap();
    store.set(&path("b.z"), ConfigValue::Int(2)).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![path("a.x"), path("b.z")]);
}

#[test]
fn unsubscribe_stops_delivery() {
    let store = ConfigStore::new();
    let count = std::sync::Arc::new(StdMutex::new(0usize));
    let sink = std::sync::Arc::clone(&count);
    let id = store.subscribe(path("a"), move |_| {
        *sink.lock().unwrap() += 1;
        Ok(())
    });

    store.set(&path("a.x"), ConfigValue::Int(1)).unwrap();
    assert!(store.unsubscribe(id));
    assert!(!store.unsubscribe(id));
    store.set(&path("a.x"), ConfigValue::Int(2)).unwrap();
    assert_eq!(*count.lock().unwrap(), 1);
}

proptest! {
    #[test]
    fn prop_set_get_round_trip(raw_path in path_strategy(), value in value_strategy()) {
        let store = ConfigStore::new();
        let p = ConfigPath::parse(&raw_path).unwrap();
        store.set(&p, value.clone()).unwrap();
        prop_assert_eq!(store.get(&p), Some(value));
    }
}
