// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ConfigValue serialization and accessor tests.

use super::*;
use yare::parameterized;

#[parameterized(
    null = { ConfigValue::Null, "null" },
    boolean = { ConfigValue::Bool(true), "true" },
    int = { ConfigValue::Int(-10), "-10" },
    real = { ConfigValue::Real(2.5), "2.5" },
    string = { ConfigValue::from("dark"), "\"dark\"" },
)]
fn scalar_json_round_trip(value: ConfigValue, expected_json: &str) {
    let json = serde_json::to_string(&value).unwrap();
    assert_eq!(json, expected_json);
    let back: ConfigValue = serde_json::from_str(&json).unwrap();
    assert_eq!(back, value);
}

#[test]
fn integral_json_number_stays_int() {
    let v: ConfigValue = serde_json::from_str("5").unwrap();
    assert_eq!(v, ConfigValue::Int(5));
    let v: ConfigValue = serde_json::from_str("5.0").unwrap();
    assert_eq!(v.kind(), ValueKind::Real);
}

#[test]
fn map_preserves_insertion_order_in_serialization() {
    let mut m = IndexMap::new();
    m.insert("zeta".to_string(), ConfigValue::Int(1));
    m.insert("alpha".to_string(), ConfigValue::Int(2));
    let json = serde_json::to_string(&ConfigValue::Map(m)).unwrap();
    assert_eq!(json, r#"{"zeta":1,"alpha":2}"#);
}

#[test]
fn int_widens_to_real() {
    assert_eq!(ConfigValue::Int(3).as_real(), Some(3.0));
    assert_eq!(ConfigValue::Real(3.5).as_real(), Some(3.5));
    assert_eq!(ConfigValue::Str("3".into()).as_real(), None);
}

#[test]
fn get_traverses_maps_only() {
    let mut m = IndexMap::new();
    m.insert("exposure".to_string(), ConfigValue::Real(5.0));
    let v = ConfigValue::Map(m);
    assert_eq!(v.get("exposure"), Some(&ConfigValue::Real(5.0)));
    assert_eq!(v.get("missing"), None);
    assert_eq!(ConfigValue::Int(1).get("exposure"), None);
}

#[test]
fn kind_names_are_kebab_free_lowercase() {
    assert_eq!(ValueKind::Map.to_string(), "map");
    assert_eq!(ConfigValue::Null.kind().to_string(), "null");
}
