// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test helpers shared by other crates' tests.

use crate::value::ConfigValue;
use indexmap::IndexMap;
use proptest::prelude::*;

/// Strategy producing arbitrary representable config values.
///
/// Reals are kept finite so JSON round-trips are exact; map keys avoid dots
/// so generated structures can be addressed by path.
pub fn value_strategy() -> impl Strategy<Value = ConfigValue> {
    let leaf = prop_oneof![
        Just(ConfigValue::Null),
        any::<bool>().prop_map(ConfigValue::Bool),
        any::<i64>().prop_map(ConfigValue::Int),
        (-1.0e9f64..1.0e9).prop_map(ConfigValue::Real),
        "[a-z0-9 ]{0,12}".prop_map(ConfigValue::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(ConfigValue::List),
            prop::collection::vec(("[a-z][a-z0-9]{0,7}", inner), 0..4).prop_map(|pairs| {
                let mut map = IndexMap::new();
                for (k, v) in pairs {
                    map.insert(k, v);
                }
                ConfigValue::Map(map)
            }),
        ]
    })
}

/// Strategy producing canonical dotted paths, 1..=4 segments.
pub fn path_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z][a-z0-9]{0,7}", 1..=4).prop_map(|segs| segs.join("."))
}
