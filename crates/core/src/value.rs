// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Config value: the tagged variant stored at every leaf and branch of the
//! configuration tree, and the unit of structured data everywhere else
//! (device properties, capability arguments, task parameters).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A structured value.
///
/// Lists are ordered. Maps preserve insertion order for serialization only;
/// lookups are by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(String),
    List(Vec<ConfigValue>),
    Map(IndexMap<String, ConfigValue>),
}

/// The kind of a [`ConfigValue`], used for type locks and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Real,
    Str,
    List,
    Map,
}

crate::simple_display! {
    ValueKind {
        Null => "null",
        Bool => "bool",
        Int => "int",
        Real => "real",
        Str => "str",
        List => "list",
        Map => "map",
    }
}

impl ConfigValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            ConfigValue::Null => ValueKind::Null,
            ConfigValue::Bool(_) => ValueKind::Bool,
            ConfigValue::Int(_) => ValueKind::Int,
            ConfigValue::Real(_) => ValueKind::Real,
            ConfigValue::Str(_) => ValueKind::Str,
            ConfigValue::List(_) => ValueKind::List,
            ConfigValue::Map(_) => ValueKind::Map,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ConfigValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric coercion: `Int` widens to `Real`, `Real` passes through.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            ConfigValue::Int(i) => Some(*i as f64),
            ConfigValue::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ConfigValue]> {
        match self {
            ConfigValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, ConfigValue>> {
        match self {
            ConfigValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Lookup a key in a `Map` value; `None` for non-maps and missing keys.
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// An empty `Map`, the shape intermediate tree nodes are created with.
    pub fn empty_map() -> Self {
        ConfigValue::Map(IndexMap::new())
    }
}

impl Default for ConfigValue {
    fn default() -> Self {
        ConfigValue::Null
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        ConfigValue::Bool(v)
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        ConfigValue::Int(v)
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        ConfigValue::Real(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        ConfigValue::Str(v.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        ConfigValue::Str(v)
    }
}

impl<T: Into<ConfigValue>> From<Vec<T>> for ConfigValue {
    fn from(v: Vec<T>) -> Self {
        ConfigValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl std::fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => f.write_str(&s),
            Err(_) => f.write_str("<unserializable>"),
        }
    }
}

#[cfg(test)]
#[path = "value_tests.rs"]
mod tests;
