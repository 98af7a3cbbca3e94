// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency resolution: topological load order over discovered bundles.
//!
//! Cycles and missing dependencies are reported per-bundle; bundles outside
//! the affected subgraph still resolve (partial successes are retained).

use std::collections::{HashMap, HashSet, VecDeque};

/// Outcome of ordering one set of bundles.
#[derive(Debug, Default, PartialEq)]
pub struct ResolveOutcome {
    /// Load order: dependencies before dependents.
    pub order: Vec<String>,
    /// Bundles naming a dependency that was not discovered.
    pub missing: Vec<(String, String)>,
    /// Bundles participating in (or downstream of) a dependency cycle.
    pub cyclic: Vec<String>,
}

/// Order bundles by declared dependencies using Kahn's algorithm.
///
/// `bundles` maps name → declared dependency names. Iteration order of the
/// input decides tie-breaks, so callers pass an insertion-ordered map.
pub fn resolve_order<'a, I>(bundles: I) -> ResolveOutcome
where
    I: IntoIterator<Item = (&'a str, &'a [String])>,
{
    let mut deps: Vec<(&str, &[String])> = bundles.into_iter().collect();
    let known: HashSet<&str> = deps.iter().map(|(name, _)| *name).collect();

    let mut outcome = ResolveOutcome::default();

    // Bundles with undiscovered dependencies fail up front and do not
    // participate in the sort.
    deps.retain(|(name, declared)| {
        let missing: Vec<&String> =
            declared.iter().filter(|d| !known.contains(d.as_str())).collect();
        match missing.first() {
            Some(dep) => {
                outcome.missing.push((name.to_string(), (*dep).clone()));
                false
            }
            None => true,
        }
    });

    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    let participating: HashSet<&str> = deps.iter().map(|(name, _)| *name).collect();

    for (name, declared) in &deps {
        let count = declared.iter().filter(|d| participating.contains(d.as_str())).count();
        in_degree.insert(name, count);
        for dep in declared.iter() {
            if participating.contains(dep.as_str()) {
                dependents.entry(dep.as_str()).or_default().push(name);
            }
        }
    }

    let mut queue: VecDeque<&str> = deps
        .iter()
        .filter(|(name, _)| in_degree.get(name) == Some(&0))
        .map(|(name, _)| *name)
        .collect();

    while let Some(name) = queue.pop_front() {
        outcome.order.push(name.to_string());
        for dependent in dependents.get(name).map(Vec::as_slice).unwrap_or_default() {
            if let Some(remaining) = in_degree.get_mut(dependent) {
                *remaining -= 1;
                if *remaining == 0 {
                    queue.push_back(dependent);
                }
            }
        }
    }

    // Anything not emitted is in a cycle or depends on one.
    if outcome.order.len() < deps.len() {
        let ordered: HashSet<&str> = outcome.order.iter().map(String::as_str).collect();
        outcome.cyclic = deps
            .iter()
            .map(|(name, _)| *name)
            .filter(|name| !ordered.contains(name))
            .map(str::to_string)
            .collect();
    }

    outcome
}

#[cfg(test)]
#[path = "resolve_tests.rs"]
mod tests;
