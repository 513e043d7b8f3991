// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transitively closed dependency information.
//!
//! Four relations are tracked per unit: `all_requires` / `all_required_by`
//! (mutually inverse), and the two ordering closures `all_starting_first`
//! and `all_stopping_first`. The ordering relations also keep inverse sets
//! while the closure is being computed; those are discarded afterwards.
//!
//! "a requires b" means, assuming both sides already enumerate everything
//! they require and everything that requires them:
//!
//! 1. a now requires b, and everything b requires;
//! 2. b is now required by a, and by everything that requires a;
//! 3. everything that requires a now requires everything b requires;
//! 4. everything b requires is now required by everything that requires b.
//!
//! A `requires` edge also orders the two units: b starts first, and a stops
//! first. `required-by` declarations are the same edge written from the
//! other side and are inverted before being merged in.

use crate::name::UnitName;
use crate::spec::UnitSpec;
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet};

/// Closed dependency sets for one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyInfo {
    pub all_requires: BTreeSet<UnitName>,
    pub all_required_by: BTreeSet<UnitName>,
    pub all_starting_first: BTreeSet<UnitName>,
    pub all_stopping_first: BTreeSet<UnitName>,
}

/// Working entry while the closure is computed; the `*_by` sets of the
/// ordering relations exist only here.
#[derive(Debug, Clone, Default)]
struct Entry {
    requires: BTreeSet<UnitName>,
    required_by: BTreeSet<UnitName>,
    starting_first: BTreeSet<UnitName>,
    starting_first_by: BTreeSet<UnitName>,
    stopping_first: BTreeSet<UnitName>,
    stopping_first_by: BTreeSet<UnitName>,
}

type Field = fn(&mut Entry) -> &mut BTreeSet<UnitName>;

fn f_requires(e: &mut Entry) -> &mut BTreeSet<UnitName> {
    &mut e.requires
}
fn f_required_by(e: &mut Entry) -> &mut BTreeSet<UnitName> {
    &mut e.required_by
}
fn f_starting_first(e: &mut Entry) -> &mut BTreeSet<UnitName> {
    &mut e.starting_first
}
fn f_starting_first_by(e: &mut Entry) -> &mut BTreeSet<UnitName> {
    &mut e.starting_first_by
}
fn f_stopping_first(e: &mut Entry) -> &mut BTreeSet<UnitName> {
    &mut e.stopping_first
}
fn f_stopping_first_by(e: &mut Entry) -> &mut BTreeSet<UnitName> {
    &mut e.stopping_first_by
}

fn entry<'a>(map: &'a mut BTreeMap<UnitName, Entry>, name: &UnitName) -> &'a mut Entry {
    map.entry(name.clone()).or_default()
}

/// Record one closed edge `a → b` in the (forward, backward) relation pair.
///
/// Self-edges are dropped, and a unit is never inserted into its own sets;
/// cyclic declarations are legal (the scheduler breaks them at run time)
/// but the closure stays irreflexive.
fn define_dependency(
    map: &mut BTreeMap<UnitName, Entry>,
    forward: Field,
    backward: Field,
    a: &UnitName,
    b: &UnitName,
) {
    if a == b {
        return;
    }

    let b_fwd = forward(entry(map, b)).clone();
    let a_bwd = backward(entry(map, a)).clone();

    {
        let fwd = forward(entry(map, a));
        fwd.insert(b.clone());
        fwd.extend(b_fwd.iter().filter(|x| *x != a).cloned());
    }
    {
        let bwd = backward(entry(map, b));
        bwd.insert(a.clone());
        bwd.extend(a_bwd.iter().filter(|x| *x != b).cloned());
    }

    let a_fwd = forward(entry(map, a)).clone();
    let b_bwd = backward(entry(map, b)).clone();

    for x in &a_bwd {
        let fwd = forward(entry(map, x));
        fwd.extend(a_fwd.iter().filter(|y| *y != x).cloned());
    }
    for y in &b_fwd {
        let bwd = backward(entry(map, y));
        bwd.extend(b_bwd.iter().filter(|x| *x != y).cloned());
    }
}

/// One `a requires b` edge: feeds the requires closure and both ordering
/// closures (b starts before a; a stops before b).
fn requires_edge(map: &mut BTreeMap<UnitName, Entry>, a: &UnitName, b: &UnitName) {
    define_dependency(map, f_requires, f_required_by, a, b);
    define_dependency(map, f_starting_first, f_starting_first_by, a, b);
    define_dependency(map, f_stopping_first, f_stopping_first_by, b, a);
}

/// Compute closed dependency information for an installed unit table.
///
/// The table must already contain every referenced unit (the engine
/// materialises synthesised placeholders before calling this).
pub fn compute_dependencies(
    specs: &IndexMap<UnitName, UnitSpec>,
) -> BTreeMap<UnitName, DependencyInfo> {
    let mut map: BTreeMap<UnitName, Entry> = BTreeMap::new();

    for name in specs.keys() {
        map.entry(name.clone()).or_default();
    }

    for spec in specs.values() {
        let a = &spec.name;
        for b in &spec.requires {
            requires_edge(&mut map, a, b);
        }
        for b in &spec.required_by {
            requires_edge(&mut map, b, a);
        }
        for b in &spec.starts_after {
            define_dependency(&mut map, f_starting_first, f_starting_first_by, a, b);
        }
        for b in &spec.starts_before {
            define_dependency(&mut map, f_starting_first, f_starting_first_by, b, a);
        }
        for b in &spec.stops_after {
            define_dependency(&mut map, f_stopping_first, f_stopping_first_by, a, b);
        }
        for b in &spec.stops_before {
            define_dependency(&mut map, f_stopping_first, f_stopping_first_by, b, a);
        }
    }

    map.into_iter()
        .map(|(name, entry)| {
            (
                name,
                DependencyInfo {
                    all_requires: entry.requires,
                    all_required_by: entry.required_by,
                    all_starting_first: entry.starting_first,
                    all_stopping_first: entry.stopping_first,
                },
            )
        })
        .collect()
}

/// Describe dependency changes between two installed tables; the messages
/// are logged when the configuration is reloaded.
pub fn diff_dependencies(
    old: &BTreeMap<UnitName, DependencyInfo>,
    new: &BTreeMap<UnitName, DependencyInfo>,
) -> Vec<String> {
    let mut changes = Vec::new();
    for (name, new_info) in new {
        let Some(old_info) = old.get(name) else {
            continue;
        };
        let fields: [(&str, &BTreeSet<UnitName>, &BTreeSet<UnitName>); 4] = [
            ("requires", &old_info.all_requires, &new_info.all_requires),
            ("required-by", &old_info.all_required_by, &new_info.all_required_by),
            (
                "starting order",
                &old_info.all_starting_first,
                &new_info.all_starting_first,
            ),
            (
                "stopping order",
                &old_info.all_stopping_first,
                &new_info.all_stopping_first,
            ),
        ];
        for (label, old_set, new_set) in fields {
            if old_set != new_set {
                changes.push(format!("{name}: {label} dependencies changed"));
            }
        }
    }
    changes
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
