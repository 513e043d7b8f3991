// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;

fn name(s: &str) -> UnitName {
    UnitName::new(s).unwrap()
}

/// Build a spec table out of (unit, requires-list) pairs.
fn table(units: &[(&str, &[&str])]) -> IndexMap<UnitName, UnitSpec> {
    let mut specs = IndexMap::new();
    for (unit, requires) in units {
        let mut spec = UnitSpec::new(name(unit));
        spec.requires = requires.iter().map(|r| name(r)).collect();
        specs.insert(spec.name.clone(), spec);
    }
    specs
}

fn set(names: &[&str]) -> BTreeSet<UnitName> {
    names.iter().map(|n| name(n)).collect()
}

#[test]
fn chain_closure_is_transitive() {
    // a -> b -> c -> d -> e
    let specs = table(&[
        ("a", &["b"]),
        ("b", &["c"]),
        ("c", &["d"]),
        ("d", &["e"]),
        ("e", &[]),
    ]);
    let info = compute_dependencies(&specs);

    assert_eq!(info["a"].all_requires, set(&["b", "c", "d", "e"]));
    assert_eq!(info["b"].all_requires, set(&["c", "d", "e"]));
    assert_eq!(info["e"].all_requires, set(&[]));

    assert_eq!(info["e"].all_required_by, set(&["a", "b", "c", "d"]));
    assert_eq!(info["c"].all_required_by, set(&["a", "b"]));
    assert_eq!(info["a"].all_required_by, set(&[]));
}

#[test]
fn closure_is_independent_of_edge_order() {
    // The same chain declared from the other end, and via required-by.
    let forward = compute_dependencies(&table(&[
        ("a", &["b"]),
        ("b", &["c"]),
        ("c", &["d"]),
        ("d", &[]),
    ]));
    let backward = compute_dependencies(&table(&[
        ("d", &[]),
        ("c", &["d"]),
        ("b", &["c"]),
        ("a", &["b"]),
    ]));
    assert_eq!(forward, backward);
}

#[test]
fn required_by_is_inverted() {
    let mut specs = table(&[("a", &[]), ("b", &[])]);
    if let Some(spec) = specs.get_mut("b") {
        spec.required_by.insert(name("a"));
    }
    let info = compute_dependencies(&specs);

    assert_eq!(info["a"].all_requires, set(&["b"]));
    assert_eq!(info["b"].all_required_by, set(&["a"]));
}

#[test]
fn requires_feeds_both_ordering_closures() {
    let specs = table(&[("a", &["b"]), ("b", &[])]);
    let info = compute_dependencies(&specs);

    // b starts before a; a stops before b.
    assert_eq!(info["a"].all_starting_first, set(&["b"]));
    assert_eq!(info["b"].all_stopping_first, set(&["a"]));
    assert_eq!(info["b"].all_starting_first, set(&[]));
    assert_eq!(info["a"].all_stopping_first, set(&[]));
}

#[test]
fn declared_ordering_without_requires() {
    let mut specs = table(&[("a", &[]), ("b", &[]), ("c", &[])]);
    if let Some(spec) = specs.get_mut("b") {
        spec.starts_after.insert(name("a"));
        spec.stops_before.insert(name("c"));
    }
    let info = compute_dependencies(&specs);

    assert_eq!(info["b"].all_starting_first, set(&["a"]));
    assert_eq!(info["c"].all_stopping_first, set(&["b"]));
    // Ordering alone creates no requires relation.
    assert_eq!(info["b"].all_requires, set(&[]));
    assert_eq!(info["b"].all_required_by, set(&[]));
}

#[test]
fn cyclic_requires_stays_irreflexive() {
    let specs = table(&[("a", &["b"]), ("b", &["a"])]);
    let info = compute_dependencies(&specs);

    assert_eq!(info["a"].all_requires, set(&["b"]));
    assert_eq!(info["b"].all_requires, set(&["a"]));
    assert_eq!(info["a"].all_required_by, set(&["b"]));
    assert_eq!(info["b"].all_required_by, set(&["a"]));
}

#[test]
fn diamond_dependencies() {
    //    a
    //   / \
    //  b   c
    //   \ /
    //    d
    let specs = table(&[
        ("a", &["b", "c"]),
        ("b", &["d"]),
        ("c", &["d"]),
        ("d", &[]),
    ]);
    let info = compute_dependencies(&specs);

    assert_eq!(info["a"].all_requires, set(&["b", "c", "d"]));
    assert_eq!(info["d"].all_required_by, set(&["a", "b", "c"]));
}

#[test]
fn diff_reports_changed_sets() {
    let old = compute_dependencies(&table(&[("a", &["b"]), ("b", &[])]));
    let new = compute_dependencies(&table(&[("a", &[]), ("b", &[])]));

    let changes = diff_dependencies(&old, &new);
    assert!(changes.contains(&"a: requires dependencies changed".to_string()));
    assert!(changes.contains(&"b: required-by dependencies changed".to_string()));
}

#[test]
fn diff_of_unchanged_tables_is_empty() {
    let info = compute_dependencies(&table(&[("a", &["b"]), ("b", &[])]));
    assert!(diff_dependencies(&info, &info).is_empty());
}

/// Strategy: a handful of units with random requires edges between them.
fn arb_edges() -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((0usize..6, 0usize..6), 0..12)
}

fn specs_from_edges(edges: &[(usize, usize)]) -> IndexMap<UnitName, UnitSpec> {
    let names: Vec<UnitName> = (0..6).map(|i| name(&format!("u{i}"))).collect();
    let mut specs: IndexMap<UnitName, UnitSpec> = names
        .iter()
        .map(|n| (n.clone(), UnitSpec::new(n.clone())))
        .collect();
    for &(a, b) in edges {
        if a != b {
            if let Some(spec) = specs.get_mut(names[a].as_str()) {
                spec.requires.insert(names[b].clone());
            }
        }
    }
    specs
}

proptest! {
    #[test]
    fn closure_symmetry(edges in arb_edges()) {
        let info = compute_dependencies(&specs_from_edges(&edges));
        for (a, a_info) in &info {
            for b in &a_info.all_requires {
                prop_assert!(info[b.as_str()].all_required_by.contains(a));
            }
            for b in &a_info.all_required_by {
                prop_assert!(info[b.as_str()].all_requires.contains(a));
            }
        }
    }

    #[test]
    fn closure_is_irreflexive(edges in arb_edges()) {
        let info = compute_dependencies(&specs_from_edges(&edges));
        for (a, a_info) in &info {
            prop_assert!(!a_info.all_requires.contains(a));
            prop_assert!(!a_info.all_required_by.contains(a));
        }
    }

    #[test]
    fn closure_is_transitive(edges in arb_edges()) {
        let info = compute_dependencies(&specs_from_edges(&edges));
        for (a, a_info) in &info {
            for b in &a_info.all_requires {
                for c in &info[b.as_str()].all_requires {
                    if c != a {
                        prop_assert!(
                            a_info.all_requires.contains(c),
                            "{a} requires {b} requires {c}, but {c} missing from closure"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn requires_closure_is_subset_of_starting_order(edges in arb_edges()) {
        let info = compute_dependencies(&specs_from_edges(&edges));
        for a_info in info.values() {
            prop_assert!(a_info.all_requires.is_subset(&a_info.all_starting_first));
        }
    }
}
