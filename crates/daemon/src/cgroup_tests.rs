// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn name(s: &str) -> UnitName {
    UnitName::new(s).unwrap()
}

#[parameterized(
    plain = { "getty", ":getty" },
    nested = { "net/dhcp", ":net:dhcp" },
    deep = { "a/b/c", ":a:b:c" },
    with_space = { "system/runlevel graphical", ":system:runlevel graphical" },
)]
fn leaf_names(unit: &str, expected: &str) {
    assert_eq!(leaf_name(&name(unit)), expected);
}

#[test]
fn unit_dir_joins_base() {
    let dir = unit_dir(Path::new("/sys/fs/cgroup/warden"), &name("net/dhcp"));
    assert_eq!(dir, Path::new("/sys/fs/cgroup/warden/:net:dhcp"));
}

#[parameterized(
    populated = { "populated 1\nfrozen 0\n", true },
    unpopulated = { "populated 0\nfrozen 0\n", false },
    empty = { "", false },
    frozen_only = { "frozen 1\n", false },
    missing_value = { "populated", false },
    nonzero = { "populated 2\n", true },
)]
fn parses_populated(content: &str, expected: bool) {
    assert_eq!(parse_populated(content), expected);
}
