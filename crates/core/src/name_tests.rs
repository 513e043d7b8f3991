// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    plain = { "getty" },
    nested = { "net/dhcp" },
    deeply_nested = { "system/rc/local" },
    with_dot = { "rc.local" },
    with_space = { "system/runlevel graphical" },
    with_underscore = { "my_unit" },
    mixed = { "a1/b-2/c.3" },
)]
fn accepts_valid_names(name: &str) {
    assert!(UnitName::new(name).is_ok(), "{name} should be valid");
}

#[parameterized(
    empty = { "", NameError::Empty },
    leading_slash = { "/abs", NameError::EmptySegment },
    trailing_slash = { "x/", NameError::EmptySegment },
    double_slash = { "a//b", NameError::EmptySegment },
    leading_dot = { ".hidden", NameError::BadSegmentEdge },
    trailing_dash = { "unit-", NameError::BadSegmentEdge },
    leading_space = { "a/ b", NameError::BadSegmentEdge },
    adjacent_specials = { "a--b", NameError::AdjacentSpecial },
    dot_dash = { "a.-b", NameError::AdjacentSpecial },
    colon = { "a:b", NameError::BadCharacter(':') },
    newline = { "a\nb", NameError::BadCharacter('\n') },
)]
fn rejects_invalid_names(name: &str, expected: NameError) {
    assert_eq!(UnitName::new(name).unwrap_err(), expected);
}

#[test]
fn rejects_overlong_name() {
    let name = "x".repeat(NAME_MAX + 1);
    assert_eq!(UnitName::new(name).unwrap_err(), NameError::TooLong);
}

#[test]
fn accepts_high_bit_bytes() {
    assert!(UnitName::new("café").is_ok());
}

#[test]
fn runlevel_names() {
    let rl = UnitName::runlevel("graphical");
    assert_eq!(rl.as_str(), "system/runlevel graphical");
    assert!(rl.is_runlevel());
    assert_eq!(rl.runlevel_name(), Some("graphical"));

    let unit = UnitName::new("getty").unwrap();
    assert!(!unit.is_runlevel());
    assert_eq!(unit.runlevel_name(), None);
}

#[test]
fn directory_of_nested_name() {
    assert_eq!(UnitName::new("net/dhcp").unwrap().directory(), "net");
    assert_eq!(UnitName::new("a/b/c").unwrap().directory(), "a/b");
    assert_eq!(UnitName::new("getty").unwrap().directory(), "");
}

#[test]
fn resolves_absolute_reference() {
    let unit = UnitName::new("net/dhcp").unwrap();
    let dep = unit.resolve_reference("/system/getty", |_| false).unwrap();
    assert_eq!(dep, "system/getty");
}

#[test]
fn resolves_relative_reference() {
    let unit = UnitName::new("net/dhcp").unwrap();
    let dep = unit.resolve_reference("lease", |_| false).unwrap();
    assert_eq!(dep, "net/lease");

    let top = UnitName::new("getty").unwrap();
    let dep = top.resolve_reference("agetty", |_| false).unwrap();
    assert_eq!(dep, "agetty");
}

#[test]
fn resolves_runlevel_reference() {
    let unit = UnitName::new("sshd").unwrap();
    let dep = unit
        .resolve_reference("/system/networking", |rl| rl == "networking")
        .unwrap();
    assert_eq!(dep, "system/runlevel networking");
}

#[test]
fn non_runlevel_system_reference_stays_plain() {
    let unit = UnitName::new("sshd").unwrap();
    let dep = unit.resolve_reference("/system/foo", |_| false).unwrap();
    assert_eq!(dep, "system/foo");
}

#[test]
fn ordering_is_lexicographic() {
    let a = UnitName::new("aaa").unwrap();
    let b = UnitName::new("bbb").unwrap();
    assert!(a < b);
}

#[test]
fn try_from_string_validates() {
    assert!(UnitName::try_from("net/dhcp".to_string()).is_ok());
    assert!(UnitName::try_from("bad//name".to_string()).is_err());
}
