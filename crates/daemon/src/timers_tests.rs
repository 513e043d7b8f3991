// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn name(s: &str) -> UnitName {
    UnitName::new(s).unwrap()
}

#[test]
fn zero_timeout_never_registers() {
    let mut timers = Timers::new();
    let key = timers.arm(Instant::now(), 0, name("a"), TimerKind::StartingTimeout);
    assert_eq!(key, None);
    assert!(timers.is_empty());
    assert_eq!(timers.next_deadline(), None);
}

#[test]
fn fires_in_deadline_order() {
    let mut timers = Timers::new();
    let now = Instant::now();
    timers.arm(now, 30, name("late"), TimerKind::StoppingTimeout);
    timers.arm(now, 10, name("early"), TimerKind::StartingTimeout);

    let due = timers.run(now + Duration::from_secs(60));
    let order: Vec<&str> = due.iter().map(|t| t.unit.as_str()).collect();
    assert_eq!(order, ["early", "late"]);
    assert!(timers.is_empty());
}

#[test]
fn only_due_timers_fire() {
    let mut timers = Timers::new();
    let now = Instant::now();
    timers.arm(now, 10, name("a"), TimerKind::Sigkill);
    timers.arm(now, 60, name("b"), TimerKind::Sigkill);

    let due = timers.run(now + Duration::from_secs(10));
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].unit, name("a"));

    // The other is still armed.
    assert_eq!(timers.next_deadline(), Some(now + Duration::from_secs(60)));
}

#[test]
fn cancel_removes_entry() {
    let mut timers = Timers::new();
    let now = Instant::now();
    let key = timers.arm(now, 10, name("a"), TimerKind::StartingTimeout);
    timers.cancel(key);
    assert!(timers.run(now + Duration::from_secs(20)).is_empty());
}

#[test]
fn cancel_of_fired_key_is_harmless() {
    let mut timers = Timers::new();
    let now = Instant::now();
    let key = timers.arm(now, 1, name("a"), TimerKind::StartingTimeout);
    let due = timers.run(now + Duration::from_secs(2));
    assert_eq!(due.len(), 1);
    timers.cancel(key);
}

#[test]
fn identical_deadlines_keep_both_entries() {
    let mut timers = Timers::new();
    let now = Instant::now();
    timers.arm(now, 10, name("a"), TimerKind::Sigkill);
    timers.arm(now, 10, name("b"), TimerKind::Sigkill);
    assert_eq!(timers.run(now + Duration::from_secs(10)).len(), 2);
}

#[test]
fn due_timer_carries_its_key() {
    let mut timers = Timers::new();
    let now = Instant::now();
    let key = timers.arm(now, 5, name("a"), TimerKind::RespawnPrepare);
    let due = timers.run(now + Duration::from_secs(5));
    assert_eq!(Some(due[0].key), key);
}
