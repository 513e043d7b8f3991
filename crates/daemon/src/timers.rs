// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deadline-ordered timers.
//!
//! Timers live in an ordered multimap keyed by absolute monotonic deadline.
//! [`Timers::run`] fires everything due and reports the next deadline for
//! the event loop to sleep on. A timer armed with a zero timeout is the
//! "no timeout" case: no entry is registered and it never fires.
//!
//! The owning state variant keeps the [`TimerKey`]; a fired or cancelled
//! key never matches a live state again, which gives the same
//! tolerate-stale-callbacks behavior a weak reference would.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use warden_core::UnitName;

/// What a timer means to the unit that armed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// The starting command ran out of time.
    StartingTimeout,
    /// The stopping command ran out of time.
    StoppingTimeout,
    /// SIGTERM was sent and the group is still populated; escalate.
    Sigkill,
    /// A respawn is waiting for the group to drain; escalate.
    RespawnPrepare,
}

/// Identity of one armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimerKey {
    deadline: Instant,
    seq: u64,
}

/// A due timer, handed back to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueTimer {
    pub key: TimerKey,
    pub unit: UnitName,
    pub kind: TimerKind,
}

#[derive(Debug, Clone)]
struct Entry {
    unit: UnitName,
    kind: TimerKind,
}

/// The timer table.
#[derive(Debug, Default)]
pub struct Timers {
    entries: BTreeMap<TimerKey, Entry>,
    seq: u64,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer `timeout_secs` from `now`. Zero means no timeout.
    pub fn arm(
        &mut self,
        now: Instant,
        timeout_secs: u32,
        unit: UnitName,
        kind: TimerKind,
    ) -> Option<TimerKey> {
        if timeout_secs == 0 {
            return None;
        }
        self.seq += 1;
        let key = TimerKey {
            deadline: now + Duration::from_secs(u64::from(timeout_secs)),
            seq: self.seq,
        };
        self.entries.insert(key, Entry { unit, kind });
        Some(key)
    }

    /// Cancel an armed timer. Harmless if it already fired.
    pub fn cancel(&mut self, key: Option<TimerKey>) {
        if let Some(key) = key {
            self.entries.remove(&key);
        }
    }

    /// Remove and return every timer with a deadline at or before `now`.
    pub fn run(&mut self, now: Instant) -> Vec<DueTimer> {
        let mut due = Vec::new();
        while let Some((&key, _)) = self.entries.first_key_value() {
            if key.deadline > now {
                break;
            }
            if let Some(entry) = self.entries.remove(&key) {
                due.push(DueTimer {
                    key,
                    unit: entry.unit,
                    kind: entry.kind,
                });
            }
        }
        due
    }

    /// The next deadline, if any timer is armed.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.first_key_value().map(|(key, _)| key.deadline)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "timers_tests.rs"]
mod tests;
