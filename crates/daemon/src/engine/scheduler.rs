// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The dependency-ordered scheduler.
//!
//! [`Engine::find_start_or_stop_to_do`] runs after every external event.
//! Each sweep gathers the transitional units that are related through the
//! dependency closures, then fires every unit whose ordering constraints
//! are met, repeating until nothing further can act. A related set where
//! nothing is ready and nothing is running is a circular dependency; the
//! lexicographically first blocked unit is force-fired to break it.

use super::state::{StoppingPhase, UnitState};
use super::{Engine, Outcome};
use crate::platform::Platform;
use std::collections::BTreeSet;
use tracing::{error, info};
use warden_core::{Clock, UnitName};

/// Which direction a sweep drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sweep {
    Start,
    Stop,
}

/// Three-valued qualification for one unit within a sweep.
///
/// `Na`: not this sweep's business (already acted on, or in some other
/// state). `Yes`: eligible but already running its phase command, which
/// counts as progress happening elsewhere. `No`: eligible and not yet
/// running; may fire if its ordering constraints allow.
enum Qualification {
    Na,
    Yes,
    No,
}

impl<P: Platform, C: Clock> Engine<P, C> {
    /// Drive everything that can make progress right now.
    pub(super) fn find_start_or_stop_to_do(&mut self) {
        loop {
            let mut did_something = true;
            while did_something {
                did_something = self.sweep_once();
            }
            if !self.run_pending_alternates() {
                break;
            }
        }
        self.settle_switch();
    }

    /// One pass over the unit table, in insertion order.
    fn sweep_once(&mut self) -> bool {
        let mut did_something = false;
        let mut processed: BTreeSet<UnitName> = BTreeSet::new();
        let names: Vec<UnitName> = self.units.keys().cloned().collect();

        for name in names {
            if processed.contains(&name) {
                continue;
            }
            let Some(unit) = self.units.get(&name) else {
                continue;
            };
            if !unit.is_loaded() {
                continue;
            }
            let sweep = match &unit.state {
                UnitState::Starting(_) => Sweep::Start,
                UnitState::Stopping(s) if matches!(s.phase, StoppingPhase::Pending) => {
                    Sweep::Stop
                }
                _ => continue,
            };
            let related = self.collect_related(&name, sweep);
            processed.extend(related.iter().cloned());
            if self.do_dependencies(&related, sweep) {
                did_something = true;
            }
        }
        did_something
    }

    /// Whether `name` is a loaded unit in the sweep's transitional state.
    fn compatible(&self, name: &UnitName, sweep: Sweep) -> bool {
        self.units.get(name).is_some_and(|unit| {
            unit.is_loaded()
                && match sweep {
                    Sweep::Start => unit.state.is_starting(),
                    Sweep::Stop => unit.state.is_stopping(),
                }
        })
    }

    /// The transitive set of compatibly-transitional units reachable from
    /// `origin` through any of the four closures. Sorted, so tie-breaks,
    /// including the cycle break, are by name.
    fn collect_related(&self, origin: &UnitName, sweep: Sweep) -> Vec<UnitName> {
        let mut related = BTreeSet::new();
        related.insert(origin.clone());
        let mut queue = vec![origin.clone()];
        while let Some(name) = queue.pop() {
            let Some(unit) = self.units.get(&name) else {
                continue;
            };
            let deps = &unit.deps;
            for set in [
                &deps.all_requires,
                &deps.all_required_by,
                &deps.all_starting_first,
                &deps.all_stopping_first,
            ] {
                for other in set.iter() {
                    if !related.contains(other) && self.compatible(other, sweep) {
                        related.insert(other.clone());
                        queue.push(other.clone());
                    }
                }
            }
        }
        related.into_iter().collect()
    }

    fn qualify(&self, name: &UnitName, sweep: Sweep) -> Qualification {
        let Some(unit) = self.units.get(name) else {
            return Qualification::Na;
        };
        match (sweep, &unit.state) {
            (Sweep::Start, UnitState::Starting(s)) => {
                if s.runner.is_some() {
                    Qualification::Yes
                } else {
                    Qualification::No
                }
            }
            (Sweep::Stop, UnitState::Stopping(s)) => match s.phase {
                StoppingPhase::Pending => Qualification::No,
                _ => Qualification::Yes,
            },
            _ => Qualification::Na,
        }
    }

    /// Whether ordering constraints still block this unit.
    fn not_ready(&self, name: &UnitName, sweep: Sweep) -> bool {
        let Some(unit) = self.units.get(name) else {
            return false;
        };
        match sweep {
            Sweep::Start => unit
                .deps
                .all_starting_first
                .iter()
                .any(|dep| self.compatible(dep, Sweep::Start)),
            Sweep::Stop => unit
                .deps
                .all_stopping_first
                .iter()
                .any(|dep| self.compatible(dep, Sweep::Stop)),
        }
    }

    /// The shared fire loop for one related set.
    fn do_dependencies(&mut self, related: &[UnitName], sweep: Sweep) -> bool {
        let mut did_something = false;
        let mut keepgoing = true;
        let mut circular = false;

        while keepgoing {
            keepgoing = false;
            let mut found_ready = false;
            let mut found_runner = false;

            for name in related {
                match self.qualify(name, sweep) {
                    Qualification::Na => continue,
                    Qualification::Yes => {
                        found_ready = true;
                        found_runner = true;
                        continue;
                    }
                    Qualification::No => {
                        found_ready = true;
                    }
                }

                let mut is_not_ready = self.not_ready(name, sweep);

                // A pass already concluded this set is deadlocked; break
                // the circle on the first blocked unit, by name.
                if circular {
                    is_not_ready = false;
                    error!("{name}: detected a circular dependency requirement");
                    circular = false;
                }

                if is_not_ready {
                    continue;
                }

                keepgoing = true;
                did_something = true;
                match sweep {
                    Sweep::Start => self.do_start_runner(name),
                    Sweep::Stop => self.do_stop_or_terminate(name),
                }
            }

            if !found_ready {
                break;
            }
            // Nothing fired and nothing is running: a completion event
            // will never arrive, so this is a circular dependency.
            if !keepgoing && !found_runner {
                circular = true;
                keepgoing = true;
            }
        }

        did_something
    }

    /// Start the upcoming member of any alternative group whose other
    /// members have all reached the stopped state.
    fn run_pending_alternates(&mut self) -> bool {
        let ready: Vec<String> = self
            .alternates
            .iter()
            .filter(|(group, switch)| {
                self.units
                    .iter()
                    .filter(|(name, unit)| {
                        unit.spec.alternative_group.as_deref() == Some(group.as_str())
                            && **name != switch.upcoming
                    })
                    .all(|(_, unit)| unit.state.is_stopped())
            })
            .map(|(group, _)| group.clone())
            .collect();

        let mut acted = false;
        for group in ready {
            let Some(switch) = self.alternates.remove(&group) else {
                continue;
            };
            if !self
                .units
                .get(&switch.upcoming)
                .is_some_and(|u| u.state.is_stopped())
            {
                continue;
            }
            let requesters = switch.requester.into_iter().collect();
            self.begin_starting(&switch.upcoming, false, requesters);
            acted = true;
        }
        acted
    }

    /// A runlevel switch completes when every loaded unit has come to rest
    /// in a terminal state (started or stopped); a member mid-start,
    /// mid-stop, or mid-respawn keeps the requester waiting.
    fn settle_switch(&mut self) {
        if self.pending_switch.is_none() {
            return;
        }
        let busy = self
            .units
            .values()
            .any(|unit| unit.is_loaded() && !unit.state.label().is_terminal());
        if busy {
            return;
        }
        if let Some(switch) = self.pending_switch.take() {
            if let Some(requester) = switch.requester {
                requester.finish(Outcome::Stopped);
            }
            info!("runlevel switch complete");
        }
    }
}
