// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runlevel switching and the status/getrunlevel queries.
//!
//! A runlevel is a synthesised unit named `system/runlevel <name>`; units
//! join one by declaring `required-by: /system/<name>`. Switching marks
//! the target runlevel started, sweeps `stop_type = target` members of the
//! outgoing runlevel that the incoming one does not also require, pulls
//! the target's members up, and notifies the requester once nothing is
//! transitional any more.

use super::state::{Started, UnitState};
use super::{Engine, Outcome, PendingSwitch, RequestReply, RequesterKind};
use crate::platform::Platform;
use std::collections::BTreeSet;
use tracing::info;
use warden_core::{Clock, StopType, UnitName, UnitType};
use warden_wire::StatusEntry;

impl<P: Platform, C: Clock> Engine<P, C> {
    pub(super) fn set_runlevel_op(&mut self, request: &str, reply: RequestReply) {
        let resolved = self
            .runlevels
            .resolve(request)
            .map(|(primary, via_override)| (primary.to_string(), via_override));
        let Some((primary, via_override)) = resolved else {
            reply.reject(format!("{request}: unknown runlevel"));
            return;
        };
        if via_override {
            self.override_consumed = true;
            self.runlevels.remove_override();
        }

        let target = UnitName::runlevel(&primary);
        if !self.units.contains_key(&target) {
            reply.reject(format!("{request}: unknown runlevel"));
            return;
        }
        if self.active_runlevel.as_deref() == Some(primary.as_str()) {
            reply.accept_and_finish(RequesterKind::Stop, Outcome::Stopped);
            return;
        }
        let requester = reply.accept(RequesterKind::Stop);

        // Phase commands run during the transition see both runlevels.
        let prev_code = self
            .active_runlevel
            .as_ref()
            .map(|p| self.runlevels.code(p).to_string())
            .unwrap_or_default();
        let new_code = self.runlevels.code(&primary).to_string();
        self.runlevel_env = (prev_code, new_code);

        info!("Starting {target}");

        // Everything the incoming runlevel requires stays (or comes) up.
        let keep: BTreeSet<UnitName> = self
            .units
            .get(&target)
            .map(|unit| {
                let mut keep = unit.deps.all_requires.clone();
                keep.insert(target.clone());
                keep
            })
            .unwrap_or_default();

        if let Some(prev) = self.active_runlevel.clone() {
            let prev_unit = UnitName::runlevel(&prev);
            let members: Vec<UnitName> = self
                .units
                .get(&prev_unit)
                .map(|unit| unit.deps.all_requires.iter().cloned().collect())
                .unwrap_or_default();
            for member in members {
                let Some(unit) = self.units.get_mut(&member) else {
                    continue;
                };
                if keep.contains(&member) {
                    continue;
                }
                // Predecessor runlevels the new target does not build on
                // are no longer reached.
                if unit.spec.unit_type == UnitType::Runlevel {
                    unit.state = UnitState::Stopped;
                    continue;
                }
                let sweep = unit.is_loaded()
                    && unit.spec.stop_type == StopType::Target
                    && (unit.state.is_started() || unit.state.is_starting());
                if sweep {
                    self.stop_for_teardown(&member);
                }
            }
            if !keep.contains(&prev_unit) {
                if let Some(unit) = self.units.get_mut(&prev_unit) {
                    unit.state = UnitState::Stopped;
                }
            }
        }

        // The target and any predecessor runlevels it requires are up by
        // definition; they carry no processes of their own.
        let runlevel_units: Vec<UnitName> = std::iter::once(target.clone())
            .chain(keep.iter().cloned())
            .filter(|name| {
                self.units
                    .get(name)
                    .is_some_and(|u| u.spec.unit_type == UnitType::Runlevel)
            })
            .collect();
        for name in runlevel_units {
            if let Some(unit) = self.units.get_mut(&name) {
                if !unit.state.is_started() {
                    unit.state = UnitState::Started(Started::new(true, self.epoch));
                }
            }
        }

        // Pull stopped members of the incoming runlevel.
        for member in keep.iter().cloned().collect::<Vec<_>>() {
            let pull = self
                .units
                .get(&member)
                .is_some_and(|unit| unit.is_loaded() && unit.state.is_stopped());
            if pull {
                self.begin_starting(&member, true, Vec::new());
            }
        }

        self.active_runlevel = Some(primary);
        self.pending_switch = Some(PendingSwitch {
            requester: Some(requester),
        });
        self.find_start_or_stop_to_do();
    }

    /// One line per name: the active runlevel unit.
    pub(super) fn get_runlevel_op(&mut self, reply: RequestReply) {
        let lines: Vec<String> = self
            .active_runlevel
            .iter()
            .map(|primary| UnitName::runlevel(primary).to_string())
            .collect();
        reply.accept_with_lines(lines);
    }

    /// Terse status of every installed unit, in table order.
    pub(super) fn status_op(&mut self, reply: RequestReply) {
        let lines: Vec<String> = self
            .units
            .iter()
            .map(|(name, unit)| {
                StatusEntry {
                    name: name.to_string(),
                    state: unit.state.label().to_string(),
                    enabled: unit.spec.enabled,
                }
                .to_line()
            })
            .collect();
        reply.accept_with_lines(lines);
    }
}
