// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit lifecycle operations: user start/stop, restart/reload, freeze,
//! runner completion, populated edges, timers, and the respawn policy.

use super::state::{Runner, Started, Starting, Stopping, StoppingPhase, UnitState};
use super::{Engine, Group, Outcome, ReexecPayload, ReexecRecord, RequestReply, Requester};
use super::{RequesterKind, SIGTERM_TIMEOUT};
use crate::platform::Platform;
use crate::runner::describe_wait_status;
use crate::timers::{DueTimer, TimerKind};
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use tracing::{info, warn};
use warden_core::{Clock, SigtermNotify, StartType, StopType, UnitName};

/// Which of the two maintenance commands to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Which {
    Restart,
    Reload,
}

impl<P: Platform, C: Clock> Engine<P, C> {
    // ---- user start -----------------------------------------------------

    pub(super) fn start_op(&mut self, name: &str, reply: RequestReply) {
        let Some(unit) = self.units.get(name) else {
            reply.reject(format!("{name}: unknown unit"));
            return;
        };
        if !unit.is_loaded() {
            reply.reject(format!("{name}: unknown unit"));
            return;
        }
        let unit_name = unit.spec.name.clone();
        if !unit.state.is_stopped() {
            reply.reject(format!("{name}: cannot start because it's not stopped"));
            return;
        }

        // Alternative groups: starting one member first stops the others.
        if let Some(group) = unit.spec.alternative_group.clone() {
            let others: Vec<UnitName> = self
                .units
                .iter()
                .filter(|(other, u)| {
                    u.spec.alternative_group.as_deref() == Some(group.as_str())
                        && **other != unit_name
                        && !u.state.is_stopped()
                })
                .map(|(other, _)| other.clone())
                .collect();
            if !others.is_empty() {
                let requester = reply.accept(RequesterKind::Start);
                for other in others {
                    self.stop_for_teardown(&other);
                }
                self.alternates.insert(
                    group,
                    super::AlternateSwitch {
                        upcoming: unit_name,
                        requester: Some(requester),
                    },
                );
                self.find_start_or_stop_to_do();
                return;
            }
        }

        let requester = reply.accept(RequesterKind::Start);
        self.begin_starting(&unit_name, false, vec![requester]);
        self.find_start_or_stop_to_do();
    }

    /// Move a stopped unit into the starting state, allocate its group,
    /// and pull every stopped requirement along as a dependency start.
    pub(super) fn begin_starting(
        &mut self,
        name: &UnitName,
        dependency: bool,
        requesters: Vec<Requester>,
    ) {
        self.enter_starting(name, dependency, requesters);

        let requires = match self.units.get(name) {
            Some(unit) => unit.deps.all_requires.clone(),
            None => return,
        };
        for dep in requires {
            let pull = self
                .units
                .get(&dep)
                .is_some_and(|u| u.is_loaded() && u.state.is_stopped());
            if pull {
                self.enter_starting(&dep, true, Vec::new());
            }
        }
    }

    /// The actual Stopped -> Starting transition for one unit.
    fn enter_starting(&mut self, name: &UnitName, dependency: bool, requesters: Vec<Requester>) {
        self.replace_state(
            name,
            UnitState::Starting(Starting {
                dependency,
                requesters,
                ..Starting::default()
            }),
        );
        self.log_state(name);

        match self.platform.create_group(name) {
            Ok(id) => {
                if let Some(unit) = self.units.get_mut(name) {
                    unit.group = Some(Group {
                        id,
                        populated: false,
                    });
                }
                info!("{name}: cgroup created");
            }
            Err(err) => {
                warn!("{name}: {err}");
                self.do_remove(name);
            }
        }
    }

    // ---- user stop ------------------------------------------------------

    pub(super) fn stop_op(&mut self, name: &str, reply: RequestReply) {
        let Some(unit) = self.units.get(name) else {
            reply.reject(format!("{name}: unknown unit"));
            return;
        };
        if !unit.is_loaded() {
            reply.reject(format!("{name}: unknown unit"));
            return;
        }
        let unit_name = unit.spec.name.clone();

        match &unit.state {
            UnitState::Stopped => {
                reply.reject(format!("{name}: cannot stop because it's not started"));
                return;
            }
            UnitState::Stopping(_) => {
                reply.reject(format!("{name}: is already stopping"));
                return;
            }
            UnitState::Starting(_) | UnitState::Started(_) => {}
        }

        let requester = reply.accept(RequesterKind::Stop);

        // Everything that requires this unit has to come down first.
        let dependents = match self.units.get(&unit_name) {
            Some(unit) => unit.deps.all_required_by.clone(),
            None => return,
        };
        for dependent in dependents {
            let needs_stop = self
                .units
                .get(&dependent)
                .is_some_and(|u| u.is_loaded() && (u.state.is_started() || u.state.is_starting()));
            if needs_stop {
                self.stop_for_teardown(&dependent);
            }
        }

        match self.units.get(&unit_name).map(|u| &u.state) {
            Some(UnitState::Starting(_)) => {
                // Cancelling a start goes straight to removal.
                self.cancel_start_to_removal(&unit_name, Some(requester));
            }
            Some(UnitState::Started(_)) => {
                self.initiate_stopping(&unit_name, vec![requester]);
            }
            _ => {}
        }

        self.find_start_or_stop_to_do();
    }

    /// Starting -> Stopping(Removing), dropping the runner and timer; the
    /// orphaned child dies when the group is force-removed.
    fn cancel_start_to_removal(&mut self, name: &UnitName, extra: Option<Requester>) {
        let old = self.replace_state(
            name,
            UnitState::Stopping(Stopping {
                phase: StoppingPhase::Pending,
                requesters: Vec::new(),
            }),
        );
        let mut requesters = match old {
            UnitState::Starting(s) => s.requesters,
            _ => Vec::new(),
        };
        requesters.extend(extra);
        if let Some(UnitState::Stopping(stopping)) =
            self.units.get_mut(name).map(|u| &mut u.state)
        {
            stopping.requesters = requesters;
        }
        self.do_remove(name);
    }

    /// Teardown entry used for dependency stops, alternate switches, and
    /// configuration removals; no requester involved.
    pub(super) fn stop_for_teardown(&mut self, name: &UnitName) {
        match self.units.get(name).map(|u| &u.state) {
            Some(UnitState::Started(_)) => self.initiate_stopping(name, Vec::new()),
            Some(UnitState::Starting(_)) => self.cancel_start_to_removal(name, None),
            _ => {}
        }
    }

    /// Started -> Stopping(Pending); the scheduler decides when the
    /// stopping command may actually run.
    fn initiate_stopping(&mut self, name: &UnitName, requesters: Vec<Requester>) {
        self.replace_state(
            name,
            UnitState::Stopping(Stopping {
                phase: StoppingPhase::Pending,
                requesters,
            }),
        );
        self.log_state(name);
    }

    /// Stop a started unit without an operator request (populated edge on
    /// an automatic unit, runlevel sweep).
    pub(super) fn internal_stop(&mut self, name: &UnitName) {
        if self.units.get(name).is_some_and(|u| u.state.is_started()) {
            self.initiate_stopping(name, Vec::new());
        }
    }

    // ---- scheduler-fired actions ---------------------------------------

    /// A starting unit was picked by the scheduler: run its starting
    /// command, or declare it started if it has none.
    pub(super) fn do_start_runner(&mut self, name: &UnitName) {
        let Some(unit) = self.units.get(name) else {
            return;
        };
        let start_type = unit.spec.start_type;
        let timeout = unit.spec.starting_timeout;
        let Some(command) = unit.spec.starting_command.clone() else {
            self.mark_started(name);
            return;
        };
        let Some(group_id) = unit.group.as_ref().map(|g| g.id) else {
            self.do_remove(name);
            return;
        };

        let env = self.spawn_env();
        match self.platform.spawn(group_id, &command, &env) {
            Err(err) => {
                warn!("{name}: {err}");
                self.do_remove(name);
            }
            Ok(pid) => {
                self.pid_table.insert(pid, name.clone());
                self.synthesise_populated(name);
                if start_type == StartType::Respawn {
                    // The command is the supervised process itself; the
                    // unit is up as soon as the fork lands.
                    self.mark_started(name);
                    if let Some(UnitState::Started(st)) =
                        self.units.get_mut(name).map(|u| &mut u.state)
                    {
                        st.respawn_runner = Some(Runner { pid });
                        st.respawn_counter = 1;
                    }
                } else if let Some(UnitState::Starting(s)) =
                    self.units.get_mut(name).map(|u| &mut u.state)
                {
                    s.runner = Some(Runner { pid });
                    s.timeout =
                        self.timers
                            .arm(self.now, timeout, name.clone(), TimerKind::StartingTimeout);
                    self.log_state(name);
                }
            }
        }
    }

    /// The parent adds the first process, so the first populated edge is
    /// synthesised here rather than waited for from the kernel.
    fn synthesise_populated(&mut self, name: &UnitName) {
        if let Some(group) = self.units.get_mut(name).and_then(|u| u.group.as_mut()) {
            group.populated = true;
        }
    }

    /// Starting -> Started.
    fn mark_started(&mut self, name: &UnitName) {
        let old = self.replace_state(name, UnitState::Stopped);
        let (dependency, delayed, requesters) = match old {
            UnitState::Starting(mut s) => (
                s.dependency,
                s.delayed_depopulation,
                std::mem::take(&mut s.requesters),
            ),
            other => {
                // Not actually starting; put it back untouched.
                if let Some(unit) = self.units.get_mut(name) {
                    unit.state = other;
                }
                return;
            }
        };
        if let Some(unit) = self.units.get_mut(name) {
            unit.state = UnitState::Started(Started::new(dependency, self.epoch));
        }
        self.log_state(name);
        for requester in requesters {
            requester.finish(Outcome::Started);
        }
        if delayed {
            // The group drained while the starting command was running.
            self.started_group_drained(name);
        }
    }

    /// A stopping unit was picked by the scheduler: run its stopping
    /// command, or go straight to removal.
    pub(super) fn do_stop_or_terminate(&mut self, name: &UnitName) {
        let Some(unit) = self.units.get(name) else {
            return;
        };
        let timeout = unit.spec.stopping_timeout;
        let Some(command) = unit.spec.stopping_command.clone() else {
            self.do_remove(name);
            return;
        };
        let Some(group_id) = unit.group.as_ref().map(|g| g.id) else {
            self.do_remove(name);
            return;
        };

        let env = self.spawn_env();
        match self.platform.spawn(group_id, &command, &env) {
            Err(err) => {
                warn!("{name}: {err}");
                self.do_remove(name);
            }
            Ok(pid) => {
                self.pid_table.insert(pid, name.clone());
                if let Some(UnitState::Stopping(stopping)) =
                    self.units.get_mut(name).map(|u| &mut u.state)
                {
                    stopping.phase = StoppingPhase::Running {
                        runner: Runner { pid },
                        timeout: self.timers.arm(
                            self.now,
                            timeout,
                            name.clone(),
                            TimerKind::StoppingTimeout,
                        ),
                    };
                    self.log_state(name);
                }
            }
        }
    }

    /// Enter the removing phase: SIGTERM the group, arm the SIGKILL
    /// escalation, and finish immediately if the group is already empty.
    pub(super) fn do_remove(&mut self, name: &UnitName) {
        let old = self.replace_state(name, UnitState::Stopped);
        let requesters = match old {
            UnitState::Starting(mut s) => std::mem::take(&mut s.requesters),
            UnitState::Stopping(mut s) => std::mem::take(&mut s.requesters),
            _ => Vec::new(),
        };
        let sigkill_timer =
            self.timers
                .arm(self.now, SIGTERM_TIMEOUT, name.clone(), TimerKind::Sigkill);
        if let Some(unit) = self.units.get_mut(name) {
            unit.state = UnitState::Stopping(Stopping {
                phase: StoppingPhase::Removing {
                    sigkill_timer,
                    sigkill_sent: false,
                },
                requesters,
            });
        }
        self.log_state(name);

        let (group_id, populated, notify) = match self.units.get(name) {
            Some(unit) => (
                unit.group.as_ref().map(|g| g.id),
                unit.group.as_ref().map(|g| g.populated).unwrap_or(false),
                unit.spec.sigterm_notify,
            ),
            None => return,
        };
        if let Some(id) = group_id {
            info!("{name}: sending SIGTERM");
            self.platform.sendsig(id, Signal::SIGTERM, notify);
        }
        if !populated {
            self.stopped_unit(name);
        }
    }

    /// The group is confirmed empty: Stopping(Removing) -> Stopped.
    pub(super) fn stopped_unit(&mut self, name: &UnitName) {
        let old = self.replace_state(name, UnitState::Stopped);
        let requesters = match old {
            UnitState::Stopping(mut s) => std::mem::take(&mut s.requesters),
            _ => Vec::new(),
        };
        if let Some(unit) = self.units.get_mut(name) {
            if let Some(group) = unit.group.take() {
                self.platform.remove_group(group.id);
                info!("{name}: cgroup removed");
            }
        }
        self.log_state(name);
        for requester in requesters {
            requester.finish(Outcome::Stopped);
        }
        if self.units.get(name).is_some_and(|u| u.autoremove) {
            self.units.shift_remove(name);
        }
    }

    // ---- respawn policy -------------------------------------------------

    /// The supervised process of a respawn unit exited: drain the group,
    /// then fork again, subject to the attempts/window budget.
    fn prepare_respawn(&mut self, name: &UnitName) {
        let Some(unit) = self.units.get_mut(name) else {
            return;
        };
        let notify = unit.spec.sigterm_notify;
        let (group_id, populated) = match &unit.group {
            Some(group) => (Some(group.id), group.populated),
            None => (None, false),
        };
        let UnitState::Started(st) = &mut unit.state else {
            return;
        };
        st.respawn_runner = None;
        st.respawn_pending = true;
        st.respawn_prepare_timer =
            self.timers
                .arm(self.now, SIGTERM_TIMEOUT, name.clone(), TimerKind::RespawnPrepare);
        self.log_state(name);

        if let Some(id) = group_id {
            self.platform.sendsig(id, Signal::SIGTERM, notify);
        }
        if !populated {
            self.respawn(name);
        }
    }

    /// The group is empty; fork the supervised process again.
    fn respawn(&mut self, name: &UnitName) {
        let Some(unit) = self.units.get_mut(name) else {
            return;
        };
        let attempts = unit.spec.respawn_attempts;
        let window = u64::from(unit.spec.respawn_window);
        let command = unit.spec.starting_command.clone();
        let group_id = unit.group.as_ref().map(|g| g.id);

        let UnitState::Started(st) = &mut unit.state else {
            return;
        };
        let prepare_timer = st.respawn_prepare_timer.take();
        self.timers.cancel(prepare_timer);

        if self.epoch > st.respawn_window_start + window {
            st.respawn_window_start = self.epoch;
            st.respawn_counter = 0;
        }
        if st.respawn_counter >= attempts {
            warn!("{name}: respawning too quickly, giving up");
            self.do_remove(name);
            return;
        }

        let (Some(command), Some(group_id)) = (command, group_id) else {
            self.do_remove(name);
            return;
        };
        let env = self.spawn_env();
        match self.platform.spawn(group_id, &command, &env) {
            Err(err) => {
                warn!("{name}: {err}");
                self.do_remove(name);
            }
            Ok(pid) => {
                self.pid_table.insert(pid, name.clone());
                if let Some(unit) = self.units.get_mut(name) {
                    if let Some(group) = unit.group.as_mut() {
                        group.populated = true;
                    }
                    if let UnitState::Started(st) = &mut unit.state {
                        st.respawn_runner = Some(Runner { pid });
                        st.respawn_counter += 1;
                        st.respawn_pending = false;
                    }
                }
                self.log_state(name);
            }
        }
    }

    // ---- restart / reload ----------------------------------------------

    pub(super) fn reload_or_restart_op(&mut self, name: &str, reply: RequestReply, which: Which) {
        let Some(unit) = self.units.get(name) else {
            reply.reject(format!("{name}: unknown unit"));
            return;
        };
        if !unit.is_loaded() {
            reply.reject(format!("{name}: unknown unit"));
            return;
        }
        let unit_name = unit.spec.name.clone();
        let command = match which {
            Which::Restart => unit.spec.restarting_command.clone(),
            Which::Reload => unit.spec.reloading_command.clone(),
        };

        let UnitState::Started(st) = &unit.state else {
            reply.reject(format!("{name}: is not currently started"));
            return;
        };
        if st.reload_runner.is_some() {
            reply.reject(format!(
                "{name}: is already in the middle of another reload or restart"
            ));
            return;
        }
        let Some(command) = command else {
            let what = match which {
                Which::Restart => "restart",
                Which::Reload => "reload",
            };
            reply.reject(format!("{name}: does not define a {what} command"));
            return;
        };
        let Some(group_id) = unit.group.as_ref().map(|g| g.id) else {
            reply.reject(format!("{name}: is not currently started"));
            return;
        };

        let env = self.spawn_env();
        match self.platform.spawn(group_id, &command, &env) {
            Err(err) => reply.reject(format!("{name}: {err}")),
            Ok(pid) => {
                self.pid_table.insert(pid, unit_name.clone());
                if let Some(UnitState::Started(st)) =
                    self.units.get_mut(&unit_name).map(|u| &mut u.state)
                {
                    st.reload_runner = Some(Runner { pid });
                    st.reload_requester = Some(reply.accept(RequesterKind::Command));
                }
            }
        }
    }

    // ---- freeze / thaw --------------------------------------------------

    pub(super) fn freeze_op(&mut self, name: &str, reply: RequestReply, frozen: bool) {
        let Some(unit) = self.units.get(name) else {
            reply.reject(format!("{name}: unknown unit"));
            return;
        };
        if !unit.is_loaded() {
            reply.reject(format!("{name}: unknown unit"));
            return;
        }
        let Some(group_id) = unit.group.as_ref().map(|g| g.id) else {
            reply.reject(format!("{name}: is not currently started"));
            return;
        };
        match self.platform.freeze(group_id, frozen) {
            Ok(()) => reply.accept_with_lines(Vec::new()),
            Err(err) => reply.reject(format!("{name}: {err}")),
        }
    }

    // ---- event entry points ---------------------------------------------

    /// A child was reaped. Route it by pid; anything that no longer maps
    /// to a live runner is dropped silently.
    pub(super) fn runner_finished(&mut self, pid: Pid, wstatus: i32) {
        let Some(name) = self.pid_table.remove(&pid) else {
            return;
        };
        let Some(unit) = self.units.get_mut(&name) else {
            return;
        };

        enum Action {
            StartingDone,
            ReloadDone(Option<Requester>),
            RespawnExited,
            StoppingDone,
            Stale,
        }

        let action = match &mut unit.state {
            UnitState::Starting(s) if s.runner.map(|r| r.pid) == Some(pid) => {
                s.runner = None;
                let timeout = s.timeout.take();
                self.timers.cancel(timeout);
                Action::StartingDone
            }
            UnitState::Started(st) if st.reload_runner.map(|r| r.pid) == Some(pid) => {
                st.reload_runner = None;
                Action::ReloadDone(st.reload_requester.take())
            }
            UnitState::Started(st) if st.respawn_runner.map(|r| r.pid) == Some(pid) => {
                Action::RespawnExited
            }
            UnitState::Stopping(s) => match &mut s.phase {
                StoppingPhase::Running { runner, timeout } if runner.pid == pid => {
                    let timeout = timeout.take();
                    self.timers.cancel(timeout);
                    Action::StoppingDone
                }
                _ => Action::Stale,
            },
            _ => Action::Stale,
        };

        match action {
            Action::StartingDone => {
                if wstatus == 0 {
                    self.mark_started(&name);
                } else {
                    warn!(
                        "{name}: starting command {}",
                        describe_wait_status(wstatus)
                    );
                    self.do_remove(&name);
                }
            }
            Action::ReloadDone(requester) => {
                if wstatus != 0 {
                    warn!("{name}: {}", describe_wait_status(wstatus));
                }
                if let Some(requester) = requester {
                    requester.finish(Outcome::ExitStatus(wstatus));
                }
            }
            Action::RespawnExited => self.prepare_respawn(&name),
            Action::StoppingDone => {
                if wstatus != 0 {
                    warn!(
                        "{name}: stopping command {}",
                        describe_wait_status(wstatus)
                    );
                }
                self.do_remove(&name);
            }
            Action::Stale => {}
        }

        self.find_start_or_stop_to_do();
    }

    /// The populated flag changed (or a change is being synthesised).
    pub(super) fn populated_event(&mut self, name: &UnitName, populated: bool) {
        let Some(unit) = self.units.get_mut(name) else {
            return;
        };
        let Some(group) = unit.group.as_mut() else {
            return;
        };
        if group.populated == populated {
            return;
        }
        group.populated = populated;
        if populated {
            return;
        }

        match &mut unit.state {
            UnitState::Starting(s) => {
                if s.runner.is_some() {
                    s.delayed_depopulation = true;
                }
            }
            UnitState::Started(_) => self.started_group_drained(name),
            UnitState::Stopping(s) => {
                if matches!(s.phase, StoppingPhase::Removing { .. }) {
                    self.stopped_unit(name);
                }
            }
            UnitState::Stopped => {}
        }
    }

    /// A started unit's group has no processes left; what happens next is
    /// the stop type's call (or the respawn policy's).
    fn started_group_drained(&mut self, name: &UnitName) {
        let Some(unit) = self.units.get(name) else {
            return;
        };
        let start_type = unit.spec.start_type;
        let stop_type = unit.spec.stop_type;
        let (pending, has_runner) = match &unit.state {
            UnitState::Started(st) => (st.respawn_pending, st.respawn_runner.is_some()),
            _ => return,
        };

        if start_type == StartType::Respawn {
            if pending {
                self.respawn(name);
            } else if !has_runner {
                self.prepare_respawn(name);
            }
            // A live respawn runner with a drained group resolves when its
            // exit is reaped.
            return;
        }

        match stop_type {
            StopType::Automatic => {
                self.internal_stop(name);
            }
            StopType::Manual | StopType::Target => {}
        }
    }

    /// A timer came due. The key must still match what the state holds;
    /// anything else is a cancelled timer's late echo.
    pub(super) fn timer_fired(&mut self, due: DueTimer) {
        let name = due.unit.clone();
        let Some(unit) = self.units.get_mut(&name) else {
            return;
        };

        match due.kind {
            TimerKind::StartingTimeout => {
                if let UnitState::Starting(s) = &mut unit.state {
                    if s.timeout == Some(due.key) {
                        s.timeout = None;
                        warn!("{name}: start process timed out");
                        self.do_remove(&name);
                    }
                }
            }
            TimerKind::StoppingTimeout => {
                if let UnitState::Stopping(s) = &mut unit.state {
                    if let StoppingPhase::Running { timeout, .. } = &mut s.phase {
                        if *timeout == Some(due.key) {
                            *timeout = None;
                            warn!("{name}: stop process timed out");
                            self.do_remove(&name);
                        }
                    }
                }
            }
            TimerKind::Sigkill => {
                let mut escalate = false;
                if let UnitState::Stopping(s) = &mut unit.state {
                    if let StoppingPhase::Removing {
                        sigkill_timer,
                        sigkill_sent,
                    } = &mut s.phase
                    {
                        if *sigkill_timer == Some(due.key) {
                            *sigkill_sent = true;
                            escalate = true;
                        }
                    }
                }
                if escalate {
                    self.send_sigkill(&name);
                }
            }
            TimerKind::RespawnPrepare => {
                let mut escalate = false;
                if let UnitState::Started(st) = &mut unit.state {
                    if st.respawn_prepare_timer == Some(due.key) && st.respawn_pending {
                        escalate = true;
                    }
                }
                if escalate {
                    self.kill_group(&name);
                    if let Some(UnitState::Started(st)) =
                        self.units.get_mut(&name).map(|u| &mut u.state)
                    {
                        st.respawn_prepare_timer = self.timers.arm(
                            self.now,
                            SIGTERM_TIMEOUT,
                            name.clone(),
                            TimerKind::RespawnPrepare,
                        );
                    }
                }
            }
        }
    }

    /// SIGKILL everything left and re-arm the escalation.
    fn send_sigkill(&mut self, name: &UnitName) {
        self.kill_group(name);
        let timer = self
            .timers
            .arm(self.now, SIGTERM_TIMEOUT, name.clone(), TimerKind::Sigkill);
        if let Some(UnitState::Stopping(s)) = self.units.get_mut(name).map(|u| &mut u.state) {
            if let StoppingPhase::Removing { sigkill_timer, .. } = &mut s.phase {
                *sigkill_timer = timer;
            }
        }
        self.log_state(name);
    }

    fn kill_group(&mut self, name: &UnitName) {
        if let Some(id) = self.units.get(name).and_then(|u| u.group.as_ref()).map(|g| g.id) {
            self.platform.sendsig(id, Signal::SIGKILL, SigtermNotify::All);
        }
    }

    /// A line of merged stdout/stderr from the unit's group: log it under
    /// the unit's name and carbon-copy it to waiting requesters.
    pub(super) fn unit_output(&mut self, name: &UnitName, line: &str) {
        info!("{name}: {line}");
        let Some(unit) = self.units.get(name) else {
            return;
        };
        for requester in unit.state.requesters() {
            requester.output(line);
        }
        if let UnitState::Started(st) = &unit.state {
            if let Some(requester) = &st.reload_requester {
                requester.output(line);
            }
        }
    }

    // ---- re-exec --------------------------------------------------------

    /// If a re-exec was requested and every unit is transferable, build
    /// the payload. The caller performs the exec.
    pub fn check_reexec(&mut self) -> Option<ReexecPayload> {
        if !self.reexec_requested {
            return None;
        }

        let transferable = self.units.values().all(|unit| match &unit.state {
            UnitState::Stopped => true,
            UnitState::Started(st) => st.reload_runner.is_none(),
            _ => false,
        }) && self.platform.watches_transferable();

        if !transferable {
            if !self.reexec_delay_logged {
                info!("re-exec delayed until units settle");
                self.reexec_delay_logged = true;
            }
            return None;
        }

        let mut records = Vec::new();
        let snapshot: Vec<(UnitName, bool)> = self
            .units
            .iter()
            .filter(|(_, u)| u.is_loaded())
            .map(|(name, unit)| (name.clone(), unit.state.is_started()))
            .collect();

        for (name, started) in snapshot {
            if !started {
                info!("{name}: preserving state: stopped");
                continue;
            }
            let Some(unit) = self.units.get(&name) else {
                continue;
            };
            let (start_time, dependency, respawn_pid) = match &unit.state {
                UnitState::Started(st) => (
                    st.start_time,
                    st.dependency,
                    st.respawn_runner.map(|r| r.pid.as_raw()),
                ),
                _ => continue,
            };
            let Some(group_id) = unit.group.as_ref().map(|g| g.id) else {
                continue;
            };
            match self.platform.prepare_transfer(group_id) {
                Err(err) => {
                    warn!("{name}: cannot prepare transfer: {err}");
                    return None;
                }
                Ok((pipe_r, pipe_w, events_fd)) => {
                    info!("{name}: container prepared to re-exec");
                    info!("{name}: preserving state: {}", unit.state.label());
                    records.push(ReexecRecord {
                        name: name.to_string(),
                        state: "started".to_string(),
                        start_time,
                        dependency,
                        pipe_r,
                        pipe_w,
                        events_fd,
                        respawn_pid,
                    });
                }
            }
        }

        self.reexec_requested = false;
        Some(ReexecPayload { records })
    }

    /// Consume the payload a previous incarnation left behind.
    pub(super) fn restore_from_payload(&mut self, payload: ReexecPayload) {
        for record in payload.records {
            let Ok(name) = UnitName::new(record.name.clone()) else {
                continue;
            };
            if !self.units.contains_key(&name) {
                info!("{name}: not in the current configuration, dropping preserved state");
                continue;
            }
            match self
                .platform
                .restore_group(&name, record.pipe_r, record.pipe_w, record.events_fd)
            {
                Err(err) => {
                    warn!("{name}: cannot restore after re-exec: {err}");
                }
                Ok(group_id) => {
                    let populated = self.platform.read_populated(group_id);
                    let Some(unit) = self.units.get_mut(&name) else {
                        continue;
                    };
                    let expect_populated = record.state == "started";
                    unit.group = Some(Group {
                        id: group_id,
                        populated: expect_populated,
                    });
                    if record.state == "started" {
                        let mut started = Started::new(record.dependency, record.start_time);
                        if let Some(pid) = record.respawn_pid {
                            let pid = Pid::from_raw(pid);
                            started.respawn_runner = Some(Runner { pid });
                            started.respawn_counter = 1;
                            self.pid_table.insert(pid, name.clone());
                        }
                        unit.state = UnitState::Started(started);
                    }
                    info!("{name}: restored after re-exec");
                    info!(
                        "{name}: restored preserved state: {}",
                        self.units
                            .get(&name)
                            .map(|u| u.state.label().to_string())
                            .unwrap_or_default()
                    );
                    // Recover the real populated flag; a group that drained
                    // while no supervisor was watching gets its edge now.
                    self.populated_event(&name, populated);
                }
            }
        }
    }
}
