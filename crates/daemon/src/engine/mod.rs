// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The container state engine.
//!
//! One [`Engine`] owns every piece of mutable supervision state: the unit
//! table with its closed dependency information, per-unit states, process
//! groups, the pid routing table, and the timer table. It runs entirely on
//! one task; everything enters through intents (control socket) or
//! platform events (child exits, populated edges, output), and every entry
//! point finishes by asking the scheduler whether anything can act now.

mod control;
pub mod reexec;
mod requester;
mod runlevel;
mod scheduler;
mod state;

pub use requester::{Outcome, Reply, RequestReply, Requester, RequesterKind};
pub use reexec::{ReexecPayload, ReexecRecord, REEXEC_FD};

use crate::platform::{GroupId, Platform, PlatformEvent};
use crate::timers::Timers;
use crate::watches::WatchEvent;
use indexmap::IndexMap;
use nix::unistd::Pid;
use state::UnitState;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::info;
use warden_core::{
    compute_dependencies, diff_dependencies, Clock, DependencyInfo, Runlevels, StateLabel,
    UnitName, UnitSpec, UnitType,
};

/// Seconds between SIGTERM and the SIGKILL escalation.
pub const SIGTERM_TIMEOUT: u32 = 10;

/// A unit's process group handle plus the engine's populated mirror.
#[derive(Debug)]
struct Group {
    id: GroupId,
    populated: bool,
}

/// One installed unit.
struct Unit {
    spec: UnitSpec,
    deps: DependencyInfo,
    state: UnitState,
    group: Option<Group>,
    /// Dropped from the configuration; remove from the table once stopped.
    autoremove: bool,
}

impl Unit {
    fn is_loaded(&self) -> bool {
        self.spec.unit_type == UnitType::Loaded
    }
}

/// How a new unit table is being installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMode {
    /// First install; may consume a re-exec payload.
    Initial,
    /// Configuration reload; running state moves across by name.
    Update,
}

/// A control-socket request, routed into the engine.
#[derive(Debug)]
pub enum Intent {
    Start { name: String, reply: RequestReply },
    Stop { name: String, reply: RequestReply },
    Restart { name: String, reply: RequestReply },
    Reload { name: String, reply: RequestReply },
    SetRunlevel { name: String, reply: RequestReply },
    GetRunlevel { reply: RequestReply },
    Status { reply: RequestReply },
    Freeze { name: String, reply: RequestReply },
    Thaw { name: String, reply: RequestReply },
    Reexec,
}

/// A runlevel switch whose requester waits for the dust to settle.
struct PendingSwitch {
    requester: Option<Requester>,
}

/// An alternative-group switch: the old members are stopping, `upcoming`
/// starts when the group is otherwise quiet.
struct AlternateSwitch {
    upcoming: UnitName,
    requester: Option<Requester>,
}

/// The supervisor core.
pub struct Engine<P: Platform, C: Clock> {
    platform: P,
    clock: C,
    units: IndexMap<UnitName, Unit>,
    runlevels: Runlevels,
    active_runlevel: Option<String>,
    /// `(PREVRUNLEVEL, RUNLEVEL)` codes exported to phase commands.
    runlevel_env: (String, String),
    pending_switch: Option<PendingSwitch>,
    alternates: HashMap<String, AlternateSwitch>,
    pid_table: HashMap<Pid, UnitName>,
    timers: Timers,
    /// Monotonic timestamp cached at the top of each wakeup.
    now: Instant,
    /// Epoch seconds cached alongside `now`.
    epoch: u64,
    reexec_requested: bool,
    reexec_delay_logged: bool,
    override_consumed: bool,
}

impl<P: Platform, C: Clock> Engine<P, C> {
    pub fn new(platform: P, clock: C, runlevels: Runlevels) -> Self {
        let now = clock.now();
        let epoch = clock.epoch_secs();
        Self {
            platform,
            clock,
            units: IndexMap::new(),
            runlevels,
            active_runlevel: None,
            runlevel_env: (String::new(), String::new()),
            pending_switch: None,
            alternates: HashMap::new(),
            pid_table: HashMap::new(),
            timers: Timers::new(),
            now,
            epoch,
            reexec_requested: false,
            reexec_delay_logged: false,
            override_consumed: false,
        }
    }

    /// Refresh the cached timestamps and fire any due timers.
    pub fn wakeup(&mut self) {
        self.refresh_clock();
        let due = self.timers.run(self.now);
        if due.is_empty() {
            return;
        }
        for timer in due {
            self.timer_fired(timer);
        }
        self.find_start_or_stop_to_do();
    }

    fn refresh_clock(&mut self) {
        self.now = self.clock.now();
        self.epoch = self.clock.epoch_secs();
    }

    /// When the event loop should wake up for the next timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Whether the one-shot `override` runlevel alias was consumed; the
    /// caller persists its removal from the runlevel configuration.
    pub fn take_override_consumed(&mut self) -> bool {
        std::mem::take(&mut self.override_consumed)
    }

    /// Install a new unit table.
    pub fn install(
        &mut self,
        loaded: Vec<UnitSpec>,
        mode: InstallMode,
        payload: Option<ReexecPayload>,
    ) {
        let mut specs: IndexMap<UnitName, UnitSpec> = IndexMap::new();
        for spec in loaded {
            specs.insert(spec.name.clone(), spec);
        }

        // Runlevels become synthesised units requiring their predecessors.
        for (name, runlevel) in self.runlevels.iter() {
            let spec = UnitSpec::runlevel(
                name,
                runlevel.requires.iter().map(|r| UnitName::runlevel(r)),
            );
            specs.entry(spec.name.clone()).or_insert(spec);
        }

        // Dangling dependency references materialise as synthesised units.
        let referenced: Vec<UnitName> = specs
            .values()
            .flat_map(|spec| spec.references().cloned().collect::<Vec<_>>())
            .collect();
        for name in referenced {
            if !specs.contains_key(&name) {
                specs.insert(name.clone(), UnitSpec::synthesised(name));
            }
        }

        let dep_info = compute_dependencies(&specs);

        if mode == InstallMode::Update {
            let old_info: BTreeMap<UnitName, DependencyInfo> = self
                .units
                .iter()
                .map(|(name, unit)| (name.clone(), unit.deps.clone()))
                .collect();
            for message in diff_dependencies(&old_info, &dep_info) {
                info!("{message}");
            }
            for (name, spec) in &specs {
                if let Some(old) = self.units.get(name) {
                    for message in old.spec.diff(spec) {
                        info!("{message}");
                    }
                }
            }
        }

        let new_units: IndexMap<UnitName, Unit> = specs
            .into_iter()
            .map(|(name, spec)| {
                let deps = dep_info.get(&name).cloned().unwrap_or_default();
                (
                    name,
                    Unit {
                        spec,
                        deps,
                        state: UnitState::Stopped,
                        group: None,
                        autoremove: false,
                    },
                )
            })
            .collect();

        let old_units = std::mem::replace(&mut self.units, new_units);
        let mut removed_live = Vec::new();
        for (name, old) in old_units {
            if let Some(unit) = self.units.get_mut(&name) {
                unit.state = old.state;
                unit.group = old.group;
            } else if !old.state.is_stopped() {
                info!("{name}: removed from configuration, stopping");
                let mut unit = old;
                unit.autoremove = true;
                self.units.insert(name.clone(), unit);
                removed_live.push(name);
            } else if let Some(group) = old.group {
                self.platform.remove_group(group.id);
            }
        }
        for name in removed_live {
            self.stop_for_teardown(&name);
        }

        if mode == InstallMode::Initial {
            if let Some(payload) = payload {
                self.restore_from_payload(payload);
            }
        }

        self.find_start_or_stop_to_do();
    }

    /// Route a control-socket request.
    pub fn handle_intent(&mut self, intent: Intent) {
        self.refresh_clock();
        match intent {
            Intent::Start { name, reply } => self.start_op(&name, reply),
            Intent::Stop { name, reply } => self.stop_op(&name, reply),
            Intent::Restart { name, reply } => {
                self.reload_or_restart_op(&name, reply, control::Which::Restart)
            }
            Intent::Reload { name, reply } => {
                self.reload_or_restart_op(&name, reply, control::Which::Reload)
            }
            Intent::SetRunlevel { name, reply } => self.set_runlevel_op(&name, reply),
            Intent::GetRunlevel { reply } => self.get_runlevel_op(reply),
            Intent::Status { reply } => self.status_op(reply),
            Intent::Freeze { name, reply } => self.freeze_op(&name, reply, true),
            Intent::Thaw { name, reply } => self.freeze_op(&name, reply, false),
            Intent::Reexec => {
                self.reexec_requested = true;
                self.reexec_delay_logged = false;
            }
        }
    }

    /// Route a platform event.
    pub fn handle_platform_event(&mut self, event: PlatformEvent) {
        self.refresh_clock();
        match event {
            PlatformEvent::ChildExited { pid, wstatus } => self.runner_finished(pid, wstatus),
            PlatformEvent::Output { unit, line } => self.unit_output(&unit, &line),
        }
    }

    /// Route a drained inotify event that may be a populated edge.
    pub fn handle_watch_event(&mut self, event: &WatchEvent) {
        if let Some((unit, populated)) = self.platform.on_watch_event(event) {
            self.refresh_clock();
            self.populated_event(&unit, populated);
            self.find_start_or_stop_to_do();
        }
    }

    /// The externally visible state of a unit, if it exists.
    pub fn state_label(&self, name: &str) -> Option<StateLabel> {
        self.units.get(name).map(|unit| unit.state.label())
    }

    // Shared helpers for the operation modules.

    fn log_state(&self, name: &UnitName) {
        if let Some(unit) = self.units.get(name) {
            info!("{name}: {}", unit.state.label());
        }
    }

    /// Swap in a new state, cancelling every timer the old one held.
    ///
    /// Requesters and runners still inside the old state are returned with
    /// it; the caller decides what survives.
    fn replace_state(&mut self, name: &UnitName, new: UnitState) -> UnitState {
        let Some(unit) = self.units.get_mut(name) else {
            return UnitState::Stopped;
        };
        let old = std::mem::replace(&mut unit.state, new);
        for key in old.timer_keys() {
            self.timers.cancel(Some(key));
        }
        old
    }

    fn spawn_env(&self) -> Vec<(String, String)> {
        vec![
            ("PREVRUNLEVEL".to_string(), self.runlevel_env.0.clone()),
            ("RUNLEVEL".to_string(), self.runlevel_env.1.clone()),
        ]
    }

    /// Accessors for tests.
    #[cfg(test)]
    pub(crate) fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    #[cfg(test)]
    pub(crate) fn group_populated(&self, name: &str) -> Option<bool> {
        self.units.get(name)?.group.as_ref().map(|g| g.populated)
    }

    #[cfg(test)]
    pub(crate) fn unit_names(&self) -> Vec<&str> {
        self.units.keys().map(|n| n.as_str()).collect()
    }

    #[cfg(test)]
    pub(crate) fn active_runlevel(&self) -> Option<&str> {
        self.active_runlevel.as_deref()
    }
}

#[cfg(test)]
pub(crate) mod test_support;




#[cfg(test)]
#[path = "reexec_engine_tests.rs"]
mod reexec_engine_tests;
