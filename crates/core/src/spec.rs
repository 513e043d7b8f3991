// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit specifications.
//!
//! A [`UnitSpec`] is immutable after loading; reloading the configuration
//! replaces specs wholesale and moves the running state across by name.

use crate::name::UnitName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Default timeout for a starting command, seconds. Zero means infinite.
pub const DEFAULT_STARTING_TIMEOUT: u32 = 60;

/// Default timeout for a stopping command, seconds.
pub const DEFAULT_STOPPING_TIMEOUT: u32 = 60;

/// How many respawns are permitted within one respawn window.
pub const DEFAULT_RESPAWN_ATTEMPTS: u32 = 3;

/// Length of the respawn window, seconds.
pub const DEFAULT_RESPAWN_WINDOW: u32 = 30;

/// Where a unit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    /// Backed by a unit file.
    Loaded,
    /// A synthesised runlevel unit.
    Runlevel,
    /// Materialised only because something depends on it. Never scheduled.
    Synthesised,
}

crate::simple_display! {
    UnitType {
        Loaded => "loaded",
        Runlevel => "runlevel",
        Synthesised => "synthesised",
    }
}

/// How the starting command behaves.
///
/// - `forking`: the command forks and the parent exits; the unit stays in
///   the starting state until the initial process terminates.
/// - `oneshot`: the unit is started once the command exits successfully.
/// - `respawn`: the command is the supervised process itself; it is
///   restarted automatically when all of the unit's processes terminate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartType {
    #[default]
    Forking,
    Oneshot,
    Respawn,
}

crate::simple_display! {
    StartType {
        Forking => "forking",
        Oneshot => "oneshot",
        Respawn => "respawn",
    }
}

impl FromStr for StartType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forking" => Ok(StartType::Forking),
            "oneshot" => Ok(StartType::Oneshot),
            "respawn" => Ok(StartType::Respawn),
            other => Err(format!("unknown starting type: {other}")),
        }
    }
}

/// When a unit leaves the started state on its own.
///
/// - `automatic`: the unit begins stopping once its group has no processes.
/// - `manual`: the unit stays started until explicitly stopped.
/// - `target`: like manual, but swept when the runlevel that pulled it in
///   is switched away from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopType {
    Automatic,
    #[default]
    Manual,
    Target,
}

crate::simple_display! {
    StopType {
        Automatic => "automatic",
        Manual => "manual",
        Target => "target",
    }
}

impl FromStr for StopType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "automatic" => Ok(StopType::Automatic),
            "manual" => Ok(StopType::Manual),
            "target" => Ok(StopType::Target),
            other => Err(format!("unknown stopping type: {other}")),
        }
    }
}

/// Who gets the SIGTERM when a unit's group is torn down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigtermNotify {
    /// Every process in the group.
    #[default]
    All,
    /// Only parents; a process whose executable matches its parent's is
    /// skipped, on the expectation the parent forwards the signal.
    Parents,
}

crate::simple_display! {
    SigtermNotify {
        All => "all",
        Parents => "parents",
    }
}

/// A unit specification, immutable after load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSpec {
    pub name: UnitName,
    pub description: String,
    pub unit_type: UnitType,
    pub start_type: StartType,
    pub stop_type: StopType,
    pub sigterm_notify: SigtermNotify,
    pub alternative_group: Option<String>,
    pub enabled: bool,

    pub starting_command: Option<String>,
    pub stopping_command: Option<String>,
    pub restarting_command: Option<String>,
    pub reloading_command: Option<String>,

    /// Seconds; zero means no timeout.
    pub starting_timeout: u32,
    pub stopping_timeout: u32,
    pub respawn_attempts: u32,
    pub respawn_window: u32,

    pub requires: BTreeSet<UnitName>,
    pub required_by: BTreeSet<UnitName>,
    pub starts_after: BTreeSet<UnitName>,
    pub starts_before: BTreeSet<UnitName>,
    pub stops_after: BTreeSet<UnitName>,
    pub stops_before: BTreeSet<UnitName>,
}

impl UnitSpec {
    pub fn new(name: UnitName) -> Self {
        Self {
            name,
            description: String::new(),
            unit_type: UnitType::Loaded,
            start_type: StartType::default(),
            stop_type: StopType::default(),
            sigterm_notify: SigtermNotify::default(),
            alternative_group: None,
            enabled: true,
            starting_command: None,
            stopping_command: None,
            restarting_command: None,
            reloading_command: None,
            starting_timeout: DEFAULT_STARTING_TIMEOUT,
            stopping_timeout: DEFAULT_STOPPING_TIMEOUT,
            respawn_attempts: DEFAULT_RESPAWN_ATTEMPTS,
            respawn_window: DEFAULT_RESPAWN_WINDOW,
            requires: BTreeSet::new(),
            required_by: BTreeSet::new(),
            starts_after: BTreeSet::new(),
            starts_before: BTreeSet::new(),
            stops_after: BTreeSet::new(),
            stops_before: BTreeSet::new(),
        }
    }

    /// A synthesised placeholder for a dependency reference with no unit
    /// file behind it.
    pub fn synthesised(name: UnitName) -> Self {
        let mut spec = Self::new(name);
        spec.unit_type = UnitType::Synthesised;
        spec
    }

    /// The synthesised unit standing for a runlevel.
    pub fn runlevel(runlevel: &str, requires: impl IntoIterator<Item = UnitName>) -> Self {
        let mut spec = Self::new(UnitName::runlevel(runlevel));
        spec.unit_type = UnitType::Runlevel;
        spec.description = runlevel.to_string();
        spec.requires = requires.into_iter().collect();
        spec
    }

    /// Every unit name this spec refers to.
    pub fn references(&self) -> impl Iterator<Item = &UnitName> {
        self.requires
            .iter()
            .chain(&self.required_by)
            .chain(&self.starts_after)
            .chain(&self.starts_before)
            .chain(&self.stops_after)
            .chain(&self.stops_before)
    }

    /// Describe what changed relative to a newer spec for the same unit.
    /// Returned messages are logged when the configuration is reloaded.
    pub fn diff(&self, new: &UnitSpec) -> Vec<String> {
        let mut changes = Vec::new();
        let mut check = |field: &str, changed: bool| {
            if changed {
                changes.push(format!("{}: {} changed", self.name, field));
            }
        };
        check("description", self.description != new.description);
        check("starting type", self.start_type != new.start_type);
        check("stopping type", self.stop_type != new.stop_type);
        check("starting command", self.starting_command != new.starting_command);
        check("stopping command", self.stopping_command != new.stopping_command);
        check("restarting command", self.restarting_command != new.restarting_command);
        check("reloading command", self.reloading_command != new.reloading_command);
        check("starting timeout", self.starting_timeout != new.starting_timeout);
        check("stopping timeout", self.stopping_timeout != new.stopping_timeout);
        check(
            "respawn limits",
            self.respawn_attempts != new.respawn_attempts
                || self.respawn_window != new.respawn_window,
        );
        check(
            "alternative group",
            self.alternative_group != new.alternative_group,
        );
        changes
    }
}

#[cfg(test)]
#[path = "spec_tests.rs"]
mod tests;
