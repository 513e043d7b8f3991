// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted platform for engine tests.
//!
//! Spawns hand out synthetic pids and record the command line; the test
//! drives runner exits and populated edges through the engine's event
//! entry points itself.

use super::{GroupId, Platform, PlatformError};
use crate::watches::WatchEvent;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::collections::{HashMap, HashSet};
use std::os::fd::RawFd;
use warden_core::{SigtermNotify, UnitName};

#[derive(Debug, Clone)]
pub struct FakeGroup {
    pub unit: UnitName,
    pub frozen: bool,
    pub populated: bool,
    pub removed: bool,
}

#[derive(Debug, Clone)]
pub struct SpawnRecord {
    pub group: GroupId,
    pub unit: UnitName,
    pub command: String,
    pub env: Vec<(String, String)>,
    pub pid: Pid,
}

#[derive(Debug, Default)]
pub struct FakePlatform {
    next_pid: i32,
    next_group: GroupId,
    pub groups: HashMap<GroupId, FakeGroup>,
    pub spawns: Vec<SpawnRecord>,
    pub signals: Vec<(UnitName, Signal, SigtermNotify)>,
    /// Commands whose spawn should fail.
    pub fail_spawns: HashSet<String>,
    /// Units whose group creation should fail.
    pub fail_groups: HashSet<String>,
    pub transferable: bool,
    /// Pretend-populated value reported after a restore.
    pub restored_populated: bool,
    pub restored: Vec<(UnitName, RawFd, RawFd, RawFd)>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            transferable: true,
            ..Self::default()
        }
    }

    /// The most recent spawn, for assertions.
    pub fn last_spawn(&self) -> &SpawnRecord {
        match self.spawns.last() {
            Some(record) => record,
            None => panic!("no spawn recorded"),
        }
    }

    pub fn group_of(&self, unit: &UnitName) -> Option<GroupId> {
        self.groups
            .iter()
            .find(|(_, g)| &g.unit == unit && !g.removed)
            .map(|(&id, _)| id)
    }

    pub fn spawned_commands(&self) -> Vec<&str> {
        self.spawns.iter().map(|s| s.command.as_str()).collect()
    }
}

impl Platform for FakePlatform {
    fn create_group(&mut self, unit: &UnitName) -> Result<GroupId, PlatformError> {
        if self.fail_groups.contains(unit.as_str()) {
            return Err(PlatformError::Cgroup(format!("{unit}: scripted failure")));
        }
        self.next_group += 1;
        self.groups.insert(
            self.next_group,
            FakeGroup {
                unit: unit.clone(),
                frozen: false,
                populated: false,
                removed: false,
            },
        );
        Ok(self.next_group)
    }

    fn remove_group(&mut self, id: GroupId) {
        if let Some(group) = self.groups.get_mut(&id) {
            group.removed = true;
        }
    }

    fn spawn(
        &mut self,
        id: GroupId,
        command: &str,
        env: &[(String, String)],
    ) -> Result<Pid, PlatformError> {
        if self.fail_spawns.contains(command) {
            return Err(PlatformError::Spawn {
                command: command.to_string(),
                message: "No such file or directory".to_string(),
            });
        }
        let unit = self
            .groups
            .get(&id)
            .map(|g| g.unit.clone())
            .ok_or_else(|| PlatformError::Cgroup("no such group".into()))?;
        self.next_pid += 1;
        let pid = Pid::from_raw(1000 + self.next_pid);
        self.spawns.push(SpawnRecord {
            group: id,
            unit,
            command: command.to_string(),
            env: env.to_vec(),
            pid,
        });
        Ok(pid)
    }

    fn sendsig(&mut self, id: GroupId, signal: Signal, notify: SigtermNotify) {
        if let Some(group) = self.groups.get(&id) {
            self.signals.push((group.unit.clone(), signal, notify));
        }
    }

    fn freeze(&mut self, id: GroupId, frozen: bool) -> Result<(), PlatformError> {
        match self.groups.get_mut(&id) {
            Some(group) => {
                group.frozen = frozen;
                Ok(())
            }
            None => Err(PlatformError::Cgroup("no such group".into())),
        }
    }

    fn read_populated(&mut self, id: GroupId) -> bool {
        self.groups.get(&id).map(|g| g.populated).unwrap_or(false)
    }

    fn watches_transferable(&self) -> bool {
        self.transferable
    }

    fn prepare_transfer(&mut self, id: GroupId) -> Result<(RawFd, RawFd, RawFd), PlatformError> {
        // Deterministic fake fd numbers derived from the group id.
        let base = (id as RawFd) * 10;
        Ok((base + 3, base + 4, base + 5))
    }

    fn restore_group(
        &mut self,
        unit: &UnitName,
        pipe_r: RawFd,
        pipe_w: RawFd,
        events_fd: RawFd,
    ) -> Result<GroupId, PlatformError> {
        self.restored.push((unit.clone(), pipe_r, pipe_w, events_fd));
        self.next_group += 1;
        self.groups.insert(
            self.next_group,
            FakeGroup {
                unit: unit.clone(),
                frozen: false,
                populated: self.restored_populated,
                removed: false,
            },
        );
        Ok(self.next_group)
    }

    fn on_watch_event(&mut self, _event: &WatchEvent) -> Option<(UnitName, bool)> {
        None
    }
}
