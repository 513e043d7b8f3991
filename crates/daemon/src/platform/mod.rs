// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The operating-system seam.
//!
//! Everything the engine needs from the host (cgroup directories, merged
//! output pipes, spawning into a group, signalling, freeze/thaw, and the
//! fd juggling around re-exec) goes through [`Platform`]. The daemon runs
//! on [`SysPlatform`]; tests drive the engine with [`fake::FakePlatform`].

mod sys;

#[cfg(test)]
pub mod fake;

pub use sys::SysPlatform;

use crate::watches::WatchEvent;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::os::fd::RawFd;
use thiserror::Error;
use warden_core::{SigtermNotify, UnitName};

/// Handle to one unit's process group.
pub type GroupId = u64;

/// Events surfaced by the platform into the engine loop.
#[derive(Debug)]
pub enum PlatformEvent {
    /// A child was reaped; `wstatus` is the raw wait status.
    ChildExited { pid: Pid, wstatus: i32 },
    /// A line of merged stdout/stderr from a unit's group.
    Output { unit: UnitName, line: String },
}

/// Errors from platform operations.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("cgroup setup failed: {0}")]
    Cgroup(String),

    #[error("cannot run {command}: {message}")]
    Spawn { command: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Os(#[from] nix::Error),
}

/// Host services behind which the engine stays testable.
pub trait Platform {
    /// Allocate the unit's cgroup directory, `cgroup.events` watch, and
    /// merged stdout/stderr pipe.
    fn create_group(&mut self, unit: &UnitName) -> Result<GroupId, PlatformError>;

    /// Tear the group down; directory removal is best-effort.
    fn remove_group(&mut self, id: GroupId);

    /// Spawn `sh -c command` with stdout/stderr on the group's pipe and
    /// the child moved into the group before exec.
    fn spawn(
        &mut self,
        id: GroupId,
        command: &str,
        env: &[(String, String)],
    ) -> Result<Pid, PlatformError>;

    /// Signal the group's processes, honouring the notify policy.
    fn sendsig(&mut self, id: GroupId, signal: Signal, notify: SigtermNotify);

    /// Write the group's `cgroup.freeze`.
    fn freeze(&mut self, id: GroupId, frozen: bool) -> Result<(), PlatformError>;

    /// Read the current populated flag straight from `cgroup.events`.
    fn read_populated(&mut self, id: GroupId) -> bool;

    /// Whether the watch machinery has nothing in flight (re-exec gate).
    fn watches_transferable(&self) -> bool;

    /// Clear close-on-exec on the group's fds and hand them out for the
    /// re-exec payload: `(pipe_r, pipe_w, events_fd)`.
    fn prepare_transfer(&mut self, id: GroupId) -> Result<(RawFd, RawFd, RawFd), PlatformError>;

    /// Rebuild a group from fds inherited across a re-exec.
    fn restore_group(
        &mut self,
        unit: &UnitName,
        pipe_r: RawFd,
        pipe_w: RawFd,
        events_fd: RawFd,
    ) -> Result<GroupId, PlatformError>;

    /// Map a drained inotify event to a populated-edge, if it belongs to
    /// one of this platform's groups and the flag actually changed.
    fn on_watch_event(&mut self, event: &WatchEvent) -> Option<(UnitName, bool)>;
}
