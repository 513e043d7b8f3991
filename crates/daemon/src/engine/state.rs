// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-unit state machine.
//!
//! Each variant owns exactly the runtime resources legal in that state:
//! runners, timers, and the requester connections waiting on the outcome.
//! Holding the runner inside the variant is what enforces "one runner per
//! unit at a time": there is nowhere else to put one.

use super::requester::Requester;
use crate::timers::TimerKey;
use nix::unistd::Pid;
use warden_core::StateLabel;

/// One running phase command; identity is the child pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Runner {
    pub pid: Pid,
}

/// A unit that is coming up.
#[derive(Debug, Default)]
pub struct Starting {
    /// Started as a consequence of another unit, not an operator request.
    pub dependency: bool,
    pub runner: Option<Runner>,
    pub timeout: Option<TimerKey>,
    /// The group drained while the starting command was still running;
    /// handled once the runner reports back.
    pub delayed_depopulation: bool,
    pub requesters: Vec<Requester>,
}

/// A unit that is up.
#[derive(Debug)]
pub struct Started {
    pub dependency: bool,
    /// Epoch seconds; crosses the re-exec payload.
    pub start_time: u64,
    pub reload_runner: Option<Runner>,
    pub reload_requester: Option<Requester>,
    /// The supervised process of a respawn unit.
    pub respawn_runner: Option<Runner>,
    /// Respawn accounting; not preserved across re-exec.
    pub respawn_window_start: u64,
    pub respawn_counter: u32,
    pub respawn_prepare_timer: Option<TimerKey>,
    /// The supervised process exited; waiting for the group to drain
    /// before forking again.
    pub respawn_pending: bool,
}

impl Started {
    pub fn new(dependency: bool, start_time: u64) -> Self {
        Self {
            dependency,
            start_time,
            reload_runner: None,
            reload_requester: None,
            respawn_runner: None,
            respawn_window_start: start_time,
            respawn_counter: 0,
            respawn_prepare_timer: None,
            respawn_pending: false,
        }
    }
}

/// Where a stopping unit is in its teardown.
#[derive(Debug)]
pub enum StoppingPhase {
    /// Waiting for reverse-dependencies to stop first.
    Pending,
    /// The stopping command is running.
    Running {
        runner: Runner,
        timeout: Option<TimerKey>,
    },
    /// SIGTERM sent; waiting for the group to drain, with SIGKILL armed.
    Removing {
        sigkill_timer: Option<TimerKey>,
        sigkill_sent: bool,
    },
}

/// A unit that is going down.
#[derive(Debug)]
pub struct Stopping {
    pub phase: StoppingPhase,
    pub requesters: Vec<Requester>,
}

/// The state of a unit.
#[derive(Debug, Default)]
pub enum UnitState {
    #[default]
    Stopped,
    Starting(Starting),
    Started(Started),
    Stopping(Stopping),
}

impl UnitState {
    pub fn label(&self) -> StateLabel {
        match self {
            UnitState::Stopped => StateLabel::Stopped,
            UnitState::Starting(s) => {
                if s.runner.is_some() {
                    StateLabel::Starting {
                        dependency: s.dependency,
                    }
                } else {
                    StateLabel::StartPending {
                        dependency: s.dependency,
                    }
                }
            }
            UnitState::Started(s) => {
                if s.respawn_pending {
                    StateLabel::Respawning {
                        dependency: s.dependency,
                    }
                } else {
                    StateLabel::Started {
                        dependency: s.dependency,
                    }
                }
            }
            UnitState::Stopping(s) => match &s.phase {
                StoppingPhase::Pending => StateLabel::StopPending,
                StoppingPhase::Running { .. } => StateLabel::Stopping,
                StoppingPhase::Removing { sigkill_sent, .. } => {
                    if *sigkill_sent {
                        StateLabel::ForceRemoving
                    } else {
                        StateLabel::Removing
                    }
                }
            },
        }
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, UnitState::Stopped)
    }

    pub fn is_starting(&self) -> bool {
        matches!(self, UnitState::Starting(_))
    }

    pub fn is_started(&self) -> bool {
        matches!(self, UnitState::Started(_))
    }

    pub fn is_stopping(&self) -> bool {
        matches!(self, UnitState::Stopping(_))
    }

    /// Every timer currently armed by this state; the engine cancels them
    /// when the state is replaced.
    pub fn timer_keys(&self) -> Vec<TimerKey> {
        match self {
            UnitState::Stopped => Vec::new(),
            UnitState::Starting(s) => s.timeout.into_iter().collect(),
            UnitState::Started(s) => s.respawn_prepare_timer.into_iter().collect(),
            UnitState::Stopping(s) => match &s.phase {
                StoppingPhase::Pending => Vec::new(),
                StoppingPhase::Running { timeout, .. } => timeout.iter().copied().collect(),
                StoppingPhase::Removing { sigkill_timer, .. } => {
                    sigkill_timer.iter().copied().collect()
                }
            },
        }
    }

    /// Drain the requesters waiting on this state, if any.
    pub fn take_requesters(&mut self) -> Vec<Requester> {
        match self {
            UnitState::Starting(s) => std::mem::take(&mut s.requesters),
            UnitState::Stopping(s) => std::mem::take(&mut s.requesters),
            _ => Vec::new(),
        }
    }

    /// The requesters to carbon-copy unit output to.
    pub fn requesters(&self) -> &[Requester] {
        match self {
            UnitState::Starting(s) => &s.requesters,
            UnitState::Stopping(s) => &s.requesters,
            _ => &[],
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
