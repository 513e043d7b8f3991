// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Human-readable unit state labels.
//!
//! The daemon's state machine carries runtime handles (runners, timers,
//! process groups) and lives in the daemon crate; what crosses the control
//! socket and the logs is this label. Starting-side labels carry the
//! `(manual)` / `(dependency)` qualifier naming why the unit is coming up.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The externally visible state of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateLabel {
    StartPending { dependency: bool },
    Starting { dependency: bool },
    Started { dependency: bool },
    Respawning { dependency: bool },
    StopPending,
    Stopping,
    Removing,
    ForceRemoving,
    Stopped,
}

impl StateLabel {
    /// The label without the `(manual)` / `(dependency)` qualifier.
    pub fn base(&self) -> &'static str {
        match self {
            StateLabel::StartPending { .. } => "start pending",
            StateLabel::Starting { .. } => "starting",
            StateLabel::Started { .. } => "started",
            StateLabel::Respawning { .. } => "respawning",
            StateLabel::StopPending => "stop pending",
            StateLabel::Stopping => "stopping",
            StateLabel::Removing => "removing",
            StateLabel::ForceRemoving => "force-removing",
            StateLabel::Stopped => "stopped",
        }
    }

    /// Whether this is a resting state (nothing in flight).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StateLabel::Started { .. } | StateLabel::Stopped
        )
    }
}

impl fmt::Display for StateLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateLabel::StartPending { dependency }
            | StateLabel::Starting { dependency }
            | StateLabel::Started { dependency }
            | StateLabel::Respawning { dependency } => {
                let qualifier = if *dependency { "dependency" } else { "manual" };
                write!(f, "{} ({})", self.base(), qualifier)
            }
            _ => f.write_str(self.base()),
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
