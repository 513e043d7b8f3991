// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! warden-core: data model for the warden init/service supervisor.
//!
//! Everything in this crate is I/O-free: unit names and their validation
//! rules, unit specifications, the unit state labels, the transitively
//! closed dependency graph, runlevel configuration, and the clock
//! abstraction the daemon's timers are built on.

pub mod macros;

pub mod clock;
pub mod graph;
pub mod name;
pub mod runlevel;
pub mod spec;
pub mod state;

pub use clock::{Clock, FakeClock, SystemClock};
pub use graph::{compute_dependencies, diff_dependencies, DependencyInfo};
pub use name::{NameError, UnitName, NAME_MAX, RUNLEVEL_PREFIX};
pub use runlevel::{Runlevel, Runlevels};
pub use spec::{
    SigtermNotify, StartType, StopType, UnitSpec, UnitType, DEFAULT_RESPAWN_ATTEMPTS,
    DEFAULT_RESPAWN_WINDOW, DEFAULT_STARTING_TIMEOUT, DEFAULT_STOPPING_TIMEOUT,
};
pub use state::StateLabel;
