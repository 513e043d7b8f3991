// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for engine tests: a fake platform, a fake clock, and
//! request probes that capture what a connection would see.

use super::{Engine, InstallMode, Intent, Reply, RequestReply};
use crate::platform::fake::FakePlatform;
use nix::unistd::Pid;
use tokio::sync::{mpsc, oneshot};
use warden_core::{FakeClock, Runlevels, UnitName, UnitSpec};

pub(crate) type TestEngine = Engine<FakePlatform, FakeClock>;

pub(crate) fn engine() -> (TestEngine, FakeClock) {
    engine_with_runlevels(Runlevels::builtin())
}

pub(crate) fn engine_with_runlevels(runlevels: Runlevels) -> (TestEngine, FakeClock) {
    let clock = FakeClock::new();
    let engine = Engine::new(FakePlatform::new(), clock.clone(), runlevels);
    (engine, clock)
}

pub(crate) fn name(s: &str) -> UnitName {
    match UnitName::new(s) {
        Ok(name) => name,
        Err(err) => panic!("bad test unit name {s}: {err}"),
    }
}

pub(crate) fn spec(s: &str) -> UnitSpec {
    UnitSpec::new(name(s))
}

pub(crate) fn install(engine: &mut TestEngine, specs: Vec<UnitSpec>) {
    engine.install(specs, InstallMode::Initial, None);
}

/// The connection side of one request.
pub(crate) struct Probe {
    status: oneshot::Receiver<String>,
    stream: mpsc::UnboundedReceiver<Reply>,
}

impl Probe {
    /// The initial status line; empty means accepted.
    pub fn status_line(&mut self) -> String {
        match self.status.try_recv() {
            Ok(line) => line,
            Err(_) => panic!("no status line was sent"),
        }
    }

    pub fn assert_accepted(&mut self) {
        assert_eq!(self.status_line(), "");
    }

    pub fn assert_rejected(&mut self, message: &str) {
        assert_eq!(self.status_line(), message);
    }

    /// Everything streamed so far.
    pub fn drain(&mut self) -> Vec<Reply> {
        let mut replies = Vec::new();
        while let Ok(reply) = self.stream.try_recv() {
            replies.push(reply);
        }
        replies
    }

    /// The terminal line, if the request has finished.
    pub fn done_line(&mut self) -> Option<String> {
        self.drain().into_iter().find_map(|reply| match reply {
            Reply::Done(line) => Some(line),
            _ => None,
        })
    }

    /// Whether the request finished with EOF (stop/setrunlevel style).
    pub fn finished_eof(&mut self) -> bool {
        self.drain().iter().any(|reply| matches!(reply, Reply::Eof))
    }
}

pub(crate) fn request() -> (RequestReply, Probe) {
    let (reply, status, stream) = RequestReply::channel();
    (reply, Probe { status, stream })
}

pub(crate) fn start(engine: &mut TestEngine, unit: &str) -> Probe {
    let (reply, probe) = request();
    engine.handle_intent(Intent::Start {
        name: unit.to_string(),
        reply,
    });
    probe
}

pub(crate) fn stop(engine: &mut TestEngine, unit: &str) -> Probe {
    let (reply, probe) = request();
    engine.handle_intent(Intent::Stop {
        name: unit.to_string(),
        reply,
    });
    probe
}

pub(crate) fn restart(engine: &mut TestEngine, unit: &str) -> Probe {
    let (reply, probe) = request();
    engine.handle_intent(Intent::Restart {
        name: unit.to_string(),
        reply,
    });
    probe
}

pub(crate) fn set_runlevel(engine: &mut TestEngine, runlevel: &str) -> Probe {
    let (reply, probe) = request();
    engine.handle_intent(Intent::SetRunlevel {
        name: runlevel.to_string(),
        reply,
    });
    probe
}

/// The pid handed out for the most recent spawn.
pub(crate) fn last_pid(engine: &mut TestEngine) -> Pid {
    engine.platform_mut().last_spawn().pid
}

/// Report a runner exit with the given exit code.
pub(crate) fn exit_runner(engine: &mut TestEngine, pid: Pid, code: i32) {
    engine.handle_platform_event(crate::platform::PlatformEvent::ChildExited {
        pid,
        wstatus: (code & 0xff) << 8,
    });
}

/// Deliver a populated edge the way the watch path would.
pub(crate) fn populated(engine: &mut TestEngine, unit: &str, value: bool) {
    engine.wakeup();
    let unit = name(unit);
    engine.populated_event(&unit, value);
    engine.find_start_or_stop_to_do();
}

/// The unit's display label, as `status` would report it.
pub(crate) fn label(engine: &TestEngine, unit: &str) -> String {
    match engine.state_label(unit) {
        Some(label) => label.to_string(),
        None => panic!("{unit}: no such unit"),
    }
}
