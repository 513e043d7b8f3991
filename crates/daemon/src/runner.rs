// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child reaping and wait-status plumbing.
//!
//! As process 1 the daemon reaps everything, its own runners included. The
//! SIGCHLD task drains `waitpid(-1, WNOHANG)` and forwards raw wait
//! statuses; the engine routes them by pid and silently drops exits nobody
//! is waiting for (cancelled runners, reparented orphans).

use crate::platform::PlatformEvent;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// Rebuild a raw wait status from what `waitpid` reported.
fn raw_wait_status(status: &WaitStatus) -> Option<(Pid, i32)> {
    match status {
        WaitStatus::Exited(pid, code) => Some((*pid, (code & 0xff) << 8)),
        WaitStatus::Signaled(pid, sig, core) => {
            Some((*pid, (*sig as i32) | if *core { 0x80 } else { 0 }))
        }
        _ => None,
    }
}

/// WEXITSTATUS.
pub fn exit_code(wstatus: i32) -> i32 {
    (wstatus >> 8) & 0xff
}

/// WTERMSIG, when the status is a signal death.
pub fn term_signal(wstatus: i32) -> Option<i32> {
    let sig = wstatus & 0x7f;
    (sig != 0).then_some(sig)
}

/// Human-readable form for failure logs.
pub fn describe_wait_status(wstatus: i32) -> String {
    match term_signal(wstatus) {
        Some(sig) => format!("terminated by signal {sig}"),
        None => format!("exited with status {}", exit_code(wstatus)),
    }
}

/// Run the SIGCHLD reaper until the daemon exits.
pub async fn reap_children(events: UnboundedSender<PlatformEvent>) {
    let mut sigchld = match signal(SignalKind::child()) {
        Ok(stream) => stream,
        Err(err) => {
            tracing::error!("cannot install SIGCHLD handler: {err}");
            return;
        }
    };

    loop {
        sigchld.recv().await;
        loop {
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => break,
                Ok(status) => {
                    if let Some((pid, wstatus)) = raw_wait_status(&status) {
                        debug!(pid = pid.as_raw(), wstatus, "reaped child");
                        if events.send(PlatformEvent::ChildExited { pid, wstatus }).is_err() {
                            return;
                        }
                    }
                }
                // ECHILD: nothing left to reap.
                Err(_) => break,
            }
        }
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
