// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: startup, the event loop, re-exec.
//!
//! The engine runs on a current-thread runtime. One task owns it; the
//! listener, the SIGCHLD reaper, and per-group output readers are
//! auxiliary tasks that only talk to it over channels, so there is no
//! shared supervision state and no locking around it.

use crate::cgroup;
use crate::engine::{Engine, InstallMode, Intent, ReexecPayload, RequestReply, REEXEC_FD};
use crate::listener::Listener;
use crate::loader;
use crate::platform::{PlatformEvent, SysPlatform};
use crate::runner;
use crate::watches::{DirMonitor, Watches};
use nix::fcntl::OFlag;
use parking_lot::Mutex;
use std::ffi::CString;
use std::io::Read;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, RawFd};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use warden_core::SystemClock;

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory tree of unit files.
    pub units_dir: PathBuf,
    /// Runlevel configuration file.
    pub runlevel_config: PathBuf,
    /// The privileged control socket.
    pub socket_path: PathBuf,
    /// Base of the daemon's cgroup v2 subtree.
    pub cgroup_base: PathBuf,
}

impl Config {
    /// Standard system paths, overridable through the environment for
    /// development and tests.
    pub fn from_env() -> Self {
        let path = |var: &str, default: &str| {
            std::env::var_os(var)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(default))
        };
        Self {
            units_dir: path("WARDEN_UNITS_DIR", "/etc/warden/units"),
            runlevel_config: path("WARDEN_RUNLEVELS", "/etc/warden/runlevels"),
            socket_path: path("WARDEN_SOCKET", "/run/warden/priv.sock"),
            cgroup_base: path("WARDEN_CGROUP_BASE", cgroup::DEFAULT_BASE),
        }
    }
}

/// Errors that prevent the daemon from coming up at all.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Os(#[from] nix::Error),
}

/// `AsyncFd` needs an owner type; the inotify fd stays owned by `Watches`.
struct BorrowedRaw(RawFd);

impl AsRawFd for BorrowedRaw {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

/// Run the supervisor. Only returns on startup failure.
pub async fn run(config: Config) -> Result<(), LifecycleError> {
    let reexec_payload = consume_reexec_payload();
    let initial_boot = reexec_payload.is_none();
    if initial_boot {
        info!("starting");
    } else {
        info!("restarted");
    }

    std::fs::create_dir_all(&config.cgroup_base).ok();
    if !config.cgroup_base.join("cgroup.procs").exists() {
        warn!(
            "{}: does not look like a mounted cgroup2 hierarchy",
            config.cgroup_base.display()
        );
    }

    // As PID 1 there is no exiting over a transient failure; keep trying.
    let watches = loop {
        match Watches::new() {
            Ok(watches) => break Arc::new(Mutex::new(watches)),
            Err(err) => {
                warn!("inotify initialisation failed, trying again: {err}");
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            }
        }
    };
    let watch_fd = AsyncFd::with_interest(
        BorrowedRaw(watches.lock().raw_fd()),
        Interest::READABLE,
    )?;

    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<PlatformEvent>();
    let (intents_tx, mut intents_rx) = mpsc::unbounded_channel::<Intent>();

    let runlevels = loader::load_runlevels(&config.runlevel_config);
    let units = loader::load_units(&config.units_dir, &runlevels);
    let platform = SysPlatform::new(
        config.cgroup_base.clone(),
        events_tx.clone(),
        Arc::clone(&watches),
    );
    let mut engine = Engine::new(platform, SystemClock, runlevels);

    // Reap anything that died while no supervisor was watching, then keep
    // reaping for the rest of this incarnation.
    tokio::spawn(runner::reap_children(events_tx.clone()));

    let mut dir_monitor = DirMonitor::new(&mut watches.lock(), &config.units_dir);

    match units {
        Ok(units) => engine.install(units, InstallMode::Initial, reexec_payload),
        Err(err) => {
            // Little choice at boot: log and come up empty.
            error!("unit configuration failed to load: {err}");
            engine.install(Vec::new(), InstallMode::Initial, reexec_payload);
        }
    }

    let mut listener_task = loop {
        match spawn_listener(&config, intents_tx.clone()) {
            Ok(task) => break Some(task),
            Err(err) => {
                warn!("control socket creation failed, trying again: {err}");
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            }
        }
    };

    if initial_boot && nix::unistd::getpid().as_raw() == 1 {
        switch_to_default_runlevel(&mut engine, &config);
    }

    let mut sigusr1 = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::user_defined1())?;
    let mut sigusr2 = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::user_defined2())?;

    loop {
        engine.wakeup();

        if let Some(payload) = engine.check_reexec() {
            if let Err(err) = reexec_self(&payload) {
                error!("cannot re-execute myself: {err}");
            }
        }
        if engine.take_override_consumed() {
            persist_override_removal(&config);
        }

        let deadline = engine.next_deadline();
        let sleep = async {
            match deadline {
                Some(instant) => {
                    tokio::time::sleep_until(tokio_instant(instant)).await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            Some(intent) = intents_rx.recv() => {
                confine("handling a request", || engine.handle_intent(intent));
            }
            Some(event) = events_rx.recv() => {
                confine("handling a platform event", || engine.handle_platform_event(event));
            }
            guard = watch_fd.readable() => {
                if let Ok(mut guard) = guard {
                    guard.clear_ready();
                }
                let drained = watches.lock().drain();
                let mut config_changed = false;
                for event in &drained {
                    let monitor_hit = {
                        let mut watches = watches.lock();
                        dir_monitor.handle(&mut watches, event)
                    };
                    match monitor_hit {
                        Some(_) => config_changed = true,
                        None => engine.handle_watch_event(event),
                    }
                }
                if config_changed {
                    reload_units(&mut engine, &config);
                }
            }
            _ = sigusr2.recv() => {
                info!("closing sockets");
                if let Some(task) = listener_task.take() {
                    task.abort();
                }
                std::fs::remove_file(&config.socket_path).ok();
            }
            _ = sigusr1.recv() => {
                info!("reopening sockets");
                if let Some(task) = listener_task.take() {
                    task.abort();
                }
                match spawn_listener(&config, intents_tx.clone()) {
                    Ok(task) => listener_task = Some(task),
                    Err(err) => error!("cannot reopen control socket: {err}"),
                }
            }
            _ = sleep => {}
        }
    }
}

fn tokio_instant(instant: Instant) -> tokio::time::Instant {
    tokio::time::Instant::from_std(instant)
}

/// PID 1 has no business dying; a panic in a dispatch path is logged and
/// the event loop resumes.
fn confine<R>(what: &str, f: impl FnOnce() -> R) -> Option<R> {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(result) => Some(result),
        Err(_) => {
            error!("panic while {what}; resuming the event loop");
            None
        }
    }
}

fn spawn_listener(
    config: &Config,
    intents: mpsc::UnboundedSender<Intent>,
) -> Result<tokio::task::JoinHandle<()>, LifecycleError> {
    if let Some(parent) = config.socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::remove_file(&config.socket_path).ok();
    let socket = UnixListener::bind(&config.socket_path)?;
    Ok(tokio::spawn(Listener::new(socket, intents).run()))
}

/// Boot as PID 1 comes up in the default runlevel.
fn switch_to_default_runlevel(
    engine: &mut Engine<SysPlatform, SystemClock>,
    config: &Config,
) {
    let (reply, _status, _stream) = RequestReply::channel();
    engine.handle_intent(Intent::SetRunlevel {
        name: "default".to_string(),
        reply,
    });
    if engine.take_override_consumed() {
        persist_override_removal(config);
    }
}

fn persist_override_removal(config: &Config) {
    let mut runlevels = loader::load_runlevels(&config.runlevel_config);
    if runlevels.remove_override() {
        if let Err(err) = loader::save_runlevels(&config.runlevel_config, &runlevels) {
            warn!("cannot persist runlevel override removal: {err}");
        }
    }
}

fn reload_units(engine: &mut Engine<SysPlatform, SystemClock>, config: &Config) {
    let runlevels = loader::load_runlevels(&config.runlevel_config);
    match loader::load_units(&config.units_dir, &runlevels) {
        Ok(units) => engine.install(units, InstallMode::Update, None),
        // The previously installed set stays active.
        Err(err) => error!("unit configuration reload failed: {err}"),
    }
}

/// Read the payload a previous incarnation left on the inherited pipe.
#[allow(unsafe_code)]
fn consume_reexec_payload() -> Option<ReexecPayload> {
    let fd: RawFd = std::env::var(REEXEC_FD).ok()?.parse().ok()?;
    std::env::remove_var(REEXEC_FD);

    // The fd was inherited across exec; the writer closed its end before
    // exec'ing, so this reads to EOF.
    let mut file = unsafe { std::fs::File::from_raw_fd(fd) };
    let mut content = String::new();
    if file.read_to_string(&mut content).is_err() {
        return None;
    }
    Some(ReexecPayload::parse(&content))
}

/// Serialise the payload into a pipe and exec ourselves in place.
///
/// Only returns on failure.
#[allow(unsafe_code)]
fn reexec_self(payload: &ReexecPayload) -> Result<(), LifecycleError> {
    let encoded = payload.encode();
    let (read_end, write_end) = nix::unistd::pipe2(OFlag::empty())?;
    nix::unistd::write(&write_end, encoded.as_bytes())?;
    drop(write_end);

    let read_fd = read_end.into_raw_fd();
    std::env::set_var(REEXEC_FD, read_fd.to_string());

    let exe = CString::new("/proc/self/exe")
        .map_err(|_| LifecycleError::Io(std::io::Error::other("bad exec path")))?;
    let arg0 = CString::new("wardend")
        .map_err(|_| LifecycleError::Io(std::io::Error::other("bad argv")))?;
    let err = match nix::unistd::execv(&exe, &[arg0.as_c_str()]) {
        Err(err) => err,
        Ok(never) => match never {},
    };

    // Exec failed; clean up so supervision can continue.
    std::env::remove_var(REEXEC_FD);
    drop(unsafe { std::os::fd::OwnedFd::from_raw_fd(read_fd) });
    Err(LifecycleError::Os(err))
}
