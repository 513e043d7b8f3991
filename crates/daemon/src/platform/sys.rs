// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The live cgroup v2 platform.

use super::{GroupId, Platform, PlatformError, PlatformEvent};
use crate::cgroup;
use crate::watches::{file_modify_mask, WatchEvent, WatchKey, Watches};
use nix::fcntl::{fcntl, FcntlArg, FdFlag, OFlag};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::debug;
use warden_core::{SigtermNotify, UnitName};

struct SysGroup {
    unit: UnitName,
    dir: PathBuf,
    pipe_r: OwnedFd,
    pipe_w: OwnedFd,
    events_file: File,
    watch_key: Option<WatchKey>,
    populated: bool,
    reader: JoinHandle<()>,
}

/// Platform implementation against a mounted cgroup v2 hierarchy.
pub struct SysPlatform {
    base: PathBuf,
    events_tx: UnboundedSender<PlatformEvent>,
    watches: Arc<Mutex<Watches>>,
    groups: HashMap<GroupId, SysGroup>,
    watch_index: HashMap<WatchKey, GroupId>,
    next_id: GroupId,
}

impl SysPlatform {
    pub fn new(
        base: PathBuf,
        events_tx: UnboundedSender<PlatformEvent>,
        watches: Arc<Mutex<Watches>>,
    ) -> Self {
        Self {
            base,
            events_tx,
            watches,
            groups: HashMap::new(),
            watch_index: HashMap::new(),
            next_id: 0,
        }
    }

    fn group(&mut self, id: GroupId) -> Option<&mut SysGroup> {
        self.groups.get_mut(&id)
    }

    fn install_group(
        &mut self,
        unit: &UnitName,
        dir: PathBuf,
        pipe_r: OwnedFd,
        pipe_w: OwnedFd,
        mut events_file: File,
    ) -> Result<GroupId, PlatformError> {
        let events_path = dir.join("cgroup.events");
        let watch_key = self.watches.lock().add(&events_path, file_modify_mask());
        let populated = read_populated_file(&mut events_file);

        let reader = spawn_output_reader(&pipe_r, unit.clone(), self.events_tx.clone())?;

        self.next_id += 1;
        let id = self.next_id;
        if let Some(key) = watch_key {
            self.watch_index.insert(key, id);
        }
        self.groups.insert(
            id,
            SysGroup {
                unit: unit.clone(),
                dir,
                pipe_r,
                pipe_w,
                events_file,
                watch_key,
                populated,
                reader,
            },
        );
        Ok(id)
    }
}

impl Platform for SysPlatform {
    fn create_group(&mut self, unit: &UnitName) -> Result<GroupId, PlatformError> {
        let dir = cgroup::unit_dir(&self.base, unit);
        if let Err(err) = std::fs::create_dir(&dir) {
            if err.kind() != std::io::ErrorKind::AlreadyExists {
                return Err(PlatformError::Cgroup(format!("{}: {err}", dir.display())));
            }
        }

        let events_path = dir.join("cgroup.events");
        let events_file = File::open(&events_path)
            .map_err(|err| PlatformError::Cgroup(format!("{}: {err}", events_path.display())))?;

        let (pipe_r, pipe_w) = nix::unistd::pipe2(OFlag::O_CLOEXEC)?;
        fcntl(pipe_r.as_raw_fd(), FcntlArg::F_SETFL(OFlag::O_NONBLOCK))?;

        self.install_group(unit, dir, pipe_r, pipe_w, events_file)
    }

    fn remove_group(&mut self, id: GroupId) {
        let Some(group) = self.groups.remove(&id) else {
            return;
        };
        if let Some(key) = group.watch_key {
            self.watch_index.remove(&key);
            self.watches.lock().remove(key);
        }
        group.reader.abort();
        if let Err(err) = std::fs::remove_dir(&group.dir) {
            if err.kind() != std::io::ErrorKind::NotFound {
                debug!(unit = %group.unit, "cgroup rmdir failed: {err}");
            }
        }
    }

    #[allow(unsafe_code)]
    fn spawn(
        &mut self,
        id: GroupId,
        command: &str,
        env: &[(String, String)],
    ) -> Result<Pid, PlatformError> {
        let group = self
            .groups
            .get(&id)
            .ok_or_else(|| PlatformError::Cgroup("no such group".into()))?;

        let spawn_err = |message: String| PlatformError::Spawn {
            command: command.to_string(),
            message,
        };

        let stdout = Stdio::from(group.pipe_w.try_clone().map_err(|e| spawn_err(e.to_string()))?);
        let stderr = Stdio::from(group.pipe_w.try_clone().map_err(|e| spawn_err(e.to_string()))?);

        // The procs file is opened in the parent; the child moves itself
        // into the group before exec by writing "0" to it.
        let procs = OpenOptions::new()
            .write(true)
            .open(group.dir.join("cgroup.procs"))
            .map_err(|e| spawn_err(e.to_string()))?;

        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        unsafe {
            cmd.pre_exec(move || (&procs).write_all(b"0\n"));
        }

        let child = cmd.spawn().map_err(|e| spawn_err(e.to_string()))?;
        // The SIGCHLD reaper collects the exit; the handle is not awaited.
        Ok(Pid::from_raw(child.id() as i32))
    }

    fn sendsig(&mut self, id: GroupId, signal: Signal, notify: SigtermNotify) {
        let Some(group) = self.groups.get(&id) else {
            return;
        };
        let pids = read_group_pids(&group.dir);
        for pid in signal_targets(&pids, notify) {
            if let Err(err) = kill(Pid::from_raw(pid), signal) {
                debug!(unit = %group.unit, pid, "kill failed: {err}");
            }
        }
    }

    fn freeze(&mut self, id: GroupId, frozen: bool) -> Result<(), PlatformError> {
        let group = self
            .groups
            .get(&id)
            .ok_or_else(|| PlatformError::Cgroup("no such group".into()))?;
        std::fs::write(
            group.dir.join("cgroup.freeze"),
            if frozen { "1\n" } else { "0\n" },
        )?;
        Ok(())
    }

    fn read_populated(&mut self, id: GroupId) -> bool {
        let Some(group) = self.group(id) else {
            return false;
        };
        group.populated = read_populated_file(&mut group.events_file);
        group.populated
    }

    fn watches_transferable(&self) -> bool {
        self.watches.lock().transferable()
    }

    fn prepare_transfer(&mut self, id: GroupId) -> Result<(RawFd, RawFd, RawFd), PlatformError> {
        let group = self
            .groups
            .get(&id)
            .ok_or_else(|| PlatformError::Cgroup("no such group".into()))?;
        let fds = (
            group.pipe_r.as_raw_fd(),
            group.pipe_w.as_raw_fd(),
            group.events_file.as_raw_fd(),
        );
        for fd in [fds.0, fds.1, fds.2] {
            fcntl(fd, FcntlArg::F_SETFD(FdFlag::empty()))
                .map_err(|e| PlatformError::Cgroup(e.to_string()))?;
        }
        Ok(fds)
    }

    #[allow(unsafe_code)]
    fn restore_group(
        &mut self,
        unit: &UnitName,
        pipe_r: RawFd,
        pipe_w: RawFd,
        events_fd: RawFd,
    ) -> Result<GroupId, PlatformError> {
        // These fds were inherited across exec; re-adopt and restore
        // close-on-exec.
        let (pipe_r, pipe_w, events) = unsafe {
            (
                OwnedFd::from_raw_fd(pipe_r),
                OwnedFd::from_raw_fd(pipe_w),
                OwnedFd::from_raw_fd(events_fd),
            )
        };
        for fd in [&pipe_r, &pipe_w, &events] {
            fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
        }
        fcntl(pipe_r.as_raw_fd(), FcntlArg::F_SETFL(OFlag::O_NONBLOCK))?;

        let dir = cgroup::unit_dir(&self.base, unit);
        self.install_group(unit, dir, pipe_r, pipe_w, File::from(events))
    }

    fn on_watch_event(&mut self, event: &WatchEvent) -> Option<(UnitName, bool)> {
        let id = *self.watch_index.get(&event.key)?;
        let group = self.groups.get_mut(&id)?;
        if event.is_ignored() {
            group.watch_key = None;
            self.watch_index.remove(&event.key);
            return None;
        }
        let populated = read_populated_file(&mut group.events_file);
        if populated == group.populated {
            return None;
        }
        group.populated = populated;
        Some((group.unit.clone(), populated))
    }
}

/// Re-read `cgroup.events` through a retained fd.
fn read_populated_file(file: &mut File) -> bool {
    let mut content = String::new();
    if file.seek(SeekFrom::Start(0)).is_err() {
        return false;
    }
    if file.read_to_string(&mut content).is_err() {
        return false;
    }
    cgroup::parse_populated(&content)
}

/// The pids currently in the group.
fn read_group_pids(dir: &std::path::Path) -> Vec<i32> {
    std::fs::read_to_string(dir.join("cgroup.procs"))
        .unwrap_or_default()
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}

/// Apply the sigterm-notify policy to the group's pid list.
///
/// `parents` skips any pid whose parent is also in the group and runs the
/// same executable; the parent is expected to forward the signal.
fn signal_targets(pids: &[i32], notify: SigtermNotify) -> Vec<i32> {
    match notify {
        SigtermNotify::All => pids.to_vec(),
        SigtermNotify::Parents => pids
            .iter()
            .copied()
            .filter(|&pid| {
                let Some(ppid) = read_ppid(pid) else {
                    return true;
                };
                if !pids.contains(&ppid) {
                    return true;
                }
                exe_of(pid) != exe_of(ppid)
            })
            .collect(),
    }
}

fn read_ppid(pid: i32) -> Option<i32> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    parse_ppid(&stat)
}

/// Parse the ppid out of `/proc/<pid>/stat`; the comm field is
/// parenthesised and may itself contain spaces or parentheses.
fn parse_ppid(stat: &str) -> Option<i32> {
    let after_comm = &stat[stat.rfind(')')? + 1..];
    after_comm.split_whitespace().nth(1)?.parse().ok()
}

fn exe_of(pid: i32) -> Option<PathBuf> {
    std::fs::read_link(format!("/proc/{pid}/exe")).ok()
}

/// Forward merged stdout/stderr lines into the engine loop.
fn spawn_output_reader(
    pipe_r: &OwnedFd,
    unit: UnitName,
    tx: UnboundedSender<PlatformEvent>,
) -> Result<JoinHandle<()>, PlatformError> {
    let dup = pipe_r.try_clone()?;
    let receiver = tokio::net::unix::pipe::Receiver::from_owned_fd(dup)?;
    Ok(tokio::spawn(forward_output(receiver, unit, tx)))
}

async fn forward_output(
    mut receiver: tokio::net::unix::pipe::Receiver,
    unit: UnitName,
    tx: UnboundedSender<PlatformEvent>,
) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match receiver.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let text = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
                    if tx
                        .send(PlatformEvent::Output {
                            unit: unit.clone(),
                            line: text,
                        })
                        .is_err()
                    {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "sys_tests.rs"]
mod tests;
