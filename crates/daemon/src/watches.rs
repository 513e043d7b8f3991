// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inotify watch registry.
//!
//! One inotify instance serves the whole daemon. Watch handles are opaque
//! keys; events are drained into [`WatchEvent`]s carrying the key, so a
//! key that has been removed simply stops matching, so no callback outlives
//! its watch.
//!
//! Removing a watch leaves the kernel an `IN_IGNORED` acknowledgement to
//! deliver. Until every pending acknowledgement has drained, new watches
//! are queued rather than installed: a watch descriptor can be reused by
//! the kernel the moment the old one dies, and installing eagerly would
//! mis-route queued events from the previous owner. A queued add that
//! later fails synthesises an `IN_IGNORED` so the handle's terminal event
//! is still delivered.

use nix::sys::inotify::{AddWatchFlags, InitFlags, Inotify, WatchDescriptor};
use std::collections::{HashMap, HashSet, VecDeque};
use std::ffi::OsString;
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Opaque identity of one watch.
pub type WatchKey = u64;

/// Watch mask for monitoring a directory of unit files.
pub fn dir_mask() -> AddWatchFlags {
    AddWatchFlags::IN_CREATE
        | AddWatchFlags::IN_CLOSE_WRITE
        | AddWatchFlags::IN_DELETE
        | AddWatchFlags::IN_DELETE_SELF
        | AddWatchFlags::IN_ONLYDIR
        | AddWatchFlags::IN_MOVED_FROM
        | AddWatchFlags::IN_MOVED_TO
}

/// Watch mask for a file whose rewrites matter (`cgroup.events`).
pub fn file_modify_mask() -> AddWatchFlags {
    AddWatchFlags::IN_MODIFY
}

/// One drained event, already mapped to its watch key.
#[derive(Debug)]
pub struct WatchEvent {
    pub key: WatchKey,
    pub mask: AddWatchFlags,
    pub name: Option<OsString>,
}

impl WatchEvent {
    pub fn is_ignored(&self) -> bool {
        self.mask.contains(AddWatchFlags::IN_IGNORED)
    }
}

struct PendingAdd {
    key: WatchKey,
    path: PathBuf,
    mask: AddWatchFlags,
}

/// The process-wide inotify registry.
pub struct Watches {
    inotify: Inotify,
    installed: HashMap<WatchDescriptor, WatchKey>,
    descriptors: HashMap<WatchKey, WatchDescriptor>,
    pending_adds: VecDeque<PendingAdd>,
    pending_rms: HashSet<WatchDescriptor>,
    next_key: WatchKey,
}

impl Watches {
    pub fn new() -> nix::Result<Self> {
        let inotify = Inotify::init(InitFlags::IN_NONBLOCK | InitFlags::IN_CLOEXEC)?;
        Ok(Self {
            inotify,
            installed: HashMap::new(),
            descriptors: HashMap::new(),
            pending_adds: VecDeque::new(),
            pending_rms: HashSet::new(),
            next_key: 0,
        })
    }

    /// The inotify file descriptor, for readiness polling.
    pub fn raw_fd(&self) -> RawFd {
        self.inotify.as_fd().as_raw_fd()
    }

    /// Install a watch. Returns `None` when the path cannot be watched
    /// (typically: it does not exist): the falsy watch, which never
    /// produces an event.
    pub fn add(&mut self, path: &Path, mask: AddWatchFlags) -> Option<WatchKey> {
        self.next_key += 1;
        let key = self.next_key;

        if !self.pending_rms.is_empty() {
            self.pending_adds.push_back(PendingAdd {
                key,
                path: path.to_path_buf(),
                mask,
            });
            return Some(key);
        }

        match self.inotify.add_watch(path, mask) {
            Ok(wd) => {
                self.installed.insert(wd, key);
                self.descriptors.insert(key, wd);
                Some(key)
            }
            Err(_) => None,
        }
    }

    /// Remove a watch. Events already queued for it are dropped; further
    /// adds wait until the kernel acknowledges the removal.
    pub fn remove(&mut self, key: WatchKey) {
        self.pending_adds.retain(|pending| pending.key != key);
        if let Some(wd) = self.descriptors.remove(&key) {
            self.installed.remove(&wd);
            if self.inotify.rm_watch(wd).is_ok() {
                self.pending_rms.insert(wd);
            }
        }
    }

    /// Whether there is nothing in flight; required before a re-exec.
    pub fn transferable(&self) -> bool {
        self.pending_adds.is_empty() && self.pending_rms.is_empty()
    }

    /// Drain every queued kernel event, then resume any adds that were
    /// delayed behind pending removals.
    pub fn drain(&mut self) -> Vec<WatchEvent> {
        let mut events = Vec::new();

        loop {
            match self.inotify.read_events() {
                Ok(batch) => {
                    for event in batch {
                        let ignored = event.mask.contains(AddWatchFlags::IN_IGNORED);
                        if ignored {
                            self.pending_rms.remove(&event.wd);
                        }
                        if let Some(&key) = self.installed.get(&event.wd) {
                            if ignored {
                                self.installed.remove(&event.wd);
                                self.descriptors.remove(&key);
                            }
                            events.push(WatchEvent {
                                key,
                                mask: event.mask,
                                name: event.name,
                            });
                        }
                    }
                }
                Err(nix::errno::Errno::EAGAIN) => break,
                Err(err) => {
                    warn!("inotify read failed: {err}");
                    break;
                }
            }
        }

        while self.pending_rms.is_empty() {
            let Some(pending) = self.pending_adds.pop_front() else {
                break;
            };
            match self.inotify.add_watch(&pending.path, pending.mask) {
                Ok(wd) => {
                    self.installed.insert(wd, pending.key);
                    self.descriptors.insert(pending.key, wd);
                    // Delayed install: the path may have changed while the
                    // add was parked, so report a wildcard event.
                    events.push(WatchEvent {
                        key: pending.key,
                        mask: AddWatchFlags::empty(),
                        name: None,
                    });
                }
                Err(_) => {
                    events.push(WatchEvent {
                        key: pending.key,
                        mask: AddWatchFlags::IN_IGNORED,
                        name: None,
                    });
                }
            }
        }

        events
    }
}

/// Recursive monitoring of a configuration directory tree.
///
/// Subdirectories discovered through `IN_CREATE` get their own watches;
/// `IN_DELETE_SELF` / `IN_MOVE_SELF` tear them down.
pub struct DirMonitor {
    dirs: HashMap<WatchKey, PathBuf>,
}

impl DirMonitor {
    /// Watch `root` and everything under it.
    pub fn new(watches: &mut Watches, root: &Path) -> Self {
        let mut monitor = Self { dirs: HashMap::new() };
        monitor.watch_tree(watches, root);
        monitor
    }

    fn watch_tree(&mut self, watches: &mut Watches, dir: &Path) {
        if let Some(key) = watches.add(dir, dir_mask()) {
            self.dirs.insert(key, dir.to_path_buf());
        } else {
            warn!("{}: cannot open directory for monitoring", dir.display());
            return;
        }
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                self.watch_tree(watches, &entry.path());
            }
        }
    }

    /// Process one drained event. Returns the path whose contents changed,
    /// if this event belongs to the monitor and is interesting.
    pub fn handle(&mut self, watches: &mut Watches, event: &WatchEvent) -> Option<PathBuf> {
        let dir = self.dirs.get(&event.key)?.clone();

        if event.mask.intersects(
            AddWatchFlags::IN_IGNORED
                | AddWatchFlags::IN_DELETE_SELF
                | AddWatchFlags::IN_MOVE_SELF,
        ) {
            self.dirs.remove(&event.key);
            if !event.is_ignored() {
                watches.remove(event.key);
            }
            return Some(dir);
        }

        let changed = event
            .name
            .as_ref()
            .map(|name| dir.join(name))
            .unwrap_or_else(|| dir.clone());

        if event.mask.contains(AddWatchFlags::IN_CREATE) && changed.is_dir() {
            self.watch_tree(watches, &changed);
        }

        Some(changed)
    }
}

#[cfg(test)]
#[path = "watches_tests.rs"]
mod tests;
