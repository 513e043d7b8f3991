// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The re-exec payload.
//!
//! When the daemon execs itself, supervised state crosses over on an
//! inherited pipe whose read end is named in the `REEXEC_FD` environment
//! variable. One newline-terminated record per started unit:
//!
//! ```text
//! name state start_time dependency pipe_r pipe_w events_fd [respawn_pid]
//! ```
//!
//! An empty line terminates the payload. Unit names may contain spaces, so
//! records parse from the right: the trailing fields are numeric and the
//! state tag in front of them is the first non-numeric token.

use std::os::fd::RawFd;

/// Name of the environment variable carrying the payload pipe's read end.
pub const REEXEC_FD: &str = "REEXEC_FD";

/// One unit's preserved state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReexecRecord {
    pub name: String,
    pub state: String,
    pub start_time: u64,
    pub dependency: bool,
    pub pipe_r: RawFd,
    pub pipe_w: RawFd,
    pub events_fd: RawFd,
    pub respawn_pid: Option<i32>,
}

impl ReexecRecord {
    pub fn to_line(&self) -> String {
        let mut line = format!(
            "{} {} {} {} {} {} {}",
            self.name,
            self.state,
            self.start_time,
            if self.dependency { 1 } else { 0 },
            self.pipe_r,
            self.pipe_w,
            self.events_fd,
        );
        if let Some(pid) = self.respawn_pid {
            line.push(' ');
            line.push_str(&pid.to_string());
        }
        line
    }

    pub fn parse(line: &str) -> Option<Self> {
        let tokens: Vec<&str> = line.split(' ').collect();

        // Count the numeric tail, then expect the state tag just before it.
        let mut numeric = 0;
        while numeric < tokens.len() && tokens[tokens.len() - 1 - numeric].parse::<i64>().is_ok()
        {
            numeric += 1;
        }
        if !(5..=6).contains(&numeric) {
            return None;
        }
        let state_index = tokens.len().checked_sub(numeric + 1)?;
        if state_index == 0 {
            return None; // no name
        }
        let state = tokens[state_index];
        if state != "started" && state != "stopped" {
            return None;
        }

        let tail = &tokens[state_index + 1..];
        let mut fields = tail.iter();
        let mut next_num = || -> Option<i64> { fields.next()?.parse().ok() };

        let start_time = next_num()?;
        let dependency = match next_num()? {
            0 => false,
            1 => true,
            _ => return None,
        };
        let pipe_r = next_num()? as RawFd;
        let pipe_w = next_num()? as RawFd;
        let events_fd = next_num()? as RawFd;
        let respawn_pid = if numeric == 6 {
            Some(next_num()? as i32)
        } else {
            None
        };

        Some(Self {
            name: tokens[..state_index].join(" "),
            state: state.to_string(),
            start_time: start_time as u64,
            dependency,
            pipe_r,
            pipe_w,
            events_fd,
            respawn_pid,
        })
    }
}

/// The full payload: every transferable unit's record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReexecPayload {
    pub records: Vec<ReexecRecord>,
}

impl ReexecPayload {
    /// Serialise, with the terminating empty line.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        for record in &self.records {
            out.push_str(&record.to_line());
            out.push('\n');
        }
        out.push('\n');
        out
    }

    /// Parse until the empty-line terminator; malformed records are
    /// dropped rather than poisoning the rest.
    pub fn parse(input: &str) -> Self {
        let mut records = Vec::new();
        for line in input.lines() {
            if line.is_empty() {
                break;
            }
            if let Some(record) = ReexecRecord::parse(line) {
                records.push(record);
            }
        }
        Self { records }
    }
}

#[cfg(test)]
#[path = "reexec_tests.rs"]
mod tests;
