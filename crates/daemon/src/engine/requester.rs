// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-socket requester plumbing.
//!
//! A connection that asked for something holds two channels: a oneshot for
//! the initial status line and a stream for carbon-copied unit output plus
//! the terminal reply. The engine owns the [`Requester`] half while the
//! operation is in flight; dropping it closes the stream, which the
//! connection observes as EOF.

use tokio::sync::{mpsc, oneshot};
use warden_wire::{START_FAILED, START_OK};

/// What flows back over a requester's stream after acceptance.
#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    /// A line of unit output, forwarded while the operation runs.
    Output(String),
    /// Terminal line, then end of stream.
    Done(String),
    /// End of stream with no terminal line.
    Eof,
}

/// Which terminal convention the requester expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequesterKind {
    /// `start`: terminal line "0" (started) or "1" (ended up stopped).
    Start,
    /// `stop` / `setrunlevel`: completion is EOF.
    Stop,
    /// `restart` / `reload`: terminal line is the raw wait status.
    Command,
}

/// The engine-held half of a connection.
#[derive(Debug)]
pub struct Requester {
    pub kind: RequesterKind,
    stream: mpsc::UnboundedSender<Reply>,
}

impl Requester {
    /// Forward a line of unit output.
    pub fn output(&self, line: &str) {
        let _ = self.stream.send(Reply::Output(line.to_string()));
    }

    /// Send the terminal reply appropriate for this requester's kind.
    pub fn finish(self, outcome: Outcome) {
        let reply = match (self.kind, outcome) {
            (RequesterKind::Start, Outcome::Started) => Reply::Done(START_OK.to_string()),
            (RequesterKind::Start, _) => Reply::Done(START_FAILED.to_string()),
            (RequesterKind::Command, Outcome::ExitStatus(code)) => Reply::Done(code.to_string()),
            (RequesterKind::Command, _) => Reply::Done((-1).to_string()),
            (RequesterKind::Stop, _) => Reply::Eof,
        };
        let _ = self.stream.send(reply);
    }
}

/// How an operation ended, from the requester's point of view.
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Started,
    Stopped,
    ExitStatus(i32),
}

/// The intent-side bundle: status oneshot plus the reply stream.
#[derive(Debug)]
pub struct RequestReply {
    status: oneshot::Sender<String>,
    stream: mpsc::UnboundedSender<Reply>,
}

impl RequestReply {
    /// Build a reply bundle along with the connection-side receivers.
    pub fn channel() -> (Self, oneshot::Receiver<String>, mpsc::UnboundedReceiver<Reply>) {
        let (status_tx, status_rx) = oneshot::channel();
        let (stream_tx, stream_rx) = mpsc::unbounded_channel();
        (
            Self {
                status: status_tx,
                stream: stream_tx,
            },
            status_rx,
            stream_rx,
        )
    }

    /// Reject with a message; the stream closes unused.
    pub fn reject(self, message: String) {
        let _ = self.status.send(message);
    }

    /// Accept and keep streaming: sends the empty status line and returns
    /// the requester the engine parks in the unit's state.
    pub fn accept(self, kind: RequesterKind) -> Requester {
        let _ = self.status.send(String::new());
        Requester {
            kind,
            stream: self.stream,
        }
    }

    /// Accept and immediately finish with `outcome`.
    pub fn accept_and_finish(self, kind: RequesterKind, outcome: Outcome) {
        self.accept(kind).finish(outcome);
    }

    /// Accept, emit the given lines, and close. Used by `getrunlevel`,
    /// `status`, `freeze`, `thaw`.
    pub fn accept_with_lines<I>(self, lines: I)
    where
        I: IntoIterator<Item = String>,
    {
        let requester = self.accept(RequesterKind::Stop);
        for line in lines {
            requester.output(&line);
        }
        requester.finish(Outcome::Stopped);
    }
}
