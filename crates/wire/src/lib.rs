// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! warden-wire: the privileged control-socket protocol.
//!
//! Wire format: a verb on one line, arguments on subsequent lines, arity
//! fixed per verb. Responses start with a status line: empty means the
//! request was accepted, anything else is a human-readable rejection,
//! optionally followed by streamed output and a verb-specific terminal
//! line.

mod request;
mod response;
mod status;

pub use request::{read_request, Request};
pub use response::{
    read_line, write_line, write_status, ACCEPTED, START_FAILED, START_OK,
};
pub use status::StatusEntry;

use thiserror::Error;

/// Longest accepted protocol line, bytes. Anything longer is a malformed
/// request and closes the connection.
pub const MAX_LINE: usize = 4096;

/// Errors from protocol framing.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection closed mid-request")]
    UnexpectedEof,

    #[error("protocol line exceeds {MAX_LINE} bytes")]
    LineTooLong,

    #[error("unknown request verb: {0}")]
    UnknownVerb(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
