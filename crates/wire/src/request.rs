// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request parsing.

use crate::response::read_line;
use crate::ProtocolError;
use tokio::io::AsyncBufRead;

/// A parsed control-socket request.
///
/// Unit and runlevel names are carried as raw strings; validation is the
/// daemon's job, and the rejection travels back on the status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Start { name: String },
    Stop { name: String },
    Restart { name: String },
    Reload { name: String },
    SetRunlevel { name: String },
    GetRunlevel,
    Status,
    Freeze { name: String },
    Thaw { name: String },
    Reexec,
}

impl Request {
    pub fn verb(&self) -> &'static str {
        match self {
            Request::Start { .. } => "start",
            Request::Stop { .. } => "stop",
            Request::Restart { .. } => "restart",
            Request::Reload { .. } => "reload",
            Request::SetRunlevel { .. } => "setrunlevel",
            Request::GetRunlevel => "getrunlevel",
            Request::Status => "status",
            Request::Freeze { .. } => "freeze",
            Request::Thaw { .. } => "thaw",
            Request::Reexec => "reexec",
        }
    }

    /// Serialise to the wire form: verb line plus argument lines.
    pub fn encode(&self) -> String {
        match self {
            Request::Start { name }
            | Request::Stop { name }
            | Request::Restart { name }
            | Request::Reload { name }
            | Request::SetRunlevel { name }
            | Request::Freeze { name }
            | Request::Thaw { name } => format!("{}\n{}\n", self.verb(), name),
            Request::GetRunlevel | Request::Status | Request::Reexec => {
                format!("{}\n", self.verb())
            }
        }
    }
}

/// Read one request off a connection.
pub async fn read_request<R>(reader: &mut R) -> Result<Request, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let verb = read_line(reader).await?.ok_or(ProtocolError::UnexpectedEof)?;

    match verb.as_str() {
        "getrunlevel" => return Ok(Request::GetRunlevel),
        "status" => return Ok(Request::Status),
        "reexec" => return Ok(Request::Reexec),
        "start" | "stop" | "restart" | "reload" | "setrunlevel" | "freeze" | "thaw" => {}
        other => return Err(ProtocolError::UnknownVerb(other.to_string())),
    }

    // One-argument verbs read the unit (or runlevel) name from the next line.
    let name = read_line(reader).await?.ok_or(ProtocolError::UnexpectedEof)?;

    Ok(match verb.as_str() {
        "start" => Request::Start { name },
        "stop" => Request::Stop { name },
        "restart" => Request::Restart { name },
        "reload" => Request::Reload { name },
        "setrunlevel" => Request::SetRunlevel { name },
        "freeze" => Request::Freeze { name },
        _ => Request::Thaw { name },
    })
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
