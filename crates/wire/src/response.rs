// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Response framing helpers.
//!
//! Every request is answered with a status line first: [`ACCEPTED`] (an
//! empty line) when the daemon took the request, otherwise a human-readable
//! message. `start` ends with a terminal result line, [`START_OK`] or
//! [`START_FAILED`]; `restart`/`reload` end with the command's wait status
//! in decimal; `stop` and `setrunlevel` signal completion by closing the
//! stream.

use crate::{ProtocolError, MAX_LINE};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// The status line sent when a request is accepted.
pub const ACCEPTED: &str = "";

/// Terminal line of a `start` whose unit reached the started state.
pub const START_OK: &str = "0";

/// Terminal line of a `start` whose unit ended up stopped.
pub const START_FAILED: &str = "1";

/// Read one newline-terminated line, without the terminator.
///
/// Returns `None` at a clean end of stream.
pub async fn read_line<R>(reader: &mut R) -> Result<Option<String>, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let mut limited = reader.take(MAX_LINE as u64 + 1);
    let n = limited.read_line(&mut line).await?;
    if n == 0 {
        return Ok(None);
    }
    if !line.ends_with('\n') && n > MAX_LINE {
        return Err(ProtocolError::LineTooLong);
    }
    while line.ends_with('\n') {
        line.pop();
    }
    Ok(Some(line))
}

/// Write one line, appending the terminator.
pub async fn write_line<W>(writer: &mut W, line: &str) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    Ok(())
}

/// Write the initial status line.
pub async fn write_status<W>(writer: &mut W, status: &str) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    write_line(writer, status).await
}
