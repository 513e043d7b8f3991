// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The privileged control socket.
//!
//! Each accepted connection carries one request. The connection task
//! parses it, forwards an intent to the engine, writes the status line
//! back, then relays streamed output until the engine finishes the
//! request. A malformed request just closes the connection.

use crate::engine::{Intent, Reply, RequestReply};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error};
use warden_wire::{read_request, write_line, write_status, ProtocolError, Request};

/// Accept loop for the control socket.
pub struct Listener {
    socket: UnixListener,
    intents: UnboundedSender<Intent>,
}

impl Listener {
    pub fn new(socket: UnixListener, intents: UnboundedSender<Intent>) -> Self {
        Self { socket, intents }
    }

    /// Run until the daemon exits (or re-execs, which closes the socket).
    pub async fn run(self) {
        loop {
            match self.socket.accept().await {
                Ok((stream, _)) => {
                    let intents = self.intents.clone();
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(stream, intents).await {
                            debug!("connection closed: {err}");
                        }
                    });
                }
                Err(err) => error!("accept failed: {err}"),
            }
        }
    }
}

async fn handle_connection(
    stream: UnixStream,
    intents: UnboundedSender<Intent>,
) -> Result<(), ProtocolError> {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let request = read_request(&mut reader).await?;

    // Re-exec has no response; the exec itself closes the connection.
    if request == Request::Reexec {
        let _ = intents.send(Intent::Reexec);
        return Ok(());
    }

    let (reply, status_rx, mut stream_rx) = RequestReply::channel();
    let intent = match request {
        Request::Start { name } => Intent::Start { name, reply },
        Request::Stop { name } => Intent::Stop { name, reply },
        Request::Restart { name } => Intent::Restart { name, reply },
        Request::Reload { name } => Intent::Reload { name, reply },
        Request::SetRunlevel { name } => Intent::SetRunlevel { name, reply },
        Request::GetRunlevel => Intent::GetRunlevel { reply },
        Request::Status => Intent::Status { reply },
        Request::Freeze { name } => Intent::Freeze { name, reply },
        Request::Thaw { name } => Intent::Thaw { name, reply },
        Request::Reexec => return Ok(()),
    };

    if intents.send(intent).is_err() {
        return Ok(());
    }

    // The engine answers the status line first; a rejection ends the
    // conversation there.
    let status = match status_rx.await {
        Ok(status) => status,
        Err(_) => return Ok(()),
    };
    let rejected = !status.is_empty();
    write_status(&mut writer, &status).await?;
    if rejected {
        return Ok(());
    }

    while let Some(reply) = stream_rx.recv().await {
        match reply {
            Reply::Output(line) => write_line(&mut writer, &line).await?,
            Reply::Done(line) => {
                write_line(&mut writer, &line).await?;
                break;
            }
            Reply::Eof => break,
        }
    }
    writer.shutdown().await.ok();
    Ok(())
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
