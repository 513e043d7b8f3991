// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end exercises of the control socket against an engine on the
//! fake platform.

use super::Listener;
use crate::engine::test_support::{self, TestEngine};
use crate::engine::Intent;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;

/// Bind a socket, spawn the listener, and run a minimal engine loop.
async fn daemon_with_unit() -> std::path::PathBuf {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("priv.sock");
    // Leak the tempdir so the socket outlives this helper.
    std::mem::forget(dir);

    let socket = UnixListener::bind(&socket_path).unwrap();
    let (intents_tx, mut intents_rx) = mpsc::unbounded_channel::<Intent>();
    tokio::spawn(Listener::new(socket, intents_tx).run());

    tokio::spawn(async move {
        let (mut engine, _clock): (TestEngine, _) = test_support::engine();
        test_support::install(&mut engine, vec![test_support::spec("a")]);
        while let Some(intent) = intents_rx.recv().await {
            engine.handle_intent(intent);
        }
    });

    socket_path
}

async fn roundtrip(socket: &std::path::Path, request: &str) -> String {
    let mut stream = UnixStream::connect(socket).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn start_round_trip_over_the_socket() {
    let socket = daemon_with_unit().await;

    // Accepted (empty status line), then the terminal "0".
    let response = roundtrip(&socket, "start\na\n").await;
    assert_eq!(response, "\n0\n");
}

#[tokio::test]
async fn rejection_carries_the_message() {
    let socket = daemon_with_unit().await;

    let response = roundtrip(&socket, "start\nghost\n").await;
    assert_eq!(response, "ghost: unknown unit\n");
}

#[tokio::test]
async fn stop_ends_with_eof_after_completion() {
    let socket = daemon_with_unit().await;

    roundtrip(&socket, "start\na\n").await;
    let response = roundtrip(&socket, "stop\na\n").await;
    // Accepted, then EOF with no terminal line.
    assert_eq!(response, "\n");
}

#[tokio::test]
async fn status_lists_units() {
    let socket = daemon_with_unit().await;

    let response = roundtrip(&socket, "status\n").await;
    assert!(response.starts_with('\n'), "status line first: {response:?}");
    assert!(response.contains("name=\"a\":state=\"stopped\":enabled=1"));
}

#[tokio::test]
async fn malformed_requests_close_the_connection() {
    let socket = daemon_with_unit().await;

    let response = roundtrip(&socket, "explode\n").await;
    assert_eq!(response, "");
}
