// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::ProtocolError;
use std::io::Cursor;
use tokio::io::BufReader;

async fn parse(input: &str) -> Result<Request, ProtocolError> {
    let mut reader = BufReader::new(Cursor::new(input.as_bytes().to_vec()));
    read_request(&mut reader).await
}

#[tokio::test]
async fn parses_valid_requests() {
    let cases = [
        ("start\ngetty\n", Request::Start { name: "getty".into() }),
        ("stop\ngetty\n", Request::Stop { name: "getty".into() }),
        ("restart\nnet/dhcp\n", Request::Restart { name: "net/dhcp".into() }),
        ("reload\nsshd\n", Request::Reload { name: "sshd".into() }),
        ("setrunlevel\ndefault\n", Request::SetRunlevel { name: "default".into() }),
        ("freeze\ngetty\n", Request::Freeze { name: "getty".into() }),
        ("thaw\ngetty\n", Request::Thaw { name: "getty".into() }),
        ("getrunlevel\n", Request::GetRunlevel),
        ("status\n", Request::Status),
        ("reexec\n", Request::Reexec),
    ];
    for (input, expected) in cases {
        assert_eq!(parse(input).await.unwrap(), expected, "input {input:?}");
    }
}

#[tokio::test]
async fn encode_round_trips() {
    let requests = [
        Request::Start { name: "a".into() },
        Request::Stop { name: "b/c".into() },
        Request::SetRunlevel { name: "3".into() },
        Request::GetRunlevel,
        Request::Reexec,
    ];
    for request in requests {
        let parsed = parse(&request.encode()).await.unwrap();
        assert_eq!(parsed, request);
    }
}

#[tokio::test]
async fn unknown_verb_is_rejected() {
    let err = parse("explode\n").await.unwrap_err();
    assert!(matches!(err, ProtocolError::UnknownVerb(v) if v == "explode"));
}

#[tokio::test]
async fn missing_argument_is_eof() {
    let err = parse("start\n").await.unwrap_err();
    assert!(matches!(err, ProtocolError::UnexpectedEof));
}

#[tokio::test]
async fn empty_stream_is_eof() {
    let err = parse("").await.unwrap_err();
    assert!(matches!(err, ProtocolError::UnexpectedEof));
}

#[tokio::test]
async fn oversized_line_is_rejected() {
    let input = format!("start\n{}\n", "x".repeat(crate::MAX_LINE + 10));
    let err = parse(&input).await.unwrap_err();
    assert!(matches!(err, ProtocolError::LineTooLong));
}

#[tokio::test]
async fn unit_names_with_spaces_survive() {
    let parsed = parse("setrunlevel\nsystem/runlevel multi-user\n").await.unwrap();
    assert_eq!(
        parsed,
        Request::SetRunlevel { name: "system/runlevel multi-user".into() }
    );
}
