// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The re-exec gate and the restore path, driven through the engine.

use super::test_support::*;
use super::{InstallMode, Intent, ReexecPayload};
use warden_core::StartType;

fn respawn_spec() -> warden_core::UnitSpec {
    let mut spec = spec("svc");
    spec.start_type = StartType::Respawn;
    spec.starting_command = Some("sleep 3600".into());
    spec
}

fn request_reexec(engine: &mut TestEngine) {
    engine.handle_intent(Intent::Reexec);
}

#[test]
fn reexec_with_everything_stopped_is_immediate() {
    let (mut engine, _clock) = engine();
    install(&mut engine, vec![spec("a")]);

    request_reexec(&mut engine);
    let payload = engine.check_reexec().unwrap();
    assert!(payload.records.is_empty());
}

#[test]
fn started_units_are_serialised() {
    let (mut engine, _clock) = engine();
    install(&mut engine, vec![respawn_spec(), spec("other")]);
    start(&mut engine, "svc").assert_accepted();
    let pid = last_pid(&mut engine);

    request_reexec(&mut engine);
    let payload = engine.check_reexec().unwrap();
    assert_eq!(payload.records.len(), 1);

    let record = &payload.records[0];
    assert_eq!(record.name, "svc");
    assert_eq!(record.state, "started");
    assert!(!record.dependency);
    assert_eq!(record.respawn_pid, Some(pid.as_raw()));

    // The payload survives its own wire format.
    assert_eq!(ReexecPayload::parse(&payload.encode()), payload);
}

#[test]
fn reexec_is_delayed_while_a_runner_is_in_flight() {
    let (mut engine, _clock) = engine();
    let mut a = spec("a");
    a.starting_command = Some("/bin/a".into());
    install(&mut engine, vec![a]);
    start(&mut engine, "a").assert_accepted();

    request_reexec(&mut engine);
    assert!(engine.check_reexec().is_none());

    // Once the start settles, the re-exec goes through.
    let pid = last_pid(&mut engine);
    exit_runner(&mut engine, pid, 0);
    assert!(engine.check_reexec().is_some());
}

#[test]
fn reexec_is_delayed_while_a_reload_runner_is_in_flight() {
    let (mut engine, _clock) = engine();
    let mut a = spec("a");
    a.restarting_command = Some("/bin/r".into());
    install(&mut engine, vec![a]);
    start(&mut engine, "a").assert_accepted();
    restart(&mut engine, "a").assert_accepted();

    request_reexec(&mut engine);
    assert!(engine.check_reexec().is_none());

    let pid = last_pid(&mut engine);
    exit_runner(&mut engine, pid, 0);
    assert!(engine.check_reexec().is_some());
}

#[test]
fn reexec_is_delayed_while_watches_are_in_flight() {
    let (mut engine, _clock) = engine();
    install(&mut engine, vec![spec("a")]);
    engine.platform_mut().transferable = false;

    request_reexec(&mut engine);
    assert!(engine.check_reexec().is_none());

    engine.platform_mut().transferable = true;
    assert!(engine.check_reexec().is_some());
}

#[test]
fn restore_rebuilds_a_started_unit_with_its_pid() {
    // First incarnation.
    let (mut engine1, _clock1) = engine();
    install(&mut engine1, vec![respawn_spec()]);
    start(&mut engine1, "svc").assert_accepted();
    let pid = last_pid(&mut engine1);
    request_reexec(&mut engine1);
    let payload = engine1.check_reexec().unwrap();

    // Second incarnation: fresh engine, same configuration.
    let (mut engine2, _clock2) = engine();
    engine2.platform_mut().restored_populated = true;
    engine2.install(vec![respawn_spec()], InstallMode::Initial, Some(payload));

    assert_eq!(label(&engine2, "svc"), "started (manual)");
    assert!(engine2.group_populated("svc").unwrap());
    assert_eq!(engine2.platform_mut().restored.len(), 1);
    // No new process was forked.
    assert!(engine2.platform_mut().spawns.is_empty());

    // The preserved pid reconnected: its exit drives the respawn policy.
    exit_runner(&mut engine2, pid, 0);
    assert_eq!(label(&engine2, "svc"), "respawning (manual)");
}

#[test]
fn restored_dependency_flag_is_preserved() {
    let (mut engine1, _clock1) = engine();
    let mut a = spec("a");
    a.requires.insert(name("b"));
    install(&mut engine1, vec![a.clone(), spec("b")]);
    start(&mut engine1, "a").assert_accepted();
    request_reexec(&mut engine1);
    let payload = engine1.check_reexec().unwrap();

    let (mut engine2, _clock2) = engine();
    engine2.platform_mut().restored_populated = true;
    engine2.install(vec![a, spec("b")], InstallMode::Initial, Some(payload));

    assert_eq!(label(&engine2, "a"), "started (manual)");
    assert_eq!(label(&engine2, "b"), "started (dependency)");
}

#[test]
fn payload_units_missing_from_the_config_are_dropped() {
    let (mut engine1, _clock1) = engine();
    install(&mut engine1, vec![spec("gone")]);
    start(&mut engine1, "gone").assert_accepted();
    request_reexec(&mut engine1);
    let payload = engine1.check_reexec().unwrap();
    assert_eq!(payload.records.len(), 1);

    let (mut engine2, _clock2) = engine();
    engine2.install(vec![spec("kept")], InstallMode::Initial, Some(payload));

    assert!(engine2.unit_names().contains(&"kept"));
    assert!(!engine2.unit_names().contains(&"gone"));
    assert!(engine2.platform_mut().restored.is_empty());
}

#[test]
fn config_units_missing_from_the_payload_start_stopped() {
    let (mut engine1, _clock1) = engine();
    install(&mut engine1, vec![spec("a")]);
    request_reexec(&mut engine1);
    let payload = engine1.check_reexec().unwrap();

    let (mut engine2, _clock2) = engine();
    engine2.install(
        vec![spec("a"), spec("newcomer")],
        InstallMode::Initial,
        Some(payload),
    );
    assert_eq!(label(&engine2, "newcomer"), "stopped");
    assert_eq!(label(&engine2, "a"), "stopped");
}

#[test]
fn restored_group_that_drained_gets_its_edge() {
    let (mut engine1, _clock1) = engine();
    let mut a = spec("a");
    a.start_type = warden_core::StartType::Oneshot;
    a.starting_command = Some("/bin/a".into());
    a.stop_type = warden_core::StopType::Automatic;
    install(&mut engine1, vec![a.clone()]);
    start(&mut engine1, "a").assert_accepted();
    let pid = last_pid(&mut engine1);
    exit_runner(&mut engine1, pid, 0);
    request_reexec(&mut engine1);
    let payload = engine1.check_reexec().unwrap();

    // Everything in the group died while nobody was supervising.
    let (mut engine2, _clock2) = engine();
    engine2.platform_mut().restored_populated = false;
    engine2.install(vec![a], InstallMode::Initial, Some(payload));

    // The synthesised edge walked the automatic unit down.
    assert_eq!(label(&engine2, "a"), "stopped");
}
