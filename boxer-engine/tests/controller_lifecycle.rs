//! Integration test: lifecycle transitions driven by real processes.
//!
//! Uses `true`, `false`, `echo`, and `sh` as stand-in hypervisor commands, so
//! it runs on any Unix host without a hypervisor installed.

use std::io::{Read, Seek};
use std::path::Path;
use std::time::{Duration, Instant};

use boxer_core::{ControlPolicy, Operation, VmControl, VmInfo, VmState};
use boxer_engine::{CommandController, EngineError, ProcessIo, VmContext, VmController};

const INTERVAL_SEC: u64 = 1;

fn policy(timeout_sec: u64) -> ControlPolicy {
    ControlPolicy::new(INTERVAL_SEC, timeout_sec, 3)
}

fn controller(start: &str, stop: &str, restore: &str) -> CommandController {
    CommandController::new(
        VmControl::new(start, stop, restore),
        policy(30),
        ProcessIo::Null,
        ProcessIo::Null,
    )
}

fn succeeding() -> CommandController {
    controller("true $machine", "true $machine", "true $machine $snapshot")
}

fn context(name: &str) -> VmContext {
    VmContext::new(VmInfo::new(name, "snapshot0", "10.0.0.11", "linux", "g1"))
}

fn write_script(dir: &Path, body: &str) -> String {
    let path = dir.join("command.sh");
    std::fs::write(&path, body).unwrap_or_else(|e| panic!("write script failed: {e}"));
    path.to_string_lossy().into_owned()
}

#[tokio::test]
async fn start_stop_restore_follow_transition_table() {
    let ctl = succeeding();
    let vm = context("vm1");

    ctl.start(&vm).await.unwrap_or_else(|e| panic!("start failed: {e}"));
    assert_eq!(vm.state(), VmState::Running);

    ctl.stop(&vm).await.unwrap_or_else(|e| panic!("stop failed: {e}"));
    assert_eq!(vm.state(), VmState::Stopped);

    ctl.restore(&vm).await.unwrap_or_else(|e| panic!("restore failed: {e}"));
    assert_eq!(vm.state(), VmState::Stopped, "restore settles back in STOPPED");
}

#[tokio::test]
async fn execute_dispatches_by_operation() {
    let ctl = succeeding();
    let vm = context("vm1");
    ctl.execute(Operation::Start, &vm)
        .await
        .unwrap_or_else(|e| panic!("execute(start) failed: {e}"));
    assert_eq!(vm.state(), VmState::Running);
}

#[tokio::test]
async fn wrong_state_is_rejected_without_side_effects() {
    let ctl = succeeding();
    let vm = context("vm1");
    let stamp = vm.updated_at();

    match ctl.stop(&vm).await {
        Err(EngineError::InvalidState { operation, current, expected, .. }) => {
            assert_eq!(operation, Operation::Stop);
            assert_eq!(current, VmState::Stopped);
            assert_eq!(expected, VmState::Running);
        }
        other => panic!("expected InvalidState, got {other:?}"),
    }
    assert_eq!(vm.state(), VmState::Stopped, "state must not change");
    assert_eq!(vm.updated_at(), stamp, "a rejected operation must not touch the context");

    // The lock was never taken, so the next command runs without a cool-down.
    let start = Instant::now();
    ctl.start(&vm).await.unwrap_or_else(|e| panic!("start failed: {e}"));
    assert!(start.elapsed() < Duration::from_secs(INTERVAL_SEC));
}

#[tokio::test]
async fn nonzero_exit_moves_vm_to_error() {
    let ctl = controller("false $machine", "true $machine", "true $machine $snapshot");
    let vm = context("vm1");

    match ctl.start(&vm).await {
        Err(EngineError::System { operation, machine, reason }) => {
            assert_eq!(operation, Operation::Start);
            assert_eq!(machine, "vm1");
            assert!(reason.contains("code 1"), "reason should carry the exit code: {reason}");
        }
        other => panic!("expected System error, got {other:?}"),
    }
    assert_eq!(vm.state(), VmState::Error);

    // ERROR is terminal for every operation.
    for op in Operation::ALL {
        assert!(
            matches!(
                ctl.execute(op, &vm).await,
                Err(EngineError::InvalidState { current: VmState::Error, .. })
            ),
            "{op} must be refused from ERROR"
        );
    }
}

#[tokio::test]
async fn launch_failure_moves_vm_to_error() {
    let ctl = controller(
        "boxer-missing-hypervisor $machine",
        "true $machine",
        "true $machine $snapshot",
    );
    let vm = context("vm1");
    assert!(matches!(ctl.start(&vm).await, Err(EngineError::System { .. })));
    assert_eq!(vm.state(), VmState::Error);
}

#[tokio::test]
async fn failed_restore_leaves_error_not_restoring() {
    let ctl = controller("true $machine", "true $machine", "false $machine $snapshot");
    let vm = context("vm1");
    assert!(matches!(ctl.restore(&vm).await, Err(EngineError::System { .. })));
    assert_eq!(vm.state(), VmState::Error);
}

#[tokio::test]
async fn overrunning_command_times_out_and_is_killed() {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
    let script = write_script(dir.path(), "exec sleep 30\n");
    let ctl = CommandController::new(
        VmControl::new(format!("sh {script} $machine"), "true $machine", "true $machine $snapshot"),
        policy(1),
        ProcessIo::Null,
        ProcessIo::Null,
    );
    let vm = context("vm1");

    let start = Instant::now();
    match ctl.start(&vm).await {
        Err(EngineError::Timeout { operation, timeout, .. }) => {
            assert_eq!(operation, Operation::Start);
            assert_eq!(timeout, Duration::from_secs(1));
        }
        other => panic!("expected Timeout, got {other:?}"),
    }
    assert!(start.elapsed() < Duration::from_secs(10), "the child must not run to completion");
    assert_eq!(vm.state(), VmState::Error);
}

#[tokio::test]
async fn consecutive_commands_are_spaced_by_interval() {
    let ctl = succeeding();
    let first = context("vm1");
    let second = context("vm2");

    let start = Instant::now();
    let (a, b) = tokio::join!(ctl.start(&first), ctl.start(&second));
    let elapsed = start.elapsed();

    a.unwrap_or_else(|e| panic!("first start failed: {e}"));
    b.unwrap_or_else(|e| panic!("second start failed: {e}"));
    assert!(
        elapsed >= Duration::from_secs(INTERVAL_SEC),
        "two commands completed {elapsed:?} apart, inside the cool-down"
    );
}

#[tokio::test]
async fn substituted_arguments_reach_the_process() {
    let mut out = tempfile::tempfile().unwrap_or_else(|e| panic!("tempfile failed: {e}"));
    let sink = out.try_clone().unwrap_or_else(|e| panic!("clone failed: {e}"));
    let ctl = CommandController::new(
        VmControl::new(
            "echo start $machine",
            "echo stop $machine",
            "echo restore $machine $snapshot",
        ),
        policy(30),
        ProcessIo::Null,
        ProcessIo::file(sink),
    );
    let vm = VmContext::new(VmInfo::new("Windows 10", "clean", "10.0.0.12", "windows", "g1"));

    ctl.restore(&vm).await.unwrap_or_else(|e| panic!("restore failed: {e}"));

    out.rewind().unwrap_or_else(|e| panic!("rewind failed: {e}"));
    let mut text = String::new();
    out.read_to_string(&mut text).unwrap_or_else(|e| panic!("read failed: {e}"));
    assert_eq!(text, "restore Windows 10 clean\n");
}

#[tokio::test]
async fn concurrent_starts_on_one_vm_run_once() {
    let mut out = tempfile::tempfile().unwrap_or_else(|e| panic!("tempfile failed: {e}"));
    let sink = out.try_clone().unwrap_or_else(|e| panic!("clone failed: {e}"));
    let ctl = CommandController::new(
        VmControl::new("echo start $machine", "echo stop $machine", "true $machine $snapshot"),
        policy(30),
        ProcessIo::Null,
        ProcessIo::file(sink),
    );
    let vm = context("vm1");

    let (a, b) = tokio::join!(ctl.start(&vm), ctl.start(&vm));

    let refused = match (a, b) {
        (Ok(()), other) | (other, Ok(())) => other,
        (Err(a), Err(b)) => panic!("both starts failed: {a}; {b}"),
    };
    match refused {
        Err(EngineError::InvalidState { operation, current, .. }) => {
            assert_eq!(operation, Operation::Start);
            assert_eq!(current, VmState::Running);
        }
        other => panic!("the queued start must be refused, got {other:?}"),
    }
    assert_eq!(vm.state(), VmState::Running);

    out.rewind().unwrap_or_else(|e| panic!("rewind failed: {e}"));
    let mut text = String::new();
    out.read_to_string(&mut text).unwrap_or_else(|e| panic!("read failed: {e}"));
    assert_eq!(text, "start vm1\n", "the hypervisor command must run exactly once");
}

#[tokio::test]
async fn abandoned_restore_moves_vm_to_error() {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
    let script = write_script(dir.path(), "exec sleep 30\n");
    let ctl = CommandController::new(
        VmControl::new("true $machine", "true $machine", format!("sh {script} $machine $snapshot")),
        policy(30),
        ProcessIo::Null,
        ProcessIo::Null,
    );
    let vm = context("vm1");

    let abandoned = tokio::time::timeout(Duration::from_millis(300), ctl.restore(&vm)).await;
    assert!(abandoned.is_err(), "restore should still be running when the caller gives up");
    assert_eq!(vm.state(), VmState::Error, "an abandoned restore must not stay RESTORING");

    assert!(matches!(
        ctl.start(&vm).await,
        Err(EngineError::InvalidState { current: VmState::Error, .. })
    ));
}
