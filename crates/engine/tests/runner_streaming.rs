//! End-to-end runner tests against a scripted fake engine.

#![cfg(unix)]

use scour_engine::{classify_failure, CommandRequest, CommandRunner, ProgressFrame, ProgressHook};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn frame_hook() -> (ProgressHook, Arc<Mutex<Vec<ProgressFrame>>>) {
    let frames = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&frames);
    let hook: ProgressHook = Arc::new(move |frame| sink.lock().unwrap().push(frame));
    (hook, frames)
}

#[tokio::test]
async fn streams_progress_frames_and_captures_output() {
    let dir = tempfile::tempdir().unwrap();
    let engine = write_script(
        dir.path(),
        "fake-engine",
        "echo '[ 50%] 10 files'\nsleep 0.05\necho '[100%] 20 files'\necho done",
    );

    let (hook, frames) = frame_hook();
    let runner = CommandRunner::new();
    let output = runner
        .run(CommandRequest {
            binary: &engine,
            args: &[],
            cwd: dir.path(),
            group: None,
            progress: Some(hook),
        })
        .await
        .unwrap();

    assert_eq!(output.exit_code, 0);
    assert!(output.stdout.contains("done"));
    let seen = frames.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            ProgressFrame {
                percent: 50,
                files: 10
            },
            ProgressFrame {
                percent: 100,
                files: 20
            },
        ]
    );
}

#[tokio::test]
async fn nonzero_exit_is_returned_not_thrown() {
    let dir = tempfile::tempdir().unwrap();
    let engine = write_script(
        dir.path(),
        "fake-engine",
        "echo 'Error: index is corrupt' >&2\nexit 2",
    );

    let runner = CommandRunner::new();
    let output = runner
        .run(CommandRequest {
            binary: &engine,
            args: &[],
            cwd: dir.path(),
            group: None,
            progress: None,
        })
        .await
        .unwrap();

    assert_eq!(output.exit_code, 2);
    assert_eq!(
        classify_failure("index update failed", &output),
        "index update failed: Error: index is corrupt"
    );
}

#[tokio::test]
async fn cancel_kills_a_long_running_command() {
    let dir = tempfile::tempdir().unwrap();
    let engine = write_script(dir.path(), "fake-engine", "sleep 30");

    let runner = CommandRunner::new();
    let running = runner
        .spawn(CommandRequest {
            binary: &engine,
            args: &[],
            cwd: dir.path(),
            group: Some("root-a"),
            progress: None,
        })
        .unwrap();

    let handle = running.handle();
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.cancel();

    let output = tokio::time::timeout(Duration::from_secs(5), running.wait())
        .await
        .expect("cancelled command should exit promptly")
        .unwrap();
    assert!(handle.cancelled());
    assert_ne!(output.exit_code, 0);
}

#[tokio::test]
async fn active_handle_accounting_per_group() {
    let dir = tempfile::tempdir().unwrap();
    let engine = write_script(dir.path(), "fake-engine", "sleep 30");

    let runner = CommandRunner::new();
    let running = runner
        .spawn(CommandRequest {
            binary: &engine,
            args: &[],
            cwd: dir.path(),
            group: Some("root-a"),
            progress: None,
        })
        .unwrap();

    assert_eq!(runner.active_in_group("root-a"), 1);
    assert_eq!(runner.active_in_group("root-b"), 0);

    running.cancel();
    let _ = running.wait().await;

    // The accounting guard drops inside the command task; give it a beat.
    for _ in 0..50 {
        if runner.active_in_group("root-a") == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(runner.active_in_group("root-a"), 0);
}

#[tokio::test]
async fn missing_binary_is_a_spawn_error() {
    let dir = tempfile::tempdir().unwrap();
    let runner = CommandRunner::new();
    let result = runner.spawn(CommandRequest {
        binary: Path::new("/nonexistent/engine"),
        args: &[],
        cwd: dir.path(),
        group: None,
        progress: None,
    });
    assert!(result.is_err());
}
