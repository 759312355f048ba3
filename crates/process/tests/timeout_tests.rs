//! Timeout and cleanup guarantees of the process runner.
//!
//! These tests use stub scripts that record their PIDs so the tests can
//! confirm the processes are really gone once the runner returns.

#![cfg(unix)]
#![allow(unsafe_code)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use safelight_process::{CommandSpec, Error, OutputStream, ProcessRunner, Termination};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn process_alive(pid: i32) -> bool {
    // Orphans may linger as zombies until init reaps them; those count as dead
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        let state = stat.rsplit(')').next().and_then(|rest| rest.trim().chars().next());
        return !matches!(state, Some('Z' | 'X'));
    }
    if Path::new("/proc/self").exists() {
        return false;
    }
    // Signal 0 only checks for existence
    unsafe { libc::kill(pid, 0) == 0 }
}

fn read_pids(path: &Path) -> Vec<i32> {
    std::fs::read_to_string(path)
        .unwrap()
        .split_whitespace()
        .map(|p| p.parse().unwrap())
        .collect()
}

#[tokio::test]
async fn never_exiting_stub_is_killed_within_bound() {
    let tmp = TempDir::new().unwrap();
    let pid_file = tmp.path().join("pids");
    let script = write_script(
        tmp.path(),
        "hang.sh",
        &format!(
            "echo $$ > {pids}\nsleep 60 &\necho $! >> {pids}\necho waiting\nwait\n",
            pids = pid_file.display()
        ),
    );

    let timeout = Duration::from_millis(500);
    let runner = ProcessRunner::new(timeout);
    let started = Instant::now();
    let err = runner
        .run_stdout(&CommandSpec::new(&script), None)
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(err.is_timeout(), "expected timeout, got {err:?}");
    assert_eq!(err.output(), Some("waiting\n"));
    assert!(elapsed >= timeout);
    assert!(elapsed < timeout + Duration::from_secs(3), "took {elapsed:?}");

    // Give the kernel a moment to finish tearing down the group
    tokio::time::sleep(Duration::from_millis(100)).await;
    for pid in read_pids(&pid_file) {
        assert!(!process_alive(pid), "process {pid} survived the timeout");
    }
}

#[tokio::test]
async fn dropped_run_kills_helper_children() {
    let tmp = TempDir::new().unwrap();
    let pid_file = tmp.path().join("pids");
    let script = write_script(
        tmp.path(),
        "helpers.sh",
        &format!(
            "echo $$ > {pids}\nsleep 30 &\necho $! >> {pids}\necho waiting\nwait\n",
            pids = pid_file.display()
        ),
    );

    // The runner's own deadline is far away; the caller gives up first
    let runner = ProcessRunner::new(Duration::from_secs(60));
    let cancelled = tokio::time::timeout(
        Duration::from_millis(500),
        runner.run_stdout(&CommandSpec::new(&script), None),
    )
    .await;
    assert!(cancelled.is_err(), "run should still have been in progress");

    tokio::time::sleep(Duration::from_millis(300)).await;
    let pids = read_pids(&pid_file);
    assert_eq!(pids.len(), 2);
    for pid in pids {
        assert!(!process_alive(pid), "process {pid} survived the cancelled run");
    }
}

#[tokio::test]
async fn execute_records_timed_out_termination() {
    let runner = ProcessRunner::new(Duration::from_millis(200));
    let spec = CommandSpec::new("/bin/sh").args(["-c", "sleep 30"]);
    let run = runner
        .execute(&spec, OutputStream::Stdout, None)
        .await
        .unwrap();

    assert!(matches!(run.termination, Termination::TimedOut));
    assert!(!run.success());
    assert!(matches!(run.into_result(), Err(Error::Timeout { .. })));
}

#[tokio::test]
async fn fast_command_is_unaffected_by_timeout() {
    let tmp = TempDir::new().unwrap();
    let script = write_script(tmp.path(), "quick.sh", "echo done\n");
    let runner = ProcessRunner::new(Duration::from_secs(30));

    let started = Instant::now();
    let out = runner
        .run_stdout(&CommandSpec::new(&script), None)
        .await
        .unwrap();
    assert_eq!(out, "done\n");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn concurrent_runs_are_independent() {
    let runner = ProcessRunner::new(Duration::from_secs(10));
    let specs: Vec<_> = (0..4)
        .map(|i| CommandSpec::new("/bin/sh").args(["-c".to_string(), format!("echo run-{i}")]))
        .collect();

    let results = run_all(&runner, &specs).await;
    for (i, out) in results.into_iter().enumerate() {
        assert_eq!(out.unwrap(), format!("run-{i}\n"));
    }
}

async fn run_all(
    runner: &ProcessRunner,
    specs: &[CommandSpec],
) -> Vec<safelight_process::Result<String>> {
    let mut set = tokio::task::JoinSet::new();
    for (i, spec) in specs.iter().cloned().enumerate() {
        let runner = runner.clone();
        set.spawn(async move { (i, runner.run_stdout(&spec, None).await) });
    }
    let mut results: Vec<_> = Vec::new();
    while let Some(joined) = set.join_next().await {
        results.push(joined.unwrap());
    }
    results.sort_by_key(|(i, _)| *i);
    results.into_iter().map(|(_, r)| r).collect()
}
