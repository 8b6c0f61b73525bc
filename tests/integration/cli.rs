#[path = "common/mod.rs"]
mod common;

use std::{fs, path::Path};

use assert_cmd::Command;
use common::{dead_pid, write_script};
use predicates::prelude::*;
use tempfile::tempdir;

fn unicornctl(dir: &Path) -> Command {
    let exec = write_script(dir, "unicorn_rails", "exit 0");
    unicornctl_with(dir, &exec)
}

fn unicornctl_with(dir: &Path, exec: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("unicornctl"));
    cmd.arg("--pid")
        .arg(dir.join("unicorn.pid"))
        .arg("--exec-path")
        .arg(exec)
        .arg("--config-path")
        .arg(dir.join("unicorn.rb"));
    cmd
}

#[test]
fn stop_without_pid_file_exits_with_file_not_found() {
    let temp = tempdir().unwrap();

    unicornctl(temp.path())
        .arg("stop")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("PID file not found"));
}

#[test]
fn reload_with_stale_pid_exits_with_not_running() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("unicorn.pid"), dead_pid().to_string()).unwrap();

    unicornctl(temp.path()).arg("reload").assert().code(3);
}

#[test]
fn status_reports_a_live_master() {
    let temp = tempdir().unwrap();
    let pid = std::process::id();
    fs::write(temp.path().join("unicorn.pid"), pid.to_string()).unwrap();

    unicornctl(temp.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "unicorn is running (pid {pid}"
        )));

    let output = unicornctl(temp.path())
        .args(["status", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let status: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status["pid"], serde_json::json!(pid));
}

#[test]
fn start_succeeds_once_and_then_refuses() {
    let temp = tempdir().unwrap();

    unicornctl(temp.path())
        .arg("start")
        .assert()
        .success()
        .stdout(predicate::str::contains("unicorn started"));

    fs::write(
        temp.path().join("unicorn.pid"),
        std::process::id().to_string(),
    )
    .unwrap();
    unicornctl(temp.path()).arg("start").assert().code(4);
}

#[test]
fn failing_launcher_is_a_generic_failure() {
    let temp = tempdir().unwrap();
    let broken = write_script(temp.path(), "broken_unicorn", "echo boom >&2; exit 7");

    unicornctl_with(temp.path(), &broken)
        .arg("start")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("boom"));
}

#[test]
fn rogues_without_pid_file_tracks_nothing() {
    let temp = tempdir().unwrap();

    let output = unicornctl(temp.path())
        .args(["rogues", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(report["tracked"].is_null());
    assert_eq!(report["rogues"], serde_json::json!([]));
}

#[test]
fn missing_executable_exits_with_file_not_found() {
    if Path::new(unicornctl::constants::DEFAULT_EXEC_PATH).exists() {
        return;
    }
    let temp = tempdir().unwrap();

    unicornctl_with(temp.path(), &temp.path().join("absent"))
        .arg("status")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Unicorn executable not found"));
}

#[test]
fn unknown_subcommand_is_rejected() {
    let temp = tempdir().unwrap();

    unicornctl(temp.path()).arg("explode").assert().failure();
}
