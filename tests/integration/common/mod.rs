#![allow(dead_code)]

use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use nix::{
    sys::signal::{Signal, kill},
    unistd::Pid,
};
use unicornctl::{
    Config,
    process::{ProcessTable, SystemProcessTable},
};

/// Writes an executable shell script into `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod script");
    path
}

/// Controller settings rooted in `dir` with short timings.
pub fn test_config(dir: &Path) -> Config {
    let exec_path = write_script(dir, "unicorn_rails", "exit 0");
    Config {
        pid_file: dir.join("unicorn.pid"),
        exec_path,
        config_path: dir.join("unicorn.rb"),
        action_timeout: 3.0,
        restart_grace: 3.0,
        poll_interval_ms: 20,
        rogue_grace_ms: 100,
        ..Config::default()
    }
}

/// A child process whose exit status is collected in the background so it
/// never lingers as a zombie.
pub struct Reaped {
    pub pid: u32,
    waiter: Option<JoinHandle<std::io::Result<ExitStatus>>>,
}

impl Reaped {
    pub fn spawn(command: &mut Command) -> Self {
        let mut child: Child = command.spawn().expect("spawn test process");
        let pid = child.id();
        let waiter = thread::spawn(move || child.wait());
        Self {
            pid,
            waiter: Some(waiter),
        }
    }

    pub fn has_exited(&self) -> bool {
        self.waiter
            .as_ref()
            .is_none_or(|waiter| waiter.is_finished())
    }

    /// Waits up to `timeout` for the process to exit and be reaped.
    ///
    /// Panics on timeout; the process tree is then killed on drop.
    pub fn wait_for_exit(mut self, timeout: Duration) {
        assert!(
            wait_until(timeout, || self.has_exited()),
            "process {} still running after {:?}",
            self.pid,
            timeout
        );
        if let Some(waiter) = self.waiter.take() {
            let _ = waiter.join();
        }
    }
}

impl Drop for Reaped {
    fn drop(&mut self) {
        if self.waiter.is_some() {
            kill_tree(self.pid);
        }
    }
}

/// PID of a process that has already exited.
pub fn dead_pid() -> u32 {
    let mut child = Command::new("true").spawn().expect("spawn true");
    let pid = child.id();
    child.wait().expect("wait true");
    pid
}

/// Polls `condition` every 20ms for up to `timeout`.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(20));
    }
}

pub fn children_of(pid: u32) -> Vec<u32> {
    SystemProcessTable
        .snapshot()
        .into_iter()
        .filter(|entry| entry.parent == Some(pid))
        .map(|entry| entry.pid)
        .collect()
}

/// Waits until the PID file holds a value other than `previous`.
pub fn wait_for_pid_change(path: &Path, previous: Option<u32>) -> u32 {
    let mut found = None;
    let changed = wait_until(Duration::from_secs(5), || {
        found = fs::read_to_string(path)
            .ok()
            .and_then(|content| content.trim().parse::<u32>().ok())
            .filter(|pid| Some(*pid) != previous);
        found.is_some()
    });
    assert!(changed, "Timed out waiting for a new PID in {:?}", path);
    found.expect("pid recorded")
}

/// SIGKILLs `pid` and all of its descendants.
pub fn kill_tree(pid: u32) {
    for child in children_of(pid) {
        kill_tree(child);
    }
    if let Ok(raw) = i32::try_from(pid) {
        let _ = kill(Pid::from_raw(raw), Signal::SIGKILL);
    }
}
