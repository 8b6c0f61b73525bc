//! Zero-downtime restart against shell scripts that mimic a unicorn master.
#![cfg(target_os = "linux")]

#[path = "common/mod.rs"]
mod common;

use std::{
    path::{Path, PathBuf},
    process::Command,
    time::Duration,
};

use common::{Reaped, kill_tree, test_config, wait_for_pid_change, write_script};
use tempfile::tempdir;
use unicornctl::{Config, Unicorn, UnicornError};

const NEW_MASTER: &str = r#"trap ':' USR1
trap 'kill $worker; exit 0' QUIT
sleep 30 &
worker=$!
echo $$ > "$1"
while :; do sleep 0.05; done"#;

/// Original master script. `quit` is the QUIT handler, `usr2` the USR2 handler.
fn original_master(usr2: &str, quit: &str) -> String {
    format!(
        r#"trap '{usr2}' USR2
trap '{quit}' QUIT
sleep 30 &
worker=$!
echo $$ > "$1"
while :; do sleep 0.05; done"#
    )
}

struct Scene {
    _temp: tempfile::TempDir,
    config: Config,
    master: Reaped,
}

impl Scene {
    fn new(usr2: &str, quit: &str, tune: impl FnOnce(&mut Config)) -> Self {
        let temp = tempdir().expect("tempdir");
        let mut config = test_config(temp.path());
        tune(&mut config);

        let new_master = write_script(temp.path(), "new_master.sh", NEW_MASTER);
        let original = write_script(temp.path(), "master.sh", &original_master(usr2, quit));
        let master = Reaped::spawn(
            Command::new("sh")
                .arg(&original)
                .arg(&config.pid_file)
                .arg(&new_master),
        );
        wait_for_pid_change(&config.pid_file, None);

        Self {
            _temp: temp,
            config,
            master,
        }
    }

    fn pid_file(&self) -> PathBuf {
        self.config.pid_file.clone()
    }
}

fn current_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[test]
fn restart_hands_over_to_a_new_master() {
    let scene = Scene::new(r#"sh "$2" "$1" &"#, "kill $worker; exit 0", |_| {});
    let original = scene.master.pid;
    let unicorn = Unicorn::new(scene.config.clone()).unwrap();

    let report = unicorn
        .restart()
        .unwrap()
        .expect("a running master is replaced, not started");

    assert_eq!(report.original, original);
    assert_ne!(report.replacement, original);
    assert_eq!(current_pid(&scene.pid_file()), Some(report.replacement));
    assert_eq!(unicorn.status().unwrap().pid, report.replacement);

    let Scene { master, .. } = scene;
    master.wait_for_exit(Duration::from_secs(5));
    kill_tree(report.replacement);
}

#[test]
fn original_that_ignores_quit_is_reported_running() {
    let scene = Scene::new(r#"sh "$2" "$1" &"#, "", |config| {
        config.action_timeout = 1.0;
    });
    let unicorn = Unicorn::new(scene.config.clone()).unwrap();

    let err = unicorn.restart().unwrap_err();
    assert!(matches!(err, UnicornError::IsRunning(_)), "{err}");
    assert_eq!(err.kind().exit_code(), 4);

    if let Some(replacement) = current_pid(&scene.pid_file()) {
        kill_tree(replacement);
    }
}

#[test]
fn master_that_never_forks_times_out_in_grace() {
    let scene = Scene::new("", "kill $worker; exit 0", |config| {
        config.restart_grace = 0.3;
    });
    let unicorn = Unicorn::new(scene.config.clone()).unwrap();

    let err = unicorn.restart().unwrap_err();
    assert!(matches!(err, UnicornError::Timeout(_)), "{err}");
    assert_eq!(current_pid(&scene.pid_file()), Some(scene.master.pid));
}
