//! Integration tests driving single-signal actions against real processes.

#[path = "common/mod.rs"]
mod common;

use std::{fs, process::Command, time::Duration};

use common::{Reaped, children_of, dead_pid, test_config, wait_until, write_script};
use tempfile::tempdir;
use unicornctl::{Action, ActionOutcome, Unicorn, UnicornError, process::Signal};

#[test]
fn status_counts_workers_of_a_live_master() {
    let temp = tempdir().expect("tempdir");
    let config = test_config(temp.path());

    let master = Reaped::spawn(Command::new("sh").args(["-c", "sleep 30 & sleep 30 & wait"]));
    fs::write(&config.pid_file, master.pid.to_string()).unwrap();
    assert!(
        wait_until(Duration::from_secs(5), || children_of(master.pid).len() == 2),
        "workers never appeared"
    );

    let unicorn = Unicorn::new(config).unwrap();
    let status = unicorn.status().unwrap();
    assert_eq!(status.pid, master.pid);
    assert_eq!(status.workers, 2);
}

#[test]
fn stop_retires_the_master_and_is_not_repeatable() {
    let temp = tempdir().expect("tempdir");
    let config = test_config(temp.path());

    let master = Reaped::spawn(Command::new("sh").args([
        "-c",
        "trap 'kill $!; exit 0' QUIT; sleep 30 & wait",
    ]));
    let pid = master.pid;
    fs::write(&config.pid_file, pid.to_string()).unwrap();

    let unicorn = Unicorn::new(config).unwrap();
    assert_eq!(
        unicorn.run(Action::Stop).unwrap(),
        ActionOutcome::Signalled {
            pid,
            signal: Signal::SIGQUIT
        }
    );

    master.wait_for_exit(Duration::from_secs(5));
    assert!(matches!(unicorn.stop(), Err(UnicornError::NotRunning(_))));
}

#[test]
fn stop_without_pid_file_is_file_not_found() {
    let temp = tempdir().expect("tempdir");
    let unicorn = Unicorn::new(test_config(temp.path())).unwrap();

    assert!(matches!(
        unicorn.stop(),
        Err(UnicornError::FileNotFound { .. })
    ));
}

#[test]
fn start_launches_over_a_stale_pid_file() {
    let temp = tempdir().expect("tempdir");
    let mut config = test_config(temp.path());
    let record = temp.path().join("launched.txt");
    config.exec_path = write_script(
        temp.path(),
        "unicorn_launch",
        &format!("echo \"$@\" > {}", record.display()),
    );
    config.environment = "staging".into();
    fs::write(&config.pid_file, dead_pid().to_string()).unwrap();
    let expected = format!(
        "--daemonize --env staging --config-file {}",
        config.config_path.display()
    );

    let unicorn = Unicorn::new(config).unwrap();
    unicorn.start().unwrap();

    assert_eq!(fs::read_to_string(&record).unwrap().trim(), expected);
}

#[test]
fn start_refuses_when_master_is_alive() {
    let temp = tempdir().expect("tempdir");
    let config = test_config(temp.path());
    fs::write(&config.pid_file, std::process::id().to_string()).unwrap();

    let unicorn = Unicorn::new(config).unwrap();
    assert!(matches!(unicorn.start(), Err(UnicornError::IsRunning(_))));
}

#[test]
fn missing_executable_fails_construction() {
    if std::path::Path::new(unicornctl::constants::DEFAULT_EXEC_PATH).exists() {
        return;
    }

    let temp = tempdir().expect("tempdir");
    let mut config = test_config(temp.path());
    config.exec_path = temp.path().join("not-installed");

    assert!(matches!(
        Unicorn::new(config),
        Err(UnicornError::FileNotFound { .. })
    ));
}

#[test]
fn rogue_masters_are_terminated_before_the_action() {
    let temp = tempdir().expect("tempdir");
    let mut config = test_config(temp.path());
    let marker = format!("unicornctl-rogue-{}", std::process::id());
    config.master_pattern = marker.clone();
    config.kill_rogues = true;

    let rogue = Reaped::spawn(Command::new("sh").args([
        "-c",
        "while :; do sleep 0.05; done",
        marker.as_str(),
    ]));
    let master = Reaped::spawn(Command::new("sleep").arg("30"));
    fs::write(&config.pid_file, master.pid.to_string()).unwrap();

    let unicorn = Unicorn::new(config).unwrap();
    let (tracked, rogues) = unicorn.rogues().unwrap();
    assert_eq!(tracked, master.pid);
    assert!(rogues.contains(&rogue.pid), "{rogues:?}");

    unicorn.status().unwrap();
    rogue.wait_for_exit(Duration::from_secs(5));
}
