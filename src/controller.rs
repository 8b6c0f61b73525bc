//! The unicorn controller: every administrative action in one place.
use std::collections::BTreeSet;

use regex::Regex;
use serde::Serialize;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use tracing::{debug, info};

use crate::{
    config::Config,
    error::{Result, UnicornError},
    gate::{ActionGate, RequiredState},
    launcher::{ExecLauncher, Launcher},
    pid_file::PidFile,
    process::{NixSignals, ProcessProbe, ProcessTable, Signal, SignalSender, SystemProcessTable},
    reaper::{ReapReport, RogueReaper},
    restart::{RestartOrchestrator, RestartPhase, RestartReport},
};

/// Administrative actions understood by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum Action {
    Start,
    Stop,
    Halt,
    Restart,
    Reload,
    AddChild,
    RemoveChild,
    RemoveAllChildren,
    ReopenLogs,
    Status,
}

impl Action {
    /// Signal sent to the master for single-signal actions.
    pub const fn signal(&self) -> Option<Signal> {
        match self {
            Self::Stop => Some(Signal::SIGQUIT),
            Self::Halt => Some(Signal::SIGTERM),
            Self::Reload => Some(Signal::SIGHUP),
            Self::AddChild => Some(Signal::SIGTTIN),
            Self::RemoveChild => Some(Signal::SIGTTOU),
            Self::RemoveAllChildren => Some(Signal::SIGWINCH),
            Self::ReopenLogs => Some(Signal::SIGUSR1),
            Self::Start | Self::Restart | Self::Status => None,
        }
    }
}

/// Snapshot of a running master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MasterStatus {
    pub pid: u32,
    pub workers: usize,
}

/// What an action did, for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The executable was launched.
    Started,
    /// A signal was delivered to the master.
    Signalled { pid: u32, signal: Signal },
    /// The master was replaced.
    Restarted(RestartReport),
    /// The master is running.
    Status(MasterStatus),
}

/// Controls one unicorn deployment through its PID file and OS signals.
///
/// Commands must be serialized by the caller; the controller holds no state
/// beyond its configuration.
pub struct Unicorn<T = SystemProcessTable, S = NixSignals, L = ExecLauncher> {
    config: Config,
    pid_file: PidFile,
    probe: ProcessProbe<T, S>,
    launcher: L,
}

impl Unicorn {
    /// Builds a controller backed by the real process table, signals and executable.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_parts(config, SystemProcessTable, NixSignals, ExecLauncher)
    }
}

impl<T: ProcessTable, S: SignalSender, L: Launcher> Unicorn<T, S, L> {
    /// Builds a controller from explicit collaborators.
    ///
    /// Fails with `FileNotFound` when the executable is missing.
    pub fn with_parts(mut config: Config, table: T, signals: S, launcher: L) -> Result<Self> {
        config.resolve_exec_path()?;
        let pattern = Regex::new(&config.master_pattern)?;

        Ok(Self {
            pid_file: PidFile::new(&config.pid_file),
            probe: ProcessProbe::new(table, signals, pattern),
            launcher,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn gate(&self) -> ActionGate<'_, T, S> {
        ActionGate::new(&self.pid_file, &self.probe)
    }

    fn reaper(&self) -> RogueReaper<'_, T, S> {
        RogueReaper::new(&self.pid_file, &self.probe, self.config.rogue_grace())
    }

    /// Terminates rogue masters; never fails.
    pub fn reap(&self) -> ReapReport {
        self.reaper().reap()
    }

    /// Lists rogue masters without touching them.
    pub fn rogues(&self) -> Option<(u32, BTreeSet<u32>)> {
        self.reaper().rogues()
    }

    /// Runs the rogue reap, when enabled, ahead of `action`.
    fn with_reap<R>(&self, action: Action, run: impl FnOnce() -> Result<R>) -> Result<R> {
        if self.config.kill_rogues {
            let report = self.reap();
            debug!(
                "Reaped {} rogue(s) before {action} ({} failed)",
                report.outcomes.len(),
                report.failed()
            );
        }

        info!("Running unicorn {action}");
        run()
    }

    fn require_running<R>(&self, action: impl FnOnce(u32) -> Result<R>) -> Result<R> {
        self.gate().require(RequiredState::Running, |pid| match pid {
            Some(pid) => action(pid),
            None => Err(UnicornError::Unicorn(
                "running check produced no PID".to_string(),
            )),
        })
    }

    fn launch_master(&self) -> Result<()> {
        self.gate()
            .require(RequiredState::Stopped, |_| self.launcher.launch(&self.config))
    }

    fn signal_master(&self, action: Action) -> Result<u32> {
        let Some(signal) = action.signal() else {
            return Err(UnicornError::Unicorn(format!("{action} is not a signal action")));
        };

        self.require_running(|pid| {
            if !self.probe.signal(pid, signal)? {
                return Err(UnicornError::NotRunning(format!(
                    "Unicorn {pid} exited before {} was delivered",
                    signal.as_str()
                )));
            }
            info!("Sent {} to unicorn master {pid}", signal.as_str());
            Ok(pid)
        })
    }

    fn send(&self, action: Action) -> Result<u32> {
        self.with_reap(action, || self.signal_master(action))
    }

    /// Starts a new daemonized master.
    pub fn start(&self) -> Result<()> {
        self.with_reap(Action::Start, || self.launch_master())
    }

    /// Graceful shutdown (`QUIT`).
    pub fn stop(&self) -> Result<u32> {
        self.send(Action::Stop)
    }

    /// Immediate shutdown (`TERM`).
    pub fn halt(&self) -> Result<u32> {
        self.send(Action::Halt)
    }

    /// Reload configuration (`HUP`).
    pub fn reload(&self) -> Result<u32> {
        self.send(Action::Reload)
    }

    /// Adds one worker (`TTIN`).
    pub fn add_child(&self) -> Result<u32> {
        self.send(Action::AddChild)
    }

    /// Removes one worker (`TTOU`).
    pub fn remove_child(&self) -> Result<u32> {
        self.send(Action::RemoveChild)
    }

    /// Stops all workers but keeps the master (`WINCH`).
    pub fn remove_all_children(&self) -> Result<u32> {
        self.send(Action::RemoveAllChildren)
    }

    /// Reopens log files (`USR1`).
    pub fn reopen_logs(&self) -> Result<u32> {
        self.send(Action::ReopenLogs)
    }

    /// Confirms the master is running and counts its workers.
    pub fn status(&self) -> Result<MasterStatus> {
        self.with_reap(Action::Status, || {
            self.require_running(|pid| {
                Ok(MasterStatus {
                    pid,
                    workers: self.probe.children_of(pid).len(),
                })
            })
        })
    }

    /// Replaces the master without downtime.
    ///
    /// Returns `None` when nothing was running and a plain start was done instead.
    pub fn restart(&self) -> Result<Option<RestartReport>> {
        self.with_reap(Action::Restart, || {
            let running = self
                .pid_file
                .read_opt()
                .is_some_and(|pid| self.probe.is_alive(pid));
            if !running {
                info!("Restart phase: {}", RestartPhase::NoOriginal);
                self.launch_master()?;
                return Ok(None);
            }

            self.require_running(|_| {
                RestartOrchestrator::new(&self.pid_file, &self.probe, &self.config).run()
            })
            .map(Some)
        })
    }

    /// Dispatches `action` to its method.
    pub fn run(&self, action: Action) -> Result<ActionOutcome> {
        match action {
            Action::Start => self.start().map(|()| ActionOutcome::Started),
            Action::Restart => self.restart().map(|report| match report {
                Some(report) => ActionOutcome::Restarted(report),
                None => ActionOutcome::Started,
            }),
            Action::Status => self.status().map(ActionOutcome::Status),
            _ => {
                let pid = self.send(action)?;
                let signal = action
                    .signal()
                    .ok_or_else(|| UnicornError::Unicorn(format!("{action} has no signal")))?;
                Ok(ActionOutcome::Signalled { pid, signal })
            }
        }
    }
}
