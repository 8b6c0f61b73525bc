//! Zero-downtime replacement of the unicorn master.
//!
//! Unicorn implements the handoff itself: on `USR2` the running master
//! re-executes into a new master, which writes the PID file and forks its
//! own workers; `QUIT` then retires the old master gracefully. The
//! [`RestartOrchestrator`] drives that protocol and decides whether it
//! worked, bounding every wait with a [`TimeoutBudget`].
//!
//! The PID file and the process table are re-read on every poll. A PID read
//! before a sleep is never trusted after it without checking liveness again.
use std::{
    thread,
    time::{Duration, Instant},
};

use strum_macros::Display;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    constants::{
        NEW_PROCESS_FAILED_MSG, NO_NEW_PROCESS_MSG, NOT_RUNNING_MSG,
        ORIGINAL_PROCESS_ALIVE_MSG,
    },
    error::{Result, UnicornError},
    pid_file::PidFile,
    process::{ProcessProbe, ProcessTable, Signal, SignalSender},
};

/// Steps of the restart protocol, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RestartPhase {
    /// Nothing is running; the restart becomes a plain start.
    NoOriginal,
    SignalSpawn,
    AwaitNewPid,
    AwaitNewMasterHealthy,
    SignalRetireOriginal,
    AwaitOriginalExit,
    Reconcile,
}

/// Elapsed-time budget measured on the monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutBudget {
    started: Instant,
    limit: Duration,
}

impl TimeoutBudget {
    /// Starts a budget of `limit` from now.
    pub fn start(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before exhaustion, zero once exhausted.
    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.elapsed())
    }

    pub fn is_exhausted(&self) -> bool {
        self.elapsed() >= self.limit
    }
}

/// Result of a completed restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartReport {
    /// Master that was retired.
    pub original: u32,
    /// Master now named by the PID file.
    pub replacement: u32,
    /// Wall time spent in the protocol.
    pub elapsed: Duration,
}

/// Drives one graceful restart of a running master.
pub struct RestartOrchestrator<'a, T, S> {
    pid_file: &'a PidFile,
    probe: &'a ProcessProbe<T, S>,
    restart_grace: Duration,
    action_timeout: Duration,
    poll_interval: Duration,
}

impl<'a, T: ProcessTable, S: SignalSender> RestartOrchestrator<'a, T, S> {
    pub fn new(pid_file: &'a PidFile, probe: &'a ProcessProbe<T, S>, config: &Config) -> Self {
        Self {
            pid_file,
            probe,
            restart_grace: config.restart_grace(),
            action_timeout: config.action_timeout(),
            poll_interval: config.poll_interval(),
        }
    }

    fn enter(&self, phase: RestartPhase) {
        info!("Restart phase: {phase}");
    }

    /// Runs the protocol against the master currently named by the PID file.
    ///
    /// The caller is expected to have checked that this master is alive.
    pub fn run(&self) -> Result<RestartReport> {
        let started = Instant::now();

        self.enter(RestartPhase::SignalSpawn);
        let original = self.pid_file.read()?;
        if !self.probe.signal(original, Signal::SIGUSR2)? {
            return Err(UnicornError::NotRunning(NOT_RUNNING_MSG.to_string()));
        }

        self.enter(RestartPhase::AwaitNewPid);
        let grace = TimeoutBudget::start(self.restart_grace);
        if !self.poll_until(&grace, || self.pid_file.read_opt() != Some(original)) {
            warn!(
                "PID file still names {original} after {:?}",
                grace.elapsed()
            );
            return Err(UnicornError::Timeout(NO_NEW_PROCESS_MSG.to_string()));
        }

        self.enter(RestartPhase::AwaitNewMasterHealthy);
        let budget = TimeoutBudget::start(self.action_timeout);
        let mut candidate = None;
        self.poll_until(&budget, || {
            candidate = self.healthy_replacement(original);
            candidate.is_some()
        });
        let Some(candidate) = candidate else {
            warn!("No healthy replacement master after {:?}", budget.elapsed());
            return Err(UnicornError::ActionFailed(NEW_PROCESS_FAILED_MSG.to_string()));
        };
        info!("Replacement master {candidate} is serving");

        self.enter(RestartPhase::SignalRetireOriginal);
        if !self.probe.signal(original, Signal::SIGQUIT)? {
            debug!("Original master {original} exited before it was retired");
        }

        self.enter(RestartPhase::AwaitOriginalExit);
        let exited = self.poll_until(&budget, || !self.probe.is_alive(original));

        self.enter(RestartPhase::Reconcile);
        let replacement = self.reconcile(original, !exited)?;

        if !self.probe.signal(replacement, Signal::SIGUSR1)? {
            return Err(UnicornError::NotRunning(NEW_PROCESS_FAILED_MSG.to_string()));
        }

        let report = RestartReport {
            original,
            replacement,
            elapsed: started.elapsed(),
        };
        info!(
            "Restarted unicorn: {} -> {} in {:?}",
            report.original, report.replacement, report.elapsed
        );
        Ok(report)
    }

    /// The PID-file master, if it differs from `original`, is alive and has a worker.
    fn healthy_replacement(&self, original: u32) -> Option<u32> {
        let pid = self.pid_file.read_opt()?;
        if pid == original || !self.probe.is_alive(pid) {
            return None;
        }
        if self.probe.children_of(pid).is_empty() {
            debug!("Replacement master {pid} has no workers yet");
            return None;
        }
        Some(pid)
    }

    /// Judges the final state and returns the replacement master on success.
    ///
    /// A surviving original always reports `IsRunning`. Otherwise an exhausted
    /// budget reports `Timeout`, naming any failure that also holds.
    fn reconcile(&self, original: u32, timed_out: bool) -> Result<u32> {
        let original_alive = self.probe.is_alive(original);
        let replacement = self
            .pid_file
            .read_opt()
            .filter(|pid| *pid != original && self.probe.is_alive(*pid));

        let mut failures = Vec::new();
        if original_alive {
            failures.push(ORIGINAL_PROCESS_ALIVE_MSG);
        }
        if replacement.is_none() {
            failures.push(NEW_PROCESS_FAILED_MSG);
        }

        if original_alive {
            return Err(UnicornError::IsRunning(failures.join("; ")));
        }
        if timed_out {
            let mut message = String::from("action timeout exhausted");
            for failure in &failures {
                message.push_str("; ");
                message.push_str(failure);
            }
            return Err(UnicornError::Timeout(message));
        }

        replacement
            .ok_or_else(|| UnicornError::NotRunning(NEW_PROCESS_FAILED_MSG.to_string()))
    }

    /// Polls `condition` until it holds or `budget` runs out.
    ///
    /// The condition is always evaluated once more after the final sleep.
    fn poll_until(&self, budget: &TimeoutBudget, mut condition: impl FnMut() -> bool) -> bool {
        loop {
            if condition() {
                return true;
            }
            if budget.is_exhausted() {
                return false;
            }
            thread::sleep(self.poll_interval.min(budget.remaining()));
        }
    }
}
