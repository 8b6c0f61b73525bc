//! Best-effort cleanup of rogue unicorn masters.
//!
//! A rogue is a process carrying the master signature that the PID file does
//! not name, typically left behind by an earlier failed restart.
use std::{collections::BTreeSet, fmt, thread, time::Duration};

use tracing::{debug, info, warn};

use crate::{
    pid_file::PidFile,
    process::{ProcessProbe, ProcessTable, Signal, SignalSender},
};

/// What happened to one rogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RogueResult {
    /// The process is gone after `TERM`.
    Killed,
    /// The process survived the grace interval.
    StillAlive,
    /// `TERM` could not be delivered.
    SignalFailed(String),
}

impl fmt::Display for RogueResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Killed => write!(f, "killed"),
            Self::StillAlive => write!(f, "still alive"),
            Self::SignalFailed(reason) => write!(f, "signal failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RogueOutcome {
    pub pid: u32,
    pub result: RogueResult,
}

/// Outcome of one reap pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Master the rogues were judged against; `None` when the pass was skipped.
    pub tracked: Option<u32>,
    pub outcomes: Vec<RogueOutcome>,
}

impl ReapReport {
    /// Number of rogues that could not be signalled.
    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome.result, RogueResult::SignalFailed(_)))
            .count()
    }
}

/// Terminates rogue masters without ever failing the caller.
pub struct RogueReaper<'a, T, S> {
    pid_file: &'a PidFile,
    probe: &'a ProcessProbe<T, S>,
    grace: Duration,
}

impl<'a, T: ProcessTable, S: SignalSender> RogueReaper<'a, T, S> {
    pub fn new(pid_file: &'a PidFile, probe: &'a ProcessProbe<T, S>, grace: Duration) -> Self {
        Self {
            pid_file,
            probe,
            grace,
        }
    }

    /// Current rogues, or `None` when no master PID can be read.
    ///
    /// Without a tracked master every unicorn would look rogue, so nothing is reported.
    pub fn rogues(&self) -> Option<(u32, BTreeSet<u32>)> {
        let tracked = self.pid_file.read_opt()?;
        Some((tracked, self.probe.rogue_masters(tracked)))
    }

    /// Sends `TERM` to every rogue, waits the grace interval once, then
    /// re-checks each one.
    pub fn reap(&self) -> ReapReport {
        let Some((tracked, rogues)) = self.rogues() else {
            let reason = if self.pid_file.exists() {
                "unreadable"
            } else {
                "missing"
            };
            let candidates = self.probe.masters();
            if candidates.is_empty() {
                debug!(
                    "Skipping rogue reap: PID file {:?} is {reason}",
                    self.pid_file.path()
                );
            } else {
                warn!(
                    "Skipping rogue reap: PID file {:?} is {reason}; unverified masters: {candidates:?}",
                    self.pid_file.path()
                );
            }
            return ReapReport::default();
        };

        if rogues.is_empty() {
            return ReapReport {
                tracked: Some(tracked),
                outcomes: Vec::new(),
            };
        }

        let mut signalled = Vec::new();
        let mut outcomes = Vec::new();
        for pid in rogues {
            match self.probe.signal(pid, Signal::SIGTERM) {
                Ok(true) => signalled.push(pid),
                Ok(false) => outcomes.push(RogueOutcome {
                    pid,
                    result: RogueResult::Killed,
                }),
                Err(err) => outcomes.push(RogueOutcome {
                    pid,
                    result: RogueResult::SignalFailed(err.to_string()),
                }),
            }
        }

        if !signalled.is_empty() && !self.grace.is_zero() {
            thread::sleep(self.grace);
        }

        for pid in signalled {
            let result = if self.probe.is_alive(pid) {
                RogueResult::StillAlive
            } else {
                RogueResult::Killed
            };
            outcomes.push(RogueOutcome { pid, result });
        }
        outcomes.sort_by_key(|outcome| outcome.pid);

        for outcome in &outcomes {
            match outcome.result {
                RogueResult::Killed => info!("Rogue unicorn {} {}", outcome.pid, outcome.result),
                _ => warn!("Rogue unicorn {} {}", outcome.pid, outcome.result),
            }
        }

        ReapReport {
            tracked: Some(tracked),
            outcomes,
        }
    }
}
