//! Process table inspection and signal delivery.
//!
//! [`ProcessTable`] and [`SignalSender`] are the two seams to the operating
//! system; [`ProcessProbe`] combines them into the liveness, child and rogue
//! queries the controller is built on.
use std::collections::BTreeSet;

use nix::{errno::Errno, sys::signal, unistd::Pid};
use regex::Regex;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::debug;

pub use nix::sys::signal::Signal;

use crate::error::Result;

/// One row of the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    /// Process ID.
    pub pid: u32,
    /// Parent process ID, when known.
    pub parent: Option<u32>,
    /// Full command line (or process name when the command line is hidden).
    pub command: String,
}

/// Read-only view of the OS process list.
pub trait ProcessTable {
    /// Takes one snapshot of every process currently visible.
    fn snapshot(&self) -> Vec<ProcessEntry>;
}

/// Delivers signals to processes by PID.
pub trait SignalSender {
    /// Sends `signal` to `pid`; `None` probes for existence without affecting the target.
    ///
    /// Returns `Ok(true)` when delivered, `Ok(false)` when no such process
    /// exists, and an error for any other refusal from the OS.
    fn send(&self, pid: u32, signal: Option<Signal>) -> Result<bool>;
}

/// Process table backed by `sysinfo`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessTable;

impl ProcessTable for SystemProcessTable {
    fn snapshot(&self) -> Vec<ProcessEntry> {
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::everything(),
        );

        system
            .processes()
            .iter()
            // Linux exposes threads as tasks; they are not workers.
            .filter(|(_, process)| process.thread_kind().is_none())
            .map(|(pid, process)| {
                let command = process
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" ");
                let command = if command.is_empty() {
                    process.name().to_string_lossy().into_owned()
                } else {
                    command
                };

                ProcessEntry {
                    pid: pid.as_u32(),
                    parent: process.parent().map(|parent| parent.as_u32()),
                    command,
                }
            })
            .collect()
    }
}

/// Signal sender backed by `kill(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NixSignals;

impl SignalSender for NixSignals {
    fn send(&self, pid: u32, signal: Option<Signal>) -> Result<bool> {
        // PID 0 and values beyond pid_t would address process groups.
        let raw = match libc::pid_t::try_from(pid) {
            Ok(raw) if raw > 0 => raw,
            _ => return Ok(false),
        };

        match signal::kill(Pid::from_raw(raw), signal) {
            Ok(()) => Ok(true),
            Err(Errno::ESRCH) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

/// Answers the liveness questions every action depends on.
#[derive(Debug)]
pub struct ProcessProbe<T, S> {
    table: T,
    signals: S,
    master_pattern: Regex,
    own_pid: u32,
}

impl<T: ProcessTable, S: SignalSender> ProcessProbe<T, S> {
    /// Builds a probe recognising masters by `master_pattern`.
    pub fn new(table: T, signals: S, master_pattern: Regex) -> Self {
        Self {
            table,
            signals,
            master_pattern,
            own_pid: std::process::id(),
        }
    }

    /// Whether `pid` exists and can be signalled.
    ///
    /// Permission errors count as absent; this never fails.
    pub fn is_alive(&self, pid: u32) -> bool {
        match self.signals.send(pid, None) {
            Ok(exists) => exists,
            Err(err) => {
                debug!("Liveness probe for PID {pid} failed: {err}");
                false
            }
        }
    }

    /// Sends `signal` to `pid`; see [`SignalSender::send`].
    pub fn signal(&self, pid: u32, signal: Signal) -> Result<bool> {
        debug!("Sending {} to PID {pid}", signal.as_str());
        self.signals.send(pid, Some(signal))
    }

    /// PIDs whose parent is `parent`, from a single table snapshot.
    pub fn children_of(&self, parent: u32) -> BTreeSet<u32> {
        self.table
            .snapshot()
            .into_iter()
            .filter(|entry| entry.parent == Some(parent))
            .map(|entry| entry.pid)
            .collect()
    }

    /// Every master-signature process except this controller.
    pub fn masters(&self) -> BTreeSet<u32> {
        self.table
            .snapshot()
            .into_iter()
            .filter(|entry| entry.pid != self.own_pid)
            .filter(|entry| self.master_pattern.is_match(&entry.command))
            .map(|entry| entry.pid)
            .collect()
    }

    /// Master-signature processes other than `tracked` and this controller.
    pub fn rogue_masters(&self, tracked: u32) -> BTreeSet<u32> {
        let mut masters = self.masters();
        masters.remove(&tracked);
        masters
    }
}
