//! Precondition checks wrapped around every administrative action.
use std::str::FromStr;

use strum_macros::{AsRefStr, Display};
use tracing::debug;

use crate::{
    constants::{IS_RUNNING_MSG, NOT_RUNNING_MSG},
    error::{Result, UnicornError},
    pid_file::PidFile,
    process::{ProcessProbe, ProcessTable, SignalSender},
};

/// State the master must be in before an action may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum RequiredState {
    Running,
    Stopped,
}

impl FromStr for RequiredState {
    type Err = UnicornError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            _ => Err(UnicornError::Unicorn(
                "Unknown process state received".to_string(),
            )),
        }
    }
}

/// Checks the master's state against the PID file before running an action.
pub struct ActionGate<'a, T, S> {
    pid_file: &'a PidFile,
    probe: &'a ProcessProbe<T, S>,
}

impl<'a, T: ProcessTable, S: SignalSender> ActionGate<'a, T, S> {
    pub fn new(pid_file: &'a PidFile, probe: &'a ProcessProbe<T, S>) -> Self {
        Self { pid_file, probe }
    }

    /// Runs `action` if the master is in `state`.
    ///
    /// `Running` reads the PID file strictly, so a missing file surfaces as
    /// `FileNotFound`, and hands the PID it just found alive to `action`.
    /// `Stopped` treats a missing or unreadable file as stopped and hands `None`.
    pub fn require<R>(
        &self,
        state: RequiredState,
        action: impl FnOnce(Option<u32>) -> Result<R>,
    ) -> Result<R> {
        match state {
            RequiredState::Running => {
                let pid = self.pid_file.read()?;
                if !self.probe.is_alive(pid) {
                    return Err(UnicornError::NotRunning(NOT_RUNNING_MSG.to_string()));
                }
                debug!("Master PID {pid} is running");
                action(Some(pid))
            }
            RequiredState::Stopped => {
                if let Some(pid) = self.pid_file.read_opt()
                    && self.probe.is_alive(pid)
                {
                    return Err(UnicornError::IsRunning(IS_RUNNING_MSG.to_string()));
                }
                debug!("No master is running");
                action(None)
            }
        }
    }
}
