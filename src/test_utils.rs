//! Helpers shared by unit and integration tests.
use std::{
    collections::{BTreeMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, OnceLock},
};

use nix::errno::Errno;

use crate::{
    config::Config,
    error::{Result, UnicornError},
    launcher::Launcher,
    process::{ProcessEntry, ProcessTable, Signal, SignalSender},
};

/// Global lock for environment variable modifications in tests.
/// All tests that modify environment variables should acquire this lock
/// to prevent race conditions between parallel test executions.
pub static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

type Reaction = Arc<dyn Fn(&FakeSystem) + Send + Sync>;

#[derive(Default)]
struct FakeState {
    processes: BTreeMap<u32, ProcessEntry>,
    refused: HashSet<u32>,
    sent: Vec<(u32, Signal)>,
    reactions: Vec<(u32, Signal, Reaction)>,
    on_launch: Option<Reaction>,
    launches: usize,
}

/// Scripted stand-in for the process table, `kill(2)` and the unicorn executable.
///
/// Clones share state, so a test keeps one handle while the controller owns others.
/// Reactions registered with [`FakeSystem::on_signal`] let a test play the
/// part of a unicorn master answering signals.
#[derive(Clone, Default)]
pub struct FakeSystem {
    state: Arc<Mutex<FakeState>>,
}

impl FakeSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds a live process.
    pub fn spawn(&self, pid: u32, parent: Option<u32>, command: &str) {
        self.lock().processes.insert(
            pid,
            ProcessEntry {
                pid,
                parent,
                command: command.to_string(),
            },
        );
    }

    /// Removes a process, as if it exited and was reaped.
    pub fn exit(&self, pid: u32) {
        self.lock().processes.remove(&pid);
    }

    /// Makes every signal to `pid` fail with `EPERM`.
    pub fn refuse_signals(&self, pid: u32) {
        self.lock().refused.insert(pid);
    }

    /// Runs `reaction` whenever `signal` is delivered to `pid`.
    pub fn on_signal(
        &self,
        pid: u32,
        signal: Signal,
        reaction: impl Fn(&FakeSystem) + Send + Sync + 'static,
    ) {
        self.lock().reactions.push((pid, signal, Arc::new(reaction)));
    }

    /// Runs `reaction` whenever the executable is launched.
    pub fn on_launch(&self, reaction: impl Fn(&FakeSystem) + Send + Sync + 'static) {
        self.lock().on_launch = Some(Arc::new(reaction));
    }

    /// Signals delivered so far, excluding liveness probes.
    pub fn sent(&self) -> Vec<(u32, Signal)> {
        self.lock().sent.clone()
    }

    /// Number of times the executable was launched.
    pub fn launches(&self) -> usize {
        self.lock().launches
    }

    /// Whether `pid` is currently in the fake process table.
    pub fn contains(&self, pid: u32) -> bool {
        self.lock().processes.contains_key(&pid)
    }
}

impl ProcessTable for FakeSystem {
    fn snapshot(&self) -> Vec<ProcessEntry> {
        self.lock().processes.values().cloned().collect()
    }
}

impl SignalSender for FakeSystem {
    fn send(&self, pid: u32, signal: Option<Signal>) -> Result<bool> {
        let reactions: Vec<Reaction> = {
            let mut state = self.lock();
            if state.refused.contains(&pid) {
                return Err(UnicornError::Signal(Errno::EPERM));
            }
            if !state.processes.contains_key(&pid) {
                return Ok(false);
            }
            let Some(signal) = signal else {
                return Ok(true);
            };

            state.sent.push((pid, signal));
            state
                .reactions
                .iter()
                .filter(|(target, expected, _)| *target == pid && *expected == signal)
                .map(|(_, _, reaction)| Arc::clone(reaction))
                .collect()
        };

        for reaction in reactions {
            reaction(self);
        }
        Ok(true)
    }
}

impl Launcher for FakeSystem {
    fn launch(&self, _config: &Config) -> Result<()> {
        let reaction = {
            let mut state = self.lock();
            state.launches += 1;
            state.on_launch.clone()
        };

        if let Some(reaction) = reaction {
            reaction(self);
        }
        Ok(())
    }
}
