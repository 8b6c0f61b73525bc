//! unicornctl controls a pre-fork unicorn server from the outside. It never
//! runs the server itself: it reads the master's PID file, inspects the
//! process table and sends signals to start, stop, scale and gracefully
//! restart the master, and to clean up rogue masters left behind by earlier
//! failures.

/// CLI interface.
pub mod cli;

/// Configuration management.
pub mod config;

/// Default paths, timings and messages.
pub mod constants;

/// The controller tying every action together.
pub mod controller;

/// Error handling.
pub mod error;

/// Precondition checks for actions.
pub mod gate;

/// Launching the unicorn executable.
pub mod launcher;

/// Master PID file access.
pub mod pid_file;

/// Process table and signal seams.
pub mod process;

/// Rogue master cleanup.
pub mod reaper;

/// Graceful master replacement.
pub mod restart;

/// Test helpers shared with integration tests.
pub mod test_utils;

pub use config::{Config, ConfigOverrides, load_config};
pub use controller::{Action, ActionOutcome, MasterStatus, Unicorn};
pub use error::{ErrorKind, Result, UnicornError};
