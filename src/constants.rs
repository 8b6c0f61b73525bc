//! Constants and default values for the unicorn controller.
//!
//! Centralizes the default paths, timings and process signatures used when a
//! settings file leaves a value unspecified.

use std::time::Duration;

// ============================================================================
// File System Defaults
// ============================================================================

/// Default location of the master PID file written by unicorn.
pub const DEFAULT_PID_FILE: &str = "/var/run/unicorn/unicorn.pid";

/// Default unicorn executable inside a bundler deployment.
///
/// Also used as the fallback when a configured executable is missing.
pub const DEFAULT_EXEC_PATH: &str = "/var/www/shared/bundle/bin/unicorn_rails";

/// Default unicorn configuration file handed to the executable on start.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/unicorn/app.rb";

/// Default application environment.
pub const DEFAULT_ENVIRONMENT: &str = "production";

// ============================================================================
// Timing
// ============================================================================

/// Seconds to wait for the new master to become healthy and the old one to exit.
pub const DEFAULT_ACTION_TIMEOUT_SECS: f64 = 30.0;

/// Seconds to wait for a new PID to appear after the spawn signal.
pub const DEFAULT_RESTART_GRACE_SECS: f64 = 8.0;

/// Sleep quantum of every polling loop.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;

/// Wait between terminating a rogue and re-checking it.
pub const DEFAULT_ROGUE_GRACE_MS: u64 = 1000;

/// How long a finished launch waits for the rest of its captured output.
pub const OUTPUT_DRAIN: Duration = Duration::from_millis(250);

/// Lower bound for the polling quantum so loops never spin.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

// ============================================================================
// Process Signatures
// ============================================================================

/// Command line pattern identifying a unicorn master process.
pub const DEFAULT_MASTER_PATTERN: &str = r"unicorn(_rails)? master";

// ============================================================================
// Executable Flags
// ============================================================================

/// Flag asking unicorn to detach into the background.
pub const DAEMONIZE_FLAG: &str = "--daemonize";

/// Flag selecting the application environment.
pub const ENV_FLAG: &str = "--env";

/// Flag pointing unicorn at its configuration file.
pub const CONFIG_FILE_FLAG: &str = "--config-file";

// ============================================================================
// Messages
// ============================================================================

/// Reported when a running master is required but none is alive.
pub const NOT_RUNNING_MSG: &str = "Unicorn is not currently running";

/// Reported when no master may be running but one is alive.
pub const IS_RUNNING_MSG: &str = "Unicorn is currently running";

/// Reported when the replacement master never became healthy.
pub const NEW_PROCESS_FAILED_MSG: &str = "failed to start new process";

/// Reported when the original master survived retirement.
pub const ORIGINAL_PROCESS_ALIVE_MSG: &str = "failed to stop original process";

/// Reported when the PID file never changed after the spawn signal.
pub const NO_NEW_PROCESS_MSG: &str = "no new process found within grace period";
