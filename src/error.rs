//! Error handling for unicornctl.
use std::path::PathBuf;

use thiserror::Error;

/// Defines every failure an administrative action can surface to its caller.
#[derive(Debug, Error)]
pub enum UnicornError {
    /// A required file (executable or PID file) is missing.
    #[error("{what} not found. Provided path: {}", .path.display())]
    FileNotFound {
        /// Human readable name of the missing file.
        what: &'static str,
        /// The path that was checked.
        path: PathBuf,
    },

    /// An action that needs a live master found none.
    #[error("{0}")]
    NotRunning(String),

    /// An action that needs no live master found one.
    #[error("{0}")]
    IsRunning(String),

    /// A polling loop ran out of time before its condition held.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Generic failure of a multi-step action (restart, launch).
    #[error("{0}")]
    ActionFailed(String),

    /// Invalid internal state; indicates a programming error.
    #[error("{0}")]
    Unicorn(String),

    /// The PID file exists but does not hold a positive integer.
    #[error("Invalid PID file {}: {content:?}", .path.display())]
    InvalidPid {
        /// Location of the PID file.
        path: PathBuf,
        /// Trimmed file contents.
        content: String,
    },

    /// Error reading a file or spawning a process.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error parsing the YAML settings file.
    #[error("Invalid YAML format: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Error compiling the master process pattern.
    #[error("Invalid master pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// The settings file references an unset environment variable.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    /// Error serializing command output.
    #[error("Failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),

    /// The OS refused a signal for a reason other than a missing process.
    #[error("Failed to signal process: {0}")]
    Signal(#[from] nix::errno::Errno),
}

/// Coarse classification of [`UnicornError`] used for reporting and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    FileNotFound,
    NotRunning,
    IsRunning,
    Timeout,
    Generic,
}

impl ErrorKind {
    /// Process exit code reported by the binary for this kind of failure.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Generic => 1,
            Self::FileNotFound => 2,
            Self::NotRunning => 3,
            Self::IsRunning => 4,
            Self::Timeout => 5,
        }
    }
}

impl UnicornError {
    /// Returns the kind this error is reported as.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FileNotFound { .. } => ErrorKind::FileNotFound,
            Self::NotRunning(_) => ErrorKind::NotRunning,
            Self::IsRunning(_) => ErrorKind::IsRunning,
            Self::Timeout(_) => ErrorKind::Timeout,
            _ => ErrorKind::Generic,
        }
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, UnicornError>;
