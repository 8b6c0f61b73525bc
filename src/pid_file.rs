//! Access to the master PID file written by unicorn.
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::error::{Result, UnicornError};

/// Handle on the PID file naming the current master.
///
/// Nothing is cached: unicorn rewrites the file during its own handoff, so
/// every call goes back to disk.
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Creates a handle for the PID file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the PID file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the PID file is currently present.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Reads the master PID, failing when the file is absent or malformed.
    pub fn read(&self) -> Result<u32> {
        let contents = fs::read_to_string(&self.path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => UnicornError::FileNotFound {
                what: "PID file",
                path: self.path.clone(),
            },
            _ => UnicornError::Io(err),
        })?;

        let trimmed = contents.trim();
        match trimmed.parse::<u32>() {
            Ok(pid) if pid > 0 => Ok(pid),
            _ => Err(UnicornError::InvalidPid {
                path: self.path.clone(),
                content: trimmed.to_string(),
            }),
        }
    }

    /// Reads the master PID if one can be read right now.
    pub fn read_opt(&self) -> Option<u32> {
        match self.read() {
            Ok(pid) => Some(pid),
            Err(err) => {
                debug!("No usable PID at {:?}: {err}", self.path);
                None
            }
        }
    }
}
