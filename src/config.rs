//! Configuration management for unicornctl.
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, warn};

use crate::constants::{
    DEFAULT_ACTION_TIMEOUT_SECS, DEFAULT_CONFIG_PATH, DEFAULT_ENVIRONMENT,
    DEFAULT_EXEC_PATH, DEFAULT_MASTER_PATTERN, DEFAULT_PID_FILE,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_RESTART_GRACE_SECS, DEFAULT_ROGUE_GRACE_MS,
    MIN_POLL_INTERVAL,
};
use crate::error::{Result, UnicornError};

/// Settings for a single unicorn deployment.
///
/// Every key is optional in the settings file; missing keys take the
/// defaults from [`crate::constants`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Path to the master PID file.
    pub pid_file: PathBuf,
    /// Path to the unicorn executable.
    pub exec_path: PathBuf,
    /// Path to the unicorn configuration file passed on start.
    pub config_path: PathBuf,
    /// Seconds allowed for the new master to become healthy and the old one to exit.
    pub action_timeout: f64,
    /// Seconds allowed for a new PID to appear after the spawn signal.
    pub restart_grace: f64,
    /// Terminate rogue masters before every action.
    pub kill_rogues: bool,
    /// Application environment handed to the executable.
    pub environment: String,
    /// Sleep quantum for polling loops, in milliseconds.
    pub poll_interval_ms: u64,
    /// Wait between terminating a rogue and re-checking it, in milliseconds.
    pub rogue_grace_ms: u64,
    /// Regex matched against command lines to recognise master processes.
    pub master_pattern: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pid_file: PathBuf::from(DEFAULT_PID_FILE),
            exec_path: PathBuf::from(DEFAULT_EXEC_PATH),
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            action_timeout: DEFAULT_ACTION_TIMEOUT_SECS,
            restart_grace: DEFAULT_RESTART_GRACE_SECS,
            kill_rogues: false,
            environment: DEFAULT_ENVIRONMENT.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            rogue_grace_ms: DEFAULT_ROGUE_GRACE_MS,
            master_pattern: DEFAULT_MASTER_PATTERN.to_string(),
        }
    }
}

/// Values supplied on the command line that take precedence over the settings file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub pid_file: Option<PathBuf>,
    pub exec_path: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub action_timeout: Option<f64>,
    pub restart_grace: Option<f64>,
    pub kill_rogues: bool,
    pub environment: Option<String>,
}

/// Converts fractional seconds into a duration, clamping negatives to zero.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

impl Config {
    /// Budget for the new master to become healthy and the original to exit.
    pub fn action_timeout(&self) -> Duration {
        seconds(self.action_timeout)
    }

    /// Budget for the PID file to change after the spawn signal.
    pub fn restart_grace(&self) -> Duration {
        seconds(self.restart_grace)
    }

    /// Sleep quantum used by every polling loop.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms).max(MIN_POLL_INTERVAL)
    }

    /// Wait between terminating a rogue and re-checking its liveness.
    pub fn rogue_grace(&self) -> Duration {
        Duration::from_millis(self.rogue_grace_ms)
    }

    /// Layers command line overrides on top of the loaded settings.
    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(pid_file) = &overrides.pid_file {
            self.pid_file = pid_file.clone();
        }
        if let Some(exec_path) = &overrides.exec_path {
            self.exec_path = exec_path.clone();
        }
        if let Some(config_path) = &overrides.config_path {
            self.config_path = config_path.clone();
        }
        if let Some(timeout) = overrides.action_timeout {
            self.action_timeout = timeout;
        }
        if let Some(grace) = overrides.restart_grace {
            self.restart_grace = grace;
        }
        if let Some(environment) = &overrides.environment {
            self.environment = environment.clone();
        }
        self.kill_rogues |= overrides.kill_rogues;
    }

    /// Ensures the executable exists, falling back to the bundled default path.
    pub(crate) fn resolve_exec_path(&mut self) -> Result<()> {
        if self.exec_path.exists() {
            return Ok(());
        }

        let fallback = Path::new(DEFAULT_EXEC_PATH);
        if fallback.exists() {
            warn!(
                "Unicorn executable {:?} not found; falling back to {:?}",
                self.exec_path, fallback
            );
            self.exec_path = fallback.to_path_buf();
            return Ok(());
        }

        Err(UnicornError::FileNotFound {
            what: "Unicorn executable",
            path: self.exec_path.clone(),
        })
    }
}

/// Expands `$VAR` and `${VAR}` references within a string.
fn expand_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?")?;

    let mut missing = None;
    let result = re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        match env::var(var_name) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| var_name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(name) => Err(UnicornError::MissingVariable(name)),
        None => Ok(result.into_owned()),
    }
}

/// Loads the YAML settings file, expanding environment variables.
///
/// Without a path the built-in defaults are returned.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };

    let content = fs::read_to_string(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => UnicornError::FileNotFound {
            what: "Settings file",
            path: path.to_path_buf(),
        },
        _ => UnicornError::Io(err),
    })?;

    let expanded = expand_env_vars(&content)?;
    if expanded.trim().is_empty() {
        return Ok(Config::default());
    }

    let config: Config = serde_yaml::from_str(&expanded)?;
    debug!("Loaded settings from {:?}: {:?}", path, config);
    Ok(config)
}
