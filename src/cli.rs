//! Command-line interface for unicornctl.
use std::{path::PathBuf, str::FromStr};

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

use crate::{config::ConfigOverrides, controller::Action};

/// Wrapper around `LevelFilter` so clap can parse log levels from either
/// string names ("info", "debug", etc.) or numeric shorthands (0-5).
#[derive(Clone, Copy, Debug)]
pub struct LogLevelArg(LevelFilter);

impl LogLevelArg {
    /// String representation suitable for `RUST_LOG`.
    pub fn as_str(&self) -> &'static str {
        match self.0 {
            LevelFilter::OFF => "off",
            LevelFilter::ERROR => "error",
            LevelFilter::WARN => "warn",
            LevelFilter::INFO => "info",
            LevelFilter::DEBUG => "debug",
            LevelFilter::TRACE => "trace",
        }
    }
}

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("log level cannot be empty".into());
        }

        if let Ok(number) = trimmed.parse::<u8>() {
            let level = match number {
                0 => LevelFilter::OFF,
                1 => LevelFilter::ERROR,
                2 => LevelFilter::WARN,
                3 => LevelFilter::INFO,
                4 => LevelFilter::DEBUG,
                5 => LevelFilter::TRACE,
                _ => {
                    return Err(format!(
                        "unsupported log level number '{number}' (expected 0-5)"
                    ));
                }
            };

            return Ok(LogLevelArg(level));
        }

        let level = match trimmed.to_ascii_lowercase().as_str() {
            "off" => Some(LevelFilter::OFF),
            "error" | "err" => Some(LevelFilter::ERROR),
            "warn" | "warning" => Some(LevelFilter::WARN),
            "info" | "information" => Some(LevelFilter::INFO),
            "debug" => Some(LevelFilter::DEBUG),
            "trace" => Some(LevelFilter::TRACE),
            _ => None,
        }
        .ok_or_else(|| format!("invalid log level '{trimmed}'"))?;

        Ok(LogLevelArg(level))
    }
}

/// Command-line interface for unicornctl.
#[derive(Parser)]
#[command(name = "unicornctl", version, author)]
#[command(about = "Controls a unicorn master through its PID file and signals", long_about = None)]
pub struct Cli {
    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevelArg>,

    /// YAML settings file for the controller.
    #[arg(short = 'f', long = "file", value_name = "FILE", global = true)]
    pub file: Option<PathBuf>,

    /// Path to the unicorn PID file.
    #[arg(long = "pid", value_name = "PATH", global = true)]
    pub pid_file: Option<PathBuf>,

    /// Path to the unicorn executable.
    #[arg(long, value_name = "PATH", global = true)]
    pub exec_path: Option<PathBuf>,

    /// Path to the unicorn configuration file used on start.
    #[arg(long, value_name = "PATH", global = true)]
    pub config_path: Option<PathBuf>,

    /// Application environment used on start.
    #[arg(long = "env", value_name = "NAME", global = true)]
    pub environment: Option<String>,

    /// Seconds allowed for the new master to come up and the old one to exit.
    #[arg(long, value_name = "SECONDS", global = true)]
    pub action_timeout: Option<f64>,

    /// Seconds allowed for a new PID to appear after a restart is signalled.
    #[arg(long, value_name = "SECONDS", global = true)]
    pub restart_grace: Option<f64>,

    /// Terminate rogue unicorn masters before running the command.
    #[arg(long, global = true)]
    pub kill_rogues: bool,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for unicornctl.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Start a daemonized unicorn master.
    Start,
    /// Gracefully stop the master (QUIT).
    Stop,
    /// Immediately stop the master (TERM).
    Halt,
    /// Replace the master without dropping requests.
    Restart,
    /// Reload the unicorn configuration (HUP).
    Reload,
    /// Add a worker (TTIN).
    AddChild,
    /// Remove a worker (TTOU).
    RemoveChild,
    /// Stop every worker but keep the master (WINCH).
    RemoveAllChildren,
    /// Reopen log files (USR1).
    ReopenLogs,
    /// Report whether the master is running.
    Status {
        /// Emit machine-readable JSON output.
        #[arg(long)]
        json: bool,
    },
    /// List rogue masters without terminating them.
    Rogues {
        /// Emit machine-readable JSON output.
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    /// The controller action this command runs, if it maps to one.
    pub fn action(&self) -> Option<Action> {
        match self {
            Commands::Start => Some(Action::Start),
            Commands::Stop => Some(Action::Stop),
            Commands::Halt => Some(Action::Halt),
            Commands::Restart => Some(Action::Restart),
            Commands::Reload => Some(Action::Reload),
            Commands::AddChild => Some(Action::AddChild),
            Commands::RemoveChild => Some(Action::RemoveChild),
            Commands::RemoveAllChildren => Some(Action::RemoveAllChildren),
            Commands::ReopenLogs => Some(Action::ReopenLogs),
            Commands::Status { .. } => Some(Action::Status),
            Commands::Rogues { .. } => None,
        }
    }
}

impl Cli {
    /// Settings supplied as flags, applied over the settings file.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            pid_file: self.pid_file.clone(),
            exec_path: self.exec_path.clone(),
            config_path: self.config_path.clone(),
            action_timeout: self.action_timeout,
            restart_grace: self.restart_grace,
            kill_rogues: self.kill_rogues,
            environment: self.environment.clone(),
        }
    }
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}
