//! Launching the unicorn executable for a cold start.
use std::{
    io::Read,
    process::{Child, Command, ExitStatus, Stdio},
    sync::mpsc::{self, Receiver},
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    constants::{CONFIG_FILE_FLAG, DAEMONIZE_FLAG, ENV_FLAG, OUTPUT_DRAIN},
    error::{Result, UnicornError},
};

/// Starts a daemonized master.
pub trait Launcher {
    /// Launches the server; returns once the daemonizing parent has exited.
    fn launch(&self, config: &Config) -> Result<()>;
}

/// Runs the configured unicorn executable.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExecLauncher;

impl ExecLauncher {
    /// Builds the command line used to start unicorn.
    pub fn command(config: &Config) -> Command {
        let mut command = Command::new(&config.exec_path);
        command
            .arg(DAEMONIZE_FLAG)
            .arg(ENV_FLAG)
            .arg(&config.environment)
            .arg(CONFIG_FILE_FLAG)
            .arg(&config.config_path)
            .stdin(Stdio::null());
        command
    }
}

/// Waits for the daemonizing parent only, returning `Ok(None)` on timeout.
fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
    poll: Duration,
) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;

    loop {
        match child.try_wait()? {
            Some(status) => return Ok(Some(status)),
            None => {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(None);
                }
                thread::sleep(poll.min(deadline - now));
            }
        }
    }
}

/// Forwards chunks read from `pipe` until EOF.
///
/// The daemonized server may inherit the pipe and hold it open, so readers
/// are never joined.
fn capture<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    if let Some(mut pipe) = pipe {
        thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match pipe.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }
    rx
}

/// Output received before EOF or `deadline`, whichever comes first.
fn collect(rx: &Receiver<Vec<u8>>, deadline: Instant) -> String {
    let mut out = Vec::new();
    while let Ok(chunk) = rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        out.extend(chunk);
    }
    String::from_utf8_lossy(&out).trim().to_string()
}

impl Launcher for ExecLauncher {
    fn launch(&self, config: &Config) -> Result<()> {
        info!(
            "Launching {:?} (env {}, config {:?})",
            config.exec_path, config.environment, config.config_path
        );

        let mut command = Self::command(config);
        command.stdout(Stdio::piped()).stderr(Stdio::piped());
        let mut child = command.spawn()?;
        let stdout = capture(child.stdout.take());
        let stderr = capture(child.stderr.take());

        let timeout = config.action_timeout();
        let Some(status) = wait_with_timeout(&mut child, timeout, config.poll_interval())? else {
            warn!("Unicorn executable still running after {timeout:?}; killing it");
            let _ = child.kill();
            let _ = child.wait();
            return Err(UnicornError::Timeout(format!(
                "unicorn executable did not exit within {timeout:?}"
            )));
        };

        let drained = Instant::now() + OUTPUT_DRAIN;
        let stdout = collect(&stdout, drained);
        let stderr = collect(&stderr, drained);
        if !stdout.is_empty() {
            debug!("unicorn stdout: {stdout}");
        }
        if !stderr.is_empty() {
            debug!("unicorn stderr: {stderr}");
        }

        if status.success() {
            return Ok(());
        }

        error!("Unicorn executable exited with {status}");
        Err(UnicornError::ActionFailed(format!(
            "unicorn executable exited with {status}: {stderr}"
        )))
    }
}
