//! Supervised Metro bundler process.
//!
//! The bundler runs as a separate OS process for the whole duration of a run.
//! [`Bundler`] owns the child and guarantees it is terminated: explicitly via
//! [`Bundler::shutdown`], and as a fallback when the handle is dropped.
//!
//! # Example
//!
//! ```no_run
//! use rnharness_core::bundler::Bundler;
//! use rnharness_core::config::CommandLine;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cli = CommandLine::new("npx").arg("react-native");
//! let mut bundler = Bundler::spawn(&cli, "--projectRoots=/app,/tests")?;
//!
//! tokio::select! {
//!     code = bundler.unexpected_exit() => eprintln!("Metro died with {code}"),
//!     _ = tokio::time::sleep(std::time::Duration::from_secs(60)) => {}
//! }
//! bundler.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::process::Child;
use tracing::{debug, error, info, warn};

use crate::config::CommandLine;

/// How long a bundler gets to exit after the termination signal before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Errors that can occur when starting the bundler.
#[derive(Error, Debug)]
pub enum BundlerError {
    /// The bundler executable could not be started.
    #[error("Failed to start bundler `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Handle to a running bundler child process.
pub struct Bundler {
    child: Child,
    status: Option<ExitStatus>,
}

impl Bundler {
    /// Starts `<cli> start <project_roots_arg>` in the background.
    ///
    /// Stdin is closed; stdout and stderr are inherited so Metro's output
    /// shows up next to the runner's logs.
    ///
    /// # Errors
    ///
    /// - [`BundlerError::Spawn`] if the process cannot be started
    pub fn spawn(cli: &CommandLine, project_roots_arg: &str) -> Result<Self, BundlerError> {
        let child = cli
            .command()
            .arg("start")
            .arg(project_roots_arg)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BundlerError::Spawn {
                command: format!("{cli} start {project_roots_arg}"),
                source,
            })?;

        info!(pid = ?child.id(), command = %cli, "Bundler started");
        Ok(Self {
            child,
            status: None,
        })
    }

    /// OS process id, while the child has not been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Resolves when the bundler exits on its own with a non-zero status.
    ///
    /// Returns the exit code; a bundler killed by a signal reports `1`. A
    /// clean exit is logged and the future never resolves, so a bundler that
    /// stops normally does not end the run. Cancel safe.
    pub async fn unexpected_exit(&mut self) -> i32 {
        let status = match self.status {
            Some(status) => status,
            None => match self.child.wait().await {
                Ok(status) => {
                    self.status = Some(status);
                    status
                }
                Err(e) => {
                    warn!(error = %e, "Failed to wait for bundler");
                    return std::future::pending().await;
                }
            },
        };

        if status.success() {
            info!("Bundler exited");
            return std::future::pending().await;
        }

        let code = status.code().unwrap_or(1);
        error!(code, "Bundler unexpectedly closed (code = {code})");
        code
    }

    /// Terminates the bundler and waits for it to go away.
    ///
    /// Sends SIGHUP on Unix and escalates to a kill if the process is still
    /// alive after a short grace period. Calling this on an already exited
    /// bundler is a no-op.
    pub async fn shutdown(&mut self) {
        if self.has_exited() {
            debug!("Bundler already exited");
            return;
        }

        self.signal_hangup();

        match tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.status = Some(status);
                info!(?status, "Bundler stopped");
                return;
            }
            Ok(Err(e)) => warn!(error = %e, "Failed to wait for bundler"),
            Err(_) => warn!("Bundler ignored termination signal, killing it"),
        }

        if let Err(e) = self.child.kill().await {
            warn!(error = %e, "Failed to kill bundler");
        }
    }

    fn has_exited(&mut self) -> bool {
        if self.status.is_some() {
            return true;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.status = Some(status);
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "Failed to poll bundler status");
                false
            }
        }
    }

    #[cfg(unix)]
    fn signal_hangup(&mut self) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id() else {
            return;
        };
        let Ok(raw) = i32::try_from(pid) else {
            return;
        };
        if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGHUP) {
            warn!(error = %e, pid, "Failed to signal bundler");
        }
    }

    #[cfg(not(unix))]
    fn signal_hangup(&mut self) {
        if let Err(e) = self.child.start_kill() {
            warn!(error = %e, "Failed to stop bundler");
        }
    }
}
