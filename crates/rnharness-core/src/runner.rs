//! Orchestration of a complete test run.
//!
//! [`Runner::run`] sequences the other components:
//!
//! 1. validate the platform
//! 2. start the Metro bundler
//! 3. start the coordinator
//! 4. deploy and launch the app
//! 5. wait for the app to report its failure count
//!
//! Steps 3 to 5 race against an unexpected bundler exit, Ctrl-C and SIGTERM. Whichever
//! way the run ends, the coordinator is stopped and the bundler is shut down
//! before `run` returns.
//!
//! The outcome maps onto the process exit code: `0` when every test passed,
//! `1` when some failed, `2` for any unexpected error, and the bundler's own
//! exit code when it died early.

use thiserror::Error;
use tracing::{info, warn};

use crate::args::ArgsError;
use crate::bundler::{Bundler, BundlerError};
use crate::config::{ConfigError, HarnessConfig};
use crate::coordinator::{Coordinator, CoordinatorError};
use crate::deployer::{deploy, DeployError, PlatformTools};
use crate::platform::Platform;

/// Exit code when every test passed.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code when at least one test failed.
pub const EXIT_TEST_FAILURES: i32 = 1;
/// Exit code for errors that prevented the tests from completing.
pub const EXIT_UNEXPECTED_ERROR: i32 = 2;

/// Errors that end a run before the app reported its results.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Args(#[from] ArgsError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Bundler(#[from] BundlerError),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    /// The bundler exited on its own with a non-zero code.
    #[error("Bundler unexpectedly closed (code = {0})")]
    BundlerExited(i32),

    /// The runner received Ctrl-C or SIGTERM.
    #[error("Interrupted")]
    Interrupted,
}

impl RunError {
    /// The process exit code for this error.
    ///
    /// An early bundler exit keeps the bundler's code; everything else is
    /// [`EXIT_UNEXPECTED_ERROR`].
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::BundlerExited(code) => *code,
            _ => EXIT_UNEXPECTED_ERROR,
        }
    }
}

/// Result of a run in which the app reported back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// Number of failed tests.
    pub failures: u32,
}

impl RunOutcome {
    /// The process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        if self.failures > 0 {
            EXIT_TEST_FAILURES
        } else {
            EXIT_SUCCESS
        }
    }
}

/// Runs the test app once on a single platform.
pub struct Runner<T: PlatformTools> {
    config: HarnessConfig,
    tools: T,
}

impl<T: PlatformTools> Runner<T> {
    pub fn new(config: HarnessConfig, tools: T) -> Self {
        Self { config, tools }
    }

    /// Performs the run and returns how many tests failed.
    ///
    /// An unsupported platform is rejected before anything is started.
    ///
    /// # Errors
    ///
    /// - [`RunError::Deploy`] for an unsupported platform, a missing device or
    ///   a failed app launch
    /// - [`RunError::Bundler`] if Metro cannot be started
    /// - [`RunError::BundlerExited`] if Metro exits early with a non-zero code
    /// - [`RunError::Coordinator`] if the port is taken or the timeout expires
    /// - [`RunError::Interrupted`] on Ctrl-C or SIGTERM
    pub async fn run(self) -> Result<RunOutcome, RunError> {
        let platform: Platform = self.config.platform.parse()?;
        info!(%platform, roots = ?self.config.project_roots, "Starting test run");

        // Listen before Metro exists so a termination request always gets cleaned up.
        let mut interrupt = Interrupt::install();

        let mut bundler =
            Bundler::spawn(&self.config.bundler, &self.config.project_roots_arg())?;
        let mut coordinator = Coordinator::new(platform.as_str(), self.config.port);

        let result = tokio::select! {
            result = drive(&mut coordinator, platform, &self.config, &self.tools) => result,
            code = bundler.unexpected_exit() => Err(RunError::BundlerExited(code)),
            () = interrupt.recv() => {
                warn!("Interrupted, shutting down");
                Err(RunError::Interrupted)
            }
        };

        coordinator.stop();
        bundler.shutdown().await;

        match &result {
            Ok(outcome) => info!(failures = outcome.failures, "Test run finished"),
            Err(e) => warn!(error = %e, "Test run aborted"),
        }
        result
    }
}

async fn drive(
    coordinator: &mut Coordinator,
    platform: Platform,
    config: &HarnessConfig,
    tools: &dyn PlatformTools,
) -> Result<RunOutcome, RunError> {
    let addr = coordinator.start().await?;
    deploy(platform, addr.port(), tools).await?;
    let failures = coordinator.run_with_timeout(config.timeout).await?;
    Ok(RunOutcome { failures })
}

/// Termination requests: Ctrl-C everywhere, SIGTERM on Unix.
struct Interrupt {
    #[cfg(unix)]
    sigterm: Option<tokio::signal::unix::Signal>,
}

impl Interrupt {
    fn install() -> Self {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let sigterm = match signal(SignalKind::terminate()) {
                Ok(sigterm) => Some(sigterm),
                Err(e) => {
                    warn!(error = %e, "Failed to listen for SIGTERM");
                    None
                }
            };
            Self { sigterm }
        }
        #[cfg(not(unix))]
        {
            Self {}
        }
    }

    /// Resolves once a termination request arrives.
    async fn recv(&mut self) {
        #[cfg(unix)]
        {
            if let Some(sigterm) = self.sigterm.as_mut() {
                tokio::select! {
                    Ok(()) = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                    Some(()) = sigterm.recv() => info!("Received SIGTERM"),
                    else => std::future::pending().await,
                }
                return;
            }
        }

        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT"),
            Err(e) => {
                warn!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_exit_codes() {
        assert_eq!(RunOutcome { failures: 0 }.exit_code(), 0);
        assert_eq!(RunOutcome { failures: 1 }.exit_code(), 1);
        assert_eq!(RunOutcome { failures: 3 }.exit_code(), 1);
    }

    #[test]
    fn error_exit_codes() {
        assert_eq!(RunError::Args(ArgsError::MissingPlatform).exit_code(), 2);
        assert_eq!(RunError::Deploy(DeployError::NoActiveDevice).exit_code(), 2);
        assert_eq!(
            RunError::Deploy(DeployError::UnexpectedPlatform("windows".into())).exit_code(),
            2
        );
        assert_eq!(RunError::Coordinator(CoordinatorError::Closed).exit_code(), 2);
        assert_eq!(RunError::Interrupted.exit_code(), 2);
        assert_eq!(RunError::BundlerExited(7).exit_code(), 7);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sigterm_is_an_interrupt() {
        let mut interrupt = Interrupt::install();
        assert!(interrupt.sigterm.is_some());

        let pid = nix::unistd::Pid::this();
        nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM).unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(5), interrupt.recv())
            .await
            .expect("SIGTERM should resolve the interrupt");
    }

    #[test]
    fn transparent_errors_keep_their_message() {
        let err = RunError::from(DeployError::NoActiveDevice);
        assert!(err.to_string().starts_with("Missing an active device"));
        assert_eq!(
            RunError::BundlerExited(7).to_string(),
            "Bundler unexpectedly closed (code = 7)"
        );
    }
}
