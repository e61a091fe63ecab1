//! Interface to the React Native command-line tool.

use std::process::Stdio;

use thiserror::Error;
use tracing::info;

use crate::config::CommandLine;
use crate::platform::Platform;

/// Flag telling `run-android`/`run-ios` not to start its own Metro bundler.
pub const NO_PACKAGER: &str = "--no-packager";

/// Errors that can occur when running the React Native CLI.
#[derive(Error, Debug)]
pub enum ReactNativeError {
    /// The CLI exited with a non-zero status.
    #[error("`{command}` failed with {status}")]
    CommandFailed {
        command: String,
        status: std::process::ExitStatus,
    },

    /// The CLI could not be executed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wrapper for React Native CLI commands.
#[derive(Debug, Clone)]
pub struct ReactNativeCli {
    cli: CommandLine,
}

impl ReactNativeCli {
    pub fn new(cli: CommandLine) -> Self {
        Self { cli }
    }

    /// Builds, installs and launches the app on `platform`, without a packager.
    ///
    /// Output is inherited so build logs stream to the terminal. Returns once
    /// the CLI exits, which is after the app has been launched.
    ///
    /// # Errors
    ///
    /// - [`ReactNativeError::Io`] if the CLI cannot be executed
    /// - [`ReactNativeError::CommandFailed`] on a non-zero exit
    pub async fn run_app(&self, platform: Platform) -> Result<(), ReactNativeError> {
        let command = format!("{} {} {NO_PACKAGER}", self.cli, platform.run_command());
        info!(%command, "Launching app");

        let status = self
            .cli
            .command()
            .arg(platform.run_command())
            .arg(NO_PACKAGER)
            .stdin(Stdio::null())
            .status()
            .await?;

        if !status.success() {
            return Err(ReactNativeError::CommandFailed { command, status });
        }
        Ok(())
    }
}
