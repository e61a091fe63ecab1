//! Interface to the Android Debug Bridge (`adb`) command-line tool.
//!
//! Only the two operations a test run needs are wrapped: listing attached
//! devices and reversing a TCP port so an app on the device can reach a
//! server on the host.
//!
//! # Example
//!
//! ```no_run
//! use rnharness_core::adb::Adb;
//! use rnharness_core::config::CommandLine;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let adb = Adb::new(CommandLine::new("adb"));
//! for device in adb.devices().await? {
//!     println!("{} ({})", device.serial, device.state);
//! }
//! adb.reverse(8090).await?;
//! # Ok(())
//! # }
//! ```

use thiserror::Error;
use tracing::{debug, info};

use crate::config::CommandLine;

/// State `adb devices` reports for a device that is online and authorized.
pub const ACTIVE_STATE: &str = "device";

/// Errors that can occur when running `adb`.
#[derive(Error, Debug)]
pub enum AdbError {
    /// `adb` ran but returned a non-zero exit code.
    #[error("adb {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// `adb` could not be executed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A device as listed by `adb devices`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidDevice {
    /// Serial number, e.g. `emulator-5554`.
    pub serial: String,
    /// Connection state, e.g. `device`, `offline` or `unauthorized`.
    pub state: String,
}

impl AndroidDevice {
    /// Whether the device is online and ready to install apps.
    pub fn is_active(&self) -> bool {
        self.state == ACTIVE_STATE
    }
}

/// Wrapper for `adb` commands.
#[derive(Debug, Clone)]
pub struct Adb {
    cli: CommandLine,
}

impl Adb {
    pub fn new(cli: CommandLine) -> Self {
        Self { cli }
    }

    /// Lists attached devices and emulators in every state.
    ///
    /// # Errors
    ///
    /// - [`AdbError::Io`] if `adb` cannot be executed
    /// - [`AdbError::CommandFailed`] if `adb` returns a non-zero exit code
    pub async fn devices(&self) -> Result<Vec<AndroidDevice>, AdbError> {
        let stdout = self.output(&["devices"]).await?;
        let devices = parse_devices(&stdout);
        debug!(count = devices.len(), "adb devices");
        Ok(devices)
    }

    /// Makes `tcp:<port>` on the device connect to `tcp:<port>` on the host.
    ///
    /// # Errors
    ///
    /// - [`AdbError::Io`] if `adb` cannot be executed
    /// - [`AdbError::CommandFailed`] if `adb` returns a non-zero exit code,
    ///   e.g. when several devices are attached and none is selected
    pub async fn reverse(&self, port: u16) -> Result<(), AdbError> {
        let socket = format!("tcp:{port}");
        self.output(&["reverse", &socket, &socket]).await?;
        info!(port, "Reversed port onto device");
        Ok(())
    }

    async fn output(&self, args: &[&str]) -> Result<String, AdbError> {
        let output = self.cli.command().args(args).output().await?;

        if !output.status.success() {
            return Err(AdbError::CommandFailed {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Parses the output of `adb devices`.
///
/// Skips the `List of devices attached` header, blank lines and daemon
/// start-up chatter (lines starting with `*`).
pub fn parse_devices(output: &str) -> Vec<AndroidDevice> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let serial = fields.next()?;
            let state = fields.next()?;
            Some(AndroidDevice {
                serial: serial.to_string(),
                state: state.to_string(),
            })
        })
        .collect()
}
