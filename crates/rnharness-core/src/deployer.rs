//! Per-platform deployment of the test app.
//!
//! [`deploy`] makes sure the app can reach the coordinator and then launches
//! it. The external tools are reached through the [`PlatformTools`] trait so
//! the sequencing can be exercised without a device; [`CliTools`] is the
//! implementation backed by `adb` and the React Native CLI.
//!
//! | Platform | Steps |
//! |----------|-------|
//! | Android  | list devices, require an active one, `adb reverse`, `run-android` |
//! | iOS      | `run-ios` (simulator selection is left to the CLI) |

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::adb::{Adb, AdbError, AndroidDevice};
use crate::config::HarnessConfig;
use crate::platform::Platform;
use crate::react_native::{ReactNativeCli, ReactNativeError};

/// Errors that can occur while deploying the app.
#[derive(Error, Debug)]
pub enum DeployError {
    /// No Android device is online.
    #[error("Missing an active device: Attach a device via USB or start an emulator")]
    NoActiveDevice,

    /// The platform value is not one of the supported platforms.
    #[error("Unexpected platform {0}")]
    UnexpectedPlatform(String),

    /// An `adb` command failed.
    #[error(transparent)]
    Adb(#[from] AdbError),

    /// The React Native CLI failed to build or launch the app.
    #[error(transparent)]
    ReactNative(#[from] ReactNativeError),
}

/// External tooling needed to deploy the app.
#[async_trait]
pub trait PlatformTools: Send + Sync {
    /// Lists attached Android devices in every state.
    async fn list_devices(&self) -> Result<Vec<AndroidDevice>, DeployError>;

    /// Reverses `port` from the Android device onto the host.
    async fn reverse_port(&self, port: u16) -> Result<(), DeployError>;

    /// Builds, installs and launches the app, returning once it is launched.
    async fn run_app(&self, platform: Platform) -> Result<(), DeployError>;
}

/// [`PlatformTools`] backed by the `adb` and React Native command-line tools.
#[derive(Debug, Clone)]
pub struct CliTools {
    adb: Adb,
    react_native: ReactNativeCli,
}

impl CliTools {
    pub fn new(adb: Adb, react_native: ReactNativeCli) -> Self {
        Self { adb, react_native }
    }

    /// Tools using the command lines from `config`.
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(
            Adb::new(config.adb.clone()),
            ReactNativeCli::new(config.react_native.clone()),
        )
    }
}

#[async_trait]
impl PlatformTools for CliTools {
    async fn list_devices(&self) -> Result<Vec<AndroidDevice>, DeployError> {
        Ok(self.adb.devices().await?)
    }

    async fn reverse_port(&self, port: u16) -> Result<(), DeployError> {
        Ok(self.adb.reverse(port).await?)
    }

    async fn run_app(&self, platform: Platform) -> Result<(), DeployError> {
        Ok(self.react_native.run_app(platform).await?)
    }
}

/// Deploys and launches the app on `platform`.
///
/// On Android the coordinator `port` is reversed onto the device before the
/// app is launched, so the app can connect back as soon as it starts.
///
/// # Errors
///
/// - [`DeployError::NoActiveDevice`] if no Android device is in the `device` state
/// - Any error from the tools
pub async fn deploy(
    platform: Platform,
    port: u16,
    tools: &dyn PlatformTools,
) -> Result<(), DeployError> {
    match platform {
        Platform::Android => {
            let devices = tools.list_devices().await?;
            let active: Vec<&AndroidDevice> = devices.iter().filter(|d| d.is_active()).collect();
            if active.is_empty() {
                return Err(DeployError::NoActiveDevice);
            }
            debug!(devices = ?active, "Active Android devices");

            tools.reverse_port(port).await?;
            tools.run_app(platform).await?;
        }
        Platform::Ios => {
            tools.run_app(platform).await?;
        }
    }

    info!(%platform, "App deployed");
    Ok(())
}
