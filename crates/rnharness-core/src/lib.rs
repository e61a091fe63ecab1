//! # rnharness-core
//!
//! Core library for running the React Native integration test app on an
//! Android device/emulator or an iOS simulator and collecting its results.
//!
//! A run starts the Metro bundler, opens a small TCP coordinator that the app
//! connects back to, deploys the app with the React Native CLI and waits until
//! the app reports how many tests failed.
//!
//! ## Modules
//!
//! - [`args`] - Extraction of the `--platform=<value>` flag
//! - [`platform`] - The supported target platforms
//! - [`config`] - Runner configuration (project roots, port, tool command lines)
//! - [`bundler`] - Supervised Metro bundler child process
//! - [`protocol`] - JSON-over-newlines messages exchanged with the app
//! - [`coordinator`] - TCP server the app reports test results to
//! - [`adb`] - Wrapper around the Android Debug Bridge CLI
//! - [`react_native`] - Wrapper around the React Native CLI
//! - [`deployer`] - Per-platform device checks and app launch
//! - [`runner`] - Orchestration of a full run and exit-code mapping
//!
//! ## External Dependencies
//!
//! - **Node.js / React Native CLI** (for `react-native start` and `run-*`)
//! - **Android SDK platform tools** (for `adb`), Android runs only
//! - **Xcode**, iOS runs only
//!
//! ## Example
//!
//! ```no_run
//! use rnharness_core::config::HarnessConfig;
//! use rnharness_core::deployer::CliTools;
//! use rnharness_core::runner::Runner;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HarnessConfig::for_app_dir("ios", std::path::Path::new("."));
//! let tools = CliTools::from_config(&config);
//! let outcome = Runner::new(config, tools).run().await?;
//! std::process::exit(outcome.exit_code());
//! # }
//! ```

pub mod adb;
pub mod args;
pub mod bundler;
pub mod config;
pub mod coordinator;
pub mod deployer;
pub mod platform;
pub mod protocol;
pub mod react_native;
pub mod runner;
