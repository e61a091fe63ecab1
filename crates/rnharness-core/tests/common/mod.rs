//! Shared test helpers for rnharness-core integration tests.
//!
//! Provides a fake app that implements [`PlatformTools`] and reports back to
//! the coordinator, plus shell-script bundlers whose behavior is observable
//! through marker files.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use rnharness_core::adb::AndroidDevice;
use rnharness_core::config::{CommandLine, HarnessConfig};
use rnharness_core::coordinator::CoordinatorClient;
use rnharness_core::deployer::{DeployError, PlatformTools};
use rnharness_core::platform::Platform;
use rnharness_core::protocol::ClientMessage;

/// Returns a port that was free a moment ago.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// What the fake app does once launched.
#[derive(Clone, Copy)]
pub enum AppBehavior {
    /// Connect with the platform id and report this many failures.
    Report(u32),
    /// Connect announcing another platform's id, then give up.
    WrongId,
    /// Never connect.
    Silent,
}

/// Stand-in for `adb` and the React Native CLI.
///
/// `run_app` "launches" the app by spawning a task that talks to the
/// coordinator on `port`, the way the real app does after start-up.
pub struct FakeApp {
    port: u16,
    devices: Vec<AndroidDevice>,
    behavior: AppBehavior,
    ready_file: Option<PathBuf>,
    calls: Mutex<Vec<String>>,
}

impl FakeApp {
    pub fn new(port: u16, behavior: AppBehavior) -> Self {
        Self {
            port,
            devices: Vec::new(),
            behavior,
            ready_file: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Holds every tool call until `path` exists and has content.
    pub fn waiting_for(mut self, path: PathBuf) -> Self {
        self.ready_file = Some(path);
        self
    }

    /// Adds an attached device per state, e.g. `&["device", "offline"]`.
    pub fn with_devices(mut self, states: &[&str]) -> Self {
        self.devices = states
            .iter()
            .enumerate()
            .map(|(i, state)| AndroidDevice {
                serial: format!("emulator-{}", 5554 + i * 2),
                state: state.to_string(),
            })
            .collect();
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn record(&self, call: String) {
        if let Some(path) = &self.ready_file {
            assert!(
                wait_for_content(path, Duration::from_secs(10)).await,
                "{} was never written",
                path.display()
            );
        }
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PlatformTools for &FakeApp {
    async fn list_devices(&self) -> Result<Vec<AndroidDevice>, DeployError> {
        self.record("devices".to_string()).await;
        Ok(self.devices.clone())
    }

    async fn reverse_port(&self, port: u16) -> Result<(), DeployError> {
        self.record(format!("reverse {port}")).await;
        Ok(())
    }

    async fn run_app(&self, platform: Platform) -> Result<(), DeployError> {
        self.record(platform.run_command().to_string()).await;

        let addr = std::net::SocketAddr::from(([127, 0, 0, 1], self.port));
        let id = match self.behavior {
            AppBehavior::Silent => return Ok(()),
            AppBehavior::WrongId => match platform {
                Platform::Android => "ios",
                Platform::Ios => "android",
            },
            AppBehavior::Report(_) => platform.as_str(),
        };
        let behavior = self.behavior;

        tokio::spawn(async move {
            // Give the launch a moment, like a real app booting.
            tokio::time::sleep(Duration::from_millis(50)).await;
            let (mut client, _reply) = CoordinatorClient::connect(addr, id).await.unwrap();
            if let AppBehavior::Report(failures) = behavior {
                client
                    .send(&ClientMessage::SuiteStarted {
                        title: "Realm".to_string(),
                    })
                    .await
                    .unwrap();
                client
                    .send(&ClientMessage::TestPassed {
                        title: "opens a realm".to_string(),
                    })
                    .await
                    .unwrap();
                client.end(failures).await.unwrap();
            }
        });
        Ok(())
    }
}

/// Polls until `path` exists and is non-empty, giving up after `limit`.
pub async fn wait_for_content(path: &Path, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// A bundler that records its start and a received SIGHUP as marker files.
pub fn observable_bundler(dir: &Path) -> CommandLine {
    let script = format!(
        "trap \"touch '{hup}'; exit 0\" HUP; touch '{started}'; while true; do sleep 0.1; done",
        started = started_marker(dir).display(),
        hup = hup_marker(dir).display(),
    );
    CommandLine::new("sh").arg("-c").arg(script)
}

/// A bundler that writes its pid to [`pid_file`] and then sleeps.
pub fn pid_bundler(dir: &Path) -> CommandLine {
    let script = format!("echo $$ > '{}'; exec sleep 30", pid_file(dir).display());
    CommandLine::new("sh").arg("-c").arg(script)
}

pub fn pid_file(dir: &Path) -> PathBuf {
    dir.join("bundler.pid")
}

/// Whether a process with the pid recorded in [`pid_file`] is still alive.
///
/// A missing pid file means the bundler was stopped before it got that far.
pub fn recorded_process_alive(dir: &Path) -> bool {
    let Ok(pid) = std::fs::read_to_string(pid_file(dir)) else {
        return false;
    };
    std::process::Command::new("kill")
        .args(["-0", pid.trim()])
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// A bundler that exits immediately with `code`.
pub fn failing_bundler(code: i32) -> CommandLine {
    CommandLine::new("sh").arg("-c").arg(format!("exit {code}"))
}

pub fn started_marker(dir: &Path) -> PathBuf {
    dir.join("bundler-started")
}

pub fn hup_marker(dir: &Path) -> PathBuf {
    dir.join("bundler-hup")
}

/// Config for `platform` with the coordinator on `port` and `bundler` as Metro.
pub fn test_config(platform: &str, port: u16, bundler: CommandLine, dir: &Path) -> HarnessConfig {
    let mut config = HarnessConfig::for_app_dir(platform, dir);
    config.port = port;
    config.bundler = bundler;
    config.timeout = Some(Duration::from_secs(10));
    config
}
