//! Runner configuration.
//!
//! A [`HarnessConfig`] holds everything a run needs: the platform value, the
//! Metro project roots, the coordinator port and timeout, and the command
//! lines of the external tools. Values come from an optional JSON file
//! ([`ConfigFile`]) and are then overridden by command-line flags.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use rnharness_core::config::{ConfigFile, HarnessConfig};
//!
//! let file = ConfigFile::load(Path::new("rnharness.json")).unwrap();
//! let mut config = HarnessConfig::for_app_dir("android", Path::new("."));
//! file.apply(&mut config);
//! println!("coordinator port: {}", config.port);
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Port the coordinator listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 8090;

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON or has unexpected keys.
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// An external program together with its leading arguments.
///
/// Serialized as a non-empty JSON array, e.g. `["npx", "react-native"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    /// A command line without leading arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends a leading argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Builds a [`tokio::process::Command`] with the leading arguments applied.
    pub fn command(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl TryFrom<Vec<String>> for CommandLine {
    type Error = String;

    fn try_from(mut parts: Vec<String>) -> Result<Self, Self::Error> {
        if parts.is_empty() {
            return Err("command line must name a program".to_string());
        }
        let program = parts.remove(0);
        Ok(Self {
            program,
            args: parts,
        })
    }
}

impl From<CommandLine> for Vec<String> {
    fn from(line: CommandLine) -> Self {
        std::iter::once(line.program).chain(line.args).collect()
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Everything a single run needs.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Raw platform value; validated when the run starts.
    pub platform: String,
    /// Directories Metro serves sources from, in order.
    pub project_roots: Vec<PathBuf>,
    /// Port the coordinator listens on and that is reversed onto Android devices.
    pub port: u16,
    /// How long to wait for the app to report results. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Command line used to start Metro (`start` is appended).
    pub bundler: CommandLine,
    /// Command line of the React Native CLI (`run-android`/`run-ios` is appended).
    pub react_native: CommandLine,
    /// Command line of the Android Debug Bridge.
    pub adb: CommandLine,
}

impl HarnessConfig {
    /// Default configuration for the test app living in `app_dir`.
    ///
    /// The project roots are the app itself and the integration-tests
    /// directory two levels above it.
    pub fn for_app_dir(platform: impl Into<String>, app_dir: &Path) -> Self {
        Self {
            platform: platform.into(),
            project_roots: default_project_roots(app_dir),
            port: DEFAULT_PORT,
            timeout: None,
            bundler: react_native_cli(),
            react_native: react_native_cli(),
            adb: CommandLine::new("adb"),
        }
    }

    /// The `--projectRoots=<a>,<b>` argument passed to Metro.
    pub fn project_roots_arg(&self) -> String {
        let joined = self
            .project_roots
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(",");
        format!("--projectRoots={joined}")
    }
}

fn react_native_cli() -> CommandLine {
    CommandLine::new("npx").arg("react-native")
}

/// The test app directory and the integration-tests root two levels up.
///
/// Paths are made absolute when possible so Metro resolves them the same way
/// regardless of its working directory.
pub fn default_project_roots(app_dir: &Path) -> Vec<PathBuf> {
    let app = std::fs::canonicalize(app_dir).unwrap_or_else(|_| app_dir.to_path_buf());
    let tests_root = app
        .parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| app.join("..").join(".."));
    vec![app, tests_root]
}

/// On-disk configuration. Every key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_roots: Option<Vec<PathBuf>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundler: Option<CommandLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub react_native: Option<CommandLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adb: Option<CommandLine>,
}

impl ConfigFile {
    /// Loads and parses a config file.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Read`] if the file cannot be read
    /// - [`ConfigError::Parse`] if the content is not a valid config
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overwrites the fields of `config` that this file sets.
    pub fn apply(self, config: &mut HarnessConfig) {
        if let Some(roots) = self.project_roots {
            config.project_roots = roots;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout = Some(Duration::from_secs(secs));
        }
        if let Some(bundler) = self.bundler {
            config.bundler = bundler;
        }
        if let Some(react_native) = self.react_native {
            config.react_native = react_native;
        }
        if let Some(adb) = self.adb {
            config.adb = adb;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_for_app_dir() {
        let config = HarnessConfig::for_app_dir("ios", Path::new("/nonexistent/a/b/app"));

        assert_eq!(config.platform, "ios");
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.timeout.is_none());
        assert_eq!(config.bundler.to_string(), "npx react-native");
        assert_eq!(config.adb, CommandLine::new("adb"));
        assert_eq!(
            config.project_roots,
            vec![PathBuf::from("/nonexistent/a/b/app"), PathBuf::from("/nonexistent/a")]
        );
    }

    #[test]
    fn project_roots_arg_joins_with_commas() {
        let mut config = HarnessConfig::for_app_dir("ios", Path::new("."));
        config.project_roots = vec![PathBuf::from("/x/app"), PathBuf::from("/x")];
        assert_eq!(config.project_roots_arg(), "--projectRoots=/x/app,/x");
    }

    #[test]
    fn command_line_from_json_array() {
        let line: CommandLine = serde_json::from_str(r#"["npx", "react-native"]"#).unwrap();
        assert_eq!(line.program, "npx");
        assert_eq!(line.args, vec!["react-native"]);
        assert_eq!(serde_json::to_string(&line).unwrap(), r#"["npx","react-native"]"#);
    }

    #[test]
    fn empty_command_line_is_rejected() {
        let result: Result<CommandLine, _> = serde_json::from_str("[]");
        assert!(result.is_err());
    }

    #[test]
    fn config_file_overrides_selected_fields() {
        let file: ConfigFile = serde_json::from_str(
            r#"{ "port": 9000, "timeout_secs": 30, "adb": ["/opt/sdk/adb"] }"#,
        )
        .unwrap();
        let mut config = HarnessConfig::for_app_dir("android", Path::new("."));
        let bundler_before = config.bundler.clone();

        file.apply(&mut config);

        assert_eq!(config.port, 9000);
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.adb.program, "/opt/sdk/adb");
        assert_eq!(config.bundler, bundler_before);
    }

    #[test]
    fn empty_config_file_changes_nothing() {
        let file: ConfigFile = serde_json::from_str("{}").unwrap();
        let mut config = HarnessConfig::for_app_dir("android", Path::new("."));
        let roots_before = config.project_roots.clone();
        file.apply(&mut config);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.project_roots, roots_before);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: Result<ConfigFile, _> = serde_json::from_str(r#"{ "prot": 1 }"#);
        assert!(result.is_err());
    }

    #[test]
    fn load_missing_file_is_read_error() {
        match ConfigFile::load(Path::new("/nonexistent/rnharness.json")) {
            Err(ConfigError::Read { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/rnharness.json"));
            }
            other => panic!("Expected Read error, got: {:?}", other),
        }
    }

    #[test]
    fn load_invalid_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rnharness.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(ConfigFile::load(&path), Err(ConfigError::Parse { .. })));
    }
}
