//! Target platforms the test app can be deployed to.

use std::fmt;
use std::str::FromStr;

use crate::deployer::DeployError;

/// A platform the React Native test app can run on.
///
/// Android needs an explicitly attached device or a running emulator, which
/// the runner checks with `adb`. iOS leaves simulator selection to the React
/// Native CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Android,
    Ios,
}

impl Platform {
    /// The identifier used on the command line and as the coordinator id.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
        }
    }

    /// The React Native CLI command that builds, installs and launches the app.
    pub fn run_command(&self) -> &'static str {
        match self {
            Platform::Android => "run-android",
            Platform::Ios => "run-ios",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "android" => Ok(Platform::Android),
            "ios" => Ok(Platform::Ios),
            other => Err(DeployError::UnexpectedPlatform(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_platforms() {
        assert_eq!("android".parse::<Platform>().unwrap(), Platform::Android);
        assert_eq!("ios".parse::<Platform>().unwrap(), Platform::Ios);
    }

    #[test]
    fn rejects_unknown_platform() {
        match "windows".parse::<Platform>() {
            Err(DeployError::UnexpectedPlatform(value)) => assert_eq!(value, "windows"),
            other => panic!("Expected UnexpectedPlatform, got: {:?}", other),
        }
    }

    #[test]
    fn parsing_is_case_sensitive() {
        assert!("Android".parse::<Platform>().is_err());
        assert!("".parse::<Platform>().is_err());
    }

    #[test]
    fn display_matches_identifier() {
        assert_eq!(Platform::Android.to_string(), "android");
        assert_eq!(Platform::Ios.to_string(), "ios");
    }

    #[test]
    fn run_commands() {
        assert_eq!(Platform::Android.run_command(), "run-android");
        assert_eq!(Platform::Ios.run_command(), "run-ios");
    }
}
