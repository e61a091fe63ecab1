//! Runs the React Native integration test app and turns its result into an exit code.
//!
//! # Usage
//!
//! ```bash
//! # Run the tests on an attached Android device or a running emulator
//! rnharness --platform=android
//!
//! # Run the tests on the iOS simulator, giving up after ten minutes
//! rnharness --platform=ios --timeout 600
//!
//! # Use a config file and a different coordinator port
//! rnharness --platform=android --config rnharness.json --port 9090
//! ```
//!
//! Exit codes: `0` all tests passed, `1` some tests failed, `2` the run could
//! not complete. If Metro dies early the runner exits with Metro's code.

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use rnharness_core::args::take_platform;
use rnharness_core::config::{ConfigFile, HarnessConfig};
use rnharness_core::deployer::CliTools;
use rnharness_core::runner::{RunError, Runner, EXIT_UNEXPECTED_ERROR};

/// Runs the React Native integration test app on a device or simulator.
#[derive(Parser, Debug)]
#[command(name = "rnharness")]
#[command(about = "Run the React Native integration tests on a device or simulator")]
#[command(after_help = "The target platform is selected with the mandatory --platform=<android|ios> flag.")]
#[command(version)]
struct Cli {
    /// Directory of the React Native test app
    #[arg(long, default_value = ".", env = "RNHARNESS_APP_DIR")]
    app_dir: PathBuf,

    /// Port the app reports test results to
    #[arg(short, long, env = "RNHARNESS_PORT")]
    port: Option<u16>,

    /// Seconds to wait for the app to report results (waits forever if unset)
    #[arg(short, long, env = "RNHARNESS_TIMEOUT")]
    timeout: Option<u64>,

    /// JSON config file with project roots and tool command lines
    #[arg(short, long, env = "RNHARNESS_CONFIG")]
    config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    let (platform, rest) = match take_platform(args.clone()) {
        Ok((platform, rest)) => (Ok(platform), rest),
        Err(e) => (Err(e), args),
    };

    // Parsed even without a platform so --help and --version keep working.
    let cli = Cli::parse_from(rest);
    init_logging(&cli);
    debug!(?cli, "Parsed arguments");

    let result = match platform {
        Ok(platform) => run(platform, &cli).await,
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(code) => exit_code(code),
        Err(e) => {
            report(&e);
            exit_code(e.exit_code())
        }
    }
}

async fn run(platform: String, cli: &Cli) -> Result<i32, RunError> {
    let config = build_config(platform, cli)?;
    info!(
        platform = %config.platform,
        port = config.port,
        timeout = ?config.timeout,
        "Configuration loaded"
    );

    let tools = CliTools::from_config(&config);
    let outcome = Runner::new(config, tools).run().await?;

    if outcome.failures > 0 {
        eprintln!("{} test(s) failed", outcome.failures);
    }
    Ok(outcome.exit_code())
}

/// Defaults, then the config file, then command-line flags.
fn build_config(platform: String, cli: &Cli) -> Result<HarnessConfig, RunError> {
    let mut config = HarnessConfig::for_app_dir(platform, &cli.app_dir);

    if let Some(path) = &cli.config {
        ConfigFile::load(path)?.apply(&mut config);
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(secs) = cli.timeout {
        config.timeout = Some(Duration::from_secs(secs));
    }

    Ok(config)
}

fn init_logging(cli: &Cli) {
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match &cli.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let file_name = path
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("rnharness.log"));
            let file_appender = tracing_appender::rolling::never(dir, file_name);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr.and(file_appender))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

fn report(err: &RunError) {
    eprintln!("Error: {err}");
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {cause}");
        source = cause.source();
    }
}

fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code)
        .map(ExitCode::from)
        .unwrap_or_else(|_| ExitCode::from(EXIT_UNEXPECTED_ERROR as u8))
}
