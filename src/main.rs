//! spade - main entry point
//!
//! Runs a script locally, or uploads it to each `--host` and runs it there.

use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

use spade::cli::Cli;
use spade::hosts;
use spade::output::ConsoleOutput;
use spade::process_guard::{self, ShutdownGuard};
use spade::runner::{self, RemoteRunner, RunSettings};
use spade::runner::remote::OpenSshFactory;

/// Initialize logging to stderr. `RUST_LOG` overrides the default level.
fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_logging(cli.debug);

    // Stop spawned commands if we are interrupted
    let policy = cli.shutdown_policy();
    if let Err(e) = process_guard::install_signal_handlers(policy) {
        warn!("Failed to initialize signal handlers: {}", e);
    }
    let _guard = ShutdownGuard::new(policy);

    let settings = RunSettings {
        assert_only: cli.assert_only,
        debug: cli.debug,
    };
    let mut output = ConsoleOutput::new(cli.debug, !cli.no_spinner);

    if cli.is_remote() {
        match run_remote(&cli, settings, &mut output) {
            Ok(failures) => ExitCode::from(u8::try_from(failures).unwrap_or(u8::MAX)),
            Err(e) => {
                error!("{:#}", e);
                ExitCode::FAILURE
            }
        }
    } else {
        match runner::run_local(&cli.script, settings, &mut output) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("{:#}", e);
                ExitCode::FAILURE
            }
        }
    }
}

fn run_remote(cli: &Cli, settings: RunSettings, output: &mut ConsoleOutput) -> Result<usize> {
    let mut specs = cli.host_specs();
    if let Some(path) = &cli.host_file {
        specs.extend(hosts::load_host_file(path)?);
    }
    let targets = hosts::resolve(&specs, &cli.host_defaults()).context("Invalid host list")?;
    debug!("{} target host(s)", targets.len());

    let factory = OpenSshFactory;
    RemoteRunner::new(&factory, settings).run(&cli.script, &targets, output)
}
