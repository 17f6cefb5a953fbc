use clap::{ArgGroup, Parser};
use std::path::PathBuf;
use std::time::Duration;

use crate::hosts::{HostDefaults, HostSpec};
use crate::process_guard::ShutdownPolicy;

/// spade - declarative assert/rectify configuration
#[derive(Parser, Debug)]
#[command(name = "spade")]
#[command(about = "Check and rectify system configuration described by JSON5 scripts")]
#[command(version)]
#[command(group(ArgGroup::new("targets").args(["host", "host_file"]).multiple(true)))]
pub struct Cli {
    /// Root script to run
    pub script: PathBuf,

    /// Only check statements; never rectify or perform anything.
    ///
    /// Each statement that is not satisfied is reported as `wouldRectify`
    /// (or `wouldPerform` for actions).
    #[arg(short, long)]
    pub assert_only: bool,

    /// Run on this remote host over SSH (repeatable)
    #[arg(short = 'H', long)]
    pub host: Vec<String>,

    /// JSON5 file listing remote hosts
    #[arg(short = 'f', long)]
    pub host_file: Option<PathBuf>,

    /// SSH user for remote hosts (default: current user)
    #[arg(short, long, requires = "targets")]
    pub user: Option<String>,

    /// SSH port for remote hosts
    #[arg(short, long, requires = "targets", value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,

    /// SSH identity file for remote hosts
    #[arg(short, long, requires = "targets")]
    pub identity: Option<PathBuf>,

    /// Do not show the progress spinner
    #[arg(long)]
    pub no_spinner: bool,

    /// Verbose logging and indented output
    #[arg(short, long)]
    pub debug: bool,

    /// Seconds an interrupted command gets to exit before it is killed
    #[arg(long, value_name = "SECONDS", default_value_t = 5)]
    pub stop_grace: u64,
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// True when the script should run on remote hosts.
    pub fn is_remote(&self) -> bool {
        !self.host.is_empty() || self.host_file.is_some()
    }

    /// Hosts named with `--host`, in order.
    pub fn host_specs(&self) -> Vec<HostSpec> {
        self.host.iter().map(HostSpec::new).collect()
    }

    pub fn shutdown_policy(&self) -> ShutdownPolicy {
        ShutdownPolicy::with_grace(Duration::from_secs(self.stop_grace))
    }

    pub fn host_defaults(&self) -> HostDefaults {
        HostDefaults {
            port: self.port,
            user: self.user.clone(),
            identity: self.identity.clone(),
        }
    }
}
