//! Entry points for running a script on this host or on remote hosts.

pub mod local;
pub mod remote;

pub use local::{run_local, run_local_with};
pub use remote::{RemoteRunner, SessionFactory};

/// Settings shared by local and remote runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSettings {
    /// Evaluate every statement but never rectify or perform.
    pub assert_only: bool,
    /// Indented output and uploaded scripts.
    pub debug: bool,
}
