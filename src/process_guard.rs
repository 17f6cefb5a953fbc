//! Bookkeeping for the programs spade runs.
//!
//! Two kinds of child are in flight during a run: `ssh` clients carrying a
//! remote session, and local remediation commands (`useradd`, `sh -c ...`).
//! Both are started as process-group leaders by [`crate::command_runner`]
//! and recorded in [`running_children`] until they are reaped. When spade is
//! interrupted, or [`ShutdownGuard`] goes out of scope with children still
//! recorded, [`ChildTable::stop_all`] stops every group: ssh sessions first,
//! so remote runs are cut off before local work, then remediation commands.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

/// What a recorded child is doing for spade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ChildKind {
    /// An `ssh` client for a remote host.
    Ssh,
    /// A local command run by an asserter or action.
    Remediation,
}

/// How long stopped process groups get between SIGTERM and SIGKILL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownPolicy {
    pub grace: Duration,
    pub poll: Duration,
}

impl ShutdownPolicy {
    pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

    pub fn with_grace(grace: Duration) -> Self {
        Self {
            grace,
            poll: Duration::from_millis(50),
        }
    }
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        Self::with_grace(Self::DEFAULT_GRACE)
    }
}

/// Counts from one [`ChildTable::stop_all`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopReport {
    pub terminated: usize,
    pub killed: usize,
}

/// Process groups started by spade, keyed by leader PID.
#[derive(Debug, Default)]
pub struct ChildTable {
    groups: HashMap<u32, ChildKind>,
    stopping: bool,
}

static RUNNING: LazyLock<Mutex<ChildTable>> = LazyLock::new(|| Mutex::new(ChildTable::default()));

/// The table shared by [`crate::command_runner`], the signal handler and
/// [`ShutdownGuard`].
pub fn running_children() -> &'static Mutex<ChildTable> {
    &RUNNING
}

impl ChildTable {
    pub fn record(&mut self, pid: u32, kind: ChildKind) {
        debug!("Started {} child {}", kind, pid);
        self.groups.insert(pid, kind);
    }

    pub fn forget(&mut self, pid: u32) -> Option<ChildKind> {
        self.groups.remove(&pid)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn count(&self, kind: ChildKind) -> usize {
        self.groups.values().filter(|k| **k == kind).count()
    }

    /// True once [`ChildTable::stop_all`] has run; later calls do nothing.
    pub fn is_stopping(&self) -> bool {
        self.stopping
    }

    /// Send SIGTERM to every recorded group, wait up to `policy.grace` for
    /// the groups to disappear, then SIGKILL whatever is left.
    pub fn stop_all(&mut self, policy: &ShutdownPolicy) -> StopReport {
        let mut report = StopReport::default();
        if std::mem::replace(&mut self.stopping, true) || self.groups.is_empty() {
            return report;
        }

        let mut order: Vec<(ChildKind, u32)> = self.groups.drain().map(|(pid, kind)| (kind, pid)).collect();
        order.sort();
        info!("Stopping {} child process group(s)", order.len());

        for (kind, pid) in &order {
            match signal_group(*pid, Signal::SIGTERM) {
                Ok(()) => report.terminated += 1,
                Err(e) => debug!("{} group {} already gone: {}", kind, pid, e),
            }
        }

        let deadline = Instant::now() + policy.grace;
        let mut remaining: Vec<u32> = order.iter().map(|(_, pid)| *pid).collect();
        loop {
            remaining.retain(|pid| group_exists(*pid));
            if remaining.is_empty() || Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(policy.poll);
        }

        for pid in remaining {
            warn!("Process group {} ignored SIGTERM, killing it", pid);
            if signal_group(pid, Signal::SIGKILL).is_ok() {
                report.killed += 1;
            }
        }
        report
    }
}

/// A negative PID addresses the whole group, which reaches the shell behind
/// `sudo` or the remote command behind `ssh` as well as the leader.
fn signal_group(leader: u32, signal: Signal) -> nix::Result<()> {
    kill(Pid::from_raw(-(leader as i32)), signal)
}

/// Signal 0 checks for any member of the group. Members that exited but were
/// not yet reaped still count, which only means they are sent SIGKILL.
fn group_exists(leader: u32) -> bool {
    kill(Pid::from_raw(-(leader as i32)), None).is_ok()
}

/// Stops recorded children when dropped. `main` holds one for the whole run
/// so an early return or error does not leave commands running.
pub struct ShutdownGuard {
    policy: ShutdownPolicy,
}

impl ShutdownGuard {
    pub fn new(policy: ShutdownPolicy) -> Self {
        Self { policy }
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        if let Ok(mut table) = running_children().lock() {
            table.stop_all(&self.policy);
        }
    }
}

/// Stop recorded children and exit with `128 + signal` on SIGINT, SIGTERM
/// or SIGHUP. Call once at startup.
pub fn install_signal_handlers(policy: ShutdownPolicy) -> std::io::Result<()> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;
    std::thread::spawn(move || {
        if let Some(number) = signals.forever().next() {
            let name = Signal::try_from(number).map(Signal::as_str).unwrap_or("signal");
            info!("Interrupted by {}", name);
            if let Ok(mut table) = running_children().lock() {
                table.stop_all(&policy);
            }
            std::process::exit(128 + number);
        }
    });
    Ok(())
}
