//! Remote preconditions: a recent enough Rust toolchain and engine.
//!
//! Each precondition is a version check followed, if it fails, by an install
//! procedure and a second check. The second check failing is fatal for the
//! host.

use chrono::Utc;
use semver::Version;
use tracing::{debug, info};

use crate::error::{Result, SpadeError};
use crate::transport::{FileTransfer, RemoteSession, RunOptions};

/// Oldest toolchain able to build this crate.
pub const MIN_CARGO_VERSION: Version = Version::new(1, 95, 0);

/// Largest tolerated difference between local and remote clocks, in seconds.
/// Certificate checks during the toolchain download fail beyond this.
const MAX_CLOCK_SKEW_SECS: i64 = 24 * 60 * 60;

/// System-wide toolchain location, so `cargo` is on every user's PATH.
const TOOLCHAIN_ENV: &str = "RUSTUP_HOME=/usr/local/rustup CARGO_HOME=/usr/local/cargo";

const RUSTUP_INSTALL_SCRIPT: &str = r#"#!/bin/sh
set -e
export RUSTUP_HOME=/usr/local/rustup
export CARGO_HOME=/usr/local/cargo
curl --proto '=https' --tlsv1.2 -sSf https://sh.rustup.rs | sh -s -- -y --profile minimal --no-modify-path
ln -sf /usr/local/cargo/bin/* /usr/local/bin/
"#;

/// The version this binary would install remotely.
pub fn engine_version() -> Version {
    Version::parse(env!("CARGO_PKG_VERSION")).unwrap_or(Version::new(0, 0, 0))
}

/// Pull the version out of `<tool> <version> [...]` output.
pub fn parse_tool_version(line: &str, tool: &str) -> Option<Version> {
    let mut words = line.split_whitespace();
    if words.next()? != tool {
        return None;
    }
    Version::parse(words.next()?).ok()
}

fn installed_version(session: &mut dyn RemoteSession, tool: &str) -> Result<Option<Version>> {
    let output = session.run(&format!("{} --version", tool), RunOptions::no_throw())?;
    if output.exit_code != 0 {
        debug!("'{} --version' exited with code {}", tool, output.exit_code);
        return Ok(None);
    }
    Ok(parse_tool_version(output.first_line(), tool))
}

fn meets(version: &Option<Version>, minimum: &Version) -> bool {
    version.as_ref().is_some_and(|v| v >= minimum)
}

fn check_remote_clock(session: &mut dyn RemoteSession) -> Result<()> {
    let output = session.run("date +%s", RunOptions::default())?;
    let remote: i64 = output
        .first_line()
        .parse()
        .map_err(|_| SpadeError::bootstrap(format!("Unexpected 'date' output '{}'", output.first_line())))?;
    let skew = (Utc::now().timestamp() - remote).abs();
    if skew > MAX_CLOCK_SKEW_SECS {
        return Err(SpadeError::bootstrap(format!(
            "Remote clock differs from local clock by {} seconds; fix the remote time before installing",
            skew
        )));
    }
    Ok(())
}

fn install_toolchain(session: &mut dyn RemoteSession, transfer: &mut dyn FileTransfer) -> Result<()> {
    check_remote_clock(session)?;

    let script = session.run("mktemp", RunOptions::default())?.first_line().to_string();
    if script.is_empty() {
        return Err(SpadeError::bootstrap("'mktemp' produced no path"));
    }
    transfer.put_content(RUSTUP_INSTALL_SCRIPT.as_bytes(), &script)?;

    let installed = session.run(&format!("sh {}", script), RunOptions::sudo());
    session.run(&format!("rm -f {}", script), RunOptions::no_throw())?;
    installed.map(|_| ())
}

fn install_engine(session: &mut dyn RemoteSession, version: &Version) -> Result<()> {
    session
        .run(
            &format!(
                "{} cargo install --locked --root /usr/local spade --version {}",
                TOOLCHAIN_ENV, version
            ),
            RunOptions::sudo(),
        )
        .map(|_| ())
}

/// Make sure the remote host has a toolchain and a `spade` at least as new as
/// this one, installing them if needed.
pub fn ensure_remote_engine(session: &mut dyn RemoteSession, transfer: &mut dyn FileTransfer) -> Result<()> {
    if !meets(&installed_version(session, "cargo")?, &MIN_CARGO_VERSION) {
        info!("Installing Rust toolchain");
        install_toolchain(session, transfer)?;
        let found = installed_version(session, "cargo")?;
        if !meets(&found, &MIN_CARGO_VERSION) {
            return Err(SpadeError::bootstrap(format!(
                "cargo {} or later is still not available after install (found {})",
                MIN_CARGO_VERSION,
                describe(&found)
            )));
        }
    }

    let wanted = engine_version();
    if !meets(&installed_version(session, "spade")?, &wanted) {
        info!("Installing spade {}", wanted);
        install_engine(session, &wanted)?;
        let found = installed_version(session, "spade")?;
        if !meets(&found, &wanted) {
            return Err(SpadeError::bootstrap(format!(
                "spade {} or later is still not available after install (found {})",
                wanted,
                describe(&found)
            )));
        }
    }
    Ok(())
}

fn describe(version: &Option<Version>) -> String {
    version
        .as_ref()
        .map_or_else(|| "none".to_string(), Version::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ConnectOptions, RemoteOutput};
    use std::collections::VecDeque;

    /// Answers commands by prefix; repeated prefixes are answered in order.
    #[derive(Default)]
    struct ScriptedSession {
        replies: VecDeque<(&'static str, i32, String)>,
        commands: Vec<(String, bool)>,
    }

    impl ScriptedSession {
        fn reply(mut self, prefix: &'static str, code: i32, output: impl Into<String>) -> Self {
            self.replies.push_back((prefix, code, output.into()));
            self
        }
    }

    impl RemoteSession for ScriptedSession {
        fn connect(&mut self, _options: &ConnectOptions) -> Result<()> {
            Ok(())
        }

        fn run_streamed(
            &mut self,
            command: &str,
            options: RunOptions,
            _on_line: &mut dyn FnMut(&str),
        ) -> Result<RemoteOutput> {
            self.commands.push((command.to_string(), options.sudo));
            let index = self
                .replies
                .iter()
                .position(|(prefix, _, _)| command.starts_with(prefix))
                .unwrap_or_else(|| panic!("unexpected command {}", command));
            let (_, exit_code, text) = self.replies.remove(index).unwrap();
            if exit_code != 0 && !options.no_throw {
                return Err(SpadeError::transport(format!("{} failed", command)));
            }
            Ok(RemoteOutput {
                exit_code,
                output: text.lines().map(String::from).collect(),
            })
        }

        fn close(&mut self) {}
    }

    #[derive(Default)]
    struct RecordingTransfer {
        uploads: Vec<(String, Vec<u8>)>,
    }

    impl FileTransfer for RecordingTransfer {
        fn connect(&mut self, _options: &ConnectOptions) -> Result<()> {
            Ok(())
        }

        fn put_content(&mut self, content: &[u8], remote_path: &str) -> Result<()> {
            self.uploads.push((remote_path.to_string(), content.to_vec()));
            Ok(())
        }

        fn close(&mut self) {}
    }

    fn current_engine() -> String {
        format!("spade {}", engine_version())
    }

    #[test]
    fn test_parse_tool_version() {
        assert_eq!(
            parse_tool_version("cargo 1.95.0 (f2d3ce0bd 2026-03-21)", "cargo"),
            Some(Version::new(1, 95, 0))
        );
        assert_eq!(parse_tool_version("spade 0.3.1", "spade"), Some(Version::new(0, 3, 1)));
        assert_eq!(parse_tool_version("rustc 1.95.0", "cargo"), None);
        assert_eq!(parse_tool_version("cargo", "cargo"), None);
        assert_eq!(parse_tool_version("", "cargo"), None);
    }

    #[test]
    fn test_everything_present() {
        let mut session = ScriptedSession::default()
            .reply("cargo --version", 0, "cargo 1.96.1 (abc 2026-06-01)")
            .reply("spade --version", 0, current_engine());
        let mut transfer = RecordingTransfer::default();

        ensure_remote_engine(&mut session, &mut transfer).unwrap();
        assert_eq!(session.commands.len(), 2);
        assert!(transfer.uploads.is_empty());
    }

    #[test]
    fn test_installs_missing_toolchain_and_engine() {
        let now = Utc::now().timestamp().to_string();
        let mut session = ScriptedSession::default()
            .reply("cargo --version", 127, "")
            .reply("date +%s", 0, now)
            .reply("mktemp", 0, "/tmp/tmp.Xa81\n")
            .reply("sh /tmp/tmp.Xa81", 0, "")
            .reply("rm -f /tmp/tmp.Xa81", 0, "")
            .reply("cargo --version", 0, "cargo 1.95.0 (abc 2026-03-21)")
            .reply("spade --version", 0, "spade 0.0.1")
            .reply(TOOLCHAIN_ENV, 0, "")
            .reply("spade --version", 0, current_engine());
        let mut transfer = RecordingTransfer::default();

        ensure_remote_engine(&mut session, &mut transfer).unwrap();

        assert_eq!(transfer.uploads.len(), 1);
        assert_eq!(transfer.uploads[0].0, "/tmp/tmp.Xa81");
        assert!(String::from_utf8_lossy(&transfer.uploads[0].1).contains("sh.rustup.rs"));

        let sudo: Vec<&str> = session
            .commands
            .iter()
            .filter(|(_, sudo)| *sudo)
            .map(|(c, _)| c.as_str())
            .collect();
        assert_eq!(sudo.len(), 2);
        assert_eq!(sudo[0], "sh /tmp/tmp.Xa81");
        assert!(sudo[1].contains(&format!("spade --version {}", engine_version())));
    }

    #[test]
    fn test_old_toolchain_after_install_fails() {
        let now = Utc::now().timestamp().to_string();
        let mut session = ScriptedSession::default()
            .reply("cargo --version", 0, "cargo 1.70.0 (abc 2023-06-01)")
            .reply("date +%s", 0, now)
            .reply("mktemp", 0, "/tmp/tmp.b")
            .reply("sh /tmp/tmp.b", 0, "")
            .reply("rm -f /tmp/tmp.b", 0, "")
            .reply("cargo --version", 0, "cargo 1.70.0 (abc 2023-06-01)");
        let mut transfer = RecordingTransfer::default();

        let err = ensure_remote_engine(&mut session, &mut transfer).unwrap_err();
        assert!(matches!(err, SpadeError::Bootstrap(_)));
        assert!(err.to_string().contains("found 1.70.0"));
    }

    #[test]
    fn test_clock_skew_blocks_install() {
        let stale = (Utc::now().timestamp() - 3 * 24 * 60 * 60).to_string();
        let mut session = ScriptedSession::default()
            .reply("cargo --version", 127, "")
            .reply("date +%s", 0, stale);
        let mut transfer = RecordingTransfer::default();

        let err = ensure_remote_engine(&mut session, &mut transfer).unwrap_err();
        assert!(err.to_string().contains("Remote clock"));
        assert!(transfer.uploads.is_empty());
    }

    #[test]
    fn test_engine_install_failure_propagates() {
        let mut session = ScriptedSession::default()
            .reply("cargo --version", 0, "cargo 1.95.0")
            .reply("spade --version", 127, "")
            .reply(TOOLCHAIN_ENV, 101, "error: could not compile");
        let mut transfer = RecordingTransfer::default();

        assert!(ensure_remote_engine(&mut session, &mut transfer).is_err());
    }
}
