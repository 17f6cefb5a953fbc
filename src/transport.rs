//! Remote command execution and file upload.
//!
//! Both capabilities are backed by the system `ssh` client in batch mode,
//! sharing one multiplexed master connection per host so that each command
//! and upload does not pay for a new handshake. Authentication must be
//! non-interactive (keys or an agent), and remote `sudo` is invoked with `-n`.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, warn};

use crate::command_runner::{run_as, stream_as};
use crate::error::{Result, SpadeError};
use crate::process_guard::ChildKind;

pub const DEFAULT_SSH_PORT: u16 = 22;

/// Where and how to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub identity: Option<PathBuf>,
}

impl ConnectOptions {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            user: None,
            identity: None,
        }
    }

    /// `user@host:port`, for log lines.
    pub fn display_name(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}:{}", user, self.host, self.port),
            None => format!("{}:{}", self.host, self.port),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunOptions {
    /// Run through `sudo -n`.
    pub sudo: bool,
    /// Return non-zero exits instead of failing.
    pub no_throw: bool,
}

impl RunOptions {
    pub const fn sudo() -> Self {
        Self {
            sudo: true,
            no_throw: false,
        }
    }

    pub const fn no_throw() -> Self {
        Self {
            sudo: false,
            no_throw: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemoteOutput {
    pub exit_code: i32,
    pub output: Vec<String>,
}

impl RemoteOutput {
    /// First line of output, trimmed.
    pub fn first_line(&self) -> &str {
        self.output.first().map(|l| l.trim()).unwrap_or("")
    }
}

pub trait RemoteSession {
    fn connect(&mut self, options: &ConnectOptions) -> Result<()>;

    /// Run `command` in the remote shell, passing each output line to
    /// `on_line` as it arrives.
    fn run_streamed(
        &mut self,
        command: &str,
        options: RunOptions,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<RemoteOutput>;

    fn run(&mut self, command: &str, options: RunOptions) -> Result<RemoteOutput> {
        self.run_streamed(command, options, &mut |_: &str| {})
    }

    fn close(&mut self);
}

pub trait FileTransfer {
    fn connect(&mut self, options: &ConnectOptions) -> Result<()>;

    fn put_content(&mut self, content: &[u8], remote_path: &str) -> Result<()>;

    fn close(&mut self);
}

/// Quote `s` for a POSIX shell.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r#"'\''"#))
}

/// Argument list shared by every `ssh` invocation to one host.
#[derive(Debug, Clone)]
struct SshTarget {
    options: ConnectOptions,
    control_path: PathBuf,
}

impl SshTarget {
    fn new(options: &ConnectOptions) -> Self {
        let control_path = std::env::temp_dir().join(format!("spade-{}-%C", std::process::id()));
        Self {
            options: options.clone(),
            control_path,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.args(["-o", "BatchMode=yes"])
            .args(["-o", "ControlMaster=auto"])
            .arg("-o")
            .arg(format!("ControlPath={}", self.control_path.display()))
            .args(["-o", "ControlPersist=60"])
            .arg("-p")
            .arg(self.options.port.to_string());
        if let Some(identity) = &self.options.identity {
            cmd.arg("-i").arg(identity);
        }
        if let Some(user) = &self.options.user {
            cmd.arg("-l").arg(user);
        }
        cmd.arg(&self.options.host);
        cmd
    }

    fn exit_master(&self) {
        let mut cmd = self.command();
        cmd.args(["-O", "exit"]);
        if let Err(e) = run_as(ChildKind::Ssh, &mut cmd, None) {
            debug!("Closing ssh master failed: {}", e);
        }
    }
}

fn wrap_sudo(command: &str, sudo: bool) -> String {
    if sudo {
        format!("sudo -n sh -c {}", shell_quote(command))
    } else {
        command.to_string()
    }
}

/// [`RemoteSession`] over the `ssh` client.
#[derive(Debug, Default)]
pub struct OpenSshSession {
    target: Option<SshTarget>,
}

impl OpenSshSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn target(&self) -> Result<&SshTarget> {
        self.target
            .as_ref()
            .ok_or_else(|| SpadeError::transport("Session is not connected"))
    }
}

impl RemoteSession for OpenSshSession {
    fn connect(&mut self, options: &ConnectOptions) -> Result<()> {
        let target = SshTarget::new(options);
        let mut cmd = target.command();
        cmd.arg("true");
        let output = run_as(ChildKind::Ssh, &mut cmd, None)?;
        if !output.success {
            return Err(SpadeError::transport(format!(
                "Unable to connect to {}: {}",
                options.display_name(),
                output.stderr.trim()
            )));
        }
        debug!("Connected to {}", options.display_name());
        self.target = Some(target);
        Ok(())
    }

    fn run_streamed(
        &mut self,
        command: &str,
        options: RunOptions,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<RemoteOutput> {
        let target = self.target()?;
        let remote = wrap_sudo(command, options.sudo);
        debug!("{} $ {}", target.options.display_name(), remote);

        let mut cmd = target.command();
        cmd.arg(&remote);
        let output = stream_as(ChildKind::Ssh, &mut cmd, None, |line| on_line(line))?;

        let result = RemoteOutput {
            exit_code: output.exit_code.unwrap_or(-1),
            output: output.lines(),
        };
        if !options.no_throw && result.exit_code != 0 {
            return Err(SpadeError::transport(format!(
                "'{}' exited with code {} on {}",
                command,
                result.exit_code,
                target.options.display_name()
            )));
        }
        Ok(result)
    }

    fn close(&mut self) {
        if let Some(target) = self.target.take() {
            target.exit_master();
        }
    }
}

/// [`FileTransfer`] that streams content into `cat` over `ssh`.
#[derive(Debug, Default)]
pub struct OpenSshTransfer {
    target: Option<SshTarget>,
}

impl OpenSshTransfer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FileTransfer for OpenSshTransfer {
    fn connect(&mut self, options: &ConnectOptions) -> Result<()> {
        self.target = Some(SshTarget::new(options));
        Ok(())
    }

    fn put_content(&mut self, content: &[u8], remote_path: &str) -> Result<()> {
        let target = self
            .target
            .as_ref()
            .ok_or_else(|| SpadeError::transport("Transfer is not connected"))?;

        let mut cmd = target.command();
        cmd.arg(format!("cat > {}", shell_quote(remote_path)));
        let output = run_as(ChildKind::Ssh, &mut cmd, Some(content))?;
        if !output.success {
            return Err(SpadeError::transport(format!(
                "Upload to '{}' failed: {}",
                remote_path,
                output.stderr.trim()
            )));
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.target.take().is_none() {
            warn!("Closing a transfer that was never connected");
        }
    }
}

/// Remote path for `relative` under `base`, always with `/` separators.
pub fn remote_join(base: &str, relative: &Path) -> String {
    let tail = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/{}", base.trim_end_matches('/'), tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/tmp/spade.x1/main.json5"), "/tmp/spade.x1/main.json5");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r#"'it'\''s'"#);
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_wrap_sudo() {
        assert_eq!(wrap_sudo("id -u", false), "id -u");
        assert_eq!(wrap_sudo("id -u", true), "sudo -n sh -c 'id -u'");
    }

    #[test]
    fn test_ssh_arguments() {
        let mut options = ConnectOptions::new("web1");
        options.port = 2222;
        options.user = Some("ops".into());
        options.identity = Some(PathBuf::from("/home/ops/.ssh/id_ed25519"));
        let cmd = SshTarget::new(&options).command();
        let args: Vec<String> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();

        assert!(args.contains(&"BatchMode=yes".to_string()));
        let tail = &args[args.len() - 7..];
        assert_eq!(
            tail,
            ["-p", "2222", "-i", "/home/ops/.ssh/id_ed25519", "-l", "ops", "web1"]
        );
        assert_eq!(options.display_name(), "ops@web1:2222");
    }

    #[test]
    fn test_remote_join() {
        assert_eq!(
            remote_join("/tmp/spade.abc/", Path::new("lib/a.json5")),
            "/tmp/spade.abc/lib/a.json5"
        );
    }

    #[test]
    fn test_unconnected_session_errors() {
        let mut session = OpenSshSession::new();
        let err = session.run("true", RunOptions::default()).unwrap_err();
        assert!(matches!(err, SpadeError::Transport(_)));

        let mut transfer = OpenSshTransfer::new();
        assert!(transfer.put_content(b"x", "/tmp/x").is_err());
    }
}
