//! Subprocess execution
//!
//! Every external program spade starts (`useradd`, `groupadd`, `sh -c`,
//! `ssh`) goes through [`run_as`] or [`stream_as`]. The child leads its own
//! process group, gets SIGTERM if spade dies, and stays in
//! [`running_children`] until it has been waited for.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};

use nix::libc;
use tracing::debug;

use crate::error::{Result, SpadeError};
use crate::process_guard::{ChildKind, running_children};

/// Output from a command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code (None if terminated by signal).
    pub exit_code: Option<i32>,
    pub success: bool,
}

impl CommandOutput {
    /// Check if the command succeeded and return an error if not.
    pub fn ensure_success(&self, context: &str) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            let code = self.exit_code.unwrap_or(-1);
            Err(SpadeError::command(format!(
                "{} failed (exit code {}): {}",
                context,
                code,
                self.stderr.trim()
            )))
        }
    }

    /// Standard output split into lines.
    pub fn lines(&self) -> Vec<String> {
        self.stdout.lines().map(str::to_string).collect()
    }
}

/// Run a local remediation command; see [`run_as`].
pub fn run_command(cmd: &mut Command, input: Option<&[u8]>) -> Result<CommandOutput> {
    run_as(ChildKind::Remediation, cmd, input)
}

/// Run `cmd` to completion, optionally feeding `input` on stdin, and
/// capture stdout and stderr.
pub fn run_as(kind: ChildKind, cmd: &mut Command, input: Option<&[u8]>) -> Result<CommandOutput> {
    debug!("{} command: {:?}", kind, cmd);

    cmd.stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let (mut child, _recorded) = spawn_recorded(cmd, kind)?;
    let writer = feed_stdin(&mut child, input);

    let output = child.wait_with_output();
    join_writer(writer)?;
    let output = output?;

    let result = CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code(),
        success: output.status.success(),
    };
    debug!("Command exited with {:?}", result.exit_code);
    Ok(result)
}

/// Run `cmd`, passing each stdout line to `on_line` as it arrives. Stderr is
/// inherited so the operator sees it directly.
pub fn stream_as(
    kind: ChildKind,
    cmd: &mut Command,
    input: Option<&[u8]>,
    mut on_line: impl FnMut(&str),
) -> Result<CommandOutput> {
    debug!("{} command (streamed): {:?}", kind, cmd);

    cmd.stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());

    let (mut child, _recorded) = spawn_recorded(cmd, kind)?;
    let writer = feed_stdin(&mut child, input);

    let mut lines = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        for line in BufReader::new(stdout).lines() {
            let line = line?;
            on_line(&line);
            lines.push(line);
        }
    }

    let status = child.wait();
    join_writer(writer)?;
    let status = status?;

    Ok(CommandOutput {
        stdout: lines.join("\n"),
        stderr: String::new(),
        exit_code: status.code(),
        success: status.success(),
    })
}

/// Removes a child from [`running_children`] once it has been waited for.
struct Recorded(u32);

impl Drop for Recorded {
    fn drop(&mut self) {
        if let Ok(mut table) = running_children().lock() {
            table.forget(self.0);
        }
    }
}

/// Spawn `cmd` as a process-group leader with a parent-death signal and
/// record it. The table stays locked across the spawn so a shutdown in
/// progress either sees the child or refuses it.
fn spawn_recorded(cmd: &mut Command, kind: ChildKind) -> Result<(Child, Recorded)> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    cmd.process_group(0);
    // SAFETY: prctl is async-signal-safe and touches no memory of the parent.
    unsafe {
        cmd.pre_exec(|| {
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let mut table = running_children()
        .lock()
        .map_err(|_| SpadeError::command("Child process table is poisoned"))?;
    if table.is_stopping() {
        return Err(SpadeError::command(format!(
            "Not starting '{}': spade is shutting down",
            program
        )));
    }
    let child = cmd
        .spawn()
        .map_err(|e| SpadeError::command(format!("Failed to spawn '{}': {}", program, e)))?;
    let pid = child.id();
    table.record(pid, kind);
    Ok((child, Recorded(pid)))
}

/// Write stdin on its own thread so a chatty child cannot deadlock us.
fn feed_stdin(
    child: &mut Child,
    input: Option<&[u8]>,
) -> Option<std::thread::JoinHandle<std::io::Result<()>>> {
    let data = input?.to_vec();
    let mut stdin = child.stdin.take()?;
    Some(std::thread::spawn(move || stdin.write_all(&data)))
}

fn join_writer(writer: Option<std::thread::JoinHandle<std::io::Result<()>>>) -> Result<()> {
    match writer.map(|w| w.join()) {
        None => Ok(()),
        Some(Ok(Ok(()))) => Ok(()),
        // The child may legitimately exit without reading all of its input.
        Some(Ok(Err(e))) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        Some(Ok(Err(e))) => Err(e.into()),
        Some(Err(_)) => Err(SpadeError::command("stdin writer thread panicked")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_command_captures_output() {
        let output = run_command(Command::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]), None)
            .expect("run sh");
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success);

        let err = output.ensure_success("sh").unwrap_err();
        assert_eq!(err.to_string(), "Command failed: sh failed (exit code 3): err");
    }

    #[test]
    fn test_run_command_feeds_stdin() {
        let output = run_command(&mut Command::new("cat"), Some(b"hello\nworld\n".as_slice())).expect("run cat");
        assert!(output.success);
        assert_eq!(output.lines(), vec!["hello", "world"]);
    }

    #[test]
    fn test_stream_as_reports_lines() {
        let mut seen = Vec::new();
        let output = stream_as(
            ChildKind::Ssh,
            Command::new("sh").args(["-c", "printf 'a\\nb\\n'"]),
            None,
            |line| seen.push(line.to_string()),
        )
        .expect("stream sh");
        assert_eq!(seen, vec!["a", "b"]);
        assert!(output.success);
        assert_eq!(output.stdout, "a\nb");
    }

    #[test]
    fn test_children_are_forgotten_after_exit() {
        let output = run_as(ChildKind::Ssh, Command::new("sh").args(["-c", "echo $$"]), None).expect("run sh");
        let pid: u32 = output.stdout.trim().parse().expect("pid");
        let mut table = running_children().lock().expect("table");
        assert_eq!(table.forget(pid), None);
    }

    #[test]
    fn test_missing_program_is_a_command_error() {
        let err = run_command(&mut Command::new("/nonexistent/program"), None).unwrap_err();
        assert!(matches!(err, SpadeError::Command(_)));
    }
}
