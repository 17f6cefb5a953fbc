//! Run a script on remote hosts.
//!
//! For each host: connect, make sure a compatible `spade` is installed,
//! upload the partially interpolated documents into a scratch directory and
//! run the remote engine against the uploaded root script. Hosts are handled
//! one after another. A failing host is logged and counted and the next
//! host is still attempted.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{debug, error, info, warn};

use super::RunSettings;
use crate::bootstrap;
use crate::output::Output;
use crate::run_context::RunContext;
use crate::script_context::ScriptExecutionContext;
use crate::transport::{
    ConnectOptions, FileTransfer, OpenSshSession, OpenSshTransfer, RemoteSession, RunOptions,
    remote_join, shell_quote,
};

/// Creates fresh transport capabilities for each host.
pub trait SessionFactory {
    fn session(&self) -> Box<dyn RemoteSession>;
    fn transfer(&self) -> Box<dyn FileTransfer>;
}

/// Sessions backed by the local `ssh` client.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenSshFactory;

impl SessionFactory for OpenSshFactory {
    fn session(&self) -> Box<dyn RemoteSession> {
        Box::new(OpenSshSession::new())
    }

    fn transfer(&self) -> Box<dyn FileTransfer> {
        Box::new(OpenSshTransfer::new())
    }
}

pub struct RemoteRunner<'a> {
    factory: &'a dyn SessionFactory,
    settings: RunSettings,
    base_context: RunContext,
}

impl<'a> RemoteRunner<'a> {
    /// Local facts used for `local` variables are captured now.
    pub fn new(factory: &'a dyn SessionFactory, settings: RunSettings) -> Self {
        Self::with_run_context(factory, settings, RunContext::capture())
    }

    pub fn with_run_context(factory: &'a dyn SessionFactory, settings: RunSettings, base_context: RunContext) -> Self {
        Self {
            factory,
            settings,
            base_context,
        }
    }

    /// Run `script` on every host. Returns the number of hosts that failed.
    ///
    /// Script load errors are returned before any host is contacted.
    pub fn run(&self, script: &Path, hosts: &[ConnectOptions], output: &mut dyn Output) -> Result<usize> {
        let context = ScriptExecutionContext::build(script)
            .with_context(|| format!("Failed to load {}", script.display()))?;

        let mut failures = 0;
        for host in hosts {
            let name = host.display_name();
            info!("Connecting to {}", name);
            match self.run_host(&context, host, output) {
                Ok(()) => info!("Finished {}", name),
                Err(e) => {
                    error!("{} failed: {:#}", name, e);
                    failures += 1;
                }
            }
        }
        Ok(failures)
    }

    fn run_host(&self, context: &ScriptExecutionContext, host: &ConnectOptions, output: &mut dyn Output) -> Result<()> {
        let mut session = self.factory.session();
        let mut transfer = self.factory.transfer();

        let result = self.run_on(context, host, session.as_mut(), transfer.as_mut(), output);

        transfer.close();
        session.close();
        info!("Disconnected from {}", host.display_name());
        result
    }

    fn run_on(
        &self,
        context: &ScriptExecutionContext,
        host: &ConnectOptions,
        session: &mut dyn RemoteSession,
        transfer: &mut dyn FileTransfer,
        output: &mut dyn Output,
    ) -> Result<()> {
        session
            .connect(host)
            .with_context(|| format!("Failed to connect to {}", host.display_name()))?;
        transfer.connect(host)?;

        bootstrap::ensure_remote_engine(session, transfer)?;

        let scratch = session.run("mktemp -d", RunOptions::default())?.first_line().to_string();
        if scratch.is_empty() {
            bail!("'mktemp -d' produced no directory on {}", host.display_name());
        }
        debug!("Created remote script directory '{}'", scratch);

        let outcome = self.upload_and_run(context, &scratch, session, transfer, output);

        debug!("Deleting remote script directory '{}'", scratch);
        if let Err(e) = session.run(&format!("rm -rf {}", shell_quote(&scratch)), RunOptions::no_throw()) {
            warn!("Unable to delete '{}': {}", scratch, e);
        }
        outcome
    }

    fn upload_and_run(
        &self,
        context: &ScriptExecutionContext,
        scratch: &str,
        session: &mut dyn RemoteSession,
        transfer: &mut dyn FileTransfer,
        output: &mut dyn Output,
    ) -> Result<()> {
        let mut run_ctx = self.base_context.clone();
        let mut created_dirs = HashSet::new();

        for (relative, doc) in context.iter() {
            run_ctx.update(doc, true)?;

            let includes: Vec<String> = doc
                .includes
                .iter()
                .filter_map(|node| node.as_str().map(String::from))
                .collect();
            let value = doc.to_value_with(&run_ctx.vars, &includes);
            let content = if self.settings.debug {
                serde_json::to_string_pretty(&value)?
            } else {
                serde_json::to_string(&value)?
            };

            let remote_path = remote_join(scratch, relative);
            let remote_dir = remote_path
                .rsplit_once('/')
                .map_or(scratch, |(dir, _)| dir)
                .to_string();
            if created_dirs.insert(remote_dir.clone()) {
                session.run(&format!("mkdir -p {}", shell_quote(&remote_dir)), RunOptions::default())?;
            }

            transfer
                .put_content(content.as_bytes(), &remote_path)
                .with_context(|| format!("Failed to upload {}", relative.display()))?;
            debug!("Uploaded {}", remote_path);
        }

        let root = context.root_path().context("No scripts were loaded")?;
        let command = format!(
            "spade --no-spinner{} {}",
            if self.settings.assert_only { " --assert-only" } else { "" },
            shell_quote(&remote_join(scratch, root))
        );

        info!(
            "Running script on host{}",
            if context.any_script_has_becomes { " as root" } else { "" }
        );
        let options = RunOptions {
            sudo: context.any_script_has_becomes,
            no_throw: true,
        };
        let result = session.run_streamed(&command, options, &mut |line: &str| output.line(line))?;
        if result.exit_code != 0 {
            bail!("Remote spade exited with code {}", result.exit_code);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::engine_version;
    use crate::error::SpadeError;
    use crate::output::MemoryOutput;
    use crate::transport::RemoteOutput;
    use serde_json::{Value, json};
    use std::cell::RefCell;
    use std::fs;
    use std::rc::Rc;

    #[derive(Debug, Default)]
    struct HostLog {
        commands: Vec<(String, bool)>,
        uploads: Vec<(String, String)>,
        closed: usize,
    }

    /// A host that already has everything installed.
    struct FakeHost {
        log: Rc<RefCell<HostLog>>,
        unreachable: bool,
        engine_exit: i32,
    }

    impl RemoteSession for FakeHost {
        fn connect(&mut self, options: &ConnectOptions) -> crate::error::Result<()> {
            if self.unreachable {
                return Err(SpadeError::transport(format!("{} is unreachable", options.host)));
            }
            Ok(())
        }

        fn run_streamed(
            &mut self,
            command: &str,
            options: RunOptions,
            on_line: &mut dyn FnMut(&str),
        ) -> crate::error::Result<RemoteOutput> {
            self.log.borrow_mut().commands.push((command.to_string(), options.sudo));
            let (exit_code, lines) = if command == "cargo --version" {
                (0, vec!["cargo 1.95.0 (abc 2026-03-21)".to_string()])
            } else if command == "spade --version" {
                (0, vec![format!("spade {}", engine_version())])
            } else if command == "mktemp -d" {
                (0, vec!["/tmp/tmp.k3".to_string()])
            } else if command.starts_with("spade --no-spinner") {
                (self.engine_exit, vec![r#"{"asserted":"Noop"}"#.to_string()])
            } else {
                (0, Vec::new())
            };
            for line in &lines {
                on_line(line);
            }
            Ok(RemoteOutput { exit_code, output: lines })
        }

        fn close(&mut self) {
            self.log.borrow_mut().closed += 1;
        }
    }

    struct FakeTransfer {
        log: Rc<RefCell<HostLog>>,
    }

    impl FileTransfer for FakeTransfer {
        fn connect(&mut self, _options: &ConnectOptions) -> crate::error::Result<()> {
            Ok(())
        }

        fn put_content(&mut self, content: &[u8], remote_path: &str) -> crate::error::Result<()> {
            self.log
                .borrow_mut()
                .uploads
                .push((remote_path.to_string(), String::from_utf8_lossy(content).into_owned()));
            Ok(())
        }

        fn close(&mut self) {
            self.log.borrow_mut().closed += 1;
        }
    }

    struct FakeFactory {
        log: Rc<RefCell<HostLog>>,
        unreachable: &'static [&'static str],
        engine_exit: i32,
        next_host: RefCell<Vec<&'static str>>,
    }

    impl FakeFactory {
        fn new(hosts: &[&'static str]) -> Self {
            Self {
                log: Rc::default(),
                unreachable: &[],
                engine_exit: 0,
                next_host: RefCell::new(hosts.iter().rev().copied().collect()),
            }
        }
    }

    impl SessionFactory for FakeFactory {
        fn session(&self) -> Box<dyn RemoteSession> {
            let host = self.next_host.borrow_mut().pop().unwrap_or_default();
            Box::new(FakeHost {
                log: self.log.clone(),
                unreachable: self.unreachable.contains(&host),
                engine_exit: self.engine_exit,
            })
        }

        fn transfer(&self) -> Box<dyn FileTransfer> {
            Box::new(FakeTransfer { log: self.log.clone() })
        }
    }

    fn write_scripts(dir: &Path) {
        fs::create_dir_all(dir.join("lib")).unwrap();
        fs::write(
            dir.join("lib/base.json5"),
            r#"{
              vars: { greeting: "hi", local: { who: "{user.name}" } },
              statements: [{ assert: "FileExists", with: { file: "/tmp/{greeting}" } }],
            }"#,
        )
        .unwrap();
        fs::write(
            dir.join("main.json5"),
            r#"{
              includes: ["lib/base.json5"],
              vars: { port: 8080 },
              statements: [{ assert: "DirectoryExists", with: { directory: "/srv" }, become: true }],
            }"#,
        )
        .unwrap();
    }

    fn base_context() -> RunContext {
        let mut ctx = RunContext::default();
        ctx.user = json!({ "name": "ops" });
        ctx
    }

    #[test]
    fn test_uploads_and_runs_remote_engine() {
        let dir = tempfile::tempdir().unwrap();
        write_scripts(dir.path());
        let factory = FakeFactory::new(&["web1"]);
        let runner = RemoteRunner::with_run_context(&factory, RunSettings::default(), base_context());
        let mut output = MemoryOutput::default();

        let failures = runner
            .run(&dir.path().join("main.json5"), &[ConnectOptions::new("web1")], &mut output)
            .unwrap();
        assert_eq!(failures, 0);
        assert_eq!(output.lines, vec![r#"{"asserted":"Noop"}"#.to_string()]);

        let log = factory.log.borrow();
        let paths: Vec<&str> = log.uploads.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, ["/tmp/tmp.k3/lib/base.json5", "/tmp/tmp.k3/main.json5"]);

        let base: Value = serde_json::from_str(&log.uploads[0].1).unwrap();
        assert_eq!(base["vars"]["greeting"], json!("hi"));
        assert_eq!(base["vars"]["local"]["who"], json!("ops"));
        assert_eq!(base["statements"][0]["with"]["file"], json!("/tmp/{greeting}"));

        let main: Value = serde_json::from_str(&log.uploads[1].1).unwrap();
        assert_eq!(main["includes"], json!(["lib/base.json5"]));
        assert_eq!(main["vars"]["port"], json!(8080));
        assert_eq!(main["vars"]["greeting"], json!("hi"));

        let commands: Vec<&str> = log.commands.iter().map(|(c, _)| c.as_str()).collect();
        assert!(commands.contains(&"mkdir -p /tmp/tmp.k3/lib"));
        assert!(commands.contains(&"mkdir -p /tmp/tmp.k3"));
        let engine = log
            .commands
            .iter()
            .find(|(c, _)| c.starts_with("spade --no-spinner"))
            .unwrap();
        assert_eq!(engine.0, "spade --no-spinner /tmp/tmp.k3/main.json5");
        assert!(engine.1, "become requires sudo on the remote side");
        assert_eq!(commands.last(), Some(&"rm -rf /tmp/tmp.k3"));
        assert_eq!(log.closed, 2);
    }

    #[test]
    fn test_assert_only_is_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        write_scripts(dir.path());
        let factory = FakeFactory::new(&["web1"]);
        let settings = RunSettings {
            assert_only: true,
            debug: false,
        };
        let runner = RemoteRunner::with_run_context(&factory, settings, base_context());
        let mut output = MemoryOutput::default();
        runner
            .run(&dir.path().join("main.json5"), &[ConnectOptions::new("web1")], &mut output)
            .unwrap();

        let log = factory.log.borrow();
        assert!(
            log.commands
                .iter()
                .any(|(c, _)| c == "spade --no-spinner --assert-only /tmp/tmp.k3/main.json5")
        );
    }

    #[test]
    fn test_failed_host_does_not_stop_others() {
        let dir = tempfile::tempdir().unwrap();
        write_scripts(dir.path());
        let mut factory = FakeFactory::new(&["down", "up"]);
        factory.unreachable = &["down"];
        let runner = RemoteRunner::with_run_context(&factory, RunSettings::default(), base_context());
        let mut output = MemoryOutput::default();

        let hosts = [ConnectOptions::new("down"), ConnectOptions::new("up")];
        let failures = runner.run(&dir.path().join("main.json5"), &hosts, &mut output).unwrap();
        assert_eq!(failures, 1);
        assert_eq!(output.lines.len(), 1);
        assert_eq!(factory.log.borrow().closed, 4);
    }

    #[test]
    fn test_remote_engine_failure_counts_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        write_scripts(dir.path());
        let mut factory = FakeFactory::new(&["web1"]);
        factory.engine_exit = 1;
        let runner = RemoteRunner::with_run_context(&factory, RunSettings::default(), base_context());
        let mut output = MemoryOutput::default();

        let failures = runner
            .run(&dir.path().join("main.json5"), &[ConnectOptions::new("web1")], &mut output)
            .unwrap();
        assert_eq!(failures, 1);
        let log = factory.log.borrow();
        assert_eq!(log.commands.last().map(|(c, _)| c.as_str()), Some("rm -rf /tmp/tmp.k3"));
    }

    #[test]
    fn test_load_error_contacts_no_host() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.json5"), "{ statements: [{ with: {} }] }").unwrap();
        let factory = FakeFactory::new(&["web1"]);
        let runner = RemoteRunner::with_run_context(&factory, RunSettings::default(), base_context());
        let mut output = MemoryOutput::default();

        assert!(
            runner
                .run(&dir.path().join("main.json5"), &[ConnectOptions::new("web1")], &mut output)
                .is_err()
        );
        assert!(factory.log.borrow().commands.is_empty());
    }
}
