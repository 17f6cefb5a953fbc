//! `CommandRun`: run a shell command once.
//!
//! ```text
//! { action: "CommandRun", with: { command: "systemctl daemon-reload" } }
//! ```

use std::process::Command;

use serde_json::{Map, Value};

use crate::asserter::{Action, Args};
use crate::command_runner::{CommandOutput, run_command};
use crate::error::Result;
use crate::interpolator::Interpolator;
use crate::node::ScriptNode;

#[derive(Debug, Default)]
pub struct CommandRun {
    command: String,
    output: Option<CommandOutput>,
}

impl Action for CommandRun {
    fn prepare(&mut self, statement: &ScriptNode, interp: &Interpolator<'_>) -> Result<()> {
        self.command = Args::new(statement, interp)?.string("command")?;
        Ok(())
    }

    fn perform(&mut self) -> Result<()> {
        let output = run_command(Command::new("sh").args(["-c", &self.command]), None)?;
        let checked = output.ensure_success(&self.command);
        self.output = Some(output);
        checked
    }

    fn result(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("command".into(), Value::String(self.command.clone()));
        if let Some(output) = &self.output {
            map.insert("exitCode".into(), output.exit_code.map_or(Value::Null, Value::from));
            map.insert("output".into(), Value::String(output.stdout.trim_end().to_string()));
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asserters::test_support::action;
    use crate::run_context::RunContext;

    #[test]
    fn test_command_run() {
        let mut ctx = RunContext::default();
        ctx.vars = serde_json::json!({ "word": "hello" });
        let interp = Interpolator::new(&ctx);

        let mut run = CommandRun::default();
        run.prepare(&action("CommandRun", r#"{ command: "echo {word}" }"#), &interp)
            .expect("prepare");
        run.perform().expect("perform");

        let result = run.result();
        assert_eq!(result["command"], Value::String("echo hello".into()));
        assert_eq!(result["output"], Value::String("hello".into()));
        assert_eq!(result["exitCode"], Value::from(0));
    }

    #[test]
    fn test_failing_command() {
        let ctx = RunContext::default();
        let interp = Interpolator::new(&ctx);
        let mut run = CommandRun::default();
        run.prepare(&action("CommandRun", r#"{ command: "exit 4" }"#), &interp)
            .expect("prepare");
        assert!(run.perform().is_err());
        assert_eq!(run.result()["exitCode"], Value::from(4));
    }
}
