//! Statement execution.
//!
//! Each statement moves through:
//!
//! ```text
//! Pending ─ when is false ──────────────────────────────► Skipped (no result)
//!    │
//!    ├─ assert() = true ────────────────────────────────► Asserted
//!    └─ assert() = false ─┬─ assert-only ───────────────► WouldRectify
//!                         └─ rectify() ─┬─ Ok ──────────► Rectified
//!                                       └─ Err ─────────► pass aborted
//! ```
//!
//! Actions skip the check: they are `Performed`, or `WouldPerform` in
//! assert-only mode.
//!
//! When any document in the pass requests `become`, spade must be started as
//! root. The pass then runs as the operator who launched it and only
//! statements (or whole documents) that ask for `become` run as root.

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::asserter::StatementRegistry;
use crate::document::{ScriptDocument, Statement, StatementKind};
use crate::error::{Result, ScriptError, SpadeError};
use crate::interpolator::Interpolator;
use crate::output::Output;
use crate::privilege::{IdentityGuard, PrivilegeSwitcher};
use crate::run_context::RunContext;
use crate::script_context::ScriptExecutionContext;

/// What happened to a statement that produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "camelCase")]
pub enum Outcome {
    Asserted,
    Rectified,
    WouldRectify,
    Performed,
    WouldPerform,
}

pub struct Executor<'a> {
    registry: &'a StatementRegistry,
    switcher: &'a dyn PrivilegeSwitcher,
    output: &'a mut dyn Output,
    assert_only: bool,
}

impl<'a> Executor<'a> {
    pub fn new(
        registry: &'a StatementRegistry,
        switcher: &'a dyn PrivilegeSwitcher,
        output: &'a mut dyn Output,
        assert_only: bool,
    ) -> Self {
        Self {
            registry,
            switcher,
            output,
            assert_only,
        }
    }

    /// Run every document of `script` in order against `run_ctx`.
    pub fn run_pass(&mut self, script: &ScriptExecutionContext, run_ctx: &mut RunContext) -> Result<()> {
        let switcher = self.switcher;

        let _operator = if script.any_script_has_becomes {
            if !switcher.effective().is_root() {
                return Err(SpadeError::privilege(
                    "One or more scripts use 'become' so spade must be run as root (try sudo)",
                ));
            }
            let operator = switcher.launch_identity();
            debug!("Running as uid {} outside of 'become' statements", operator.uid);
            Some(IdentityGuard::switch_to(switcher, operator)?)
        } else {
            None
        };

        for (relative, doc) in script.iter() {
            info!("Running '{}'", relative.display());
            run_ctx.update(doc, false)?;

            if let Some(metadata) = doc.metadata.to_value().as_object() {
                if !metadata.is_empty() {
                    self.output.metadata(relative, metadata);
                }
            }

            self.run_document(doc, run_ctx)?;
        }

        Ok(())
    }

    /// Run the statements of one document, elevated throughout when the
    /// document asks for it.
    pub fn run_document(&mut self, doc: &ScriptDocument, run_ctx: &mut RunContext) -> Result<()> {
        let elevated = if doc.elevate_all {
            Some(IdentityGuard::elevate(self.switcher)?)
        } else {
            None
        };

        for statement in &doc.statements {
            self.run_statement(statement, run_ctx)?;
        }

        if let Some(guard) = elevated {
            guard.restore()?;
        }
        Ok(())
    }

    /// Run one statement. Returns the appended result, or `None` when the
    /// `when` guard skipped it.
    pub fn run_statement(&mut self, statement: &Statement, run_ctx: &mut RunContext) -> Result<Option<Value>> {
        let interp = Interpolator::new(&*run_ctx);

        if let Some(when) = &statement.when {
            if !interp.guard(when)? {
                debug!("Skipping '{}': 'when' is false", statement.kind.name());
                return Ok(None);
            }
        }

        let description = statement
            .description
            .as_ref()
            .map(|d| interp.interpolate(d))
            .transpose()?;

        let _elevated = if statement.elevate {
            Some(IdentityGuard::elevate(self.switcher)?)
        } else {
            None
        };

        let name = statement.kind.name();
        self.output.progress(name);

        let (outcome, details) = match &statement.kind {
            StatementKind::Assert(_) => self.assert_and_rectify(statement, &interp)?,
            StatementKind::Action(_) => self.perform(statement, &interp)?,
        };

        let mut result = Map::new();
        result.insert(outcome.as_ref().to_string(), Value::String(name.to_string()));
        if let Some(description) = description {
            result.insert("description".into(), description);
        }
        result.extend(details);
        let result = Value::Object(result);

        run_ctx.results.push(result.clone());
        self.output.result(&result);
        Ok(Some(result))
    }

    fn assert_and_rectify(
        &self,
        statement: &Statement,
        interp: &Interpolator<'_>,
    ) -> Result<(Outcome, Map<String, Value>)> {
        let name = statement.kind.name();
        let mut asserter = self
            .registry
            .create_asserter(name)
            .ok_or_else(|| unknown(statement, "asserter"))?;

        let outcome = if asserter.assert(&statement.node, interp)? {
            Outcome::Asserted
        } else if self.assert_only {
            Outcome::WouldRectify
        } else {
            info!("Rectifying '{}'", name);
            asserter
                .rectify()
                .map_err(|e| SpadeError::rectify(name, e))?;
            Outcome::Rectified
        };

        Ok((outcome, asserter.result()))
    }

    fn perform(
        &self,
        statement: &Statement,
        interp: &Interpolator<'_>,
    ) -> Result<(Outcome, Map<String, Value>)> {
        let name = statement.kind.name();
        let mut action = self
            .registry
            .create_action(name)
            .ok_or_else(|| unknown(statement, "action"))?;

        action.prepare(&statement.node, interp)?;
        let outcome = if self.assert_only {
            Outcome::WouldPerform
        } else {
            info!("Performing '{}'", name);
            action
                .perform()
                .map_err(|e| SpadeError::rectify(name, e))?;
            Outcome::Performed
        };

        Ok((outcome, action.result()))
    }
}

fn unknown(statement: &Statement, what: &str) -> SpadeError {
    SpadeError::UnknownStatement(ScriptError::new(
        format!("Unable to find {} '{}'", what, statement.kind.name()),
        &statement.name_node,
    ))
}
