//! Run a script on this host.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use super::RunSettings;
use crate::asserter::StatementRegistry;
use crate::executor::Executor;
use crate::output::Output;
use crate::privilege::{NixSwitcher, PrivilegeSwitcher};
use crate::run_context::RunContext;
use crate::script_context::ScriptExecutionContext;

/// Load `script` and its includes and run them with the built-in statements.
pub fn run_local(script: &Path, settings: RunSettings, output: &mut dyn Output) -> Result<()> {
    let registry = StatementRegistry::with_builtins();
    run_local_with(script, settings, &registry, &NixSwitcher, RunContext::capture(), output)
}

/// [`run_local`] with every collaborator supplied by the caller.
pub fn run_local_with(
    script: &Path,
    settings: RunSettings,
    registry: &StatementRegistry,
    switcher: &dyn PrivilegeSwitcher,
    mut run_ctx: RunContext,
    output: &mut dyn Output,
) -> Result<()> {
    let context = ScriptExecutionContext::build(script)
        .with_context(|| format!("Failed to load {}", script.display()))?;
    debug!(
        "Loaded {} script(s) from {}",
        context.script_paths.len(),
        context.root_dir.display()
    );

    let mut executor = Executor::new(registry, switcher, output, settings.assert_only);
    executor.run_pass(&context, &mut run_ctx)?;
    Ok(())
}
