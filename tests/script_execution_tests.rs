//! Script loading and execution tests
//!
//! These run whole script trees from a temporary directory through the
//! loader and the executor, with counting asserters standing in for real
//! system changes.

use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde_json::{Map, Value, json};

use spade::asserter::{Args, Asserter, StatementRegistry};
use spade::error::{Result, SpadeError};
use spade::interpolator::Interpolator;
use spade::node::ScriptNode;
use spade::output::MemoryOutput;
use spade::privilege::{Identity, SimulatedSwitcher};
use spade::{Executor, RunContext, ScriptDocument, ScriptExecutionContext};

// =============================================================================
// Helpers
// =============================================================================

fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("mkdir");
    }
    fs::write(&path, text).expect("write script");
    path
}

#[derive(Default)]
struct Counters {
    asserts: Cell<usize>,
    rectifies: Cell<usize>,
}

/// Reports the state as satisfied when `with.ok` is true.
struct Counting {
    counters: Rc<Counters>,
    ok: bool,
}

impl Asserter for Counting {
    fn assert(&mut self, statement: &ScriptNode, interp: &Interpolator<'_>) -> Result<bool> {
        self.counters.asserts.set(self.counters.asserts.get() + 1);
        self.ok = Args::new(statement, interp)?.optional_bool("ok")?.unwrap_or(false);
        Ok(self.ok)
    }

    fn rectify(&mut self) -> Result<()> {
        self.counters.rectifies.set(self.counters.rectifies.get() + 1);
        Ok(())
    }

    fn result(&self) -> Map<String, Value> {
        Map::new()
    }
}

fn registry(counters: &Rc<Counters>) -> StatementRegistry {
    let mut registry = StatementRegistry::new();
    let shared = counters.clone();
    registry.register_asserter("Noop", move || {
        Box::new(Counting {
            counters: shared.clone(),
            ok: true,
        })
    });
    registry
}

fn run(root: &Path, assert_only: bool, counters: &Rc<Counters>) -> (MemoryOutput, RunContext) {
    let context = ScriptExecutionContext::build(root).expect("load");
    let registry = registry(counters);
    let switcher = SimulatedSwitcher::unprivileged(Identity::new(1000, 1000));
    let mut output = MemoryOutput::default();
    let mut run_ctx = RunContext::default();
    Executor::new(&registry, &switcher, &mut output, assert_only)
        .run_pass(&context, &mut run_ctx)
        .expect("run");
    (output, run_ctx)
}

// =============================================================================
// Loading
// =============================================================================

#[test]
fn test_loading_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "main.json5",
        r#"{ statements: [{ assert: "Noop", with: { ok: true }, when: "{true}" }] }"#,
    );
    let first = ScriptDocument::load(&path).unwrap();
    let second = ScriptDocument::load(&path).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_include_cycle_loads_each_document_once() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.json5", r#"{ includes: ["b.json5"] }"#);
    let root = write(dir.path(), "b.json5", r#"{ includes: ["a.json5"] }"#);

    let context = ScriptExecutionContext::build(&root).unwrap();
    assert_eq!(
        context.script_paths,
        vec![PathBuf::from("a.json5"), PathBuf::from("b.json5")]
    );
    assert_eq!(context.documents.len(), 2);
}

#[test]
fn test_include_outside_root_is_rejected_at_the_include() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "shared.json5", "{}");
    let root = write(
        dir.path(),
        "site/main.json5",
        "{\n  includes: [\"../shared.json5\"],\n}",
    );

    let err = ScriptExecutionContext::build(&root).unwrap_err();
    let script_err = err.script_error().expect("script error");
    assert!(script_err.message.contains("outside the root script directory"));
    assert_eq!(script_err.file, root);
    assert_eq!((script_err.line, script_err.column), (2, 14));
}

#[test]
fn test_statement_without_assert_fails_before_running() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "lib.json5",
        r#"{ statements: [{ assert: "Noop", with: {} }] }"#,
    );
    let root = write(
        dir.path(),
        "main.json5",
        r#"{ includes: ["lib.json5"], statements: [{ description: "broken" }] }"#,
    );

    let err = ScriptExecutionContext::build(&root).unwrap_err();
    assert!(matches!(err, SpadeError::Script(_)));
    assert!(err.to_string().contains("Neither 'assert' or 'action'"));
}

// =============================================================================
// Execution
// =============================================================================

#[test]
fn test_when_false_never_asserts() {
    let dir = tempfile::tempdir().unwrap();
    let root = write(
        dir.path(),
        "main.json5",
        r#"{
          vars: { enabled: false },
          statements: [
            { assert: "Noop", with: {}, when: false },
            { assert: "Noop", with: {}, when: "{enabled}" },
          ],
        }"#,
    );
    let counters = Rc::new(Counters::default());
    let (output, run_ctx) = run(&root, false, &counters);

    assert_eq!(counters.asserts.get(), 0);
    assert!(output.results.is_empty());
    assert!(run_ctx.results.is_empty());
}

#[test]
fn test_assert_only_never_rectifies() {
    let dir = tempfile::tempdir().unwrap();
    let root = write(
        dir.path(),
        "main.json5",
        r#"{ statements: [{ assert: "Noop", with: { ok: false } }] }"#,
    );

    let counters = Rc::new(Counters::default());
    let (output, _) = run(&root, true, &counters);
    assert_eq!(counters.rectifies.get(), 0);
    assert_eq!(output.results, vec![json!({ "wouldRectify": "Noop" })]);

    let counters = Rc::new(Counters::default());
    let (output, _) = run(&root, false, &counters);
    assert_eq!(counters.rectifies.get(), 1);
    assert_eq!(output.results, vec![json!({ "rectified": "Noop" })]);
}

#[test]
fn test_vars_merge_across_documents() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.json5", r#"{ vars: { db: { host: "a" } } }"#);
    let root = write(
        dir.path(),
        "b.json5",
        r#"{ includes: ["a.json5"], vars: { db: { port: 5432 } } }"#,
    );

    let counters = Rc::new(Counters::default());
    let (_, run_ctx) = run(&root, false, &counters);
    assert_eq!(run_ctx.vars["db"], json!({ "host": "a", "port": 5432 }));
}

#[test]
fn test_interpolated_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let root = write(
        dir.path(),
        "main.json5",
        r#"{
          vars: { name: "web1" },
          statements: [
            { description: "{name}.example.com", assert: "Noop", with: {} },
            { description: "plain", assert: "Noop", with: {} },
          ],
        }"#,
    );
    let counters = Rc::new(Counters::default());
    let (output, _) = run(&root, false, &counters);

    assert_eq!(output.results[0]["description"], json!("web1.example.com"));
    assert_eq!(output.results[1]["description"], json!("plain"));
}

#[test]
fn test_two_documents_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "a.json5",
        r#"{ vars: { x: 1 }, statements: [{ assert: "Noop", with: { ok: true } }] }"#,
    );
    let root = write(
        dir.path(),
        "b.json5",
        r#"{
          includes: ["a.json5"],
          statements: [{ description: "{x}", assert: "Noop", with: {} }],
        }"#,
    );

    let counters = Rc::new(Counters::default());
    let (output, run_ctx) = run(&root, false, &counters);

    assert_eq!(output.results.len(), 2);
    assert_eq!(output.results[0], json!({ "asserted": "Noop" }));
    assert_eq!(output.results[1]["description"], json!(1));
    assert_eq!(run_ctx.results, output.results);
}

#[test]
fn test_later_statements_see_earlier_results() {
    let dir = tempfile::tempdir().unwrap();
    let root = write(
        dir.path(),
        "main.json5",
        r#"{
          statements: [
            { assert: "Noop", with: { ok: false } },
            { assert: "Noop", with: {}, when: "{results.last().rectified == 'Noop'}" },
          ],
        }"#,
    );
    let counters = Rc::new(Counters::default());
    let (output, _) = run(&root, false, &counters);
    assert_eq!(output.results.len(), 2);
}

#[test]
fn test_metadata_is_reported_per_document() {
    let dir = tempfile::tempdir().unwrap();
    let root = write(
        dir.path(),
        "main.json5",
        r#"{ metadata: { description: "Web tier" }, statements: [] }"#,
    );
    let counters = Rc::new(Counters::default());
    let (output, _) = run(&root, false, &counters);

    assert_eq!(output.metadata.len(), 1);
    assert_eq!(output.metadata[0].0, "main.json5");
    assert_eq!(output.metadata[0].1["description"], json!("Web tier"));
}
