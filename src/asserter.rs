//! Asserter and action capabilities, and the registry that maps statement
//! names to them.
//!
//! A fresh instance is created for every statement executed, so
//! implementations can keep whatever they learn in `assert` around for
//! `rectify` and `result`.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::{Result, ScriptError};
use crate::interpolator::Interpolator;
use crate::node::{NodeKind, ScriptNode};

/// A desired-state check with a remediation.
pub trait Asserter {
    /// True when the desired state already holds. Malformed arguments are
    /// reported as [`ScriptError`]s.
    fn assert(&mut self, statement: &ScriptNode, interp: &Interpolator<'_>) -> Result<bool>;

    /// Bring the system into the desired state.
    fn rectify(&mut self) -> Result<()>;

    /// Details of what was checked or changed, merged into the statement
    /// result.
    fn result(&self) -> Map<String, Value>;
}

/// A one-shot operation with no precondition check.
pub trait Action {
    /// Read and validate arguments. Runs in every mode.
    fn prepare(&mut self, statement: &ScriptNode, interp: &Interpolator<'_>) -> Result<()>;

    /// Carry out the action. Skipped in assert-only mode.
    fn perform(&mut self) -> Result<()>;

    fn result(&self) -> Map<String, Value>;
}

pub type AsserterFactory = Box<dyn Fn() -> Box<dyn Asserter>>;
pub type ActionFactory = Box<dyn Fn() -> Box<dyn Action>>;

/// Name to constructor mapping, populated at startup.
#[derive(Default)]
pub struct StatementRegistry {
    asserters: HashMap<String, AsserterFactory>,
    actions: HashMap<String, ActionFactory>,
}

impl StatementRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in asserter and action.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::asserters::register_builtins(&mut registry);
        registry
    }

    pub fn register_asserter<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Asserter> + 'static,
    {
        self.asserters.insert(name.to_string(), Box::new(factory));
    }

    pub fn register_action<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Action> + 'static,
    {
        self.actions.insert(name.to_string(), Box::new(factory));
    }

    pub fn create_asserter(&self, name: &str) -> Option<Box<dyn Asserter>> {
        self.asserters.get(name).map(|factory| factory())
    }

    pub fn create_action(&self, name: &str) -> Option<Box<dyn Action>> {
        self.actions.get(name).map(|factory| factory())
    }

    /// Registered asserter names, sorted.
    pub fn asserter_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.asserters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Registered action names, sorted.
    pub fn action_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Typed access to a statement's `with` arguments.
pub struct Args<'a> {
    with: &'a ScriptNode,
    interp: &'a Interpolator<'a>,
}

impl<'a> Args<'a> {
    pub fn new(statement: &'a ScriptNode, interp: &'a Interpolator<'a>) -> std::result::Result<Self, ScriptError> {
        match statement.get("with") {
            Some(with) if with.kind() == NodeKind::Object => Ok(Self { with, interp }),
            _ => Err(ScriptError::new(
                "'with' must be present and of type 'object'",
                statement,
            )),
        }
    }

    /// The `with` node itself.
    pub fn node(&self) -> &'a ScriptNode {
        self.with
    }

    pub fn get(&self, name: &str) -> Option<&'a ScriptNode> {
        self.with.get(name)
    }

    /// A mandatory string argument, interpolated.
    pub fn string(&self, name: &str) -> std::result::Result<String, ScriptError> {
        match self.get(name) {
            None => Err(ScriptError::new(
                format!("'{}' must be supplied", name),
                self.with,
            )),
            Some(node) => self.string_node(name, node),
        }
    }

    /// An optional string argument, interpolated.
    pub fn optional_string(&self, name: &str) -> std::result::Result<Option<String>, ScriptError> {
        self.get(name)
            .map(|node| self.string_node(name, node))
            .transpose()
    }

    /// An optional boolean argument. Strings are interpolated and must
    /// produce a boolean.
    pub fn optional_bool(&self, name: &str) -> std::result::Result<Option<bool>, ScriptError> {
        let Some(node) = self.get(name) else {
            return Ok(None);
        };
        if let Some(b) = node.as_bool() {
            return Ok(Some(b));
        }
        if node.kind() == NodeKind::String {
            if let Value::Bool(b) = self.interp.interpolate(node)? {
                return Ok(Some(b));
            }
        }
        Err(ScriptError::new(format!("'{}' must be a boolean", name), node))
    }

    fn string_node(&self, name: &str, node: &ScriptNode) -> std::result::Result<String, ScriptError> {
        if node.kind() != NodeKind::String {
            return Err(ScriptError::new(format!("'{}' must be a string", name), node));
        }
        self.interp.interpolate_string(node)
    }
}
