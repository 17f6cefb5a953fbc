//! Script document loading and validation.
//!
//! A script file is read, parsed into a node tree, normalized so the four
//! top-level sections always exist, tagged with its owning file and then
//! validated. Any violation rejects the whole document.
//!
//! # Document Shape
//!
//! ```text
//! {
//!   includes: ["relative/path.json5", ...],
//!   metadata: { description: "...", become: false },
//!   vars: { ... },
//!   statements: [
//!     { description?, when?, assert | action, with: {...}, become? },
//!   ],
//! }
//! ```

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::{Result, ScriptError};
use crate::node::{NodeKind, NodeValue, ScriptNode};
use crate::parser;
use crate::paths;

/// Whether a statement checks state or performs a one-shot action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    Assert(String),
    Action(String),
}

impl StatementKind {
    pub fn name(&self) -> &str {
        match self {
            Self::Assert(name) | Self::Action(name) => name,
        }
    }
}

/// One validated statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// The whole statement object, handed to asserters.
    pub node: ScriptNode,
    pub kind: StatementKind,
    /// The `assert`/`action` string node, for error positions.
    pub name_node: ScriptNode,
    pub description: Option<ScriptNode>,
    pub when: Option<ScriptNode>,
    pub with: ScriptNode,
    /// `become: true` on this statement.
    pub elevate: bool,
}

/// A loaded, normalized and validated script file.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptDocument {
    /// Absolute, normalized path of the file.
    pub path: PathBuf,
    /// The normalized tree, with defaulted sections in place.
    pub root: ScriptNode,
    pub includes: Vec<ScriptNode>,
    pub metadata: ScriptNode,
    pub vars: ScriptNode,
    pub statements: Vec<Statement>,
    /// `metadata.become: true`.
    pub elevate_all: bool,
}

impl ScriptDocument {
    /// Read and validate the script at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let path = paths::absolute(path)?;
        let text = std::fs::read_to_string(&path)?;
        Ok(Self::parse(&text, &path)?)
    }

    /// Validate script `text` as if it had been read from `path`.
    pub fn parse(text: &str, path: &Path) -> std::result::Result<Self, ScriptError> {
        let mut root = parser::parse(text, path)?;

        if root.kind() != NodeKind::Object {
            root.tag_source(path);
            return Err(ScriptError::new("Script must have an object as the root", &root));
        }

        if let Some(map) = root.as_object_mut() {
            if !map.contains_key("includes") {
                map.insert("includes", ScriptNode::empty_array());
            }
            if !map.contains_key("metadata") {
                map.insert("metadata", ScriptNode::empty_object());
            }
            if !map.contains_key("vars") {
                map.insert("vars", ScriptNode::empty_object());
            }
            if !map.contains_key("statements") {
                map.insert("statements", ScriptNode::empty_array());
            }
        }

        root.tag_source(path);

        let section = |name: &str| root.get(name).cloned().unwrap_or_else(ScriptNode::empty_object);
        let includes_node = section("includes");
        let metadata = section("metadata");
        let vars = section("vars");
        let statements_node = section("statements");

        let includes = validate_includes(&includes_node)?;
        let elevate_all = validate_metadata(&metadata)?;

        if vars.kind() != NodeKind::Object {
            return Err(ScriptError::new("'vars' must be an object", &vars));
        }

        let statement_nodes = statements_node
            .as_array()
            .ok_or_else(|| ScriptError::new("'statements' must be an array", &statements_node))?;

        let statements = statement_nodes
            .iter()
            .map(validate_statement)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            path: path.to_path_buf(),
            root,
            includes,
            metadata,
            vars,
            statements,
            elevate_all,
        })
    }

    /// Directory containing this script.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("/"))
    }

    /// True when this document or any of its statements requests elevation.
    pub fn has_becomes(&self) -> bool {
        self.elevate_all || self.statements.iter().any(|s| s.elevate)
    }

    /// Plain-data form of the document with `vars` replaced and the include
    /// list rewritten, as uploaded to remote hosts.
    pub fn to_value_with(&self, vars: &Value, includes: &[String]) -> Value {
        let mut out = Map::new();
        out.insert(
            "includes".to_string(),
            Value::Array(includes.iter().cloned().map(Value::String).collect()),
        );
        out.insert("metadata".to_string(), self.metadata.to_value());
        out.insert("vars".to_string(), vars.clone());
        out.insert(
            "statements".to_string(),
            Value::Array(self.statements.iter().map(|s| s.node.to_value()).collect()),
        );
        Value::Object(out)
    }
}

fn validate_includes(node: &ScriptNode) -> std::result::Result<Vec<ScriptNode>, ScriptError> {
    let items = node
        .as_array()
        .ok_or_else(|| ScriptError::new("'includes' must be an array", node))?;

    for include in items {
        let Some(value) = include.as_str() else {
            return Err(ScriptError::new("Include must be a string", include));
        };
        if Path::new(value).is_absolute() {
            return Err(ScriptError::new(
                "Absolute path for include is not allowed",
                include,
            ));
        }
    }

    Ok(items.to_vec())
}

fn validate_metadata(node: &ScriptNode) -> std::result::Result<bool, ScriptError> {
    let map = node
        .as_object()
        .ok_or_else(|| ScriptError::new("'metadata' must be an object", node))?;

    if let Some(description) = map.get("description") {
        if description.kind() != NodeKind::String {
            return Err(ScriptError::new("'description' must be a string", description));
        }
    }

    match map.get("become") {
        None => Ok(false),
        Some(become_node) => become_node
            .as_bool()
            .ok_or_else(|| ScriptError::new("'become' must be a boolean", become_node)),
    }
}

fn validate_statement(node: &ScriptNode) -> std::result::Result<Statement, ScriptError> {
    let Some(map) = node.as_object() else {
        return Err(ScriptError::new("Statement must be an object", node));
    };

    let (kind, name_node) = match (map.get("assert"), map.get("action")) {
        (Some(_), Some(action)) => {
            return Err(ScriptError::new(
                "Only one of 'assert' or 'action' may be present",
                action,
            ));
        }
        (Some(assert), None) => match &assert.value {
            NodeValue::String(name) => (StatementKind::Assert(name.clone()), assert.clone()),
            _ => return Err(ScriptError::new("'assert' must be a string", assert)),
        },
        (None, Some(action)) => match &action.value {
            NodeValue::String(name) => (StatementKind::Action(name.clone()), action.clone()),
            _ => return Err(ScriptError::new("'action' must be a string", action)),
        },
        (None, None) => {
            return Err(ScriptError::new(
                "Neither 'assert' or 'action' property is present",
                node,
            ));
        }
    };

    let description = map.get("description").cloned();
    if let Some(description) = &description {
        if description.kind() != NodeKind::String {
            return Err(ScriptError::new("'description' must be a string", description));
        }
    }

    let when = map.get("when").cloned();
    if let Some(when) = &when {
        if !matches!(when.kind(), NodeKind::String | NodeKind::Boolean) {
            return Err(ScriptError::new("'when' must be a string or boolean", when));
        }
    }

    let with = match map.get("with") {
        Some(with) if with.kind() == NodeKind::Object => with.clone(),
        _ => {
            return Err(ScriptError::new(
                "'with' must be present and of type 'object'",
                node,
            ));
        }
    };

    let elevate = match map.get("become") {
        None => false,
        Some(become_node) => become_node
            .as_bool()
            .ok_or_else(|| ScriptError::new("'become' must be a boolean", become_node))?,
    };

    Ok(Statement {
        node: node.clone(),
        kind,
        name_node,
        description,
        when,
        with,
        elevate,
    })
}
