//! Typed script tree.
//!
//! A parsed script is a tree of [`ScriptNode`]s. Each node is a closed sum
//! over the six data kinds plus the position it was parsed from and the file
//! that owns it. The owning file is attached after parsing by walking the tree
//! with a [`NodeVisitor`].

use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

/// 1-based position of a node in its source file. Synthesized nodes use 0:0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// The data kind of a node, as named in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum NodeKind {
    Null,
    Number,
    Boolean,
    String,
    Array,
    Object,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeValue {
    Null,
    Number(serde_json::Number),
    Boolean(bool),
    String(String),
    Array(Vec<ScriptNode>),
    Object(NodeMap),
}

/// Insertion-ordered object entries.
///
/// Order matters: variables may refer back to siblings declared earlier in
/// the same object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeMap {
    entries: Vec<(String, ScriptNode)>,
}

impl NodeMap {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ScriptNode> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut ScriptNode> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace. A replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, node: ScriptNode) {
        let key = key.into();
        match self.get_mut(&key) {
            Some(existing) => *existing = node,
            None => self.entries.push((key, node)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScriptNode)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut ScriptNode)> {
        self.entries.iter_mut().map(|(k, v)| (k.as_str(), v))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptNode {
    pub value: NodeValue,
    pub location: Location,
    file: Option<Arc<Path>>,
}

impl ScriptNode {
    pub fn new(value: NodeValue, location: Location) -> Self {
        Self {
            value,
            location,
            file: None,
        }
    }

    /// An empty object node at 0:0, used when defaulting missing sections.
    pub fn empty_object() -> Self {
        Self::new(NodeValue::Object(NodeMap::new()), Location::default())
    }

    /// An empty array node at 0:0, used when defaulting missing sections.
    pub fn empty_array() -> Self {
        Self::new(NodeValue::Array(Vec::new()), Location::default())
    }

    pub fn string(value: impl Into<String>, location: Location) -> Self {
        Self::new(NodeValue::String(value.into()), location)
    }

    pub fn kind(&self) -> NodeKind {
        match self.value {
            NodeValue::Null => NodeKind::Null,
            NodeValue::Number(_) => NodeKind::Number,
            NodeValue::Boolean(_) => NodeKind::Boolean,
            NodeValue::String(_) => NodeKind::String,
            NodeValue::Array(_) => NodeKind::Array,
            NodeValue::Object(_) => NodeKind::Object,
        }
    }

    /// The file that owns this node; empty until the tree has been tagged.
    pub fn file(&self) -> &Path {
        self.file.as_deref().unwrap_or(Path::new(""))
    }

    pub fn is_tagged(&self) -> bool {
        self.file.as_deref().is_some_and(|p| !p.as_os_str().is_empty())
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            NodeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.value {
            NodeValue::Boolean(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[ScriptNode]> {
        match &self.value {
            NodeValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&NodeMap> {
        match &self.value {
            NodeValue::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut NodeMap> {
        match &mut self.value {
            NodeValue::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Member lookup on object nodes; `None` for other kinds.
    pub fn get(&self, key: &str) -> Option<&ScriptNode> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Attach `file` to this node and every node beneath it.
    pub fn tag_source(&mut self, file: &Path) {
        let mut tagger = SourceTagger {
            file: Arc::from(file),
        };
        walk_mut(self, &mut tagger);
    }

    /// Strip positions, producing plain data.
    pub fn to_value(&self) -> Value {
        match &self.value {
            NodeValue::Null => Value::Null,
            NodeValue::Number(n) => Value::Number(n.clone()),
            NodeValue::Boolean(b) => Value::Bool(*b),
            NodeValue::String(s) => Value::String(s.clone()),
            NodeValue::Array(items) => Value::Array(items.iter().map(Self::to_value).collect()),
            NodeValue::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.to_string(), v.to_value()))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }
}

/// Mutable visitor over a node tree.
pub trait NodeVisitor {
    fn visit(&mut self, node: &mut ScriptNode);
}

/// Depth-first, pre-order walk through arrays and objects.
pub fn walk_mut<V: NodeVisitor + ?Sized>(node: &mut ScriptNode, visitor: &mut V) {
    visitor.visit(node);
    match &mut node.value {
        NodeValue::Array(items) => {
            for item in items {
                walk_mut(item, visitor);
            }
        }
        NodeValue::Object(map) => {
            for (_, child) in map.iter_mut() {
                walk_mut(child, visitor);
            }
        }
        NodeValue::Null | NodeValue::Number(_) | NodeValue::Boolean(_) | NodeValue::String(_) => {}
    }
}

struct SourceTagger {
    file: Arc<Path>,
}

impl NodeVisitor for SourceTagger {
    fn visit(&mut self, node: &mut ScriptNode) {
        node.file = Some(Arc::clone(&self.file));
    }
}
