//! Variable namespaces for one execution pass.
//!
//! A [`RunContext`] is built once per pass. `env`, `os` and `user` are
//! captured when it is created and never change; `sys` is updated as each
//! document starts; `vars` accumulates the `vars` sections of every document
//! run so far; `results` grows by one entry per executed statement.

use std::path::Path;

use nix::unistd::Uid;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::builtins;
use crate::document::ScriptDocument;
use crate::error::{Result, ScriptError};
use crate::expr::EvalContext;
use crate::interpolator::Interpolator;
use crate::node::{NodeValue, ScriptNode};
use crate::privilege::{Identity, NixSwitcher, PrivilegeSwitcher};

#[derive(Debug, Clone, PartialEq)]
pub struct RunContext {
    pub vars: Value,
    pub env: Value,
    pub os: Value,
    pub user: Value,
    pub sys: Value,
    pub results: Vec<Value>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self {
            vars: Value::Object(Map::new()),
            env: Value::Object(Map::new()),
            os: Value::Object(Map::new()),
            user: Value::Object(Map::new()),
            sys: Value::Object(Map::new()),
            results: Vec::new(),
        }
    }
}

impl RunContext {
    /// Snapshot the process environment, operating system and the user who
    /// launched spade (the sudo caller when run under sudo).
    pub fn capture() -> Self {
        Self::capture_as(NixSwitcher.launch_identity())
    }

    /// Like [`RunContext::capture`], with `user` describing `identity`.
    pub fn capture_as(identity: Identity) -> Self {
        let env = std::env::vars()
            .map(|(k, v)| (k, Value::String(v)))
            .collect::<Map<String, Value>>();

        let hostname = nix::unistd::gethostname()
            .ok()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_default();
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let os = json!({
            "platform": std::env::consts::OS,
            "family": std::env::consts::FAMILY,
            "arch": std::env::consts::ARCH,
            "hostname": hostname,
            "cpus": cpus,
        });

        let user = match nix::unistd::User::from_uid(Uid::from_raw(identity.uid)) {
            Ok(Some(u)) => json!({
                "name": u.name,
                "uid": identity.uid,
                "gid": identity.gid,
                "homeDir": u.dir.to_string_lossy(),
                "shell": u.shell.to_string_lossy(),
            }),
            _ => json!({ "uid": identity.uid, "gid": identity.gid }),
        };

        Self {
            env: Value::Object(env),
            os,
            user,
            ..Self::default()
        }
    }

    /// Set `sys.scriptFile`/`sys.scriptDir` for `doc` and merge its `vars`.
    ///
    /// With `interpolate_only_local_vars`, only strings nested somewhere
    /// beneath a key named `local` are evaluated; every other string is
    /// stored verbatim so it can be evaluated later on the remote host.
    pub fn update(&mut self, doc: &ScriptDocument, interpolate_only_local_vars: bool) -> Result<()> {
        self.set_script(&doc.path);
        debug!(
            "Merging vars from '{}' (local only: {})",
            doc.path.display(),
            interpolate_only_local_vars
        );

        let mut path = Vec::new();
        self.merge(&doc.vars, &mut path, interpolate_only_local_vars, false)?;
        Ok(())
    }

    fn set_script(&mut self, file: &Path) {
        let dir = file.parent().unwrap_or(Path::new("/"));
        if !self.sys.is_object() {
            self.sys = Value::Object(Map::new());
        }
        if let Value::Object(sys) = &mut self.sys {
            sys.insert("scriptFile".into(), Value::String(file.to_string_lossy().into_owned()));
            sys.insert("scriptDir".into(), Value::String(dir.to_string_lossy().into_owned()));
        }
    }

    fn merge(
        &mut self,
        node: &ScriptNode,
        path: &mut Vec<Segment>,
        only_local: bool,
        in_local: bool,
    ) -> std::result::Result<(), ScriptError> {
        match &node.value {
            NodeValue::Object(map) => {
                let slot = slot_mut(&mut self.vars, path);
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                for (key, child) in map.iter() {
                    path.push(Segment::Key(key.to_string()));
                    self.merge(child, path, only_local, in_local || key == "local")?;
                    path.pop();
                }
            }
            NodeValue::Array(items) => {
                let slot = slot_mut(&mut self.vars, path);
                if !slot.is_array() {
                    *slot = Value::Array(Vec::new());
                }
                for (index, child) in items.iter().enumerate() {
                    path.push(Segment::Index(index));
                    self.merge(child, path, only_local, in_local)?;
                    path.pop();
                }
            }
            NodeValue::String(text) => {
                let value = if !only_local || in_local {
                    Interpolator::new(&*self).interpolate(node)?
                } else {
                    Value::String(text.clone())
                };
                *slot_mut(&mut self.vars, path) = value;
            }
            NodeValue::Null | NodeValue::Number(_) | NodeValue::Boolean(_) => {
                *slot_mut(&mut self.vars, path) = node.to_value();
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Key(String),
    Index(usize),
}

/// Walk `path` from `root`, creating or replacing containers as needed.
fn slot_mut<'a>(root: &'a mut Value, path: &[Segment]) -> &'a mut Value {
    let mut current = root;
    for segment in path {
        current = match segment {
            Segment::Key(key) => {
                if !current.is_object() {
                    *current = Value::Object(Map::new());
                }
                match current {
                    Value::Object(map) => map.entry(key.clone()).or_insert(Value::Null),
                    other => other,
                }
            }
            Segment::Index(index) => {
                if !current.is_array() {
                    *current = Value::Array(Vec::new());
                }
                match current {
                    Value::Array(items) => {
                        if items.len() <= *index {
                            items.resize(index + 1, Value::Null);
                        }
                        &mut items[*index]
                    }
                    other => other,
                }
            }
        };
    }
    current
}

impl EvalContext for RunContext {
    fn lookup(&self, name: &str) -> Option<Value> {
        match name {
            "vars" => Some(self.vars.clone()),
            "env" => Some(self.env.clone()),
            "os" => Some(self.os.clone()),
            "user" => Some(self.user.clone()),
            "sys" => Some(self.sys.clone()),
            "results" => Some(Value::Array(self.results.clone())),
            // Bare names are shorthand for `vars.<name>`.
            _ => self.vars.get(name).cloned(),
        }
    }

    fn is_function_namespace(&self, name: &str) -> bool {
        builtins::is_namespace(name)
    }

    fn call_function(&self, namespace: &str, function: &str, args: Vec<Value>) -> std::result::Result<Value, String> {
        builtins::call(self, namespace, function, &args)
    }
}
