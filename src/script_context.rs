//! Include graph resolution.
//!
//! Starting from the root script, includes are followed depth-first. Every
//! document is loaded once, keyed by its path relative to the root script's
//! directory, and recorded in post-order so that running `script_paths` in
//! order always runs an include before the script that includes it. The root
//! is therefore always last.
//!
//! No include may resolve outside the root script's directory tree.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::document::ScriptDocument;
use crate::error::{Result, ScriptError};
use crate::node::ScriptNode;
use crate::paths;

/// Everything needed to run one invocation.
#[derive(Debug, Clone)]
pub struct ScriptExecutionContext {
    /// Absolute directory of the root script.
    pub root_dir: PathBuf,
    /// Document paths relative to `root_dir`, includes before includers.
    pub script_paths: Vec<PathBuf>,
    pub documents: HashMap<PathBuf, ScriptDocument>,
    /// True if any loaded document requests privilege elevation.
    pub any_script_has_becomes: bool,
}

impl ScriptExecutionContext {
    /// Resolve the include graph rooted at `root_script`.
    pub fn build(root_script: &Path) -> Result<Self> {
        let root_script = paths::absolute(root_script)?;
        let root_dir = root_script
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));

        let mut builder = Builder {
            root_dir: root_dir.clone(),
            script_paths: Vec::new(),
            documents: HashMap::new(),
            any_script_has_becomes: false,
        };
        builder.visit(None, &root_script)?;

        Ok(Self {
            root_dir,
            script_paths: builder.script_paths,
            documents: builder.documents,
            any_script_has_becomes: builder.any_script_has_becomes,
        })
    }

    /// Documents in execution order, paired with their relative paths.
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &ScriptDocument)> {
        self.script_paths.iter().filter_map(|path| {
            self.documents
                .get(path)
                .map(|doc| (path.as_path(), doc))
        })
    }

    /// Relative path of the root script.
    pub fn root_path(&self) -> Option<&Path> {
        self.script_paths.last().map(PathBuf::as_path)
    }
}

struct Builder {
    root_dir: PathBuf,
    script_paths: Vec<PathBuf>,
    documents: HashMap<PathBuf, ScriptDocument>,
    any_script_has_becomes: bool,
}

impl Builder {
    fn visit(&mut self, include: Option<&ScriptNode>, script: &Path) -> Result<()> {
        let relative = paths::relative_to(script, &self.root_dir);

        if let Some(include) = include {
            if paths::escapes_base(&relative) {
                return Err(ScriptError::new(
                    format!(
                        "Cannot include script from a directory outside the root script directory '{}'",
                        self.root_dir.display()
                    ),
                    include,
                )
                .into());
            }
        }

        if self.documents.contains_key(&relative) {
            debug!("'{}' already loaded", relative.display());
            return Ok(());
        }

        let document = ScriptDocument::load(script)?;
        self.any_script_has_becomes |= document.has_becomes();

        let dir = document.dir().to_path_buf();
        let includes = document.includes.clone();
        // Mark as loaded before descending so include cycles terminate.
        self.documents.insert(relative.clone(), document);

        for include in &includes {
            let Some(target) = include.as_str() else {
                continue;
            };
            let target = paths::normalize(&dir.join(target));
            self.visit(Some(include), &target)?;
        }

        self.script_paths.push(relative);
        Ok(())
    }
}
