//! Error handling module for spade
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Script defects always carry the file, line and column of the node that
//! caused them so operators can jump straight to the offending text.

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::node::ScriptNode;

/// A structural or semantic defect in a script document.
///
/// Rendered as `message (file:line:column)`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    pub message: String,
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
}

impl ScriptError {
    /// Create an error pointing at `node`.
    pub fn new(message: impl Into<String>, node: &ScriptNode) -> Self {
        Self {
            message: message.into(),
            file: node.file().to_path_buf(),
            line: node.location.line,
            column: node.location.column,
        }
    }

    /// Create an error at an explicit position (used by the parser before
    /// any node exists).
    pub fn at(message: impl Into<String>, file: &Path, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            file: file.to_path_buf(),
            line,
            column,
        }
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}:{}:{})",
            self.message,
            self.file.display(),
            self.line,
            self.column
        )
    }
}

/// Main error type for spade
#[derive(Error, Debug)]
pub enum SpadeError {
    /// Script load, validation or interpolation errors
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// A statement names an asserter or action that is not registered
    #[error("{0}")]
    UnknownStatement(ScriptError),

    /// Remediation raised an error; fatal to the pass
    #[error("Rectify failed for '{asserter}': {message}")]
    Rectify { asserter: String, message: String },

    /// Effective uid/gid could not be changed
    #[error("Privilege error: {0}")]
    Privilege(String),

    /// IO errors (file operations, subprocess pipes)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Subprocess failures
    #[error("Command failed: {0}")]
    Command(String),

    /// SSH session or file transfer errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// Remote runtime/engine installation errors
    #[error("Bootstrap error: {0}")]
    Bootstrap(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for spade operations
pub type Result<T> = std::result::Result<T, SpadeError>;

// Convenient error constructors
impl SpadeError {
    /// Create a remediation error
    pub fn rectify(asserter: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Rectify {
            asserter: asserter.into(),
            message: message.to_string(),
        }
    }

    /// Create a privilege error
    pub fn privilege(msg: impl Into<String>) -> Self {
        Self::Privilege(msg.into())
    }

    /// Create a command error
    pub fn command(msg: impl Into<String>) -> Self {
        Self::Command(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a bootstrap error
    pub fn bootstrap(msg: impl Into<String>) -> Self {
        Self::Bootstrap(msg.into())
    }

    /// The script error behind this error, if any.
    pub fn script_error(&self) -> Option<&ScriptError> {
        match self {
            Self::Script(e) | Self::UnknownStatement(e) => Some(e),
            _ => None,
        }
    }
}
