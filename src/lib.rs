//! spade library
//!
//! Scripts are JSON5 documents that list statements, each naming an asserter
//! that checks one piece of system state and can rectify it when the check
//! fails. Documents include other documents and share variables, which are
//! interpolated into statement arguments with `{expression}` templates.

pub mod asserter;
pub mod asserters;
pub mod bootstrap;
pub mod builtins;
pub mod cli;
pub mod command_runner;
pub mod document;
pub mod error;
pub mod executor;
pub mod expr;
pub mod hosts;
pub mod interpolator;
pub mod node;
pub mod output;
pub mod parser;
pub mod paths;
pub mod privilege;
pub mod process_guard;
pub mod run_context;
pub mod runner;
pub mod script_context;
pub mod transport;

// Re-export main types for convenience
pub use asserter::{Action, Args, Asserter, StatementRegistry};
pub use document::{ScriptDocument, Statement, StatementKind};
pub use error::{Result, ScriptError, SpadeError};
pub use executor::{Executor, Outcome};
pub use interpolator::Interpolator;
pub use node::{Location, NodeKind, NodeValue, ScriptNode};
pub use output::{ConsoleOutput, MemoryOutput, Output};
pub use privilege::{Identity, IdentityGuard, NixSwitcher, PrivilegeSwitcher, SimulatedSwitcher};
pub use process_guard::{ChildKind, ChildTable, ShutdownGuard, ShutdownPolicy};
pub use run_context::RunContext;
pub use runner::RunSettings;
pub use script_context::ScriptExecutionContext;
pub use transport::{ConnectOptions, FileTransfer, RemoteSession, RunOptions};
