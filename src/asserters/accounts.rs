//! User and group accounts.
//!
//! Presence is read from the account databases directly; changes go through
//! the shadow-utils tools so that every related file stays consistent.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::{Map, Value};

use crate::asserter::{Args, Asserter};
use crate::command_runner::run_command;
use crate::error::{Result, SpadeError};
use crate::interpolator::Interpolator;
use crate::node::ScriptNode;

/// Locations of the account databases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountDatabase {
    pub passwd: PathBuf,
    pub group: PathBuf,
}

impl Default for AccountDatabase {
    fn default() -> Self {
        Self {
            passwd: PathBuf::from("/etc/passwd"),
            group: PathBuf::from("/etc/group"),
        }
    }
}

impl AccountDatabase {
    pub fn has_user(&self, name: &str) -> Result<bool> {
        has_entry(&self.passwd, name)
    }

    pub fn has_group(&self, name: &str) -> Result<bool> {
        has_entry(&self.group, name)
    }
}

/// Whether a colon-separated database has a line whose first field is `name`.
fn has_entry(file: &Path, name: &str) -> Result<bool> {
    let text = std::fs::read_to_string(file)?;
    Ok(text
        .lines()
        .filter(|line| !line.starts_with('#'))
        .any(|line| line.split(':').next() == Some(name)))
}

fn require_root(what: &str) -> Result<()> {
    if nix::unistd::geteuid().is_root() {
        Ok(())
    } else {
        Err(SpadeError::privilege(format!(
            "Only root user can add or modify {}",
            what
        )))
    }
}

fn run_tool(program: &str, name: &str) -> Result<()> {
    run_command(Command::new(program).arg(name), None)?.ensure_success(program)
}

fn name_result(name: &str) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("name".into(), Value::String(name.to_string()));
    map
}

/// `{ assert: "UserExists", with: { name: "deploy" } }`
#[derive(Debug, Default)]
pub struct UserExists {
    accounts: AccountDatabase,
    name: String,
}

impl UserExists {
    pub fn new(accounts: AccountDatabase) -> Self {
        Self {
            accounts,
            name: String::new(),
        }
    }
}

impl Asserter for UserExists {
    fn assert(&mut self, statement: &ScriptNode, interp: &Interpolator<'_>) -> Result<bool> {
        self.name = Args::new(statement, interp)?.string("name")?;
        self.accounts.has_user(&self.name)
    }

    fn rectify(&mut self) -> Result<()> {
        require_root("users")?;
        run_tool("useradd", &self.name)
    }

    fn result(&self) -> Map<String, Value> {
        name_result(&self.name)
    }
}

/// `{ assert: "GroupExists", with: { name: "www" } }`
#[derive(Debug, Default)]
pub struct GroupExists {
    accounts: AccountDatabase,
    name: String,
}

impl GroupExists {
    pub fn new(accounts: AccountDatabase) -> Self {
        Self {
            accounts,
            name: String::new(),
        }
    }
}

impl Asserter for GroupExists {
    fn assert(&mut self, statement: &ScriptNode, interp: &Interpolator<'_>) -> Result<bool> {
        self.name = Args::new(statement, interp)?.string("name")?;
        self.accounts.has_group(&self.name)
    }

    fn rectify(&mut self) -> Result<()> {
        require_root("groups")?;
        run_tool("groupadd", &self.name)
    }

    fn result(&self) -> Map<String, Value> {
        name_result(&self.name)
    }
}

/// `{ assert: "GroupAbsent", with: { name: "games" } }`
#[derive(Debug, Default)]
pub struct GroupAbsent {
    accounts: AccountDatabase,
    name: String,
}

impl GroupAbsent {
    pub fn new(accounts: AccountDatabase) -> Self {
        Self {
            accounts,
            name: String::new(),
        }
    }
}

impl Asserter for GroupAbsent {
    fn assert(&mut self, statement: &ScriptNode, interp: &Interpolator<'_>) -> Result<bool> {
        self.name = Args::new(statement, interp)?.string("name")?;
        Ok(!self.accounts.has_group(&self.name)?)
    }

    fn rectify(&mut self) -> Result<()> {
        require_root("groups")?;
        run_tool("groupdel", &self.name)
    }

    fn result(&self) -> Map<String, Value> {
        name_result(&self.name)
    }
}
