//! `FileContains`: a file holds the given text, either as its entire content
//! or anchored relative to a regular expression match.
//!
//! ```text
//! {
//!   assert: "FileContains",
//!   with: {
//!     file: "/etc/sudoers",
//!     contents: "deploy ALL=(ALL) NOPASSWD: ALL\n",
//!     position: "after",          // all | over | before | after
//!     regex: "^root .*\\n",
//!     validation: "sudoers",      // none | sudoers
//!   },
//! }
//! ```

use std::path::PathBuf;
use std::process::Command;
use std::str::FromStr;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::info;

use crate::asserter::{Args, Asserter};
use crate::command_runner::run_command;
use crate::error::{Result, ScriptError, SpadeError};
use crate::interpolator::Interpolator;
use crate::node::ScriptNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Position {
    #[default]
    All,
    Over,
    Before,
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Validation {
    #[default]
    None,
    Sudoers,
}

#[derive(Debug, Default)]
pub struct FileContains {
    file: PathBuf,
    contents: String,
    position: Position,
    regex: String,
    validation: Validation,
    current: String,
    /// Byte range of the regex match in `current`.
    matched: (usize, usize),
}

impl FileContains {
    /// The file text after rectification.
    fn desired(&self) -> String {
        let (start, end) = self.matched;
        let current = &self.current;
        match self.position {
            Position::All => self.contents.clone(),
            Position::Before => format!("{}{}{}", &current[..start], self.contents, &current[start..]),
            Position::After => format!("{}{}{}", &current[..end], self.contents, &current[end..]),
            Position::Over => format!("{}{}{}", &current[..start], self.contents, &current[end..]),
        }
    }
}

impl Asserter for FileContains {
    fn assert(&mut self, statement: &ScriptNode, interp: &Interpolator<'_>) -> Result<bool> {
        let args = Args::new(statement, interp)?;
        self.file = PathBuf::from(args.string("file")?);
        self.contents = args.string("contents")?;

        if let Some(text) = args.optional_string("position")? {
            self.position = Position::from_str(&text).map_err(|_| {
                ScriptError::new(
                    "'position' must be 'before', 'after', 'over' or 'all'",
                    args.get("position").unwrap_or(args.node()),
                )
            })?;
        }

        if let Some(text) = args.optional_string("validation")? {
            self.validation = Validation::from_str(&text).map_err(|_| {
                ScriptError::new(
                    "'validation' can be 'none' or 'sudoers'",
                    args.get("validation").unwrap_or(args.node()),
                )
            })?;
        }

        let regex = match args.optional_string("regex")? {
            Some(pattern) => {
                let node = args.get("regex").unwrap_or(args.node());
                let compiled = Regex::new(&format!("(?m){}", pattern)).map_err(|e| {
                    ScriptError::new(format!("Unable to parse regular expression. {}", e), node)
                })?;
                self.regex = pattern;
                Some((compiled, node))
            }
            None => None,
        };

        if self.position != Position::All && regex.is_none() {
            return Err(ScriptError::new(
                "A 'regex' node must be provided with 'before', 'after' and 'over'",
                args.get("position").unwrap_or(args.node()),
            )
            .into());
        }

        self.current = std::fs::read_to_string(&self.file).map_err(|_| {
            ScriptError::new(
                format!("{} does not exist or is not readable", self.file.display()),
                args.get("file").unwrap_or(args.node()),
            )
        })?;

        let Some((regex, regex_node)) = regex.filter(|_| self.position != Position::All) else {
            return Ok(self.current == self.contents);
        };

        if self.position == Position::Over && self.current.contains(&self.contents) {
            return Ok(true);
        }

        let Some(found) = regex.find(&self.current) else {
            return Err(ScriptError::new(
                format!("Match not found for '{}'", self.regex),
                regex_node,
            )
            .into());
        };
        self.matched = (found.start(), found.end());

        let len = self.contents.len();
        let satisfied = match self.position {
            Position::Before => found
                .start()
                .checked_sub(len)
                .and_then(|from| self.current.get(from..found.start()))
                == Some(self.contents.as_str()),
            Position::After => self.current.get(found.end()..found.end() + len) == Some(self.contents.as_str()),
            Position::Over | Position::All => false,
        };
        Ok(satisfied)
    }

    fn rectify(&mut self) -> Result<()> {
        let desired = self.desired();

        if self.validation == Validation::Sudoers {
            let output = run_command(
                Command::new("visudo").args(["-c", "-q", "-f", "-"]),
                Some(desired.as_bytes()),
            )?;
            if !output.success {
                return Err(SpadeError::command(format!(
                    "Modified file would not be valid '{}' format",
                    self.validation
                )));
            }
        }

        info!("Writing {} bytes to '{}'", desired.len(), self.file.display());
        std::fs::write(&self.file, desired)?;
        Ok(())
    }

    fn result(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("file".into(), Value::String(self.file.to_string_lossy().into_owned()));
        map.insert("contents".into(), Value::String(self.contents.clone()));
        map.insert("position".into(), Value::String(self.position.to_string()));
        map.insert("regex".into(), Value::String(self.regex.clone()));
        map
    }
}
