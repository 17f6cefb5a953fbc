//! Operator-facing output.
//!
//! Statement results go to stdout as one JSON object per line so they can be
//! piped into other tools. The progress indicator and all diagnostics go to
//! stderr.

use std::io::{IsTerminal, Write};
use std::path::Path;

use serde_json::{Map, Value};

pub trait Output {
    /// Note which statement is running. Cleared by the next `result`.
    fn progress(&mut self, _name: &str) {}

    /// Report a document's metadata before its statements run.
    fn metadata(&mut self, script: &Path, metadata: &Map<String, Value>);

    /// Report one statement result.
    fn result(&mut self, result: &Value);

    /// Relay a line of output produced elsewhere, such as a remote engine.
    fn line(&mut self, text: &str);
}

/// Writes JSON lines to stdout.
pub struct ConsoleOutput {
    pretty: bool,
    spinner: bool,
    spinning: bool,
}

impl ConsoleOutput {
    /// `pretty` prints indented JSON. The spinner is only drawn when
    /// `spinner` is set and stderr is a terminal.
    pub fn new(pretty: bool, spinner: bool) -> Self {
        Self {
            pretty,
            spinner: spinner && std::io::stderr().is_terminal(),
            spinning: false,
        }
    }

    fn clear_spinner(&mut self) {
        if self.spinning {
            let mut stderr = std::io::stderr().lock();
            let _ = write!(stderr, "\r\x1b[2K");
            let _ = stderr.flush();
            self.spinning = false;
        }
    }

    fn emit(&mut self, value: &Value) {
        self.clear_spinner();
        let text = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        match text {
            Ok(text) => println!("{}", text),
            Err(e) => tracing::error!("Unable to serialize output: {}", e),
        }
    }
}

impl Output for ConsoleOutput {
    fn progress(&mut self, name: &str) {
        if !self.spinner {
            return;
        }
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r\x1b[2K⠿ {}", name);
        let _ = stderr.flush();
        self.spinning = true;
    }

    fn metadata(&mut self, script: &Path, metadata: &Map<String, Value>) {
        let mut value = Map::new();
        value.insert("script".into(), Value::String(script.to_string_lossy().into_owned()));
        value.extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.emit(&Value::Object(value));
    }

    fn result(&mut self, result: &Value) {
        self.emit(result);
    }

    fn line(&mut self, text: &str) {
        self.clear_spinner();
        println!("{}", text);
    }
}

impl Drop for ConsoleOutput {
    fn drop(&mut self) {
        self.clear_spinner();
    }
}

/// Collects everything in memory.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MemoryOutput {
    pub progress: Vec<String>,
    pub metadata: Vec<(String, Map<String, Value>)>,
    pub results: Vec<Value>,
    pub lines: Vec<String>,
}

impl Output for MemoryOutput {
    fn progress(&mut self, name: &str) {
        self.progress.push(name.to_string());
    }

    fn metadata(&mut self, script: &Path, metadata: &Map<String, Value>) {
        self.metadata
            .push((script.to_string_lossy().into_owned(), metadata.clone()));
    }

    fn result(&mut self, result: &Value) {
        self.results.push(result.clone());
    }

    fn line(&mut self, text: &str) {
        self.lines.push(text.to_string());
    }
}
