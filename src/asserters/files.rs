//! File and directory presence.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use serde_json::{Map, Value};
use tracing::info;

use crate::asserter::{Args, Asserter};
use crate::error::{Result, ScriptError};
use crate::interpolator::Interpolator;
use crate::node::ScriptNode;

/// `{ assert: "FileExists", with: { file: "/path" } }`
///
/// Rectify creates an empty file; the parent directory must exist.
#[derive(Debug, Default)]
pub struct FileExists {
    file: PathBuf,
}

impl Asserter for FileExists {
    fn assert(&mut self, statement: &ScriptNode, interp: &Interpolator<'_>) -> Result<bool> {
        let args = Args::new(statement, interp)?;
        self.file = PathBuf::from(args.string("file")?);

        match fs::metadata(&self.file) {
            Ok(meta) if meta.is_dir() => Err(ScriptError::new(
                format!("'{}' is a directory", self.file.display()),
                args.get("file").unwrap_or(args.node()),
            )
            .into()),
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn rectify(&mut self) -> Result<()> {
        info!("Creating '{}'", self.file.display());
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file)?;
        Ok(())
    }

    fn result(&self) -> Map<String, Value> {
        path_result("file", &self.file)
    }
}

/// `{ assert: "FileAbsent", with: { file: "/path" } }`
///
/// Refuses to act on directories.
#[derive(Debug, Default)]
pub struct FileAbsent {
    file: PathBuf,
}

impl Asserter for FileAbsent {
    fn assert(&mut self, statement: &ScriptNode, interp: &Interpolator<'_>) -> Result<bool> {
        let args = Args::new(statement, interp)?;
        self.file = PathBuf::from(args.string("file")?);

        match fs::symlink_metadata(&self.file) {
            Ok(meta) if meta.is_dir() => Err(ScriptError::new(
                format!("'{}' is a directory and cannot be removed", self.file.display()),
                args.get("file").unwrap_or(args.node()),
            )
            .into()),
            Ok(_) => Ok(false),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    fn rectify(&mut self) -> Result<()> {
        info!("Removing '{}'", self.file.display());
        fs::remove_file(&self.file)?;
        Ok(())
    }

    fn result(&self) -> Map<String, Value> {
        path_result("file", &self.file)
    }
}

/// `{ assert: "DirectoryExists", with: { directory: "/path" } }`
///
/// Rectify creates the directory and any missing parents.
#[derive(Debug, Default)]
pub struct DirectoryExists {
    directory: PathBuf,
}

impl Asserter for DirectoryExists {
    fn assert(&mut self, statement: &ScriptNode, interp: &Interpolator<'_>) -> Result<bool> {
        let args = Args::new(statement, interp)?;
        self.directory = PathBuf::from(args.string("directory")?);

        match fs::metadata(&self.directory) {
            Ok(meta) if meta.is_dir() => Ok(true),
            Ok(_) => Err(ScriptError::new(
                format!("'{}' exists and is not a directory", self.directory.display()),
                args.get("directory").unwrap_or(args.node()),
            )
            .into()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn rectify(&mut self) -> Result<()> {
        info!("Creating directory '{}'", self.directory.display());
        fs::create_dir_all(&self.directory)?;
        Ok(())
    }

    fn result(&self) -> Map<String, Value> {
        path_result("directory", &self.directory)
    }
}

fn path_result(key: &str, path: &std::path::Path) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(key.to_string(), Value::String(path.to_string_lossy().into_owned()));
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asserters::test_support::statement;
    use crate::run_context::RunContext;

    #[test]
    fn test_file_exists_rectify_creates_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("marker");
        let node = statement("FileExists", &format!("{{ file: {:?} }}", file.to_string_lossy()));
        let ctx = RunContext::default();
        let interp = Interpolator::new(&ctx);

        let mut asserter = FileExists::default();
        assert!(!asserter.assert(&node, &interp).expect("assert"));
        asserter.rectify().expect("rectify");
        assert!(file.is_file());

        let mut again = FileExists::default();
        assert!(again.assert(&node, &interp).expect("assert"));
        assert_eq!(again.result()["file"], Value::String(file.to_string_lossy().into_owned()));
    }

    #[test]
    fn test_file_exists_rejects_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let node = statement("FileExists", &format!("{{ file: {:?} }}", dir.path().to_string_lossy()));
        let ctx = RunContext::default();
        let interp = Interpolator::new(&ctx);

        let err = FileExists::default().assert(&node, &interp).unwrap_err();
        assert!(err.to_string().contains("is a directory"));
    }

    #[test]
    fn test_file_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("stale.pid");
        fs::write(&file, "1").expect("write");
        let node = statement("FileAbsent", &format!("{{ file: {:?} }}", file.to_string_lossy()));
        let ctx = RunContext::default();
        let interp = Interpolator::new(&ctx);

        let mut asserter = FileAbsent::default();
        assert!(!asserter.assert(&node, &interp).expect("assert"));
        asserter.rectify().expect("rectify");
        assert!(!file.exists());
        assert!(FileAbsent::default().assert(&node, &interp).expect("assert"));
    }

    #[test]
    fn test_directory_exists_creates_parents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("a/b/c");
        let node = statement("DirectoryExists", &format!("{{ directory: {:?} }}", target.to_string_lossy()));
        let ctx = RunContext::default();
        let interp = Interpolator::new(&ctx);

        let mut asserter = DirectoryExists::default();
        assert!(!asserter.assert(&node, &interp).expect("assert"));
        asserter.rectify().expect("rectify");
        assert!(target.is_dir());
    }

    #[test]
    fn test_missing_argument_is_script_error() {
        let node = statement("FileExists", "{ path: \"/tmp/x\" }");
        let ctx = RunContext::default();
        let interp = Interpolator::new(&ctx);
        let err = FileExists::default().assert(&node, &interp).unwrap_err();
        assert_eq!(
            err.script_error().map(|e| e.message.as_str()),
            Some("'file' must be supplied")
        );
    }
}
