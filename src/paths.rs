//! Lexical path helpers.
//!
//! Include resolution compares paths textually, without touching the
//! filesystem, so that `a/../b.json5` and `b.json5` name the same document
//! and symlinks do not change which scripts are considered inside the root.

use std::path::{Component, Path, PathBuf};

/// Resolve `.` and `..` components without consulting the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                );
                if can_pop {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Make `path` absolute against the current directory, then normalize it.
pub fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    Ok(normalize(&std::path::absolute(path)?))
}

/// Express `path` relative to `base`. Both are expected to be normalized and
/// either both absolute or both relative.
pub fn relative_to(path: &Path, base: &Path) -> PathBuf {
    let path_parts: Vec<Component> = path.components().collect();
    let base_parts: Vec<Component> = base.components().collect();

    let common = path_parts
        .iter()
        .zip(base_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..base_parts.len() {
        out.push("..");
    }
    for part in &path_parts[common..] {
        out.push(part.as_os_str());
    }
    out
}

/// True when a relative path climbs out of its base directory.
pub fn escapes_base(relative: &Path) -> bool {
    matches!(relative.components().next(), Some(Component::ParentDir))
        || relative.is_absolute()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("a/../../b")), PathBuf::from("../b"));
        assert_eq!(normalize(Path::new("/../x")), PathBuf::from("/x"));
    }

    #[test]
    fn test_relative_to() {
        assert_eq!(
            relative_to(Path::new("/root/s/lib/a.json5"), Path::new("/root/s")),
            PathBuf::from("lib/a.json5")
        );
        assert_eq!(
            relative_to(Path::new("/root/other/a.json5"), Path::new("/root/s")),
            PathBuf::from("../other/a.json5")
        );
        assert_eq!(
            relative_to(Path::new("/root/s/main.json5"), Path::new("/root/s")),
            PathBuf::from("main.json5")
        );
    }

    #[test]
    fn test_escapes_base() {
        assert!(escapes_base(Path::new("../x.json5")));
        assert!(!escapes_base(Path::new("lib/x.json5")));
        assert!(!escapes_base(Path::new(".hidden.json5")));
    }
}
