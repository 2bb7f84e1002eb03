//! File selection and write helpers shared by the tasks.

use std::fs;
use std::path::{Path, PathBuf};

use ashlar_graph::TaskError;

/// Select the files under `base` matching `pattern`, in glob match order.
///
/// A pattern that matches nothing yields an empty list.
pub fn select(base: &Path, pattern: &str) -> Result<Vec<PathBuf>, TaskError> {
    let full = format!(
        "{}/{}",
        glob::Pattern::escape(&base.to_string_lossy()),
        pattern
    );

    let entries = glob::glob(&full)
        .map_err(|e| TaskError::Config(format!("Invalid glob '{}': {}", pattern, e)))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| {
            let path = e.path().to_path_buf();
            TaskError::io(&path, e.into_error())
        })?;

        if path.is_file() {
            files.push(path);
        }
    }

    Ok(files)
}

pub fn read(path: &Path) -> Result<Vec<u8>, TaskError> {
    fs::read(path).map_err(|e| TaskError::io(path, e))
}

pub fn read_to_string(path: &Path) -> Result<String, TaskError> {
    fs::read_to_string(path).map_err(|e| TaskError::io(path, e))
}

/// Write `contents` to `path`, creating parent directories.
pub fn write(path: &Path, contents: impl AsRef<[u8]>) -> Result<PathBuf, TaskError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| TaskError::io(parent, e))?;
    }

    fs::write(path, contents).map_err(|e| TaskError::io(path, e))?;
    Ok(path.to_path_buf())
}

/// Copy `from` to `to`, creating parent directories.
pub fn copy(from: &Path, to: &Path) -> Result<PathBuf, TaskError> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|e| TaskError::io(parent, e))?;
    }

    fs::copy(from, to).map_err(|e| TaskError::io(from, e))?;
    Ok(to.to_path_buf())
}

/// File name of `path`, for mirroring a flat selection into an output dir.
pub fn file_name(path: &Path) -> Result<&std::ffi::OsStr, TaskError> {
    path.file_name()
        .ok_or_else(|| TaskError::malformed(path, "path has no file name"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn selects_in_sorted_order() {
        let temp = tempdir().unwrap();
        for name in ["b.js", "a.js", "notes.txt"] {
            fs::write(temp.path().join(name), "").unwrap();
        }

        let files = select(temp.path(), "*.js").unwrap();

        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.js", "b.js"]);
    }

    #[test]
    fn empty_match_is_not_an_error() {
        let temp = tempdir().unwrap();

        let files = select(&temp.path().join("missing"), "**/*.svg").unwrap();

        assert!(files.is_empty());
    }

    #[test]
    fn skips_directories() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("fonts.d")).unwrap();
        fs::write(temp.path().join("font.woff"), "").unwrap();

        let files = select(temp.path(), "*.*").unwrap();

        assert_eq!(files, vec![temp.path().join("font.woff")]);
    }

    #[test]
    fn writes_into_missing_directories() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("build/css/styles.min.css");

        write(&target, "body{}").unwrap();

        assert_eq!(fs::read_to_string(target).unwrap(), "body{}");
    }
}
