//! Atomic file operations for the shared document.
//!
//! A document write either replaces the destination in full or leaves it
//! untouched:
//! - write to a uniquely named temporary file next to the destination
//! - fsync the temporary file
//! - rename it onto the destination (the only step assumed atomic)
//!
//! On failure the temporary file is removed (best effort) and the error
//! is returned to the caller.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::Result;

/// Suffix shared by every temporary file; `.gitignore` whitelists on it.
pub const TEMP_SUFFIX: &str = ".gitdo-tmp";

/// Write content to a file atomically.
///
/// Concurrent writers never share a temporary file, because each call
/// picks a fresh random suffix.
///
/// # Errors
///
/// Returns an error if any file operation fails. The destination is
/// unchanged in that case.
pub fn atomic_write(path: &Path, content: &str) -> Result<()> {
    atomic_write_with(path, content, |from, to| fs::rename(from, to))
}

/// Async wrapper that runs [`atomic_write`] on the blocking pool.
///
/// # Errors
///
/// Same as [`atomic_write`].
pub async fn atomic_write_async(path: PathBuf, content: String) -> Result<()> {
    tokio::task::spawn_blocking(move || atomic_write(&path, &content))
        .await
        .map_err(|e| crate::error::Error::Other(format!("atomic write task failed: {e}")))?
}

/// [`atomic_write`] with an injectable rename step.
pub(crate) fn atomic_write_with<F>(path: &Path, content: &str, rename: F) -> Result<()>
where
    F: FnOnce(&Path, &Path) -> io::Result<()>,
{
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let temp_path = temp_path_for(path);
    let outcome = write_temp(&temp_path, content).and_then(|()| rename(&temp_path, path));

    if let Err(e) = outcome {
        if let Err(cleanup) = fs::remove_file(&temp_path)
            && cleanup.kind() != io::ErrorKind::NotFound
        {
            warn!(path = %temp_path.display(), error = %cleanup, "Failed to remove temp file");
        }
        return Err(e.into());
    }

    debug!(path = %path.display(), bytes = content.len(), "Atomic write complete");
    Ok(())
}

fn write_temp(temp_path: &Path, content: &str) -> io::Result<()> {
    let file = File::create(temp_path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(content.as_bytes())?;
    writer.flush()?;
    writer.get_ref().sync_all()
}

/// `dir/.name.<random>.gitdo-tmp` alongside the destination, so the
/// rename never crosses a filesystem boundary.
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| "document".into(), |n| n.to_string_lossy());
    let suffix = &uuid::Uuid::new_v4().simple().to_string()[..12];
    path.with_file_name(format!(".{name}.{suffix}{TEMP_SUFFIX}"))
}

/// Generate `.gitignore` content that hides atomic-write temporaries.
#[must_use]
pub fn gitignore_content() -> &'static str {
    r"# gitdo atomic-write temporaries (never commit these)
*.gitdo-tmp
"
}

/// Ensure a `.gitignore` exists in `dir`.
///
/// If the file already exists it is left alone unless it lacks the
/// temporary-file pattern, in which case the pattern is appended.
///
/// # Errors
///
/// Returns an error if the file cannot be read or written.
pub fn ensure_gitignore(dir: &Path) -> Result<()> {
    let gitignore_path = dir.join(".gitignore");

    if gitignore_path.exists() {
        let existing = fs::read_to_string(&gitignore_path)?;
        if existing.lines().any(|l| l.trim() == "*.gitdo-tmp") {
            return Ok(());
        }
        let mut updated = existing;
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(gitignore_content());
        return atomic_write(&gitignore_path, &updated);
    }

    fs::create_dir_all(dir)?;
    atomic_write(&gitignore_path, gitignore_content())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn stray_temp_files(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.to_string_lossy().ends_with(TEMP_SUFFIX))
            .collect()
    }

    #[test]
    fn test_atomic_write() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("todos.json");

        atomic_write(&path, "{\"todos\":[]}\n").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "{\"todos\":[]}\n");
        assert!(stray_temp_files(temp_dir.path()).is_empty());
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("todos.json");

        atomic_write(&path, "x").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "x");
    }

    #[test]
    fn test_failed_rename_leaves_destination_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("todos.json");
        fs::write(&path, "original").unwrap();

        let result = atomic_write_with(&path, "replacement", |_, _| {
            Err(io::Error::other("simulated crash before rename"))
        });

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "original");
        assert!(stray_temp_files(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_atomic_write_async() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("todos.json");

        atomic_write_async(path.clone(), "async".to_string())
            .await
            .unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "async");
    }

    #[test]
    fn test_temp_paths_are_unique() {
        let path = Path::new("/repo/todos.json");
        assert_ne!(temp_path_for(path), temp_path_for(path));
        assert!(temp_path_for(path).starts_with("/repo"));
    }

    #[test]
    fn test_ensure_gitignore_creates_file() {
        let temp_dir = TempDir::new().unwrap();

        ensure_gitignore(temp_dir.path()).unwrap();

        let content = fs::read_to_string(temp_dir.path().join(".gitignore")).unwrap();
        assert!(content.contains("*.gitdo-tmp"));
    }

    #[test]
    fn test_ensure_gitignore_appends_once() {
        let temp_dir = TempDir::new().unwrap();
        let gitignore_path = temp_dir.path().join(".gitignore");
        fs::write(&gitignore_path, "target/").unwrap();

        ensure_gitignore(temp_dir.path()).unwrap();
        ensure_gitignore(temp_dir.path()).unwrap();

        let content = fs::read_to_string(&gitignore_path).unwrap();
        assert!(content.starts_with("target/\n"));
        assert_eq!(content.matches("*.gitdo-tmp").count(), 1);
    }
}
