//! Utility functions for common operations.
//!
//! Currently this is the atomic file writing used for configuration and
//! resume-state persistence.

use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{Result, TelemetryError};

/// Atomically write content to a file.
///
/// The content goes to a temporary file in the same directory, is flushed,
/// and then renamed over the target. If any step fails, the original file
/// (if it exists) remains unchanged. Missing parent directories are created.
///
/// # Errors
///
/// Returns an error if the parent directory cannot be determined or created,
/// or if writing or the final rename fails.
///
/// # Example
///
/// ```rust,no_run
/// use qkd_telemetry::util::atomic_write;
///
/// atomic_write("config.toml", b"[parser]\n").unwrap();
/// ```
pub fn atomic_write(path: impl AsRef<Path>, content: &[u8]) -> Result<()> {
    atomic_write_with(path, |writer| writer.write_all(content))
}

/// Atomically write a file using a writer function.
///
/// # Errors
///
/// Returns an error if any file operation fails.
pub fn atomic_write_with<F>(path: impl AsRef<Path>, write_fn: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    let path = path.as_ref();

    let parent = match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => Path::new("."),
        Some(parent) => parent,
        None => {
            return Err(TelemetryError::IoError {
                context: format!("Cannot determine parent directory for: {}", path.display()),
                source: io::Error::new(io::ErrorKind::InvalidInput, "No parent directory"),
            })
        }
    };

    if !parent.exists() {
        std::fs::create_dir_all(parent).map_err(|e| {
            TelemetryError::io(format!("Failed to create directory: {}", parent.display()), e)
        })?;
    }

    // Same directory keeps the rename on one filesystem
    let mut temp_file = NamedTempFile::new_in(parent).map_err(|e| {
        TelemetryError::io(
            format!("Failed to create temporary file in: {}", parent.display()),
            e,
        )
    })?;

    write_fn(&mut temp_file).map_err(|e| {
        TelemetryError::io(
            format!("Failed to write to temporary file for: {}", path.display()),
            e,
        )
    })?;

    temp_file.flush().map_err(|e| {
        TelemetryError::io(
            format!("Failed to flush temporary file for: {}", path.display()),
            e,
        )
    })?;

    temp_file.persist(path).map_err(|e| {
        TelemetryError::io(
            format!("Failed to atomically write file: {}", path.display()),
            e.error,
        )
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        atomic_write(&path, b"{\"offset\":42}").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"offset\":42}");
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("dir").join("config.toml");

        atomic_write(&path, b"[parser]\n").unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_atomic_write_replaces_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "old").unwrap();

        atomic_write_with(&path, |w| {
            writeln!(w, "line 1")?;
            writeln!(w, "line 2")
        })
        .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "line 1\nline 2\n");
    }

    #[test]
    fn test_failed_write_keeps_original() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "original").unwrap();

        let result = atomic_write_with(&path, |_| Err(io::Error::other("boom")));

        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "original");
    }
}
