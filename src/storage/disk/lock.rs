//! Process-exclusive store lock.
//!
//! Uses an advisory file lock (flock) so that two processes never open the
//! same storage directory at once.
//! Note: File locks may not work correctly on all network filesystems.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{StorageError, StorageResult};

/// RAII guard for the store lock file.
///
/// The lock is released when the guard is dropped.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    file: File,
}

impl StoreLock {
    /// Take the exclusive lock at `path` without waiting.
    ///
    /// # Errors
    ///
    /// Returns `LockFailed` if another holder has the lock or the file cannot
    /// be opened.
    pub fn acquire(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| StorageError::LockFailed(format!("{}: {e}", path.display())))?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                return Err(StorageError::LockFailed(format!(
                    "{} is held by another store",
                    path.display()
                )));
            }
            Err(e) => {
                return Err(StorageError::LockFailed(format!(
                    "{}: {e}",
                    path.display()
                )));
            }
        }

        // Record the holder for operators; the lock itself is what matters.
        file.set_len(0).ok();
        let mut file_ref = &file;
        writeln!(file_ref, "{}", std::process::id()).ok();

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = ?self.path, error = %e, "Failed to release store lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_fails_while_held() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.lock");

        let guard = StoreLock::acquire(&path).unwrap();
        assert!(path.exists());
        assert_eq!(guard.path(), path);

        let err = StoreLock::acquire(&path).unwrap_err();
        assert!(matches!(err, StorageError::LockFailed(_)));
    }

    #[test]
    fn test_drop_releases_lock() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.lock");

        let guard = StoreLock::acquire(&path).unwrap();
        drop(guard);

        assert!(StoreLock::acquire(&path).is_ok());
    }

    #[test]
    fn test_missing_directory_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing").join("store.lock");

        assert!(matches!(
            StoreLock::acquire(&path),
            Err(StorageError::LockFailed(_))
        ));
    }
}
