//! Local filesystem storage backend.
//!
//! Each key maps to a file below the base directory; `/` in a key becomes a
//! directory separator. A single lock file guards the directory against a
//! second store opening it.
//!
//! Directory structure:
//! ```text
//! base/
//! ├── store.lock
//! ├── 01ABCXYZ.png
//! └── avatars/
//!     └── foo.jpg
//! ```

mod lock;

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use walkdir::WalkDir;

use crate::error::{StorageError, StorageResult};
use crate::storage::traits::Storage;

pub use lock::StoreLock;

/// Lock file name used when the lock lives inside the base directory.
pub const LOCK_FILE_NAME: &str = "store.lock";

/// Scratch file written by the health check.
const HEALTH_CHECK_FILE_NAME: &str = ".health_check";

/// Filesystem-backed storage implementation.
#[derive(Debug)]
pub struct DiskStorage {
    /// Base data directory.
    base_dir: PathBuf,
    /// Held for the lifetime of the storage.
    lock: StoreLock,
    /// Shared by writers creating directories, exclusive while pruning them.
    dirs: RwLock<()>,
}

impl DiskStorage {
    /// Open storage rooted at `base_dir`, taking the lock at `lock_file`.
    ///
    /// The base directory is created if needed. If any step after the lock is
    /// taken fails, the lock is released before returning.
    ///
    /// # Errors
    ///
    /// Returns `FileIO` if the directory cannot be created or is not a
    /// directory, and `LockFailed` if the lock is held elsewhere.
    pub fn open(base_dir: impl Into<PathBuf>, lock_file: impl AsRef<Path>) -> StorageResult<Self> {
        let base_dir = base_dir.into();

        std::fs::create_dir_all(&base_dir).map_err(|e| {
            StorageError::FileIO(format!("Failed to create directory {base_dir:?}: {e}"))
        })?;

        let lock = StoreLock::acquire(lock_file.as_ref())?;

        // Canonical form makes the prune loop in `remove` stop at the right place.
        let base_dir = base_dir.canonicalize().map_err(|e| {
            StorageError::FileIO(format!("Failed to resolve directory {base_dir:?}: {e}"))
        })?;

        tracing::debug!(base_dir = ?base_dir, lock = ?lock.path(), "Disk storage opened");

        Ok(Self {
            base_dir,
            lock,
            dirs: RwLock::new(()),
        })
    }

    /// Base directory objects are stored under.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Map a key onto a file path, rejecting anything that could escape the
    /// base directory, alias another key, or collide with the lock file.
    fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let invalid = || StorageError::InvalidKey(key.to_string());

        if key.is_empty() || key.contains('\\') || key.contains('\0') {
            return Err(invalid());
        }

        // `Path::components` folds these away, so `a//b` would alias `a/b`.
        if key.starts_with('/') || key.ends_with('/') || key.contains("//") {
            return Err(invalid());
        }

        let relative = Path::new(key);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(invalid());
        }

        let path = self.base_dir.join(relative);
        if path == self.lock.path() || key == LOCK_FILE_NAME || key == HEALTH_CHECK_FILE_NAME {
            return Err(invalid());
        }

        Ok(path)
    }

    /// Remove empty directories between `dir` and the base directory.
    async fn prune_empty_dirs(&self, mut dir: Option<&Path>) {
        let _dirs = self.dirs.write().await;

        while let Some(current) = dir {
            if current == self.base_dir || !current.starts_with(&self.base_dir) {
                break;
            }
            // Fails on non-empty directories, which ends the walk.
            if tokio::fs::remove_dir(current).await.is_err() {
                break;
            }
            dir = current.parent();
        }
    }
}

#[async_trait]
impl Storage for DiskStorage {
    async fn read(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_path(key)?;

        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, value: Bytes) -> StorageResult<()> {
        let path = self.key_path(key)?;

        let mut file = {
            // Keeps a concurrent prune from removing the parent before the
            // file exists in it.
            let _dirs = self.dirs.read().await;

            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
                        return Err(StorageError::InvalidKey(key.to_string()));
                    }
                    return Err(StorageError::AlreadyExists(key.to_string()));
                }
                Err(e) => return Err(e.into()),
            }
        };

        let result = async {
            file.write_all(&value).await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = result {
            drop(file);
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e.into());
        }

        Ok(())
    }

    async fn stat(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key)?;

        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key)?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        self.prune_empty_dirs(path.parent()).await;
        Ok(())
    }

    async fn walk_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let base_dir = self.base_dir.clone();
        let lock_path = self.lock.path().to_path_buf();
        let prefix = prefix.to_string();

        tokio::task::spawn_blocking(move || {
            let mut keys = Vec::new();

            for entry in WalkDir::new(&base_dir).min_depth(1) {
                let entry = entry.map_err(|e| StorageError::FileIO(e.to_string()))?;
                if !entry.file_type().is_file() || entry.path() == lock_path {
                    continue;
                }

                let Ok(relative) = entry.path().strip_prefix(&base_dir) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");

                if key != LOCK_FILE_NAME
                    && key != HEALTH_CHECK_FILE_NAME
                    && key.starts_with(&prefix)
                {
                    keys.push(key);
                }
            }

            Ok::<_, StorageError>(keys)
        })
        .await
        .map_err(|e| StorageError::FileIO(format!("Directory walk failed: {e}")))?
    }

    async fn health_check(&self) -> StorageResult<()> {
        if !self.base_dir.exists() {
            return Err(StorageError::Unavailable);
        }

        // Try to create a test file
        let test_file = self.base_dir.join(HEALTH_CHECK_FILE_NAME);
        tokio::fs::write(&test_file, b"ok")
            .await
            .map_err(|e| StorageError::FileIO(format!("Health check failed: {e}")))?;
        tokio::fs::remove_file(&test_file)
            .await
            .map_err(|e| StorageError::FileIO(format!("Health check cleanup failed: {e}")))?;

        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "disk"
    }
}
