//! Key-value store over a storage backend.
//!
//! Adds per-key reader/writer locking on top of a raw `Storage`: readers of
//! one key run concurrently, writers are exclusive, and different keys never
//! contend.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::error::StorageResult;
use crate::storage::traits::Storage;

/// Table of per-key locks. Entries are dropped once nobody holds or waits
/// on them.
#[derive(Default)]
struct KeyLocks {
    locks: Mutex<HashMap<String, LockEntry>>,
}

struct LockEntry {
    lock: Arc<RwLock<()>>,
    /// Holders plus waiters.
    users: usize,
}

/// Claim on one key's lock table entry, taken before waiting so that a
/// cancelled wait still gives the entry back.
struct KeyGuard<'a, G> {
    table: &'a KeyLocks,
    key: &'a str,
    guard: Option<G>,
}

impl KeyLocks {
    fn checkout<'a, G>(&'a self, key: &'a str) -> (Arc<RwLock<()>>, KeyGuard<'a, G>) {
        let mut locks = self.locks.lock();
        let entry = locks.entry(key.to_string()).or_insert_with(|| LockEntry {
            lock: Arc::default(),
            users: 0,
        });
        entry.users += 1;

        let claim = KeyGuard {
            table: self,
            key,
            guard: None,
        };
        (Arc::clone(&entry.lock), claim)
    }

    async fn read<'a>(&'a self, key: &'a str) -> KeyGuard<'a, OwnedRwLockReadGuard<()>> {
        let (lock, mut claim) = self.checkout(key);
        claim.guard = Some(lock.read_owned().await);
        claim
    }

    async fn write<'a>(&'a self, key: &'a str) -> KeyGuard<'a, OwnedRwLockWriteGuard<()>> {
        let (lock, mut claim) = self.checkout(key);
        claim.guard = Some(lock.write_owned().await);
        claim
    }

    fn release(&self, key: &str) {
        let mut locks = self.locks.lock();
        if let Some(entry) = locks.get_mut(key) {
            entry.users -= 1;
            if entry.users == 0 {
                locks.remove(key);
            }
        }
    }

    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

impl<G> Drop for KeyGuard<'_, G> {
    fn drop(&mut self) {
        self.guard.take();
        self.table.release(self.key);
    }
}

/// Key-value store built on a storage backend.
pub struct KvStore {
    storage: Arc<dyn Storage>,
    locks: KeyLocks,
}

impl KvStore {
    /// Wrap an opened backend.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            locks: KeyLocks::default(),
        }
    }

    /// Fetch the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the key is absent, or a backend error.
    pub async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let _guard = self.locks.read(key).await;
        self.storage.read(key).await
    }

    /// Store `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if the key is present, or a backend error.
    pub async fn put(&self, key: &str, value: impl Into<Bytes>) -> StorageResult<()> {
        let value = value.into();
        let size = value.len();

        let _guard = self.locks.write(key).await;
        self.storage.write(key, value).await?;

        tracing::debug!(key = %key, size, "Stored object");
        Ok(())
    }

    /// Check whether `key` is present.
    ///
    /// # Errors
    ///
    /// Returns a backend error if presence cannot be determined.
    pub async fn stat(&self, key: &str) -> StorageResult<bool> {
        let _guard = self.locks.read(key).await;
        self.storage.stat(key).await
    }

    /// Delete `key`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the key is absent, or a backend error.
    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        let _guard = self.locks.write(key).await;
        self.storage.remove(key).await?;

        tracing::debug!(key = %key, "Deleted object");
        Ok(())
    }

    /// List keys starting with `prefix`, sorted.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the listing fails.
    pub async fn keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = self.storage.walk_keys(prefix).await?;
        keys.sort_unstable();
        Ok(keys)
    }

    /// Check backend health.
    ///
    /// # Errors
    ///
    /// Returns the backend's health check failure.
    pub async fn health_check(&self) -> StorageResult<()> {
        self.storage.health_check().await
    }
}
