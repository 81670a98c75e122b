//! Storage trait definitions.
//!
//! These traits define the interface for storage backends, enabling swapping
//! between different implementations without changing callers.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::error::StorageResult;

/// Raw object storage operations.
///
/// Backends perform no key-level coordination themselves; `KvStore` layers
/// per-key locking on top.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read the full value stored under `key`.
    async fn read(&self, key: &str) -> StorageResult<Bytes>;

    /// Store `value` under `key`.
    ///
    /// Fails with `AlreadyExists` if the key is present; values are never
    /// overwritten.
    async fn write(&self, key: &str, value: Bytes) -> StorageResult<()>;

    /// Check whether `key` is present.
    async fn stat(&self, key: &str) -> StorageResult<bool>;

    /// Remove `key`. Fails with `NotFound` if it is absent.
    async fn remove(&self, key: &str) -> StorageResult<()>;

    /// List every key starting with `prefix`.
    async fn walk_keys(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Check if the storage backend is healthy and reachable.
    async fn health_check(&self) -> StorageResult<()>;

    /// Get the storage backend name.
    fn backend_name(&self) -> &'static str;

    /// The presign capability, for backends that can hand out direct URLs.
    fn presigner(&self) -> Option<&dyn Presign> {
        None
    }
}

/// Presigned URL generation.
#[async_trait]
pub trait Presign: Send + Sync {
    /// Produce a time-limited GET URL for `key`, with `query` added to the
    /// signed request (e.g. `response-content-type`).
    async fn presign_get(
        &self,
        key: &str,
        expiry: Duration,
        query: HashMap<String, String>,
    ) -> StorageResult<Url>;
}
