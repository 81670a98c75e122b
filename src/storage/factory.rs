//! Storage backend factory.
//!
//! Opens the appropriate storage backend based on configuration.

use std::sync::Arc;

use crate::config::{S3StorageConfig, StorageBackend, StorageConfig};
use crate::error::{StorageError, StorageResult};
use crate::storage::disk::{DiskStorage, LOCK_FILE_NAME};
use crate::storage::s3::{DEFAULT_LIST_SIZE, DEFAULT_PUT_CHUNK_SIZE, S3Options, S3Storage};
use crate::storage::traits::Storage;

/// Open a storage backend based on configuration.
///
/// # Arguments
///
/// * `config` - Storage configuration
///
/// # Returns
///
/// An `Arc<dyn Storage>` pointing to the configured storage backend.
///
/// # Errors
///
/// Returns `StorageError::Open` naming the backend if it cannot be opened.
pub async fn create_storage(config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    match config.backend {
        StorageBackend::S3 => {
            let options = s3_options(&config.s3);
            let storage = S3Storage::open(&config.s3.bucket, &options)
                .await
                .map_err(|e| open_error("s3", &e))?;

            Ok(Arc::new(storage))
        }
        StorageBackend::Local => {
            let base_path = &config.local.base_path;

            // Keys are generated by the application, never taken verbatim from
            // users, so no object can be named `store.lock`.
            let lock_file = base_path.join(LOCK_FILE_NAME);

            let storage =
                DiskStorage::open(base_path, &lock_file).map_err(|e| open_error("disk", &e))?;

            Ok(Arc::new(storage))
        }
    }
}

/// Client options for the configured S3 endpoint.
#[must_use]
pub fn s3_options(config: &S3StorageConfig) -> S3Options {
    S3Options {
        endpoint: config.endpoint.clone(),
        region: config.region.clone(),
        access_key: config.access_key.clone(),
        secret_key: config.secret_key.clone(),
        use_ssl: config.use_ssl,
        put_chunk_size: DEFAULT_PUT_CHUNK_SIZE,
        list_size: DEFAULT_LIST_SIZE,
    }
}

fn open_error(backend: &'static str, err: &StorageError) -> StorageError {
    StorageError::Open {
        backend,
        reason: err.to_string(),
    }
}
