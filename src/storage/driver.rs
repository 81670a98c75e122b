//! Storage driver.
//!
//! Wraps the configured backend in a `KvStore` and hands out presigned GET
//! URLs when objects live on S3 and proxying is off.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::{AppConfig, StorageConfig};
use crate::error::{AppError, StorageResult};
use crate::storage::factory::create_storage;
use crate::storage::kv::KvStore;
use crate::storage::traits::Storage;

/// Validity window of presigned URLs.
pub const PRESIGN_EXPIRY: Duration = Duration::from_secs(60 * 60);

/// Storage driver shared by the whole process.
///
/// Object operations (`get`, `put`, `stat`, `delete`, `keys`) are reached
/// through `Deref` to the inner `KvStore`.
pub struct Driver {
    kv: KvStore,
    storage: Arc<dyn Storage>,
    proxy: bool,
    bucket: String,
}

impl Driver {
    /// Open the backend named by `config` and wrap it.
    ///
    /// Nothing stays acquired on failure; the disk lock is released with the
    /// partially built backend.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Open` if the backend cannot be opened.
    pub async fn from_config(config: &StorageConfig) -> StorageResult<Self> {
        let storage = create_storage(config).await?;

        tracing::info!(
            backend = %config.backend,
            storage = storage.backend_name(),
            proxy = config.s3.proxy,
            "Storage driver ready"
        );

        Ok(Self::new(storage, config.s3.proxy, config.s3.bucket.clone()))
    }

    /// Load configuration from files and environment, then open the backend.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for unreadable or invalid configuration
    /// (including an unknown backend), or `AppError::Storage` if the backend
    /// cannot be opened.
    pub async fn auto_config() -> Result<Self, AppError> {
        let config = AppConfig::load()?;
        Self::from_config(&config.storage)
            .await
            .map_err(AppError::Storage)
    }

    /// Wrap an already opened backend.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, proxy: bool, bucket: String) -> Self {
        Self {
            kv: KvStore::new(Arc::clone(&storage)),
            storage,
            proxy,
            bucket,
        }
    }

    /// The raw backend handle.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Whether objects are served through the application.
    #[must_use]
    pub const fn proxy(&self) -> bool {
        self.proxy
    }

    /// Configured S3 bucket name; empty or meaningless for local storage.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Presigned GET URL for `key`, valid for one hour.
    ///
    /// Returns `None` when the backend cannot presign, when proxying is on,
    /// when `cancel` fires, or when signing fails. Callers then fetch the
    /// object through `get`, which always works, so failures are not errors.
    pub async fn url(&self, key: &str, cancel: &CancellationToken) -> Option<Url> {
        if self.proxy {
            return None;
        }
        let presigner = self.storage.presigner()?;

        if cancel.is_cancelled() {
            tracing::debug!(key = %key, "Presign skipped: cancelled");
            return None;
        }

        let mut query = HashMap::new();
        if let Some(content_type) = content_type_hint(key) {
            query.insert("response-content-type".to_string(), content_type);
        }

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(key = %key, "Presign abandoned: cancelled");
                return None;
            }
            result = presigner.presign_get(key, PRESIGN_EXPIRY, query) => result,
        };

        match result {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::debug!(key = %key, bucket = %self.bucket, error = %e, "Presign failed");
                None
            }
        }
    }
}

impl Deref for Driver {
    type Target = KvStore;

    fn deref(&self) -> &Self::Target {
        &self.kv
    }
}

/// Content type to request for `key`, guessed from its extension.
fn content_type_hint(key: &str) -> Option<String> {
    mime_guess::from_path(key).first().map(|mime| mime.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LocalStorageConfig, StorageBackend};
    use crate::error::StorageError;
    use crate::storage::s3::{DEFAULT_LIST_SIZE, DEFAULT_PUT_CHUNK_SIZE, S3Options, S3Storage};
    use crate::storage::traits::Presign;
    use async_trait::async_trait;
    use bytes::Bytes;
    use tempfile::TempDir;

    fn s3_storage(bucket: &str) -> Arc<dyn Storage> {
        let options = S3Options {
            endpoint: "127.0.0.1:9000".to_string(),
            region: "us-east-1".to_string(),
            access_key: "access".to_string(),
            secret_key: "secret".to_string(),
            use_ssl: false,
            put_chunk_size: DEFAULT_PUT_CHUNK_SIZE,
            list_size: DEFAULT_LIST_SIZE,
        };
        Arc::new(S3Storage::new(bucket, &options).unwrap())
    }

    /// Backend whose presign always fails.
    struct FailingPresign;

    #[async_trait]
    impl Storage for FailingPresign {
        async fn read(&self, key: &str) -> StorageResult<Bytes> {
            Err(StorageError::NotFound(key.to_string()))
        }

        async fn write(&self, _key: &str, _value: Bytes) -> StorageResult<()> {
            Err(StorageError::Unavailable)
        }

        async fn stat(&self, _key: &str) -> StorageResult<bool> {
            Ok(false)
        }

        async fn remove(&self, key: &str) -> StorageResult<()> {
            Err(StorageError::NotFound(key.to_string()))
        }

        async fn walk_keys(&self, _prefix: &str) -> StorageResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn health_check(&self) -> StorageResult<()> {
            Ok(())
        }

        fn backend_name(&self) -> &'static str {
            "failing"
        }

        fn presigner(&self) -> Option<&dyn Presign> {
            Some(self)
        }
    }

    #[async_trait]
    impl Presign for FailingPresign {
        async fn presign_get(
            &self,
            _key: &str,
            _expiry: Duration,
            _query: HashMap<String, String>,
        ) -> StorageResult<Url> {
            Err(StorageError::Presign("signing unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_local_url_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            backend: StorageBackend::Local,
            local: LocalStorageConfig {
                base_path: temp_dir.path().join("gts-test"),
            },
            ..Default::default()
        };

        let driver = Driver::from_config(&config).await.unwrap();
        let cancel = CancellationToken::new();

        assert!(driver.url("01ABCXYZ.png", &cancel).await.is_none());
        assert!(driver.url("avatars/foo.jpg", &cancel).await.is_none());
        assert!(
            temp_dir
                .path()
                .join("gts-test")
                .join("store.lock")
                .exists()
        );
    }

    #[tokio::test]
    async fn test_local_driver_exposes_kv() {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            local: LocalStorageConfig {
                base_path: temp_dir.path().to_path_buf(),
            },
            ..Default::default()
        };

        let driver = Driver::from_config(&config).await.unwrap();
        driver.put("01ABCXYZ.png", "data").await.unwrap();

        assert_eq!(
            driver.get("01ABCXYZ.png").await.unwrap(),
            Bytes::from_static(b"data")
        );
        assert!(driver.put("01ABCXYZ.png", "again").await.unwrap_err().is_already_exists());
        assert_eq!(driver.storage().backend_name(), "disk");
    }

    #[tokio::test]
    async fn test_second_local_driver_fails_until_first_dropped() {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            local: LocalStorageConfig {
                base_path: temp_dir.path().to_path_buf(),
            },
            ..Default::default()
        };

        let first = Driver::from_config(&config).await.unwrap();
        assert!(matches!(
            Driver::from_config(&config).await,
            Err(StorageError::Open { backend: "disk", .. })
        ));

        drop(first);
        assert!(Driver::from_config(&config).await.is_ok());
    }

    #[tokio::test]
    async fn test_s3_url_carries_key_and_content_type() {
        let driver = Driver::new(s3_storage("media"), false, "media".to_string());
        let cancel = CancellationToken::new();

        let url = driver.url("avatars/foo.jpg", &cancel).await.unwrap();
        assert!(url.path().contains("media"));
        assert!(url.path().contains("avatars/foo.jpg"));

        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(
            query.get("response-content-type").map(String::as_str),
            Some("image/jpeg")
        );
        let expires: u64 = query["X-Amz-Expires"].parse().unwrap();
        assert!(expires >= PRESIGN_EXPIRY.as_secs());
    }

    #[tokio::test]
    async fn test_s3_url_png_hint() {
        let driver = Driver::new(s3_storage("media"), false, "media".to_string());
        let url = driver
            .url("01ABCXYZ.png", &CancellationToken::new())
            .await
            .unwrap();

        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(query["response-content-type"], "image/png");
    }

    #[tokio::test]
    async fn test_s3_url_unknown_extension_omits_hint() {
        let driver = Driver::new(s3_storage("media"), false, "media".to_string());
        let cancel = CancellationToken::new();

        for key in ["01ABCXYZ", "blob.notarealextension"] {
            let url = driver.url(key, &cancel).await.unwrap();
            assert!(
                !url.query_pairs()
                    .any(|(name, _)| name == "response-content-type"),
                "{url}"
            );
        }
    }

    #[tokio::test]
    async fn test_s3_proxy_url_is_none() {
        let driver = Driver::new(s3_storage("media"), true, "media".to_string());
        let cancel = CancellationToken::new();

        assert!(driver.url("avatars/foo.jpg", &cancel).await.is_none());
        cancel.cancel();
        assert!(driver.url("avatars/foo.jpg", &cancel).await.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_url_is_none() {
        let driver = Driver::new(s3_storage("media"), false, "media".to_string());
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(driver.url("avatars/foo.jpg", &cancel).await.is_none());
    }

    #[tokio::test]
    async fn test_presign_failure_is_none() {
        let driver = Driver::new(Arc::new(FailingPresign), false, "media".to_string());
        assert!(
            driver
                .url("a.png", &CancellationToken::new())
                .await
                .is_none()
        );
    }

    #[test]
    fn test_content_type_hint() {
        assert_eq!(content_type_hint("a.png").as_deref(), Some("image/png"));
        assert_eq!(content_type_hint("x/y.jpg").as_deref(), Some("image/jpeg"));
        assert_eq!(content_type_hint("noext"), None);
    }
}
