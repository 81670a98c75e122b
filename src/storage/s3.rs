//! S3-compatible object storage backend.
//!
//! Values larger than one chunk are uploaded as multipart uploads; listings
//! are paginated. Presigned GET URLs are produced locally by signing, without
//! a network round trip.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use s3::creds::Credentials;
use s3::serde_types::Part;
use s3::{Bucket, Region};
use url::Url;

use crate::error::{StorageError, StorageResult};
use crate::storage::traits::{Presign, Storage};

/// Part size used for multipart puts.
pub const DEFAULT_PUT_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Keys requested per listing page.
pub const DEFAULT_LIST_SIZE: usize = 200;

/// Client options for an S3 backend.
#[derive(Clone)]
pub struct S3Options {
    /// Endpoint as `host:port`, without scheme.
    pub endpoint: String,
    /// Signing region.
    pub region: String,
    /// Access key ID.
    pub access_key: String,
    /// Secret access key.
    pub secret_key: String,
    /// Connect over HTTPS.
    pub use_ssl: bool,
    /// Part size for multipart puts; values up to this size use a single PUT.
    pub put_chunk_size: usize,
    /// Keys requested per listing page.
    pub list_size: usize,
}

impl S3Options {
    fn endpoint_url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{scheme}://{}", self.endpoint)
    }
}

/// S3-backed storage implementation.
pub struct S3Storage {
    bucket: Box<Bucket>,
    put_chunk_size: usize,
    list_size: usize,
}

impl S3Storage {
    /// Build a client for `bucket` without contacting the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials or bucket handle cannot be built.
    pub fn new(bucket: &str, options: &S3Options) -> StorageResult<Self> {
        let credentials = Credentials::new(
            Some(&options.access_key),
            Some(&options.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::S3(format!("Invalid credentials: {e}")))?;

        let region = Region::Custom {
            region: options.region.clone(),
            endpoint: options.endpoint_url(),
        };

        let bucket = Bucket::new(bucket, region, credentials)?.with_path_style();

        Ok(Self {
            bucket,
            put_chunk_size: options.put_chunk_size.max(1),
            list_size: options.list_size.max(1),
        })
    }

    /// Build a client and check that the bucket is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be built or the bucket cannot be
    /// listed.
    pub async fn open(bucket: &str, options: &S3Options) -> StorageResult<Self> {
        let storage = Self::new(bucket, options)?;
        storage.health_check().await?;

        tracing::debug!(
            bucket = %bucket,
            endpoint = %options.endpoint,
            "S3 storage opened"
        );

        Ok(storage)
    }

    /// Name of the bucket objects are stored in.
    #[must_use]
    pub fn bucket_name(&self) -> String {
        self.bucket.name()
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let (_, code) = self.bucket.head_object(key).await?;
        match code {
            200..=299 => Ok(true),
            404 => Ok(false),
            other => Err(StorageError::S3(format!(
                "HEAD {key} returned status {other}"
            ))),
        }
    }

    async fn put_multipart(
        &self,
        key: &str,
        value: &Bytes,
        content_type: &str,
    ) -> StorageResult<()> {
        let upload = self
            .bucket
            .initiate_multipart_upload(key, content_type)
            .await?;
        let upload_id = upload.upload_id;

        let mut parts: Vec<Part> = Vec::new();
        for (index, chunk) in value.chunks(self.put_chunk_size).enumerate() {
            let part_number = u32::try_from(index + 1)
                .map_err(|_| StorageError::S3(format!("Too many parts for {key}")))?;

            match self
                .bucket
                .put_multipart_chunk(chunk.to_vec(), key, part_number, &upload_id, content_type)
                .await
            {
                Ok(part) => parts.push(part),
                Err(e) => {
                    if let Err(abort) = self.bucket.abort_upload(key, &upload_id).await {
                        tracing::warn!(
                            key = %key,
                            error = %abort,
                            "Failed to abort multipart upload"
                        );
                    }
                    return Err(e.into());
                }
            }
        }

        let response = self
            .bucket
            .complete_multipart_upload(key, &upload_id, parts)
            .await?;
        check_status(key, "complete multipart upload", response.status_code())?;

        tracing::debug!(key = %key, size = value.len(), "Multipart upload complete");
        Ok(())
    }
}

fn check_status(key: &str, action: &str, code: u16) -> StorageResult<()> {
    match code {
        200..=299 => Ok(()),
        404 => Err(StorageError::NotFound(key.to_string())),
        other => Err(StorageError::S3(format!(
            "{action} {key} returned status {other}"
        ))),
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn read(&self, key: &str) -> StorageResult<Bytes> {
        let response = self.bucket.get_object(key).await?;
        check_status(key, "GET", response.status_code())?;
        Ok(response.bytes().clone())
    }

    async fn write(&self, key: &str, value: Bytes) -> StorageResult<()> {
        if self.exists(key).await? {
            return Err(StorageError::AlreadyExists(key.to_string()));
        }

        let content_type = mime_guess::from_path(key)
            .first_or_octet_stream()
            .to_string();

        if value.len() > self.put_chunk_size {
            return self.put_multipart(key, &value, &content_type).await;
        }

        let response = self
            .bucket
            .put_object_with_content_type(key, &value, &content_type)
            .await?;
        check_status(key, "PUT", response.status_code())
    }

    async fn stat(&self, key: &str) -> StorageResult<bool> {
        self.exists(key).await
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        if !self.exists(key).await? {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let response = self.bucket.delete_object(key).await?;
        check_status(key, "DELETE", response.status_code())
    }

    async fn walk_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token = None;

        loop {
            let (page, code) = self
                .bucket
                .list_page(
                    prefix.to_string(),
                    None,
                    continuation_token,
                    None,
                    Some(self.list_size),
                )
                .await?;
            check_status(prefix, "LIST", code)?;

            keys.extend(page.contents.into_iter().map(|object| object.key));

            match page.next_continuation_token {
                Some(token) if page.is_truncated => continuation_token = Some(token),
                _ => break,
            }
        }

        Ok(keys)
    }

    async fn health_check(&self) -> StorageResult<()> {
        let (_, code) = self
            .bucket
            .list_page(String::new(), None, None, None, Some(1))
            .await?;

        if (200..300).contains(&code) {
            Ok(())
        } else {
            Err(StorageError::S3(format!(
                "bucket {} returned status {code}",
                self.bucket.name()
            )))
        }
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }

    fn presigner(&self) -> Option<&dyn Presign> {
        Some(self)
    }
}

#[async_trait]
impl Presign for S3Storage {
    async fn presign_get(
        &self,
        key: &str,
        expiry: Duration,
        query: HashMap<String, String>,
    ) -> StorageResult<Url> {
        let expiry_secs = u32::try_from(expiry.as_secs())
            .map_err(|_| StorageError::Presign(format!("expiry {expiry:?} out of range")))?;
        let custom_queries = if query.is_empty() { None } else { Some(query) };

        let signed = self
            .bucket
            .presign_get(key, expiry_secs, custom_queries)
            .await
            .map_err(|e| StorageError::Presign(e.to_string()))?;

        Url::parse(&signed).map_err(|e| StorageError::Presign(format!("{signed}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> S3Options {
        S3Options {
            endpoint: "127.0.0.1:9000".to_string(),
            region: "us-east-1".to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            use_ssl: false,
            put_chunk_size: DEFAULT_PUT_CHUNK_SIZE,
            list_size: DEFAULT_LIST_SIZE,
        }
    }

    #[test]
    fn test_endpoint_url_scheme() {
        let mut opts = options();
        assert_eq!(opts.endpoint_url(), "http://127.0.0.1:9000");
        opts.use_ssl = true;
        assert_eq!(opts.endpoint_url(), "https://127.0.0.1:9000");
    }

    #[test]
    fn test_new_does_not_connect() {
        let storage = S3Storage::new("media", &options()).unwrap();
        assert_eq!(storage.bucket_name(), "media");
        assert_eq!(storage.backend_name(), "s3");
        assert!(storage.presigner().is_some());
    }

    #[tokio::test]
    async fn test_presign_get_signs_locally() {
        let storage = S3Storage::new("media", &options()).unwrap();
        let query = HashMap::from([(
            "response-content-type".to_string(),
            "image/jpeg".to_string(),
        )]);

        let url = storage
            .presign_get("avatars/foo.jpg", Duration::from_secs(3600), query)
            .await
            .unwrap();

        assert_eq!(url.host_str(), Some("127.0.0.1"));
        assert!(url.path().contains("media"));
        assert!(url.path().contains("avatars/foo.jpg"));

        let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs.get("response-content-type").map(String::as_str),
            Some("image/jpeg")
        );
        assert_eq!(pairs.get("X-Amz-Expires").map(String::as_str), Some("3600"));
        assert!(pairs.contains_key("X-Amz-Signature"));
    }

    #[tokio::test]
    async fn test_presign_rejects_oversized_expiry() {
        let storage = S3Storage::new("media", &options()).unwrap();
        let err = storage
            .presign_get("a.png", Duration::from_secs(u64::MAX), HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Presign(_)));
    }
}
