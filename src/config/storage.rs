//! Storage configuration.

use std::path::PathBuf;
use std::str::FromStr;

use config::ConfigError;
use serde::Deserialize;

use crate::error::StorageError;

/// Storage backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum StorageBackend {
    /// S3-compatible object storage.
    S3,
    /// Local filesystem storage.
    #[default]
    Local,
}

impl FromStr for StorageBackend {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "s3" => Ok(Self::S3),
            "local" => Ok(Self::Local),
            other => Err(StorageError::InvalidBackend(other.to_string())),
        }
    }
}

impl TryFrom<String> for StorageBackend {
    type Error = StorageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::S3 => write!(f, "s3"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// Storage backend type.
    #[serde(default)]
    pub backend: StorageBackend,

    /// Local storage configuration.
    #[serde(default)]
    pub local: LocalStorageConfig,

    /// S3 storage configuration.
    #[serde(default)]
    pub s3: S3StorageConfig,
}

impl StorageConfig {
    /// Validate the storage configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration fields are missing for the selected backend.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.backend {
            StorageBackend::Local => {
                if self.local.base_path.as_os_str().is_empty() {
                    return Err(ConfigError::Message(
                        "storage.local.base_path cannot be empty".to_string(),
                    ));
                }
                Ok(())
            }
            StorageBackend::S3 => {
                if self.s3.endpoint.is_empty() {
                    return Err(ConfigError::Message(
                        "storage.s3.endpoint cannot be empty".to_string(),
                    ));
                }
                if self.s3.bucket.is_empty() {
                    return Err(ConfigError::Message(
                        "storage.s3.bucket cannot be empty".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Local storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalStorageConfig {
    /// Directory objects are stored under.
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,
}

fn default_base_path() -> PathBuf {
    PathBuf::from("./storage")
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
        }
    }
}

/// S3 storage configuration.
#[derive(Clone, Deserialize)]
pub struct S3StorageConfig {
    /// Endpoint as `host:port`, without scheme.
    #[serde(default)]
    pub endpoint: String,

    /// Signing region.
    #[serde(default = "default_region")]
    pub region: String,

    /// Access key ID.
    #[serde(default)]
    pub access_key: String,

    /// Secret access key.
    #[serde(default)]
    pub secret_key: String,

    /// Connect over HTTPS.
    #[serde(default = "default_use_ssl")]
    pub use_ssl: bool,

    /// Bucket holding all objects.
    #[serde(default)]
    pub bucket: String,

    /// Serve objects through the application instead of redirecting
    /// clients to presigned URLs.
    #[serde(default)]
    pub proxy: bool,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

const fn default_use_ssl() -> bool {
    true
}

impl Default for S3StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: default_region(),
            access_key: String::new(),
            secret_key: String::new(),
            use_ssl: true,
            bucket: String::new(),
            proxy: false,
        }
    }
}

// Keeps the secret key out of logs.
impl std::fmt::Debug for S3StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("use_ssl", &self.use_ssl)
            .field("bucket", &self.bucket)
            .field("proxy", &self.proxy)
            .finish()
    }
}
