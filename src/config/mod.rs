//! Configuration management module.
//!
//! Supports loading configuration from:
//! - TOML files (config/default.toml, config/{profile}.toml)
//! - Environment variables with `MEDIA_STORE__<SECTION>__<KEY>` pattern

mod server;
mod storage;

use config::{Config, ConfigBuilder, ConfigError, Environment, File, builder::DefaultState};
use serde::Deserialize;

pub use server::ServerConfig;
pub use storage::{LocalStorageConfig, S3StorageConfig, StorageBackend, StorageConfig};

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from files and environment.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. `config/default.toml`
    /// 2. `config/{MEDIA_STORE_PROFILE}.toml` (if `MEDIA_STORE_PROFILE` is set)
    /// 3. Environment variables with `MEDIA_STORE__` prefix
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded or is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        // Determine profile
        let profile =
            std::env::var("MEDIA_STORE_PROFILE").unwrap_or_else(|_| "development".to_string());

        let builder = Config::builder()
            // Load default configuration
            .add_source(File::with_name("config/default").required(false))
            // Load profile-specific configuration
            .add_source(File::with_name(&format!("config/{profile}")).required(false))
            // Override with environment variables
            // MEDIA_STORE__STORAGE__BACKEND=s3 -> storage.backend = "s3"
            .add_source(
                Environment::with_prefix("MEDIA_STORE")
                    .separator("__")
                    .try_parsing(true),
            );

        Self::from_builder(builder)
    }

    /// Build, deserialize and validate configuration from an arbitrary builder.
    ///
    /// # Errors
    ///
    /// Returns an error if the sources cannot be read, a value has the wrong
    /// shape (including an unknown storage backend), or validation fails.
    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let app_config: Self = builder.build()?.try_deserialize()?;
        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message("server.port cannot be 0".to_string()));
        }

        self.storage.validate()
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: "text" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.backend, StorageBackend::Local);
        assert!(!config.storage.s3.proxy);
        assert_eq!(config.observability.log_format, "text");
    }

    #[test]
    fn test_from_builder_s3() {
        let builder = Config::builder()
            .set_override("storage.backend", "s3")
            .unwrap()
            .set_override("storage.s3.endpoint", "minio:9000")
            .unwrap()
            .set_override("storage.s3.bucket", "media")
            .unwrap()
            .set_override("storage.s3.proxy", true)
            .unwrap();

        let config = AppConfig::from_builder(builder).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::S3);
        assert_eq!(config.storage.s3.bucket, "media");
        assert!(config.storage.s3.proxy);
        assert!(config.storage.s3.use_ssl);
        assert_eq!(config.storage.s3.region, "us-east-1");
    }

    #[test]
    fn test_from_builder_rejects_unknown_backend() {
        let builder = Config::builder()
            .set_override("storage.backend", "webdav")
            .unwrap();

        let err = AppConfig::from_builder(builder).unwrap_err().to_string();
        assert!(err.contains("webdav"), "{err}");
    }

    #[test]
    fn test_from_builder_validates_s3_fields() {
        let builder = Config::builder()
            .set_override("storage.backend", "s3")
            .unwrap();

        let err = AppConfig::from_builder(builder).unwrap_err().to_string();
        assert!(err.contains("storage.s3.endpoint"), "{err}");
    }
}
