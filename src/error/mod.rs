//! Error handling module.
//!
//! This module provides unified error handling with proper HTTP status code mapping
//! and standardized API error responses.

pub mod codes;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

pub use codes::ErrorCode;

/// Error returned by request handlers and startup.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration could not be loaded or is invalid.
    #[error("Invalid configuration: {0}")]
    Config(#[from] config::ConfigError),

    /// Requested key cannot be addressed by the backend.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// No object under the requested key.
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Storage backend error.
    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => Self::NotFound(key),
            StorageError::InvalidKey(key) => Self::InvalidKey(key),
            other => Self::Storage(other),
        }
    }
}

impl AppError {
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Config(_) => ErrorCode::INVALID_CONFIG,
            Self::InvalidKey(_) => ErrorCode::INVALID_KEY,
            Self::NotFound(_) => ErrorCode::OBJECT_NOT_FOUND,
            Self::Storage(_) => ErrorCode::STORAGE_ERROR,
        }
    }

    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.error_code().status()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code().as_i32();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(
                error_code = code,
                status = %status,
                message = %message,
                "Request failed"
            );
        } else {
            tracing::debug!(
                error_code = code,
                status = %status,
                message = %message,
                "Request rejected"
            );
        }

        let body = Json(json!({
            "code": code,
            "message": message,
            "data": null
        }));

        (status, body).into_response()
    }
}

/// Storage-specific error type.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Unrecognised backend selector.
    #[error("invalid storage backend: {0}")]
    InvalidBackend(String),

    /// Backend could not be opened or reached.
    #[error("Error opening {backend} storage: {reason}")]
    Open {
        /// Backend name ("disk" or "s3").
        backend: &'static str,
        /// Underlying failure.
        reason: String,
    },

    /// Key is already present; puts never overwrite.
    #[error("Key already exists: {0}")]
    AlreadyExists(String),

    /// Key is not present.
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Key cannot be mapped onto the backend.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Lock acquisition failed.
    #[error("Failed to acquire lock: {0}")]
    LockFailed(String),

    /// File I/O error.
    #[error("File I/O error: {0}")]
    FileIO(String),

    /// S3 request error.
    #[error("S3 error: {0}")]
    S3(String),

    /// Presigned URL generation failed.
    #[error("Presign failed: {0}")]
    Presign(String),

    /// Backend not available.
    #[error("Storage backend unavailable")]
    Unavailable,
}

impl StorageError {
    /// Whether this error reports a put against an existing key.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// Whether this error reports a missing key.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::FileIO(err.to_string())
    }
}

impl From<s3::error::S3Error> for StorageError {
    fn from(err: s3::error::S3Error) -> Self {
        Self::S3(err.to_string())
    }
}

/// Result type alias using `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type alias using `StorageError`.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::NotFound("a.png".to_string()).error_code(),
            ErrorCode::OBJECT_NOT_FOUND
        );
        assert_eq!(
            AppError::Storage(StorageError::Unavailable).error_code(),
            ErrorCode::STORAGE_ERROR
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::NotFound("a.png".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::InvalidKey("../x".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Storage(StorageError::Unavailable).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_storage_error_conversion() {
        let err: AppError = StorageError::NotFound("a.png".to_string()).into();
        assert!(matches!(err, AppError::NotFound(ref k) if k == "a.png"));

        let err: AppError = StorageError::InvalidKey("../x".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err: AppError = StorageError::FileIO("disk full".to_string()).into();
        assert_eq!(err.error_code(), ErrorCode::STORAGE_ERROR);
    }

    #[test]
    fn test_open_error_message() {
        let err = StorageError::Open {
            backend: "disk",
            reason: "permission denied".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Error opening disk storage: permission denied"
        );
    }

    #[test]
    fn test_already_exists_detection() {
        assert!(StorageError::AlreadyExists("k".to_string()).is_already_exists());
        assert!(!StorageError::NotFound("k".to_string()).is_already_exists());
        assert!(StorageError::NotFound("k".to_string()).is_not_found());
    }
}
