//! Numeric codes carried in the `code` field of JSON error bodies.
//!
//! The leading digit groups them: 1 configuration, 3 rejected key,
//! 4 missing object, 5 backend failure.

use axum::http::StatusCode;

/// Code reported alongside an HTTP error status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode(i32);

impl ErrorCode {
    /// Configuration could not be loaded or is invalid.
    pub const INVALID_CONFIG: Self = Self(1003);

    /// Key the backend cannot address.
    pub const INVALID_KEY: Self = Self(3001);

    /// No object is stored under the key.
    pub const OBJECT_NOT_FOUND: Self = Self(4001);

    /// Backend read, write or listing failed.
    pub const STORAGE_ERROR: Self = Self(5001);

    /// Backend failed its readiness check.
    pub const STORAGE_UNAVAILABLE: Self = Self(5003);

    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// HTTP status sent with this code.
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self.0 {
            3000..=3999 => StatusCode::BAD_REQUEST,
            4000..=4999 => StatusCode::NOT_FOUND,
            5003 => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
