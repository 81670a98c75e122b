//! Application state for Axum handlers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::storage::Driver;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Storage driver.
    pub driver: Arc<Driver>,
    /// Cancelled when the server starts shutting down.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub const fn new(driver: Arc<Driver>, shutdown: CancellationToken) -> Self {
        Self { driver, shutdown }
    }
}
