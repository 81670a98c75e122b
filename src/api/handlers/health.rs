//! Health check handlers.

use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};

use crate::api::state::AppState;
use crate::error::ErrorCode;

/// Liveness check: always returns 200 if the service is running.
pub async fn health() -> Json<Value> {
    Json(json!({
        "code": 0,
        "message": "success",
        "data": {
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

/// Readiness check: verifies that the storage backend is usable.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let storage_ok = match state.driver.health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Storage health check failed");
            false
        }
    };

    let (status_code, code) = if storage_ok {
        (StatusCode::OK, 0)
    } else {
        let code = ErrorCode::STORAGE_UNAVAILABLE;
        (code.status(), code.as_i32())
    };

    let response = Json(json!({
        "code": code,
        "message": if storage_ok { "success" } else { "service unavailable" },
        "data": {
            "ready": storage_ok,
            "components": {
                "storage": state.driver.storage().backend_name()
            }
        }
    }));

    (status_code, response)
}
