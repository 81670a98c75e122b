//! Router setup and configuration.

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::api::handlers::{health, media};
use crate::api::state::AppState;

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready));

    let media_routes = Router::new().route("/{*key}", get(media::serve));

    Router::new()
        .merge(health_routes)
        .nest("/fileserver", media_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
