//! # Media Store
//!
//! Object storage for media files behind one key-value interface:
//!
//! - **Local disk**: objects stored as files below a base directory, guarded
//!   by a process-exclusive lock file
//! - **S3**: objects stored in an S3-compatible bucket, with presigned GET
//!   URLs so clients can fetch directly from the bucket
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Media Store                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌──────────────┐   ┌────────────────────┐  │
//! │  │ Fileserver │ → │    Driver    │ → │  KvStore           │  │
//! │  │ (Axum)     │   │ (presigning) │   │  ├─ DiskStorage    │  │
//! │  └────────────┘   └──────────────┘   │  └─ S3Storage      │  │
//! │                                      └────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod error;
pub mod storage;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::create_router;
use crate::api::state::AppState;
use crate::config::AppConfig;
use crate::storage::Driver;

/// Run the media store service.
///
/// This function:
/// 1. Loads configuration from files and environment
/// 2. Opens the storage driver
/// 3. Starts the HTTP fileserver
/// 4. Handles graceful shutdown
///
/// # Errors
///
/// Returns an error if:
/// - Configuration cannot be loaded
/// - The storage backend fails to open
/// - HTTP server fails to bind
pub async fn run() -> anyhow::Result<()> {
    // A missing .env file is normal.
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;

    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Media Store"
    );

    let driver = Driver::from_config(&config.storage).await?;

    let shutdown = CancellationToken::new();
    let state = AppState::new(Arc::new(driver), shutdown.clone());
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize logging based on configuration.
fn init_logging(config: &AppConfig) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.observability.log_format == "json" {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer()).init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown");
        }
        () = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
