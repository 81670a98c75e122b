//! Media Store Service Entry Point
//!
//! Loads configuration, opens the storage driver and starts the fileserver.

use media_store::run;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    run().await
}
