//! # Mise Config Service
//!
//! Device directory and configuration service for Mise scales.
//!
//! ## Running
//!
//! ```bash
//! # Required: token every client must present
//! export AUTH_TOKEN=your_secret_token
//!
//! # Optional: persist the directory across restarts
//! export MISE_DATA_PATH=./data/directory.json
//!
//! # Run the service
//! cargo run --release --bin config-service
//! ```
//!
//! ## API Endpoints
//!
//! - `GET /health` - Health check
//! - `POST /:model` - Create a device
//! - `GET|PUT /:model/:serial` - Read or replace a device's configuration
//! - `GET|PUT /address/:model/:serial` - Read or set a device's address

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use config_service::{api, store::MemoryStore, AppState};
use shared::config::ServiceConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = ServiceConfig::from_env()?;
    config.validate()?;

    // Initialize logging
    let level: Level = config.log_level.parse().unwrap_or(Level::INFO);
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting Mise Config Service");
    info!("Version: {}", shared::VERSION);
    info!(
        endpoint = %config.api.bind_addr(),
        max_attempts = config.transaction.max_attempts,
        persistent = config.store.data_path.is_some(),
        "Configuration loaded"
    );

    if config.auth.token.is_none() {
        warn!("AUTH_TOKEN is not set: every directory request will be refused");
    }

    info!("Opening document store...");
    let store = MemoryStore::from_config(&config.store).await?;

    let state = Arc::new(AppState::new(config.clone(), Arc::new(store)));
    let app = api::create_router(state);

    // Start server
    let bind_addr = config.api.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Server running at http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
