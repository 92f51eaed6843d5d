// SPDX-License-Identifier: MIT

//! UBus API Server
//!
//! Backend for the campus bus tracker: session auth, live bus views over
//! server-sent events, driver trip publishing, and fleet administration.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use ubus_tracker::{
    config::{Config, StoreBackend},
    store::{DirectoryStore, FirestoreDirectory, MemoryDirectory},
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting UBus API");

    // Initialize directory store backend
    let store: Arc<dyn DirectoryStore> = match config.store_backend {
        StoreBackend::Firestore => {
            let firestore = FirestoreDirectory::new(&config.gcp_project_id)
                .await
                .expect("Failed to connect to Firestore");
            tracing::info!(project = %config.gcp_project_id, "Firestore store initialized");
            Arc::new(firestore)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; all data is volatile");
            Arc::new(MemoryDirectory::new())
        }
    };

    // Build shared state
    let state = Arc::new(AppState::new(config.clone(), store));

    // Build router
    let app = ubus_tracker::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ubus_tracker=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
