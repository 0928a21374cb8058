//! Face Extraction Service
//!
//! Accepts image uploads and returns, per detected face, a 512-dimension
//! embedding, bounding box and detection score. Models are initialized
//! before the listener binds; an initialization failure aborts startup.

use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use pis_ai::api::rest::{create_rest_router, AppState};
use pis_ai::config::Config;
use pis_ai::engine::ModelHost;
use pis_ai::service::ExtractService;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    info!("Starting Face Extraction Service v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load(Config::default_path()).unwrap_or_else(|e| {
        info!("Using default config ({})", e);
        Config::default()
    });

    info!("Configuration loaded:");
    info!("  Port: {}", config.server.port);
    info!("  Device: {}", config.inference.device);
    info!("  Detection size: {:?}", config.inference.det_size());
    info!("  Embedding dim: {}", config.inference.embedding_dim);

    // Initialize the model host. Slow (weight download + compilation) and
    // deliberately ahead of the listener: a failure here must prevent the
    // service from ever accepting traffic.
    let host = Arc::new(ModelHost::initialize(&config.inference, &config.models).await?);
    info!("Model host initialized");

    let state = Arc::new(AppState {
        service: ExtractService::new(host),
    });
    let router = create_rest_router(state);

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("REST API listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Goodbye!");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received, cleaning up...");
}
