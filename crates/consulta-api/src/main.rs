//! Consulta API Server
//!
//! Answers questions over HTTP using retrieval-augmented generation.
//!
//! Author: hephaex@gmail.com

use consulta_api::{create_router, init_tracing, state::AppState};
use consulta_core::config::AppConfig;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A local .env is optional; the hosted deployment injects variables directly
    dotenvy::dotenv().ok();

    // Load configuration
    let config = match std::env::var("CONSULTA_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?.with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };

    init_tracing(&config.logging);

    // Refuse to start without upstream credentials
    config.validate()?;
    tracing::debug!(upstream = ?config.upstream, retrieval = ?config.retrieval, "Configuration loaded");

    let addr = format!("{}:{}", config.server.host, config.server.port);

    // Create application state (upstream clients are built once here)
    let state = Arc::new(AppState::from_config(config)?);

    // Create router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Consulta API Server starting on http://{}", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
