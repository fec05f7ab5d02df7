//! NeoLearn Backend
//!
//! Server entry point: configuration, logging, storage and the HTTP listener.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use neolearn_backend::config::{Config, LogFormat};
use neolearn_backend::gateway::GeminiGateway;
use neolearn_backend::{create_router, db, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    tracing::info!("Starting NeoLearn Backend");
    tracing::info!("Environment: {:?}", config.environment);
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Upload directory: {:?}", config.upload_dir);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.jwt_secret == neolearn_backend::config::DEV_JWT_SECRET {
        tracing::warn!("Using the development JWT secret (set NEOLEARN_JWT_SECRET)");
    }

    // Generation gateway
    let gateway = GeminiGateway::new(&config.gemini)?;
    if config.gemini.api_key.is_none() {
        tracing::warn!("GEMINI_API_KEY is not set; generation endpoints will fail");
    }
    tracing::info!("Generation model: {}", gateway.model());

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;

    let bind_addr = config.bind_addr;
    let state = AppState::new(config, pool, Arc::new(gateway)).await?;
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
