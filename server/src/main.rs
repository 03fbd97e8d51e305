//! Voice Relay Server - Main Entry Point

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use vc_relay::{api, config, voice};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize rustls crypto provider (required for WebRTC)
    // This must happen before any TLS/WebRTC operations
    let _ =
        rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider());

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vc_relay=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting voice relay server"
    );

    // Initialize the peer-session engine and relay
    let engine = Arc::new(voice::WebRtcEngine::new(&config)?);
    let relay = Arc::new(voice::RelayServer::new(&config, engine));
    info!(
        default_room = %relay.registry().default_room().name,
        "Voice relay initialized"
    );

    // Build application state
    let state = api::AppState::new(config.clone(), Arc::clone(&relay));

    // Sweep admission tokens nobody came back for
    let token_sweeper = config
        .token_ttl
        .map(|ttl| state.tokens.start_cleanup_task(ttl));

    // Build router
    let app = api::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "Server listening");

    // Graceful shutdown handler
    let shutdown_relay = Arc::clone(&relay);
    let shutdown_signal = async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
        info!("Received shutdown signal, cleaning up...");
        let disconnected = shutdown_relay.disconnect_all().await;
        info!(disconnected, "Disconnected all clients");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    if let Some(task) = token_sweeper {
        task.abort();
    }

    info!("Server shutdown complete");

    Ok(())
}
