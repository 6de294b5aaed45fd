//! Multi-room WebSocket Chat Hub - Entry Point
//!
//! Loads configuration, starts the TCP listener and accepts connections.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use room_hub::{handle_connection, Authenticator, Hub, JwtAuthenticator, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=room_hub=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("room_hub=info")),
        )
        .init();

    // Bind address from the command line, the rest from ROOM_HUB_* variables
    let config = ServerConfig::from_env()?;
    info!("Hub configuration: {:?}", config.hub);

    let listener = TcpListener::bind(&config.addr).await?;
    info!("WebSocket Chat Hub listening on {}", config.addr);
    info!("Connect with ws://{}/?username=<name> or ?token=<token>", config.addr);

    let hub = Hub::new(config.hub);
    let authenticator: Arc<dyn Authenticator> = Arc::new(JwtAuthenticator::new(
        config.jwt_secret.as_bytes(),
        config.token_ttl,
    ));

    // Connection accept loop
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let hub = hub.clone();
                let authenticator = authenticator.clone();

                // Spawn handler task for each connection
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, hub, authenticator).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
