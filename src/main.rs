//! Multi-room WebSocket Chat Server - Entry Point
//!
//! Opens the store, starts the ChatServer actor, the realtime listener
//! and the HTTP API.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use room_chat_server::{api, handler, AppState, ChatServer, ChatStore, Config, SqliteStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=room_chat_server=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("room_chat_server=info")),
        )
        .init();

    let config = Config::parse();

    let store: Arc<dyn ChatStore> = Arc::new(SqliteStore::connect(&config.database_url).await?);

    // Create ChatServer actor channel and start
    let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer);
    let server = ChatServer::new(cmd_rx).with_typing_timeout(config.typing_timeout());
    tokio::spawn(server.run());

    let ws_listener = TcpListener::bind(config.ws_addr).await?;
    info!("Realtime listener on ws://{}", config.ws_addr);
    tokio::spawn(handler::serve(ws_listener, cmd_tx, store.clone()));

    let http_listener = TcpListener::bind(config.http_addr).await?;
    info!("HTTP API listening on http://{}", config.http_addr);
    if let Err(e) = axum::serve(http_listener, api::router(AppState::new(store))).await {
        error!("HTTP server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
