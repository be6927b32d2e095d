//! Multi-room WebSocket Chat Server Library
//!
//! A chat server built with tokio-tungstenite for the realtime channel,
//! axum for the HTTP API and sqlx/SQLite for storage.
//!
//! # Features
//! - Account registration and login
//! - Any number of named rooms, joined by name
//! - Online user list per room
//! - Room-scoped typing indicators with server-side expiry
//! - Message history replay on join
//! - Read receipts
//! - Favorites, history search and export over HTTP
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor owning presence and typing state
//! - Each connection has a `handler` session that runs store calls and
//!   forwards the results to the server as commands
//! - No locks needed - all realtime state goes through message passing
//! - Storage sits behind the `ChatStore` trait, shared as `Arc<dyn ChatStore>`
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tokio::sync::mpsc;
//! use room_chat_server::{handler, ChatServer, ChatStore, SqliteStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store: Arc<dyn ChatStore> = Arc::new(SqliteStore::connect("sqlite://chat.db").await.unwrap());
//!     let (cmd_tx, cmd_rx) = mpsc::channel(256);
//!     tokio::spawn(ChatServer::new(cmd_rx).run());
//!
//!     let listener = TcpListener::bind("127.0.0.1:3002").await.unwrap();
//!     handler::serve(listener, cmd_tx, store).await;
//! }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod export;
pub mod handler;
pub mod message;
pub mod presence;
pub mod receipts;
pub mod relay;
pub mod room;
pub mod server;
pub mod store;
pub mod types;
pub mod typing;

// Re-export main types for convenience
pub use api::{ApiError, AppState};
pub use client::Client;
pub use config::Config;
pub use error::{AppError, CredentialError, SendError, StoreError};
pub use handler::{handle_connection, Session};
pub use message::{ClientMessage, ServerMessage};
pub use presence::PresenceRegistry;
pub use relay::ChatMessage;
pub use room::Room;
pub use server::{ChatServer, ServerCommand};
pub use store::{ChatStore, SqliteStore};
pub use types::{ClientId, MessageId, RoomName};
pub use typing::TypingRegistry;
