//! Error types for the chat server
//!
//! Defines realtime session errors, message send errors, store errors and
//! password hashing errors.
//! Uses thiserror for ergonomic error definitions. HTTP errors live in
//! `api::error`.

use thiserror::Error;

/// Application-level errors
///
/// Covers both fatal errors (connection termination) and
/// business errors (send an `error` event to the client).
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Persistence failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Join was sent without a username or room
    #[error("Username and room are required")]
    MissingJoinFields,

    /// Action needs a joined room
    #[error("Join a room before sending messages")]
    JoinRequired,
}

impl AppError {
    /// Whether the error should be reported to the client as an `error` event
    pub fn is_client_facing(&self) -> bool {
        matches!(self, AppError::MissingJoinFields | AppError::JoinRequired)
    }
}

/// Message send errors
///
/// Occurs when attempting to send messages through closed channels.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}

/// Persistence errors raised by a `ChatStore`
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A row could not be turned back into a record
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether a UNIQUE constraint rejected the write
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(e)) => e.is_unique_violation(),
            _ => false,
        }
    }
}

/// Password hashing failures
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    /// The blocking hashing task panicked or was cancelled
    #[error("hashing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
