//! Message protocol definitions
//!
//! JSON-based bidirectional event protocol using Serde's adjacently tagged
//! enums: every frame is `{"event": "<name>", "data": <payload>}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::relay::ChatMessage;
use crate::store::ReadReceipt;
use crate::types::{MessageId, RoomName};

/// Client → Server event
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Join a room under a username (fields validated by the session)
    Join {
        #[serde(default)]
        username: String,
        #[serde(default)]
        room: String,
    },
    /// Leave the current room
    Leave,
    /// Typing started or stopped
    #[serde(rename_all = "camelCase")]
    Typing { room: RoomName, is_typing: bool },
    /// Send a chat message
    Message { room: RoomName, text: String },
    /// Report that a user has read a message
    #[serde(rename_all = "camelCase")]
    MarkAsRead {
        message_id: MessageId,
        username: String,
    },
}

/// Server → Client event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Recent messages of the joined room, oldest first
    History(Vec<ChatMessage>),
    /// New chat message in the room
    Message(ChatMessage),
    /// Current members of the room, in join order
    UserListUpdate(Vec<String>),
    /// A member started or stopped typing
    #[serde(rename_all = "camelCase")]
    UserTypingUpdate { username: String, is_typing: bool },
    /// A member read a message
    #[serde(rename_all = "camelCase")]
    MessageRead {
        message_id: MessageId,
        username: String,
        read_at: DateTime<Utc>,
    },
    /// Request rejected
    Error { message: String },
}

impl ServerMessage {
    pub fn typing(username: impl Into<String>, is_typing: bool) -> Self {
        ServerMessage::UserTypingUpdate {
            username: username.into(),
            is_typing,
        }
    }
}

impl From<ReadReceipt> for ServerMessage {
    fn from(receipt: ReadReceipt) -> Self {
        ServerMessage::MessageRead {
            message_id: receipt.message_id,
            username: receipt.username,
            read_at: receipt.read_at,
        }
    }
}

/// Convert AppError to ServerMessage for client notification
impl From<AppError> for ServerMessage {
    fn from(err: AppError) -> Self {
        let message = if err.is_client_facing() {
            err.to_string()
        } else {
            // Fatal errors are not typically converted (connection closes)
            "Internal error".to_string()
        };
        ServerMessage::Error { message }
    }
}
