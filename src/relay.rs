//! Message relay
//!
//! Shapes chat messages on their way into and out of the store: strips
//! tags from inbound text and turns stored rows into the display form
//! sent to clients.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::{ChatStore, MessageQuery, NewMessage, Order, StoreResult, StoredMessage};
use crate::types::{MessageId, RoomName};

/// Number of messages replayed to a joining client
pub const HISTORY_LIMIT: u32 = 50;

/// Display-ready message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub user: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub read_by: Vec<String>,
}

impl From<StoredMessage> for ChatMessage {
    fn from(message: StoredMessage) -> Self {
        Self {
            id: message.id,
            user: message.author,
            text: message.content,
            timestamp: message.created_at,
            read_by: message.read_by,
        }
    }
}

/// Remove everything that looks like a tag (`<` up to the next `>`)
///
/// This is a single pass over the text, not an HTML sanitizer: an
/// unterminated `<` is kept as is.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('<') {
        let Some(len) = rest[start..].find('>') else {
            break;
        };
        out.push_str(&rest[..start]);
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    out
}

/// Sanitize and persist a message, returning its display form
pub async fn create_message(
    store: &dyn ChatStore,
    room: &RoomName,
    text: &str,
    author: &str,
) -> StoreResult<ChatMessage> {
    let stored = store
        .create_message(NewMessage {
            room: room.clone(),
            author: author.to_string(),
            content: sanitize(text),
            created_at: Utc::now(),
        })
        .await?;

    Ok(stored.into())
}

/// The most recent messages of a room, oldest first, with their readers
pub async fn get_history(store: &dyn ChatStore, room: &RoomName) -> StoreResult<Vec<ChatMessage>> {
    let query = MessageQuery::room(room.clone())
        .order(Order::Descending)
        .limit(HISTORY_LIMIT);
    let mut messages = store.find_messages(&query).await?;
    messages.reverse();

    Ok(messages.into_iter().map(ChatMessage::from).collect())
}
