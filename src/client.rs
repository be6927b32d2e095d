//! Client struct definition
//!
//! Represents a connected client with their state and communication channel.

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::{ClientId, RoomName};

/// Connected client information
///
/// Holds the state the ChatServer keeps per connection: the outbound
/// channel and the (username, room) pair set by the last join.
#[derive(Debug)]
pub struct Client {
    /// Unique identifier for this connection
    pub id: ClientId,
    /// Username given on join (None before the first join)
    pub username: Option<String>,
    /// Room the connection is subscribed to
    pub room: Option<RoomName>,
    /// Server → Client message channel
    pub sender: mpsc::Sender<ServerMessage>,
}

impl Client {
    /// Create a new client with the given ID and sender channel
    pub fn new(id: ClientId, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id,
            username: None,
            room: None,
            sender,
        }
    }

    /// Send a message to this client
    ///
    /// Returns an error if the channel is closed (client disconnected).
    pub async fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Get the display name for this client
    ///
    /// Returns the username if set, otherwise "Unknown".
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or("Unknown")
    }

    /// Record a join
    pub fn enter(&mut self, username: String, room: RoomName) {
        self.username = Some(username);
        self.room = Some(room);
    }

    /// Forget the current room, returning it together with the username
    ///
    /// The username is kept for later typing signals.
    pub fn exit(&mut self) -> Option<(String, RoomName)> {
        let room = self.room.take()?;
        let username = self.username.clone()?;
        Some((username, room))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_creation() {
        let (tx, _rx) = mpsc::channel(32);
        let client = Client::new(ClientId::new(), tx);

        assert!(client.username.is_none());
        assert!(client.room.is_none());
        assert_eq!(client.display_name(), "Unknown");
    }

    #[tokio::test]
    async fn test_client_enter_and_exit() {
        let (tx, _rx) = mpsc::channel(32);
        let mut client = Client::new(ClientId::new(), tx);

        assert!(client.exit().is_none());

        client.enter("Alice".to_string(), RoomName::from("r1"));
        assert_eq!(client.display_name(), "Alice");

        let (username, room) = client.exit().unwrap();
        assert_eq!(username, "Alice");
        assert_eq!(room, RoomName::from("r1"));
        assert!(client.room.is_none());
        assert_eq!(client.display_name(), "Alice");
        assert!(client.exit().is_none());
    }

    #[tokio::test]
    async fn test_send_to_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        let client = Client::new(ClientId::new(), tx);
        drop(rx);

        let result = client.send(ServerMessage::UserListUpdate(vec![])).await;
        assert!(matches!(result, Err(SendError::ChannelClosed)));
    }
}
