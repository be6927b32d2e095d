//! Room struct definition
//!
//! Represents a named chat room: the usernames currently joined and the
//! connections subscribed to its broadcasts.

use std::collections::HashSet;

use crate::types::ClientId;

/// Chat room
///
/// Membership is by username with set semantics, kept in join order.
/// Subscribers are the connections that receive the room's events.
#[derive(Debug, Default)]
pub struct Room {
    /// Joined usernames, no duplicates
    members: Vec<String>,
    /// Connections receiving room broadcasts
    subscribers: HashSet<ClientId>,
}

impl Room {
    /// Create a new empty room
    pub fn new() -> Self {
        Self::default()
    }

    /// Current members in join order
    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Check if a username is a member
    pub fn has_member(&self, username: &str) -> bool {
        self.members.iter().any(|m| m == username)
    }

    /// Add a member; returns false if already present
    pub fn add_member(&mut self, username: &str) -> bool {
        if self.has_member(username) {
            return false;
        }
        self.members.push(username.to_string());
        true
    }

    /// Remove a member; returns false if absent
    pub fn remove_member(&mut self, username: &str) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m != username);
        self.members.len() != before
    }

    pub fn subscribe(&mut self, client_id: ClientId) {
        self.subscribers.insert(client_id);
    }

    pub fn unsubscribe(&mut self, client_id: ClientId) {
        self.subscribers.remove(&client_id);
    }

    /// Connections subscribed to this room
    pub fn subscribers(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.subscribers.iter().copied()
    }

    /// True when nobody is joined or listening
    pub fn is_empty(&self) -> bool {
        self.members.is_empty() && self.subscribers.is_empty()
    }
}
