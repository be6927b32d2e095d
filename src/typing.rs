//! Typing indicator registry
//!
//! Tracks who is typing per room, keyed by (room, username), so a user
//! typing in one room never shows up as typing in another. Each entry
//! remembers its last "typing" signal; the ChatServer expires stale
//! entries on a timer.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::types::RoomName;

#[derive(Debug, Default)]
pub struct TypingRegistry {
    active: HashMap<(RoomName, String), Instant>,
}

impl TypingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a typing signal received at `now`
    ///
    /// Returns true if the typing state of the pair changed.
    pub fn set(&mut self, room: &RoomName, username: &str, is_typing: bool, now: Instant) -> bool {
        let key = (room.clone(), username.to_string());
        if is_typing {
            self.active.insert(key, now).is_none()
        } else {
            self.active.remove(&key).is_some()
        }
    }

    /// Clear a pair; returns true if it was typing
    pub fn clear(&mut self, room: &RoomName, username: &str) -> bool {
        self.set(room, username, false, Instant::now())
    }

    /// Remove and return every pair whose last signal is older than `timeout`
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> Vec<(RoomName, String)> {
        let stale: Vec<(RoomName, String)> = self
            .active
            .iter()
            .filter(|(_, since)| now.saturating_duration_since(**since) >= timeout)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &stale {
            self.active.remove(key);
        }
        stale
    }
}

#[cfg(test)]
impl TypingRegistry {
    fn is_typing(&self, room: &RoomName, username: &str) -> bool {
        self.active
            .contains_key(&(room.clone(), username.to_string()))
    }

    /// Users typing in a room, sorted
    fn typing_in(&self, room: &RoomName) -> Vec<String> {
        let mut users: Vec<String> = self
            .active
            .keys()
            .filter(|(r, _)| r == room)
            .map(|(_, u)| u.clone())
            .collect();
        users.sort();
        users
    }

    fn len(&self) -> usize {
        self.active.len()
    }

    fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}
