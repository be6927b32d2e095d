//! Presence registry
//!
//! Maps room names to rooms. Owned by the ChatServer actor; every join and
//! leave returns the member list to broadcast.

use std::collections::HashMap;

use tracing::debug;

use crate::room::Room;
use crate::types::{ClientId, RoomName};

#[derive(Debug, Default)]
pub struct PresenceRegistry {
    rooms: HashMap<RoomName, Room>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a connection and add its username, creating the room on
    /// first use. Returns the updated member list.
    pub fn join(&mut self, room: &RoomName, client_id: ClientId, username: &str) -> Vec<String> {
        let entry = self.rooms.entry(room.clone()).or_insert_with(|| {
            debug!("Room {} created", room);
            Room::new()
        });
        entry.subscribe(client_id);
        entry.add_member(username);
        entry.members().to_vec()
    }

    /// Unsubscribe a connection and remove its username
    ///
    /// Returns the remaining members, or None for an unknown room. A room
    /// left with no members and no subscribers is dropped.
    pub fn leave(&mut self, room: &RoomName, client_id: ClientId, username: &str) -> Option<Vec<String>> {
        let entry = self.rooms.get_mut(room)?;
        entry.unsubscribe(client_id);
        entry.remove_member(username);
        let members = entry.members().to_vec();

        if entry.is_empty() {
            self.rooms.remove(room);
            debug!("Room {} deleted (empty)", room);
        }
        Some(members)
    }

    /// Connections subscribed to a room
    pub fn subscribers(&self, room: &RoomName) -> Vec<ClientId> {
        self.rooms
            .get(room)
            .map(|r| r.subscribers().collect())
            .unwrap_or_default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
impl PresenceRegistry {
    fn members(&self, room: &RoomName) -> Option<&[String]> {
        self.rooms.get(room).map(Room::members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_returns_full_list() {
        let mut registry = PresenceRegistry::new();
        let room = RoomName::from("r1");

        assert_eq!(registry.join(&room, ClientId::new(), "A"), vec!["A"]);
        assert_eq!(registry.join(&room, ClientId::new(), "B"), vec!["A", "B"]);
        assert_eq!(registry.room_count(), 1);
    }

    #[test]
    fn test_repeated_join_is_idempotent() {
        let mut registry = PresenceRegistry::new();
        let room = RoomName::from("r1");
        let a = ClientId::new();

        registry.join(&room, a, "A");
        assert_eq!(registry.join(&room, a, "A"), vec!["A"]);
        assert_eq!(registry.subscribers(&room), vec![a]);
    }

    #[test]
    fn test_leave_removes_member_and_subscriber() {
        let mut registry = PresenceRegistry::new();
        let room = RoomName::from("r1");
        let a = ClientId::new();
        let b = ClientId::new();
        registry.join(&room, a, "A");
        registry.join(&room, b, "B");

        assert_eq!(registry.leave(&room, a, "A"), Some(vec!["B".to_string()]));
        assert_eq!(registry.subscribers(&room), vec![b]);
        assert_eq!(registry.members(&room).unwrap(), ["B"]);
    }

    #[test]
    fn test_leave_unknown_room_is_noop() {
        let mut registry = PresenceRegistry::new();
        assert!(registry.leave(&RoomName::from("nowhere"), ClientId::new(), "A").is_none());
    }

    #[test]
    fn test_last_leave_drops_room() {
        let mut registry = PresenceRegistry::new();
        let room = RoomName::from("r1");
        let a = ClientId::new();
        registry.join(&room, a, "A");

        assert_eq!(registry.leave(&room, a, "A"), Some(vec![]));
        assert_eq!(registry.room_count(), 0);
        assert!(registry.subscribers(&room).is_empty());
    }

    #[test]
    fn test_member_list_matches_set_after_any_sequence() {
        let mut registry = PresenceRegistry::new();
        let room = RoomName::from("r1");
        let ids: Vec<ClientId> = (0..3).map(|_| ClientId::new()).collect();
        let names = ["A", "B", "C"];
        let mut expected: Vec<String> = Vec::new();

        let ops = [(0, true), (1, true), (0, true), (2, true), (1, false), (1, true), (0, false), (2, false)];
        for (who, joining) in ops {
            let list = if joining {
                if !expected.iter().any(|n| n == names[who]) {
                    expected.push(names[who].to_string());
                }
                registry.join(&room, ids[who], names[who])
            } else {
                expected.retain(|n| n != names[who]);
                registry.leave(&room, ids[who], names[who]).unwrap()
            };
            assert_eq!(list, expected);
        }
    }
}
