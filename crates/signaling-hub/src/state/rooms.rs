//! Room registry: membership, host map, creator map.
//!
//! Member lists keep insertion order; host succession after a disconnect
//! promotes the first remaining member, so the order is load-bearing.
//! A room exists iff its member list is non-empty: `remove_member` tears
//! down the room record (and its host/creator entries) when the last
//! member leaves.

use std::collections::HashMap;

/// Room id -> membership, host, creator stores.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    /// Insertion-ordered member connection ids per room.
    members: HashMap<String, Vec<String>>,
    /// Current host connection id per room.
    hosts: HashMap<String, String>,
    /// Creator user id per room, when supplied at room creation.
    creators: HashMap<String, String>,
}

impl RoomRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member, creating the room lazily.
    ///
    /// Returns `true` when this created the room.
    pub fn add_member(&mut self, room_id: &str, connection_id: &str) -> bool {
        let entry = self.members.entry(room_id.to_string()).or_default();
        let created = entry.is_empty();
        if !entry.iter().any(|id| id == connection_id) {
            entry.push(connection_id.to_string());
        }
        created
    }

    /// Remove a member; deletes the room (host and creator included) when
    /// the member list empties. Returns `true` when the member was present.
    pub fn remove_member(&mut self, room_id: &str, connection_id: &str) -> bool {
        let Some(entry) = self.members.get_mut(room_id) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|id| id != connection_id);
        let removed = entry.len() != before;

        if entry.is_empty() {
            self.members.remove(room_id);
            self.hosts.remove(room_id);
            self.creators.remove(room_id);
        }
        removed
    }

    /// Member connection ids in insertion order; empty for unknown rooms.
    #[must_use]
    pub fn members(&self, room_id: &str) -> &[String] {
        self.members.get(room_id).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn member_count(&self, room_id: &str) -> usize {
        self.members.get(room_id).map_or(0, Vec::len)
    }

    #[must_use]
    pub fn is_empty(&self, room_id: &str) -> bool {
        self.member_count(room_id) == 0
    }

    #[must_use]
    pub fn room_count(&self) -> usize {
        self.members.len()
    }

    /// Iterate room ids.
    pub fn room_ids(&self) -> impl Iterator<Item = &String> {
        self.members.keys()
    }

    #[must_use]
    pub fn host(&self, room_id: &str) -> Option<&String> {
        self.hosts.get(room_id)
    }

    pub fn set_host(&mut self, room_id: &str, connection_id: &str) {
        self.hosts
            .insert(room_id.to_string(), connection_id.to_string());
    }

    pub fn clear_host(&mut self, room_id: &str) {
        self.hosts.remove(room_id);
    }

    #[must_use]
    pub fn creator(&self, room_id: &str) -> Option<&String> {
        self.creators.get(room_id)
    }

    /// Remember the creator of a room; first writer wins.
    pub fn set_creator_if_absent(&mut self, room_id: &str, user_id: &str) {
        self.creators
            .entry(room_id.to_string())
            .or_insert_with(|| user_id.to_string());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_add_member_creates_room_lazily() {
        let mut rooms = RoomRegistry::new();
        assert!(rooms.add_member("r1", "conn-1"));
        assert!(!rooms.add_member("r1", "conn-2"));
        assert_eq!(rooms.member_count("r1"), 2);
        assert_eq!(rooms.room_count(), 1);
    }

    #[test]
    fn test_members_preserve_insertion_order() {
        let mut rooms = RoomRegistry::new();
        rooms.add_member("r1", "a");
        rooms.add_member("r1", "b");
        rooms.add_member("r1", "c");
        rooms.remove_member("r1", "a");

        assert_eq!(rooms.members("r1"), ["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_duplicate_add_is_idempotent() {
        let mut rooms = RoomRegistry::new();
        rooms.add_member("r1", "conn-1");
        rooms.add_member("r1", "conn-1");
        assert_eq!(rooms.member_count("r1"), 1);
    }

    #[test]
    fn test_empty_room_is_torn_down_with_host_and_creator() {
        let mut rooms = RoomRegistry::new();
        rooms.add_member("r1", "conn-1");
        rooms.set_host("r1", "conn-1");
        rooms.set_creator_if_absent("r1", "user-1");

        assert!(rooms.remove_member("r1", "conn-1"));
        assert_eq!(rooms.room_count(), 0);
        assert!(rooms.host("r1").is_none());
        assert!(rooms.creator("r1").is_none());
        assert!(rooms.is_empty("r1"));
    }

    #[test]
    fn test_remove_absent_member_returns_false() {
        let mut rooms = RoomRegistry::new();
        rooms.add_member("r1", "conn-1");
        assert!(!rooms.remove_member("r1", "ghost"));
        assert!(!rooms.remove_member("ghost-room", "conn-1"));
    }

    #[test]
    fn test_creator_first_writer_wins() {
        let mut rooms = RoomRegistry::new();
        rooms.set_creator_if_absent("r1", "user-1");
        rooms.set_creator_if_absent("r1", "user-2");
        assert_eq!(rooms.creator("r1").unwrap(), "user-1");
    }
}
