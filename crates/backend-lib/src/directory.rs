// ============================
// crates/backend-lib/src/directory.rs
// ============================
//! In-memory room directory used for hot-path authorization.
//!
//! The store stays the authority; the directory is refreshed whenever
//! persisted membership changes and at each connection's initial sync.

use std::sync::Arc;

use dashmap::DashMap;
use parley_common::{Room, RoomId, UserId};

/// Cached membership of one room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub members: Vec<UserId>,
    pub creator_id: UserId,
}

impl From<&Room> for Entry {
    fn from(room: &Room) -> Self {
        Self {
            members: room.members.clone(),
            creator_id: room.creator_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Directory {
    rooms: Arc<DashMap<RoomId, Entry>>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, room_id: &str) -> Option<Entry> {
        self.rooms.get(room_id).map(|entry| entry.clone())
    }

    pub fn put(&self, room_id: &str, entry: Entry) {
        self.rooms.insert(room_id.to_string(), entry);
    }

    /// Mirror a persisted room
    pub fn refresh(&self, room: &Room) {
        self.put(&room.room_id, Entry::from(room));
    }

    pub fn remove(&self, room_id: &str) -> Option<Entry> {
        self.rooms.remove(room_id).map(|(_, entry)| entry)
    }

    pub fn is_member(&self, room_id: &str, user_id: &str) -> bool {
        self.rooms
            .get(room_id)
            .is_some_and(|entry| entry.members.iter().any(|m| m == user_id))
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_and_membership() {
        let directory = Directory::new();
        let mut room = Room::one_on_one("u2", "u1", "c1");
        directory.refresh(&room);

        assert!(directory.is_member("room_u1_u2", "u1"));
        assert!(directory.is_member("room_u1_u2", "u2"));
        assert!(!directory.is_member("room_u1_u2", "u3"));
        assert_eq!(directory.get("room_u1_u2").unwrap().creator_id, "u2");

        room.members.retain(|m| m != "u1");
        directory.refresh(&room);
        assert!(!directory.is_member("room_u1_u2", "u1"));
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_remove() {
        let directory = Directory::new();
        directory.refresh(&Room::one_on_one("u1", "u2", "c1"));
        assert!(directory.remove("room_u1_u2").is_some());
        assert!(directory.remove("room_u1_u2").is_none());
        assert!(!directory.is_member("room_u1_u2", "u1"));
        assert!(directory.is_empty());
    }
}
