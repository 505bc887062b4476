//! Room membership table.
//!
//! A room is a named fan-out scope: one per chat (`chat:{id}`), one per
//! notification recipient (`user:{id}`) and one per bet topic (`bet:{id}`).
//! The table maps each room to the connections in it and the user behind
//! each connection, so the persistence bridge can ask whether a user is
//! currently present in a room.

use std::collections::HashMap;

use dashmap::DashMap;

pub fn chat_room(chat_id: &str) -> String {
    format!("chat:{chat_id}")
}

/// The per-user notification room, shared by all of a user's devices.
pub fn user_room(user_id: &str) -> String {
    format!("user:{user_id}")
}

pub fn bet_room(bet_id: &str) -> String {
    format!("bet:{bet_id}")
}

#[derive(Default)]
pub struct RoomTable {
    rooms: DashMap<String, HashMap<String, String>>,
}

impl RoomTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the connection was already in the room.
    pub fn join(&self, room: &str, conn_id: &str, user_id: &str) -> bool {
        self.rooms
            .entry(room.to_string())
            .or_default()
            .insert(conn_id.to_string(), user_id.to_string())
            .is_none()
    }

    /// Returns `false` if the connection was not in the room.
    pub fn leave(&self, room: &str, conn_id: &str) -> bool {
        let removed = match self.rooms.get_mut(room) {
            Some(mut members) => members.remove(conn_id).is_some(),
            None => false,
        };
        self.rooms.remove_if(room, |_, members| members.is_empty());
        removed
    }

    /// Whether any connection of `user_id` is in the room.
    pub fn has_user(&self, room: &str, user_id: &str) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|members| members.values().any(|u| u == user_id))
    }

    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.get(room).map_or(0, |members| members.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_and_leave_track_membership() {
        let rooms = RoomTable::new();
        let room = chat_room("c1");
        assert!(rooms.join(&room, "cn_a", "u1"));
        assert!(!rooms.join(&room, "cn_a", "u1"));
        assert_eq!(rooms.member_count(&room), 1);
        assert!(rooms.has_user(&room, "u1"));
        assert!(!rooms.has_user(&room, "u2"));

        assert!(rooms.leave(&room, "cn_a"));
        assert!(!rooms.leave(&room, "cn_a"));
        assert_eq!(rooms.member_count(&room), 0);
    }

    #[test]
    fn user_present_while_any_device_remains() {
        let rooms = RoomTable::new();
        let room = user_room("u1");
        rooms.join(&room, "cn_phone", "u1");
        rooms.join(&room, "cn_laptop", "u1");
        rooms.leave(&room, "cn_phone");
        assert!(rooms.has_user(&room, "u1"));
        rooms.leave(&room, "cn_laptop");
        assert!(!rooms.has_user(&room, "u1"));
    }

    #[test]
    fn room_names_are_namespaced() {
        assert_eq!(chat_room("abc"), "chat:abc");
        assert_eq!(user_room("abc"), "user:abc");
        assert_eq!(bet_room("abc"), "bet:abc");
    }
}
