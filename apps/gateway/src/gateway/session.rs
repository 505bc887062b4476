//! Per-connection gateway session state.

use std::collections::HashSet;

use parking_lot::RwLock;

/// State for a single WebSocket connection.
pub struct GatewaySession {
    /// Unique connection identifier (`cn_` prefixed ULID).
    pub conn_id: String,
    /// Authenticated user ID from the handshake token.
    pub user_id: String,
    /// Authenticated username from the handshake token.
    pub username: String,
    /// Rooms this connection has joined.
    rooms: RwLock<HashSet<String>>,
}

impl GatewaySession {
    pub fn new(conn_id: String, user_id: String, username: String) -> Self {
        Self {
            conn_id,
            user_id,
            username,
            rooms: RwLock::new(HashSet::new()),
        }
    }

    pub fn join(&self, room: &str) -> bool {
        self.rooms.write().insert(room.to_string())
    }

    pub fn leave(&self, room: &str) -> bool {
        self.rooms.write().remove(room)
    }

    pub fn in_room(&self, room: &str) -> bool {
        self.rooms.read().contains(room)
    }

    /// Drain the joined rooms (used at disconnect).
    pub fn take_rooms(&self) -> Vec<String> {
        self.rooms.write().drain().collect()
    }
}
