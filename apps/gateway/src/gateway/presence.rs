//! Online user directory: one entry per connected user.
//!
//! The entry points at the user's newest connection (last connection wins)
//! and also counts every live connection the user holds, so a user with a
//! second device open stays online when one of them closes.

use std::collections::HashSet;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

struct UserEntry {
    current: String,
    live: HashSet<String>,
}

#[derive(Default)]
pub struct OnlineUserDirectory {
    inner: DashMap<String, UserEntry>,
}

impl OnlineUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point `user_id` at `conn_id`. Returns the connection it replaced as
    /// the user's current one, if any.
    pub fn register(&self, user_id: &str, conn_id: &str) -> Option<String> {
        match self.inner.entry(user_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let entry = entry.get_mut();
                entry.live.insert(conn_id.to_string());
                Some(std::mem::replace(&mut entry.current, conn_id.to_string()))
            }
            Entry::Vacant(entry) => {
                entry.insert(UserEntry {
                    current: conn_id.to_string(),
                    live: HashSet::from([conn_id.to_string()]),
                });
                None
            }
        }
    }

    /// Drop `conn_id` from the user's live connections. Returns whether the
    /// user went offline, which happens only when the last one closes.
    pub fn unregister(&self, user_id: &str, conn_id: &str) -> bool {
        let Entry::Occupied(mut occupied) = self.inner.entry(user_id.to_string()) else {
            return false;
        };
        let entry = occupied.get_mut();
        if !entry.live.remove(conn_id) {
            return false;
        }
        if entry.live.is_empty() {
            occupied.remove();
            return true;
        }
        if entry.current == conn_id {
            if let Some(next) = entry.live.iter().next() {
                entry.current = next.clone();
            }
        }
        false
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.inner.contains_key(user_id)
    }

    pub fn connection_of(&self, user_id: &str) -> Option<String> {
        self.inner.get(user_id).map(|e| e.current.clone())
    }

    pub fn connection_count(&self, user_id: &str) -> usize {
        self.inner.get(user_id).map_or(0, |e| e.live.len())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_connection_wins() {
        let dir = OnlineUserDirectory::new();
        assert_eq!(dir.register("u1", "cn_a"), None);
        assert_eq!(dir.register("u1", "cn_b"), Some("cn_a".to_string()));
        assert_eq!(dir.connection_of("u1").as_deref(), Some("cn_b"));
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.connection_count("u1"), 2);
    }

    #[test]
    fn stale_connection_does_not_evict_newer_one() {
        let dir = OnlineUserDirectory::new();
        dir.register("u1", "cn_a");
        dir.register("u1", "cn_b");

        assert!(!dir.unregister("u1", "cn_a"));
        assert!(dir.is_online("u1"));
        assert_eq!(dir.connection_of("u1").as_deref(), Some("cn_b"));

        assert!(dir.unregister("u1", "cn_b"));
        assert!(!dir.is_online("u1"));
        assert!(dir.is_empty());
    }

    #[test]
    fn closing_newest_connection_keeps_older_device_online() {
        let dir = OnlineUserDirectory::new();
        dir.register("u1", "cn_phone");
        dir.register("u1", "cn_laptop");

        assert!(!dir.unregister("u1", "cn_laptop"));
        assert!(dir.is_online("u1"));
        assert_eq!(dir.connection_of("u1").as_deref(), Some("cn_phone"));
        assert_eq!(dir.connection_count("u1"), 1);

        assert!(dir.unregister("u1", "cn_phone"));
        assert!(!dir.is_online("u1"));
    }

    #[test]
    fn unregistering_twice_is_noop() {
        let dir = OnlineUserDirectory::new();
        dir.register("u1", "cn_a");
        assert!(dir.unregister("u1", "cn_a"));
        assert!(!dir.unregister("u1", "cn_a"));
    }

    #[test]
    fn unregister_unknown_user_is_noop() {
        let dir = OnlineUserDirectory::new();
        assert!(!dir.unregister("ghost", "cn_x"));
    }
}
