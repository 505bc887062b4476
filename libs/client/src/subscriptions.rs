//! The set of channels the client *wants*, independent of the link.
//!
//! Every mutator returns the envelope that announces the change, or `None`
//! when the call did not change anything. The connection manager sends the
//! announcement right away when a link is up; otherwise the intent waits in
//! the set and goes out with [`SubscriptionSet::replay`] on the next connect.

use std::collections::BTreeSet;

use serde_json::json;

use parlay_common::{ClientEventName, Envelope};

#[derive(Debug, Default, Clone)]
pub struct SubscriptionSet {
    notifications: bool,
    chat_rooms: BTreeSet<String>,
    bet_topics: BTreeSet<String>,
}

fn join_chat(chat_id: &str) -> Envelope {
    Envelope::new(ClientEventName::JOIN_CHAT, json!(chat_id))
}

fn subscribe_bet(bet_id: &str) -> Envelope {
    Envelope::new(ClientEventName::SUBSCRIBE_BET, json!({ "betId": bet_id }))
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_notifications(&mut self) -> Option<Envelope> {
        if self.notifications {
            return None;
        }
        self.notifications = true;
        Some(Envelope::bare(ClientEventName::SUBSCRIBE_NOTIFICATIONS))
    }

    pub fn unsubscribe_notifications(&mut self) -> Option<Envelope> {
        if !self.notifications {
            return None;
        }
        self.notifications = false;
        Some(Envelope::bare(ClientEventName::UNSUBSCRIBE_NOTIFICATIONS))
    }

    pub fn join_room(&mut self, chat_id: &str) -> Option<Envelope> {
        self.chat_rooms
            .insert(chat_id.to_string())
            .then(|| join_chat(chat_id))
    }

    pub fn leave_room(&mut self, chat_id: &str) -> Option<Envelope> {
        self.chat_rooms
            .remove(chat_id)
            .then(|| Envelope::new(ClientEventName::LEAVE_CHAT, json!(chat_id)))
    }

    pub fn subscribe_bet(&mut self, bet_id: &str) -> Option<Envelope> {
        self.bet_topics
            .insert(bet_id.to_string())
            .then(|| subscribe_bet(bet_id))
    }

    pub fn unsubscribe_bet(&mut self, bet_id: &str) -> Option<Envelope> {
        self.bet_topics.remove(bet_id).then(|| {
            Envelope::new(ClientEventName::UNSUBSCRIBE_BET, json!({ "betId": bet_id }))
        })
    }

    /// Announcements for everything currently wanted, one per channel.
    pub fn replay(&self) -> Vec<Envelope> {
        let mut out = Vec::with_capacity(
            usize::from(self.notifications) + self.chat_rooms.len() + self.bet_topics.len(),
        );
        if self.notifications {
            out.push(Envelope::bare(ClientEventName::SUBSCRIBE_NOTIFICATIONS));
        }
        out.extend(self.chat_rooms.iter().map(|id| join_chat(id)));
        out.extend(self.bet_topics.iter().map(|id| subscribe_bet(id)));
        out
    }

    pub fn clear(&mut self) {
        self.notifications = false;
        self.chat_rooms.clear();
        self.bet_topics.clear();
    }

    pub fn notifications_subscribed(&self) -> bool {
        self.notifications
    }

    pub fn chat_rooms(&self) -> impl Iterator<Item = &str> {
        self.chat_rooms.iter().map(String::as_str)
    }

    pub fn bet_topics(&self) -> impl Iterator<Item = &str> {
        self.bet_topics.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        !self.notifications && self.chat_rooms.is_empty() && self.bet_topics.is_empty()
    }
}
