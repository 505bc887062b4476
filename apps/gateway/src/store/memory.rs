//! In-process store used by tests and by database-less development runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use parlay_common::events::ChatMessage;
use parlay_common::Notification;

use super::{ChatStore, NotificationStore, StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    notifications: Vec<Notification>,
    chats: HashMap<String, Vec<String>>,
    messages: HashMap<String, ChatMessage>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a chat with the given participants.
    pub fn insert_chat(&self, chat_id: &str, participants: &[&str]) {
        self.tables.write().chats.insert(
            chat_id.to_string(),
            participants.iter().map(|p| p.to_string()).collect(),
        );
    }

    pub fn insert_message(&self, message: ChatMessage) {
        self.tables
            .write()
            .messages
            .insert(message.id.clone(), message);
    }

    /// Every stored notification addressed to `user_id`, oldest first.
    pub fn notifications_for(&self, user_id: &str) -> Vec<Notification> {
        self.tables
            .read()
            .notifications
            .iter()
            .filter(|n| n.recipient == user_id)
            .cloned()
            .collect()
    }

    pub fn read_by(&self, message_id: &str) -> Vec<String> {
        self.tables
            .read()
            .messages
            .get(message_id)
            .map(|m| m.read_by.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn create(&self, notification: Notification) -> StoreResult<Notification> {
        self.tables.write().notifications.push(notification.clone());
        Ok(notification)
    }

    async fn recent_for(&self, user_id: &str, limit: usize) -> StoreResult<Vec<Notification>> {
        let tables = self.tables.read();
        let mut list: Vec<Notification> = tables
            .notifications
            .iter()
            .rev()
            .filter(|n| n.recipient == user_id)
            .cloned()
            .collect();
        // Stable sort keeps later inserts first on equal timestamps.
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list.truncate(limit);
        Ok(list)
    }

    async fn unread_count(&self, user_id: &str) -> StoreResult<u64> {
        let tables = self.tables.read();
        Ok(tables
            .notifications
            .iter()
            .filter(|n| n.recipient == user_id && !n.read)
            .count() as u64)
    }

    async fn mark_read(&self, user_id: &str, notification_id: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write();
        let notification = tables
            .notifications
            .iter_mut()
            .find(|n| n.id == notification_id && n.recipient == user_id)
            .ok_or(StoreError::NotFound("notification"))?;
        let changed = !notification.read;
        notification.read = true;
        Ok(changed)
    }

    async fn mark_all_read(&self, user_id: &str) -> StoreResult<u64> {
        let mut tables = self.tables.write();
        let mut changed = 0;
        for n in tables
            .notifications
            .iter_mut()
            .filter(|n| n.recipient == user_id && !n.read)
        {
            n.read = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.tables.write();
        let before = tables.notifications.len();
        tables.notifications.retain(|n| n.created_at >= cutoff);
        Ok((before - tables.notifications.len()) as u64)
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn participants(&self, chat_id: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .tables
            .read()
            .chats
            .get(chat_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn is_participant(&self, chat_id: &str, user_id: &str) -> StoreResult<bool> {
        Ok(self
            .tables
            .read()
            .chats
            .get(chat_id)
            .is_some_and(|members| members.iter().any(|m| m == user_id)))
    }

    async fn message(&self, message_id: &str) -> StoreResult<Option<ChatMessage>> {
        Ok(self.tables.read().messages.get(message_id).cloned())
    }

    async fn mark_chat_read(&self, chat_id: &str, user_id: &str) -> StoreResult<u64> {
        let mut tables = self.tables.write();
        let mut recorded = 0;
        for message in tables
            .messages
            .values_mut()
            .filter(|m| m.chat == chat_id && m.sender.id() != user_id)
        {
            if !message.read_by.iter().any(|r| r == user_id) {
                message.read_by.push(user_id.to_string());
                recorded += 1;
            }
        }
        Ok(recorded)
    }
}
