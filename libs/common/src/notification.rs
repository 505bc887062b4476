//! Durable notification model shared by the gateway and its clients.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::id::{prefix, prefixed_ulid};

/// Notifications older than this are purged by the gateway.
pub const RETENTION_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Message,
    BetInteraction,
    Follow,
    BetOutcome,
    Mention,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Message => "message",
            NotificationKind::BetInteraction => "bet_interaction",
            NotificationKind::Follow => "follow",
            NotificationKind::BetOutcome => "bet_outcome",
            NotificationKind::Mention => "mention",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "message" => Some(NotificationKind::Message),
            "bet_interaction" => Some(NotificationKind::BetInteraction),
            "follow" => Some(NotificationKind::Follow),
            "bet_outcome" => Some(NotificationKind::BetOutcome),
            "mention" => Some(NotificationKind::Mention),
            _ => None,
        }
    }
}

/// What a notification points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Chat,
    Bet,
    User,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Chat => "chat",
            EntityType::Bet => "bet",
            EntityType::User => "user",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "chat" => Some(EntityType::Chat),
            "bet" => Some(EntityType::Bet),
            "user" => Some(EntityType::User),
            _ => None,
        }
    }
}

/// A user reference as it appears on the wire: either a bare id or a
/// populated document carrying at least `_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserRef {
    Id(String),
    Populated(UserSummary),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
}

impl UserRef {
    pub fn id(&self) -> &str {
        match self {
            UserRef::Id(id) => id,
            UserRef::Populated(user) => &user.id,
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            UserRef::Id(_) => None,
            UserRef::Populated(user) => user.username.as_deref(),
        }
    }

    pub fn populated(id: impl Into<String>, username: impl Into<String>) -> Self {
        UserRef::Populated(UserSummary {
            id: id.into(),
            username: Some(username.into()),
            profile_image: None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "_id")]
    pub id: String,
    pub recipient: String,
    pub sender: UserRef,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub entity_type: EntityType,
    pub entity_id: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Build a fresh, unread notification with a generated id.
    pub fn new(
        recipient: impl Into<String>,
        sender: UserRef,
        kind: NotificationKind,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: prefixed_ulid(prefix::NOTIFICATION),
            recipient: recipient.into(),
            sender,
            kind,
            entity_type,
            entity_id: entity_id.into(),
            read: false,
            content: content.into(),
            metadata: Map::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Click-through target for this notification.
    pub fn deep_link(&self) -> String {
        match self.entity_type {
            EntityType::Chat => format!("/messages/{}", self.entity_id),
            EntityType::Bet => format!("/bets/{}", self.entity_id),
            EntityType::User => format!("/profile/{}", self.entity_id),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > Duration::days(RETENTION_DAYS)
    }

    /// Start of the retention window relative to `now`.
    pub fn retention_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(RETENTION_DAYS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_wire_shape() {
        let raw = json!({
            "_id": "n1",
            "recipient": "u1",
            "sender": { "_id": "u2", "username": "bettor" },
            "type": "bet_interaction",
            "entityType": "bet",
            "entityId": "bet42",
            "read": false,
            "content": "bettor liked your bet",
            "metadata": { "interaction": "like" },
            "createdAt": "2024-03-01T10:00:00Z"
        });
        let n: Notification = serde_json::from_value(raw).unwrap();
        assert_eq!(n.id, "n1");
        assert_eq!(n.kind, NotificationKind::BetInteraction);
        assert_eq!(n.sender.id(), "u2");
        assert_eq!(n.sender.username(), Some("bettor"));
        assert_eq!(n.deep_link(), "/bets/bet42");
    }

    #[test]
    fn sender_may_be_a_bare_id() {
        let raw = json!({
            "_id": "n2",
            "recipient": "u1",
            "sender": "u3",
            "type": "follow",
            "entityType": "user",
            "entityId": "u3",
            "createdAt": "2024-03-01T10:00:00Z"
        });
        let n: Notification = serde_json::from_value(raw).unwrap();
        assert_eq!(n.sender, UserRef::Id("u3".to_string()));
        assert!(!n.read);
        assert_eq!(n.deep_link(), "/profile/u3");
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let n = Notification::new(
            "u1",
            UserRef::Id("u2".into()),
            NotificationKind::Message,
            EntityType::Chat,
            "c1",
            "hi",
        );
        let v = serde_json::to_value(&n).unwrap();
        assert!(v["_id"].as_str().unwrap().starts_with("ntf_"));
        assert_eq!(v["type"], "message");
        assert_eq!(v["entityType"], "chat");
        assert_eq!(v["entityId"], "c1");
    }

    #[test]
    fn expires_after_retention_window() {
        let mut n = Notification::new(
            "u1",
            UserRef::Id("u2".into()),
            NotificationKind::Mention,
            EntityType::Chat,
            "c1",
            "",
        );
        let now = Utc::now();
        assert!(!n.is_expired(now));
        n.created_at = now - Duration::days(RETENTION_DAYS + 1);
        assert!(n.is_expired(now));
    }

    #[test]
    fn kind_and_entity_round_trip_through_strings() {
        for kind in [
            NotificationKind::Message,
            NotificationKind::BetInteraction,
            NotificationKind::Follow,
            NotificationKind::BetOutcome,
            NotificationKind::Mention,
        ] {
            assert_eq!(NotificationKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityType::parse("bet"), Some(EntityType::Bet));
        assert_eq!(EntityType::parse("pod"), None);
    }
}
