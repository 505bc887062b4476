//! Socket event vocabulary, the wire envelope, and typed payloads.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::normalize::normalize;
use crate::notification::{Notification, UserRef};

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

/// Events sent by clients.
pub struct ClientEventName;

impl ClientEventName {
    pub const SUBSCRIBE_NOTIFICATIONS: &'static str = "subscribe_notifications";
    pub const UNSUBSCRIBE_NOTIFICATIONS: &'static str = "unsubscribe_notifications";
    pub const JOIN_CHAT: &'static str = "join_chat";
    pub const LEAVE_CHAT: &'static str = "leave_chat";
    pub const TYPING: &'static str = "typing";
    pub const READ_MESSAGES: &'static str = "read_messages";
    pub const READ_NOTIFICATION: &'static str = "read_notification";
    pub const NEW_MESSAGE: &'static str = "new_message";
    pub const BET_INTERACTION: &'static str = "bet_interaction";
    pub const SUBSCRIBE_BET: &'static str = "subscribe_bet";
    pub const UNSUBSCRIBE_BET: &'static str = "unsubscribe_bet";
    pub const PING: &'static str = "ping";
    pub const HEARTBEAT: &'static str = "heartbeat";
}

/// Events sent by the gateway.
pub struct EventName;

impl EventName {
    pub const NOTIFICATIONS_INIT: &'static str = "notifications_init";
    pub const NEW_NOTIFICATION: &'static str = "new_notification";
    pub const NEW_MESSAGE: &'static str = "new_message";
    pub const MESSAGE_RECEIVED: &'static str = "message_received";
    pub const USER_TYPING: &'static str = "user_typing";
    pub const MESSAGES_READ: &'static str = "messages_read";
    pub const USER_STATUS_CHANGE: &'static str = "user_status_change";
    pub const NOTIFICATION_COUNT_UPDATED: &'static str = "notification_count_updated";
    pub const BET_UPDATE: &'static str = "bet_update";
    pub const PONG: &'static str = "pong";
    pub const HEARTBEAT: &'static str = "heartbeat";
    pub const ERROR: &'static str = "error";
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// One event on the wire: `{"event": "...", "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(event: &str, data: Value) -> Self {
        Self {
            event: event.to_string(),
            data,
        }
    }

    /// An event without a payload (`data: null`).
    pub fn bare(event: &str) -> Self {
        Self::new(event, Value::Null)
    }

    /// Build an envelope from any serializable payload.
    pub fn with_payload<T: Serialize>(event: &str, payload: &T) -> Self {
        Self::new(event, serde_json::to_value(payload).unwrap_or(Value::Null))
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_text(&self) -> String {
        serde_json::json!({ "event": self.event, "data": self.data }).to_string()
    }

    /// Decode the payload through the normalization boundary.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(normalize(self.data.clone()))
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Chat-scoped events (`join_chat`, `leave_chat`, `read_messages`) carry the
/// chat id either bare or as `{"chatId": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatTarget {
    Bare(String),
    Wrapped {
        #[serde(rename = "chatId")]
        chat_id: String,
    },
}

impl ChatTarget {
    pub fn chat_id(&self) -> &str {
        match self {
            ChatTarget::Bare(id) => id,
            ChatTarget::Wrapped { chat_id } => chat_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub chat_id: String,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTyping {
    pub chat_id: String,
    pub is_typing: bool,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesRead {
    pub chat_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadNotification {
    pub notification_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetInteraction {
    pub bet_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetTopic {
    pub bet_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusChange {
    pub user_id: String,
    pub username: String,
    pub is_online: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountUpdate {
    pub unread_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    #[serde(default)]
    pub ts: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Video,
    Bet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bet_id: Option<String>,
}

/// A chat message as echoed over the socket after the REST write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(rename = "_id")]
    pub id: String,
    pub chat: String,
    pub sender: UserRef,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub read_by: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Typed server events
// ---------------------------------------------------------------------------

/// Every server-to-client event, decoded once at the wire boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    NotificationsInit(Vec<Notification>),
    NewNotification(Notification),
    MessageReceived(ChatMessage),
    UserTyping(UserTyping),
    MessagesRead(MessagesRead),
    UserStatusChange(UserStatusChange),
    NotificationCountUpdated(CountUpdate),
    BetUpdate(Value),
    Pong,
    Heartbeat,
    Error(ErrorPayload),
    Other { event: String, data: Value },
}

impl ServerEvent {
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, serde_json::Error> {
        let event = match envelope.event.as_str() {
            EventName::NOTIFICATIONS_INIT => ServerEvent::NotificationsInit(envelope.payload()?),
            EventName::NEW_NOTIFICATION => ServerEvent::NewNotification(envelope.payload()?),
            EventName::NEW_MESSAGE | EventName::MESSAGE_RECEIVED => {
                ServerEvent::MessageReceived(envelope.payload()?)
            }
            EventName::USER_TYPING => ServerEvent::UserTyping(envelope.payload()?),
            EventName::MESSAGES_READ => ServerEvent::MessagesRead(envelope.payload()?),
            EventName::USER_STATUS_CHANGE => ServerEvent::UserStatusChange(envelope.payload()?),
            EventName::NOTIFICATION_COUNT_UPDATED => {
                ServerEvent::NotificationCountUpdated(envelope.payload()?)
            }
            EventName::BET_UPDATE => ServerEvent::BetUpdate(normalize(envelope.data.clone())),
            EventName::PONG => ServerEvent::Pong,
            EventName::HEARTBEAT => ServerEvent::Heartbeat,
            EventName::ERROR => ServerEvent::Error(envelope.payload()?),
            other => ServerEvent::Other {
                event: other.to_string(),
                data: normalize(envelope.data.clone()),
            },
        };
        Ok(event)
    }

    /// True for the liveness replies that acknowledge a heartbeat.
    pub fn is_liveness(&self) -> bool {
        matches!(self, ServerEvent::Pong | ServerEvent::Heartbeat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_text_round_trip() {
        let env = Envelope::new(ClientEventName::JOIN_CHAT, json!("abc123"));
        let text = env.to_text();
        assert_eq!(Envelope::parse(&text).unwrap(), env);
    }

    #[test]
    fn envelope_data_defaults_to_null() {
        let env = Envelope::parse(r#"{"event":"ping"}"#).unwrap();
        assert_eq!(env.event, "ping");
        assert!(env.data.is_null());
    }

    #[test]
    fn chat_target_accepts_both_shapes() {
        let bare: ChatTarget = serde_json::from_value(json!("c1")).unwrap();
        let wrapped: ChatTarget = serde_json::from_value(json!({ "chatId": "c1" })).unwrap();
        assert_eq!(bare.chat_id(), "c1");
        assert_eq!(wrapped.chat_id(), "c1");
    }

    #[test]
    fn typed_payloads_use_camel_case() {
        let v = serde_json::to_value(UserStatusChange {
            user_id: "u1".into(),
            username: "ana".into(),
            is_online: true,
        })
        .unwrap();
        assert_eq!(v, json!({ "userId": "u1", "username": "ana", "isOnline": true }));
    }

    #[test]
    fn server_event_decodes_extended_json() {
        let env = Envelope::new(
            EventName::MESSAGE_RECEIVED,
            json!({
                "_id": { "$oid": "m1" },
                "chat": { "$oid": "c1" },
                "sender": { "_id": { "$oid": "u1" }, "username": "ana" },
                "content": "gl",
                "attachments": [{ "type": "bet", "betId": "b9" }],
                "readBy": [{ "$oid": "u1" }],
                "createdAt": { "$date": 1700000000000i64 }
            }),
        );
        match ServerEvent::from_envelope(&env).unwrap() {
            ServerEvent::MessageReceived(msg) => {
                assert_eq!(msg.id, "m1");
                assert_eq!(msg.chat, "c1");
                assert_eq!(msg.sender.id(), "u1");
                assert_eq!(msg.attachments[0].kind, AttachmentKind::Bet);
                assert_eq!(msg.read_by, vec!["u1".to_string()]);
                assert!(msg.created_at.is_some());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_events_are_preserved() {
        let env = Envelope::new("leaderboard_update", json!({ "rank": 3 }));
        assert_eq!(
            ServerEvent::from_envelope(&env).unwrap(),
            ServerEvent::Other {
                event: "leaderboard_update".into(),
                data: json!({ "rank": 3 }),
            }
        );
    }

    #[test]
    fn liveness_events() {
        assert!(ServerEvent::from_envelope(&Envelope::bare("pong")).unwrap().is_liveness());
        assert!(ServerEvent::from_envelope(&Envelope::bare("heartbeat"))
            .unwrap()
            .is_liveness());
    }
}
