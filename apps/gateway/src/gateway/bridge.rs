//! Persistence bridge: turns live chat and bet activity into durable
//! notifications for users who are not watching.

use serde_json::{json, Value};

use parlay_common::events::{BetInteraction, ChatMessage};
use parlay_common::notification::{EntityType, Notification, NotificationKind, UserRef};
use parlay_common::EventName;

use super::fanout::Target;
use super::rooms::chat_room;
use super::session::GatewaySession;
use crate::AppState;

/// Longest message excerpt carried in a notification body.
const PREVIEW_CHARS: usize = 50;

fn preview(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Interaction kinds the bet owner hears about, with the wording used.
fn bet_verb(kind: &str) -> Option<&'static str> {
    match kind {
        "like" => Some("liked"),
        "comment" => Some("commented on"),
        "ride" => Some("rode"),
        "hedge" => Some("hedged"),
        _ => None,
    }
}

/// Persist, then push to whatever sessions joined the recipient's user room.
async fn deliver(state: &AppState, notification: Notification) {
    let recipient = notification.recipient.clone();
    let created = match state.notifications.create(notification).await {
        Ok(created) => created,
        Err(e) => {
            tracing::error!(recipient = %recipient, error = %e, "failed to persist notification");
            return;
        }
    };

    tracing::debug!(
        notification_id = %created.id,
        recipient = %recipient,
        kind = created.kind.as_str(),
        "notification created"
    );

    state
        .broadcast
        .publish_payload(Target::user(&recipient), EventName::NEW_NOTIFICATION, &created);
}

/// Notify every participant of the message's chat who has no connection in
/// the chat room, except the sender.
pub async fn notify_absent_participants(
    state: &AppState,
    session: &GatewaySession,
    message: &ChatMessage,
) {
    let participants = match state.chats.participants(&message.chat).await {
        Ok(participants) => participants,
        Err(e) => {
            tracing::error!(chat_id = %message.chat, error = %e, "failed to load participants");
            return;
        }
    };

    let room = chat_room(&message.chat);
    let body = format!("{}: {}", session.username, preview(&message.content));

    for participant in participants {
        if participant == session.user_id || state.rooms.has_user(&room, &participant) {
            continue;
        }
        let notification = Notification::new(
            participant,
            UserRef::populated(&session.user_id, &session.username),
            NotificationKind::Message,
            EntityType::Chat,
            &message.chat,
            body.clone(),
        )
        .with_metadata("messageId", Value::String(message.id.clone()));

        deliver(state, notification).await;
    }
}

/// Notify the owner of a bet about a like, comment, ride or hedge by someone
/// else. The owner comes from `data.betOwnerId`; without it nothing is sent.
pub async fn notify_bet_owner(
    state: &AppState,
    session: &GatewaySession,
    interaction: &BetInteraction,
) {
    let Some(verb) = bet_verb(&interaction.kind) else {
        return;
    };
    let Some(owner) = interaction.data.get("betOwnerId").and_then(Value::as_str) else {
        return;
    };
    if owner == session.user_id {
        return;
    }

    let notification = Notification::new(
        owner,
        UserRef::populated(&session.user_id, &session.username),
        NotificationKind::BetInteraction,
        EntityType::Bet,
        &interaction.bet_id,
        format!("{} {verb} your bet", session.username),
    )
    .with_metadata("interaction", json!(interaction.kind));

    deliver(state, notification).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_long_messages() {
        assert_eq!(preview("short"), "short");
        let long = "x".repeat(60);
        let cut = preview(&long);
        assert_eq!(cut.len(), PREVIEW_CHARS + 3);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn preview_counts_characters_not_bytes() {
        let text = "é".repeat(PREVIEW_CHARS);
        assert_eq!(preview(&text), text);
    }

    #[test]
    fn only_owner_facing_interactions_have_wording() {
        assert_eq!(bet_verb("like"), Some("liked"));
        assert_eq!(bet_verb("comment"), Some("commented on"));
        assert_eq!(bet_verb("view"), None);
    }
}
