//! Client event handlers.
//!
//! Each inbound envelope is handled to completion before the next one from
//! the same connection. Handlers return the events to send straight back on
//! the originating socket; everything else goes out through the broadcast hub.

use serde::de::DeserializeOwned;
use serde_json::json;

use parlay_common::events::{
    BetInteraction, BetTopic, ChatMessage, ChatTarget, CountUpdate, ErrorPayload, MessagesRead,
    ReadNotification, TypingPayload, UserTyping,
};
use parlay_common::{ClientEventName, Envelope, EventName};

use super::bridge;
use super::fanout::Target;
use super::rooms::{bet_room, chat_room, user_room};
use super::session::GatewaySession;
use crate::store::StoreError;
use crate::AppState;

type Replies = Vec<Envelope>;

fn error_reply(message: impl Into<String>) -> Replies {
    vec![Envelope::with_payload(
        EventName::ERROR,
        &ErrorPayload {
            message: message.into(),
        },
    )]
}

fn decode<T: DeserializeOwned>(envelope: &Envelope) -> Result<T, Replies> {
    envelope.payload().map_err(|e| {
        tracing::debug!(event = %envelope.event, error = %e, "invalid payload");
        error_reply(format!("invalid payload for {}", envelope.event))
    })
}

/// Add the connection to a room, in both the session and the shared table.
pub fn join(state: &AppState, session: &GatewaySession, room: &str) {
    session.join(room);
    state.rooms.join(room, &session.conn_id, &session.user_id);
}

pub fn leave(state: &AppState, session: &GatewaySession, room: &str) {
    session.leave(room);
    state.rooms.leave(room, &session.conn_id);
}

pub async fn handle_event(state: &AppState, session: &GatewaySession, envelope: Envelope) -> Replies {
    dispatch(state, session, &envelope)
        .await
        .unwrap_or_else(|reply| reply)
}

async fn dispatch(
    state: &AppState,
    session: &GatewaySession,
    envelope: &Envelope,
) -> Result<Replies, Replies> {
    let replies = match envelope.event.as_str() {
        ClientEventName::SUBSCRIBE_NOTIFICATIONS => subscribe_notifications(state, session).await,
        ClientEventName::UNSUBSCRIBE_NOTIFICATIONS => {
            leave(state, session, &user_room(&session.user_id));
            Vec::new()
        }
        ClientEventName::JOIN_CHAT => {
            let target: ChatTarget = decode(envelope)?;
            join_chat(state, session, target.chat_id()).await
        }
        ClientEventName::LEAVE_CHAT => {
            let target: ChatTarget = decode(envelope)?;
            leave(state, session, &chat_room(target.chat_id()));
            Vec::new()
        }
        ClientEventName::TYPING => relay_typing(state, session, decode(envelope)?),
        ClientEventName::READ_MESSAGES => {
            let target: ChatTarget = decode(envelope)?;
            read_messages(state, session, target.chat_id()).await
        }
        ClientEventName::READ_NOTIFICATION => {
            let read: ReadNotification = decode(envelope)?;
            read_notification(state, session, &read.notification_id).await
        }
        ClientEventName::NEW_MESSAGE => new_message(state, session, decode(envelope)?).await,
        ClientEventName::BET_INTERACTION => bet_interaction(state, session, decode(envelope)?).await,
        ClientEventName::SUBSCRIBE_BET => {
            let topic: BetTopic = decode(envelope)?;
            join(state, session, &bet_room(&topic.bet_id));
            Vec::new()
        }
        ClientEventName::UNSUBSCRIBE_BET => {
            let topic: BetTopic = decode(envelope)?;
            leave(state, session, &bet_room(&topic.bet_id));
            Vec::new()
        }
        ClientEventName::PING => vec![Envelope::bare(EventName::PONG)],
        ClientEventName::HEARTBEAT => vec![Envelope::new(
            EventName::HEARTBEAT,
            json!({ "ts": chrono::Utc::now().timestamp_millis() }),
        )],
        other => {
            tracing::debug!(conn_id = %session.conn_id, event = other, "unknown client event");
            return Err(error_reply(format!("unknown event {other}")));
        }
    };
    Ok(replies)
}

async fn subscribe_notifications(state: &AppState, session: &GatewaySession) -> Replies {
    join(state, session, &user_room(&session.user_id));

    match state
        .notifications
        .recent_for(&session.user_id, state.config.notifications_init_limit)
        .await
    {
        Ok(list) => vec![Envelope::with_payload(EventName::NOTIFICATIONS_INIT, &list)],
        Err(e) => {
            tracing::error!(user_id = %session.user_id, error = %e, "failed to load notifications");
            error_reply("could not load notifications")
        }
    }
}

async fn join_chat(state: &AppState, session: &GatewaySession, chat_id: &str) -> Replies {
    match state.chats.is_participant(chat_id, &session.user_id).await {
        Ok(true) => {
            join(state, session, &chat_room(chat_id));
            tracing::debug!(conn_id = %session.conn_id, chat_id, "joined chat room");
            Vec::new()
        }
        Ok(false) => error_reply("not a participant of this chat"),
        Err(e) => {
            tracing::error!(chat_id, error = %e, "participant lookup failed");
            error_reply("could not join chat")
        }
    }
}

fn relay_typing(state: &AppState, session: &GatewaySession, typing: TypingPayload) -> Replies {
    let room = chat_room(&typing.chat_id);
    if !session.in_room(&room) {
        return Vec::new();
    }
    state.broadcast.publish_payload(
        Target::room_except(room, &session.conn_id),
        EventName::USER_TYPING,
        &UserTyping {
            chat_id: typing.chat_id,
            is_typing: typing.is_typing,
            username: session.username.clone(),
        },
    );
    Vec::new()
}

async fn read_messages(state: &AppState, session: &GatewaySession, chat_id: &str) -> Replies {
    match state.chats.is_participant(chat_id, &session.user_id).await {
        Ok(true) => {}
        Ok(false) => return error_reply("not a participant of this chat"),
        Err(e) => {
            tracing::error!(chat_id, error = %e, "participant lookup failed");
            return error_reply("could not mark messages read");
        }
    }

    match state.chats.mark_chat_read(chat_id, &session.user_id).await {
        Ok(recorded) => {
            tracing::debug!(chat_id, user_id = %session.user_id, recorded, "messages read");
        }
        Err(e) => {
            tracing::error!(chat_id, user_id = %session.user_id, error = %e, "failed to record reads");
        }
    }

    // Receipts are relayed regardless; the store keeps them idempotent.
    state.broadcast.publish_payload(
        Target::room_except(chat_room(chat_id), &session.conn_id),
        EventName::MESSAGES_READ,
        &MessagesRead {
            chat_id: chat_id.to_string(),
            user_id: session.user_id.clone(),
        },
    );
    Vec::new()
}

async fn read_notification(
    state: &AppState,
    session: &GatewaySession,
    notification_id: &str,
) -> Replies {
    match state
        .notifications
        .mark_read(&session.user_id, notification_id)
        .await
    {
        Ok(_) => {
            publish_unread_count(state, &session.user_id).await;
            Vec::new()
        }
        Err(StoreError::NotFound(_)) => error_reply("notification not found"),
        Err(e) => {
            tracing::error!(notification_id, error = %e, "failed to mark notification read");
            Vec::new()
        }
    }
}

/// Push the current unread count to every device of `user_id`.
pub async fn publish_unread_count(state: &AppState, user_id: &str) {
    match state.notifications.unread_count(user_id).await {
        Ok(unread_count) => state.broadcast.publish_payload(
            Target::user(user_id),
            EventName::NOTIFICATION_COUNT_UPDATED,
            &CountUpdate { unread_count },
        ),
        Err(e) => tracing::error!(user_id, error = %e, "failed to count unread notifications"),
    }
}

async fn new_message(state: &AppState, session: &GatewaySession, message: ChatMessage) -> Replies {
    let chat_id = message.chat.clone();
    match state.chats.is_participant(&chat_id, &session.user_id).await {
        Ok(true) => {}
        Ok(false) => return error_reply("not a participant of this chat"),
        Err(e) => {
            tracing::error!(chat_id, error = %e, "participant lookup failed");
            return error_reply("could not send message");
        }
    }

    // Prefer the persisted copy when the REST write already landed.
    let message = match state.chats.message(&message.id).await {
        Ok(Some(stored)) if stored.chat == chat_id => stored,
        Ok(_) => message,
        Err(e) => {
            tracing::warn!(message_id = %message.id, error = %e, "message lookup failed; relaying as sent");
            message
        }
    };

    state.broadcast.publish_payload(
        Target::room_except(chat_room(&chat_id), &session.conn_id),
        EventName::MESSAGE_RECEIVED,
        &message,
    );

    bridge::notify_absent_participants(state, session, &message).await;
    Vec::new()
}

async fn bet_interaction(
    state: &AppState,
    session: &GatewaySession,
    interaction: BetInteraction,
) -> Replies {
    state.broadcast.publish(
        Target::room_except(bet_room(&interaction.bet_id), &session.conn_id),
        EventName::BET_UPDATE,
        json!({
            "betId": interaction.bet_id,
            "type": interaction.kind,
            "data": interaction.data,
            "userId": session.user_id,
        }),
    );

    bridge::notify_bet_owner(state, session, &interaction).await;
    Vec::new()
}
