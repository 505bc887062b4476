//! Chat read receipts over REST.

use axum::extract::{Path, State};
use axum::routing::put;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use parlay_common::events::MessagesRead;
use parlay_common::EventName;

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::gateway::fanout::Target;
use crate::gateway::rooms::chat_room;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/chats/{chat_id}/read", put(mark_chat_read))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkChatReadResponse {
    /// Messages newly recorded as read by the caller.
    pub marked: u64,
}

#[utoipa::path(
    put,
    path = "/api/v1/chats/{chat_id}/read",
    tag = "Chats",
    security(("bearer" = [])),
    params(
        ("chat_id" = String, Path, description = "Chat ID"),
    ),
    responses(
        (status = 200, description = "Chat marked as read", body = MarkChatReadResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not a participant", body = ApiErrorBody),
    ),
)]
pub async fn mark_chat_read(
    user: AuthUser,
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<Json<MarkChatReadResponse>, ApiError> {
    if !state.chats.is_participant(&chat_id, &user.user_id).await? {
        return Err(ApiError::forbidden("Not a participant of this chat"));
    }

    let marked = state.chats.mark_chat_read(&chat_id, &user.user_id).await?;

    // Let everyone viewing the chat update their receipts.
    state.broadcast.publish_payload(
        Target::room(chat_room(&chat_id)),
        EventName::MESSAGES_READ,
        &MessagesRead {
            chat_id: chat_id.clone(),
            user_id: user.user_id.clone(),
        },
    );

    tracing::debug!(%chat_id, user_id = %user.user_id, marked, "chat marked read");
    Ok(Json(MarkChatReadResponse { marked }))
}
