//! Notification inbox endpoints.
//!
//! Read transitions push `notification_count_updated` to the user's sockets
//! so other open tabs stay in sync.

use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use parlay_common::Notification;

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::gateway::handler::publish_unread_count;
use crate::AppState;

/// Upper bound on `limit`.
const MAX_PAGE: usize = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/unread-count", get(unread_count))
        .route("/notifications/read-all", put(mark_all_read))
        .route("/notifications/{notification_id}/read", put(mark_read))
}

// ---------------------------------------------------------------------------
// GET /api/v1/notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListNotificationsQuery {
    /// Max notifications to return (default 20, max 100).
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationListResponse {
    #[schema(value_type = Vec<Object>)]
    pub notifications: Vec<Notification>,
    pub unread_count: u64,
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications",
    tag = "Notifications",
    security(("bearer" = [])),
    params(ListNotificationsQuery),
    responses(
        (status = 200, description = "Newest notifications first", body = NotificationListResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn list_notifications(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ListNotificationsQuery>,
) -> Result<Json<NotificationListResponse>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(state.config.notifications_init_limit)
        .clamp(1, MAX_PAGE);

    let notifications = state.notifications.recent_for(&user.user_id, limit).await?;
    let unread_count = state.notifications.unread_count(&user.user_id).await?;

    Ok(Json(NotificationListResponse {
        notifications,
        unread_count,
    }))
}

// ---------------------------------------------------------------------------
// GET /api/v1/notifications/unread-count
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountResponse {
    pub unread_count: u64,
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications/unread-count",
    tag = "Notifications",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Unread notification count", body = UnreadCountResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn unread_count(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let unread_count = state.notifications.unread_count(&user.user_id).await?;
    Ok(Json(UnreadCountResponse { unread_count }))
}

// ---------------------------------------------------------------------------
// PUT /api/v1/notifications/:notification_id/read
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadResponse {
    /// How many notifications changed state.
    pub updated: u64,
    pub unread_count: u64,
}

#[utoipa::path(
    put,
    path = "/api/v1/notifications/{notification_id}/read",
    tag = "Notifications",
    security(("bearer" = [])),
    params(
        ("notification_id" = String, Path, description = "Notification ID"),
    ),
    responses(
        (status = 200, description = "Notification marked as read", body = MarkReadResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "Notification not found", body = ApiErrorBody),
    ),
)]
pub async fn mark_read(
    user: AuthUser,
    State(state): State<AppState>,
    Path(notification_id): Path<String>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    let changed = state
        .notifications
        .mark_read(&user.user_id, &notification_id)
        .await?;
    if changed {
        publish_unread_count(&state, &user.user_id).await;
    }

    let unread_count = state.notifications.unread_count(&user.user_id).await?;
    Ok(Json(MarkReadResponse {
        updated: u64::from(changed),
        unread_count,
    }))
}

// ---------------------------------------------------------------------------
// PUT /api/v1/notifications/read-all
// ---------------------------------------------------------------------------

#[utoipa::path(
    put,
    path = "/api/v1/notifications/read-all",
    tag = "Notifications",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "All notifications marked as read", body = MarkReadResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn mark_all_read(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    let updated = state.notifications.mark_all_read(&user.user_id).await?;
    if updated > 0 {
        publish_unread_count(&state, &user.user_id).await;
    }

    Ok(Json(MarkReadResponse {
        updated,
        unread_count: 0,
    }))
}
