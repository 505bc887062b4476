//! PostgreSQL-backed stores (diesel-async over a deadpool pool).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use diesel_async::AsyncConnection;
use scoped_futures::ScopedFutureExt;
use serde_json::{Map, Value};

use parlay_common::events::ChatMessage;
use parlay_common::notification::UserSummary;
use parlay_common::{EntityType, Notification, NotificationKind, UserRef};

use super::{ChatStore, NotificationStore, StoreError, StoreResult};
use crate::db::pool::DbPool;
use crate::db::schema::{chat_participants, message_reads, messages, notifications};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = notifications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct NotificationRow {
    id: String,
    recipient_id: String,
    sender_id: String,
    sender_username: Option<String>,
    kind: String,
    entity_type: String,
    entity_id: String,
    read: bool,
    content: String,
    metadata: Value,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = notifications)]
struct NewNotificationRow<'a> {
    id: &'a str,
    recipient_id: &'a str,
    sender_id: &'a str,
    sender_username: Option<&'a str>,
    kind: &'a str,
    entity_type: &'a str,
    entity_id: &'a str,
    read: bool,
    content: &'a str,
    metadata: Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StoreError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let kind = NotificationKind::parse(&row.kind)
            .ok_or_else(|| StoreError::Database(format!("unknown notification kind {}", row.kind)))?;
        let entity_type = EntityType::parse(&row.entity_type)
            .ok_or_else(|| StoreError::Database(format!("unknown entity type {}", row.entity_type)))?;
        let sender = match row.sender_username {
            Some(username) => UserRef::Populated(UserSummary {
                id: row.sender_id,
                username: Some(username),
                profile_image: None,
            }),
            None => UserRef::Id(row.sender_id),
        };
        let metadata = match row.metadata {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        Ok(Notification {
            id: row.id,
            recipient: row.recipient_id,
            sender,
            kind,
            entity_type,
            entity_id: row.entity_id,
            read: row.read,
            content: row.content,
            metadata,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct MessageRow {
    id: String,
    chat_id: String,
    sender_id: String,
    content: String,
    attachments: Value,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = message_reads)]
struct NewMessageRead<'a> {
    message_id: &'a str,
    user_id: &'a str,
}

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn create(&self, notification: Notification) -> StoreResult<Notification> {
        let mut conn = self.pool.get().await?;
        let row: NotificationRow = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(notifications::table)
                .values(NewNotificationRow {
                    id: &notification.id,
                    recipient_id: &notification.recipient,
                    sender_id: notification.sender.id(),
                    sender_username: notification.sender.username(),
                    kind: notification.kind.as_str(),
                    entity_type: notification.entity_type.as_str(),
                    entity_id: &notification.entity_id,
                    read: notification.read,
                    content: &notification.content,
                    metadata: Value::Object(notification.metadata.clone()),
                    created_at: notification.created_at,
                })
                .returning(NotificationRow::as_returning()),
            &mut conn,
        )
        .await?;
        row.try_into()
    }

    async fn recent_for(&self, user_id: &str, limit: usize) -> StoreResult<Vec<Notification>> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<NotificationRow> = diesel_async::RunQueryDsl::load(
            notifications::table
                .filter(notifications::recipient_id.eq(user_id))
                .order(notifications::created_at.desc())
                .limit(limit as i64)
                .select(NotificationRow::as_select()),
            &mut conn,
        )
        .await?;
        rows.into_iter().map(Notification::try_from).collect()
    }

    async fn unread_count(&self, user_id: &str) -> StoreResult<u64> {
        let mut conn = self.pool.get().await?;
        let count: i64 = diesel_async::RunQueryDsl::get_result(
            notifications::table
                .filter(notifications::recipient_id.eq(user_id))
                .filter(notifications::read.eq(false))
                .count(),
            &mut conn,
        )
        .await?;
        Ok(count.max(0) as u64)
    }

    async fn mark_read(&self, user_id: &str, notification_id: &str) -> StoreResult<bool> {
        let mut conn = self.pool.get().await?;
        let updated = diesel_async::RunQueryDsl::execute(
            diesel::update(
                notifications::table
                    .filter(notifications::id.eq(notification_id))
                    .filter(notifications::recipient_id.eq(user_id))
                    .filter(notifications::read.eq(false)),
            )
            .set(notifications::read.eq(true)),
            &mut conn,
        )
        .await?;
        if updated > 0 {
            return Ok(true);
        }

        // Nothing changed: either already read or not this user's.
        let exists: Option<String> = diesel_async::RunQueryDsl::get_result(
            notifications::table
                .filter(notifications::id.eq(notification_id))
                .filter(notifications::recipient_id.eq(user_id))
                .select(notifications::id),
            &mut conn,
        )
        .await
        .optional()?;
        match exists {
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound("notification")),
        }
    }

    async fn mark_all_read(&self, user_id: &str) -> StoreResult<u64> {
        let mut conn = self.pool.get().await?;
        let updated = diesel_async::RunQueryDsl::execute(
            diesel::update(
                notifications::table
                    .filter(notifications::recipient_id.eq(user_id))
                    .filter(notifications::read.eq(false)),
            )
            .set(notifications::read.eq(true)),
            &mut conn,
        )
        .await?;
        Ok(updated as u64)
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut conn = self.pool.get().await?;
        let deleted = diesel_async::RunQueryDsl::execute(
            diesel::delete(notifications::table.filter(notifications::created_at.lt(cutoff))),
            &mut conn,
        )
        .await?;
        Ok(deleted as u64)
    }
}

#[async_trait]
impl ChatStore for PgStore {
    async fn participants(&self, chat_id: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.pool.get().await?;
        let users: Vec<String> = diesel_async::RunQueryDsl::load(
            chat_participants::table
                .filter(chat_participants::chat_id.eq(chat_id))
                .select(chat_participants::user_id),
            &mut conn,
        )
        .await?;
        Ok(users)
    }

    async fn is_participant(&self, chat_id: &str, user_id: &str) -> StoreResult<bool> {
        let mut conn = self.pool.get().await?;
        let found: bool = diesel_async::RunQueryDsl::get_result(
            diesel::select(exists(
                chat_participants::table
                    .filter(chat_participants::chat_id.eq(chat_id))
                    .filter(chat_participants::user_id.eq(user_id)),
            )),
            &mut conn,
        )
        .await?;
        Ok(found)
    }

    async fn message(&self, message_id: &str) -> StoreResult<Option<ChatMessage>> {
        let mut conn = self.pool.get().await?;
        let row: Option<MessageRow> = diesel_async::RunQueryDsl::get_result(
            messages::table
                .find(message_id)
                .select(MessageRow::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        let Some(row) = row else {
            return Ok(None);
        };

        let read_by: Vec<String> = diesel_async::RunQueryDsl::load(
            message_reads::table
                .filter(message_reads::message_id.eq(&row.id))
                .order(message_reads::read_at.asc())
                .select(message_reads::user_id),
            &mut conn,
        )
        .await?;

        Ok(Some(ChatMessage {
            id: row.id,
            chat: row.chat_id,
            sender: UserRef::Id(row.sender_id),
            content: row.content,
            attachments: serde_json::from_value(row.attachments).unwrap_or_default(),
            read_by,
            created_at: Some(row.created_at),
        }))
    }

    async fn mark_chat_read(&self, chat_id: &str, user_id: &str) -> StoreResult<u64> {
        let mut conn = self.pool.get().await?;
        let chat_id = chat_id.to_string();
        let user_id = user_id.to_string();

        let recorded = conn
            .transaction::<_, StoreError, _>(|conn| {
                async move {
                    let message_ids: Vec<String> = diesel_async::RunQueryDsl::load(
                        messages::table
                            .filter(messages::chat_id.eq(&chat_id))
                            .filter(messages::sender_id.ne(&user_id))
                            .select(messages::id),
                        conn,
                    )
                    .await?;
                    if message_ids.is_empty() {
                        return Ok(0);
                    }

                    let rows: Vec<NewMessageRead<'_>> = message_ids
                        .iter()
                        .map(|id| NewMessageRead {
                            message_id: id,
                            user_id: &user_id,
                        })
                        .collect();

                    // The (message_id, user_id) key keeps reads append-only.
                    let inserted = diesel_async::RunQueryDsl::execute(
                        diesel::insert_into(message_reads::table)
                            .values(&rows)
                            .on_conflict_do_nothing(),
                        conn,
                    )
                    .await?;
                    Ok(inserted as u64)
                }
                .scope_boxed()
            })
            .await?;

        Ok(recorded)
    }
}
