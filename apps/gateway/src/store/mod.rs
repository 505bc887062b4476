//! Persistence seams for notifications and chat read state.
//!
//! The gateway only needs a narrow slice of the data model: creating and
//! reading notifications, checking chat participation, and recording message
//! reads. [`memory::MemoryStore`] backs tests and database-less runs;
//! [`pg::PgStore`] runs against PostgreSQL.

pub mod memory;
pub mod pg;
pub mod retention;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use parlay_common::events::ChatMessage;
use parlay_common::Notification;

#[derive(Debug)]
pub enum StoreError {
    /// The named entity does not exist (or is not visible to the caller).
    NotFound(&'static str),
    Database(String),
    Pool(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(what) => write!(f, "{what} not found"),
            StoreError::Database(e) => write!(f, "database error: {e}"),
            StoreError::Pool(e) => write!(f, "connection pool error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<diesel::result::Error> for StoreError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => StoreError::NotFound("row"),
            other => StoreError::Database(other.to_string()),
        }
    }
}

impl From<diesel_async::pooled_connection::deadpool::PoolError> for StoreError {
    fn from(err: diesel_async::pooled_connection::deadpool::PoolError) -> Self {
        StoreError::Pool(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait NotificationStore: Send + Sync + 'static {
    async fn create(&self, notification: Notification) -> StoreResult<Notification>;

    /// Newest first, at most `limit`.
    async fn recent_for(&self, user_id: &str, limit: usize) -> StoreResult<Vec<Notification>>;

    async fn unread_count(&self, user_id: &str) -> StoreResult<u64>;

    /// Mark one of `user_id`'s notifications read. Returns whether it changed.
    async fn mark_read(&self, user_id: &str, notification_id: &str) -> StoreResult<bool>;

    /// Returns how many notifications changed.
    async fn mark_all_read(&self, user_id: &str) -> StoreResult<u64>;

    /// Delete notifications created before `cutoff`. Returns how many went.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
}

#[async_trait]
pub trait ChatStore: Send + Sync + 'static {
    /// User ids of everyone in the chat. Empty if the chat does not exist.
    async fn participants(&self, chat_id: &str) -> StoreResult<Vec<String>>;

    async fn is_participant(&self, chat_id: &str, user_id: &str) -> StoreResult<bool>;

    /// The persisted copy of a message, if it exists.
    async fn message(&self, message_id: &str) -> StoreResult<Option<ChatMessage>>;

    /// Record `user_id` as having read every message in the chat sent by
    /// someone else. Returns the number of newly recorded reads; a message
    /// already read by the user is never counted twice.
    async fn mark_chat_read(&self, chat_id: &str, user_id: &str) -> StoreResult<u64>;
}
