//! Persistence collaborator
//!
//! The realtime layer and the HTTP API only ever talk to storage through
//! the [`ChatStore`] trait. `SqliteStore` is the shipped implementation.

mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StoreError;
use crate::types::{MessageId, RoomName};

pub type StoreResult<T> = Result<T, StoreError>;

/// A persisted chat message together with the users that have read it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: MessageId,
    pub room: RoomName,
    pub author: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Readers ordered by receipt time
    pub read_by: Vec<String>,
}

/// Message row to insert
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub room: RoomName,
    pub author: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub message_id: MessageId,
    pub username: String,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub username: String,
    pub password_hash: String,
}

/// Insertion order of query results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    #[default]
    Ascending,
    Descending,
}

impl Order {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            Order::Ascending => "ASC",
            Order::Descending => "DESC",
        }
    }
}

/// Filter for `ChatStore::find_messages`
#[derive(Debug, Clone)]
pub struct MessageQuery {
    pub room: RoomName,
    /// Case-insensitive substring of the content
    pub contains: Option<String>,
    /// Inclusive lower bound on `created_at`
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`
    pub until: Option<DateTime<Utc>>,
    pub order: Order,
    pub limit: Option<u32>,
}

impl MessageQuery {
    pub fn room(room: RoomName) -> Self {
        Self {
            room,
            contains: None,
            since: None,
            until: None,
            order: Order::Ascending,
            limit: None,
        }
    }

    pub fn contains(mut self, text: Option<String>) -> Self {
        self.contains = text.filter(|t| !t.is_empty());
        self
    }

    pub fn between(mut self, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        self.since = since;
        self.until = until;
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Query contract of the persistence layer
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn create_message(&self, message: NewMessage) -> StoreResult<StoredMessage>;

    async fn find_messages(&self, query: &MessageQuery) -> StoreResult<Vec<StoredMessage>>;

    async fn find_message(&self, id: MessageId) -> StoreResult<Option<StoredMessage>>;

    /// Returns the receipt and whether it was created by this call
    async fn find_or_create_receipt(
        &self,
        message_id: MessageId,
        username: &str,
        read_at: DateTime<Utc>,
    ) -> StoreResult<(ReadReceipt, bool)>;

    /// Receipts of a message, oldest first
    async fn find_receipts(&self, message_id: MessageId) -> StoreResult<Vec<ReadReceipt>>;

    async fn find_user(&self, username: &str) -> StoreResult<Option<UserRecord>>;

    async fn create_user(&self, username: &str, password_hash: &str) -> StoreResult<UserRecord>;

    /// Returns true if the favorite did not exist before
    async fn find_or_create_favorite(&self, username: &str, room: &RoomName) -> StoreResult<bool>;

    /// Returns true if a favorite was removed
    async fn remove_favorite(&self, username: &str, room: &RoomName) -> StoreResult<bool>;

    async fn find_favorites(&self, username: &str) -> StoreResult<Vec<RoomName>>;
}
