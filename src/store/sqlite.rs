//! SQLite implementation of `ChatStore` (sqlx)
//!
//! Timestamps are stored as Unix milliseconds. Message ids come from an
//! AUTOINCREMENT key, so ordering by id is insertion order.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use tracing::{debug, info};

use super::{
    ChatStore, MessageQuery, NewMessage, ReadReceipt, StoreResult, StoredMessage, UserRecord,
};
use crate::error::StoreError;
use crate::types::{MessageId, RoomName};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY,
    username      TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    created_at    INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    room       TEXT NOT NULL,
    author     TEXT NOT NULL,
    content    TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS messages_room_id ON messages (room, id);

CREATE TABLE IF NOT EXISTS read_receipts (
    id         INTEGER PRIMARY KEY,
    message_id INTEGER NOT NULL REFERENCES messages (id) ON DELETE CASCADE,
    username   TEXT NOT NULL,
    read_at    INTEGER NOT NULL,
    UNIQUE (message_id, username)
);

CREATE TABLE IF NOT EXISTS favorites (
    id       INTEGER PRIMARY KEY,
    username TEXT NOT NULL,
    room     TEXT NOT NULL,
    UNIQUE (username, room)
);
"#;

/// One message row joined with at most one reader
type MessageRow = (i64, String, String, String, i64, Option<String>);

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and apply the schema
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect_with(options)
            .await?;

        info!("Connected to database {}", url);
        Self::with_pool(pool).await
    }

    /// Private in-memory database, gone when the store is dropped
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        // every connection to :memory: is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    pub async fn with_pool(pool: SqlitePool) -> StoreResult<Self> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        debug!("Schema applied");
        Ok(Self { pool })
    }
}

fn from_millis(millis: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp {millis} out of range")))
}

/// LIKE pattern matching `text` anywhere, with wildcards escaped by `\`
fn like_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Fold joined rows (grouped by message id) into messages with readers
fn collect_messages(rows: Vec<MessageRow>) -> StoreResult<Vec<StoredMessage>> {
    let mut messages: Vec<StoredMessage> = Vec::new();

    for (id, room, author, content, created_at, reader) in rows {
        if messages.last().map(|m| m.id) != Some(id) {
            messages.push(StoredMessage {
                id,
                room: RoomName(room),
                author,
                content,
                created_at: from_millis(created_at)?,
                read_by: Vec::new(),
            });
        }
        if let (Some(reader), Some(message)) = (reader, messages.last_mut()) {
            message.read_by.push(reader);
        }
    }

    Ok(messages)
}

#[async_trait]
impl ChatStore for SqliteStore {
    async fn create_message(&self, message: NewMessage) -> StoreResult<StoredMessage> {
        let created_at = message.created_at.timestamp_millis();
        let result = sqlx::query(
            "INSERT INTO messages (room, author, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(message.room.as_str())
        .bind(&message.author)
        .bind(&message.content)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(StoredMessage {
            id: result.last_insert_rowid(),
            room: message.room,
            author: message.author,
            content: message.content,
            created_at: from_millis(created_at)?,
            read_by: Vec::new(),
        })
    }

    async fn find_messages(&self, query: &MessageQuery) -> StoreResult<Vec<StoredMessage>> {
        let order = query.order.as_sql();

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT m.id, m.room, m.author, m.content, m.created_at, r.username \
             FROM (SELECT id, room, author, content, created_at FROM messages WHERE room = ",
        );
        qb.push_bind(query.room.0.clone());
        if let Some(text) = &query.contains {
            qb.push(" AND content LIKE ")
                .push_bind(like_pattern(text))
                .push(" ESCAPE '\\'");
        }
        if let Some(since) = query.since {
            qb.push(" AND created_at >= ").push_bind(since.timestamp_millis());
        }
        if let Some(until) = query.until {
            qb.push(" AND created_at <= ").push_bind(until.timestamp_millis());
        }
        qb.push(" ORDER BY id ").push(order);
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ").push_bind(i64::from(limit));
        }
        qb.push(") AS m LEFT JOIN read_receipts r ON r.message_id = m.id ORDER BY m.id ")
            .push(order)
            .push(", r.read_at ASC, r.id ASC");

        let rows: Vec<MessageRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        collect_messages(rows)
    }

    async fn find_message(&self, id: MessageId) -> StoreResult<Option<StoredMessage>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT m.id, m.room, m.author, m.content, m.created_at, r.username \
             FROM messages m LEFT JOIN read_receipts r ON r.message_id = m.id \
             WHERE m.id = ? ORDER BY r.read_at ASC, r.id ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(collect_messages(rows)?.into_iter().next())
    }

    async fn find_or_create_receipt(
        &self,
        message_id: MessageId,
        username: &str,
        read_at: DateTime<Utc>,
    ) -> StoreResult<(ReadReceipt, bool)> {
        let result = sqlx::query(
            "INSERT INTO read_receipts (message_id, username, read_at) VALUES (?, ?, ?) \
             ON CONFLICT (message_id, username) DO NOTHING",
        )
        .bind(message_id)
        .bind(username)
        .bind(read_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        let created = result.rows_affected() > 0;

        let (stored_at,): (i64,) =
            sqlx::query_as("SELECT read_at FROM read_receipts WHERE message_id = ? AND username = ?")
                .bind(message_id)
                .bind(username)
                .fetch_one(&self.pool)
                .await?;

        let receipt = ReadReceipt {
            message_id,
            username: username.to_string(),
            read_at: from_millis(stored_at)?,
        };
        Ok((receipt, created))
    }

    async fn find_receipts(&self, message_id: MessageId) -> StoreResult<Vec<ReadReceipt>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT username, read_at FROM read_receipts WHERE message_id = ? \
             ORDER BY read_at ASC, id ASC",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(username, read_at)| {
                Ok(ReadReceipt {
                    message_id,
                    username,
                    read_at: from_millis(read_at)?,
                })
            })
            .collect()
    }

    async fn find_user(&self, username: &str) -> StoreResult<Option<UserRecord>> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT username, password_hash FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(username, password_hash)| UserRecord {
            username,
            password_hash,
        }))
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> StoreResult<UserRecord> {
        sqlx::query("INSERT INTO users (username, password_hash, created_at) VALUES (?, ?, ?)")
            .bind(username)
            .bind(password_hash)
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?;

        Ok(UserRecord {
            username: username.to_string(),
            password_hash: password_hash.to_string(),
        })
    }

    async fn find_or_create_favorite(&self, username: &str, room: &RoomName) -> StoreResult<bool> {
        let result = sqlx::query(
            "INSERT INTO favorites (username, room) VALUES (?, ?) \
             ON CONFLICT (username, room) DO NOTHING",
        )
        .bind(username)
        .bind(room.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_favorite(&self, username: &str, room: &RoomName) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM favorites WHERE username = ? AND room = ?")
            .bind(username)
            .bind(room.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_favorites(&self, username: &str) -> StoreResult<Vec<RoomName>> {
        let rooms: Vec<(String,)> =
            sqlx::query_as("SELECT room FROM favorites WHERE username = ? ORDER BY id ASC")
                .bind(username)
                .fetch_all(&self.pool)
                .await?;

        Ok(rooms.into_iter().map(|(room,)| RoomName(room)).collect())
    }
}
