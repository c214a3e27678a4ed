//! Message and blob persistence over SQLite.
//!
//! The rest of the crate only ever talks to this narrow surface: insert a
//! message, look one up, page backwards, store/load a blob. Messages are
//! append-only; nothing here updates or deletes them.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A persisted chat message. `created_at` serializes as ISO-8601 UTC with a
/// trailing "Z"; it is assigned here, at persistence time, and together with
/// the time-ordered UUIDv7 id forms the pagination sort key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub attachments: Vec<Attachment>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Uuid>,
}

pub async fn init_schema(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL,
            sender_id TEXT NOT NULL,
            content TEXT NOT NULL DEFAULT '',
            attachments TEXT NOT NULL DEFAULT '[]',
            reply_to TEXT,
            created_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages (conversation_id, created_at DESC, id DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS files (
            id TEXT PRIMARY KEY,
            conversation_id TEXT,
            sender_id TEXT,
            filename TEXT NOT NULL,
            mime TEXT NOT NULL,
            data BLOB NOT NULL,
            created_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn now_micros() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000) as i64
}

fn micros_to_odt(us: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(us as i128 * 1_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

type MessageRow = (String, String, String, String, String, Option<String>, i64);

fn row_to_message(row: MessageRow) -> anyhow::Result<StoredMessage> {
    let (id, conversation_id, sender_id, content, attachments, reply_to, created_at) = row;
    Ok(StoredMessage {
        id: Uuid::parse_str(&id).context("bad message id in store")?,
        conversation_id,
        sender_id,
        content,
        attachments: serde_json::from_str(&attachments).unwrap_or_default(),
        created_at: micros_to_odt(created_at),
        reply_to: match reply_to {
            Some(r) => Some(Uuid::parse_str(&r).context("bad reply_to in store")?),
            None => None,
        },
    })
}

const MESSAGE_COLS: &str = "id, conversation_id, sender_id, content, attachments, reply_to, created_at";

pub async fn insert_message(
    pool: &SqlitePool,
    conversation_id: &str,
    sender_id: &str,
    content: &str,
    attachments: Vec<Attachment>,
    reply_to: Option<Uuid>,
) -> anyhow::Result<StoredMessage> {
    let msg = StoredMessage {
        id: Uuid::now_v7(),
        conversation_id: conversation_id.to_owned(),
        sender_id: sender_id.to_owned(),
        content: content.to_owned(),
        attachments,
        created_at: micros_to_odt(now_micros()),
        reply_to,
    };

    sqlx::query(
        "INSERT INTO messages (id, conversation_id, sender_id, content, attachments, reply_to, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(msg.id.to_string())
    .bind(&msg.conversation_id)
    .bind(&msg.sender_id)
    .bind(&msg.content)
    .bind(serde_json::to_string(&msg.attachments)?)
    .bind(msg.reply_to.as_ref().map(Uuid::to_string))
    .bind((msg.created_at.unix_timestamp_nanos() / 1_000) as i64)
    .execute(pool)
    .await?;

    Ok(msg)
}

pub async fn find_message(
    pool: &SqlitePool,
    conversation_id: &str,
    id: Uuid,
) -> anyhow::Result<Option<StoredMessage>> {
    let row: Option<MessageRow> = sqlx::query_as(&format!(
        "SELECT {MESSAGE_COLS} FROM messages WHERE id = ? AND conversation_id = ?"
    ))
    .bind(id.to_string())
    .bind(conversation_id)
    .fetch_optional(pool)
    .await?;

    row.map(row_to_message).transpose()
}

/// The `limit` most recent messages of the conversation strictly older than
/// `anchor` (all of them, when no anchor is given), newest first. Ordering is
/// by `(created_at, id)` so messages sharing a timestamp still page out in a
/// stable order.
pub async fn page_before(
    pool: &SqlitePool,
    conversation_id: &str,
    limit: usize,
    anchor: Option<&StoredMessage>,
) -> anyhow::Result<Vec<StoredMessage>> {
    let rows: Vec<MessageRow> = match anchor {
        Some(anchor) => {
            let anchor_us = (anchor.created_at.unix_timestamp_nanos() / 1_000) as i64;
            sqlx::query_as(&format!(
                "SELECT {MESSAGE_COLS} FROM messages
                 WHERE conversation_id = ?
                   AND (created_at < ? OR (created_at = ? AND id < ?))
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?"
            ))
            .bind(conversation_id)
            .bind(anchor_us)
            .bind(anchor_us)
            .bind(anchor.id.to_string())
            .bind(limit as i64)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as(&format!(
                "SELECT {MESSAGE_COLS} FROM messages
                 WHERE conversation_id = ?
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?"
            ))
            .bind(conversation_id)
            .bind(limit as i64)
            .fetch_all(pool)
            .await?
        }
    };

    rows.into_iter().map(row_to_message).collect()
}

pub async fn store_file(
    pool: &SqlitePool,
    conversation_id: Option<&str>,
    sender_id: Option<&str>,
    filename: &str,
    mime: &str,
    data: &[u8],
) -> anyhow::Result<String> {
    let id = Uuid::now_v7().to_string();
    sqlx::query(
        "INSERT INTO files (id, conversation_id, sender_id, filename, mime, data, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(conversation_id)
    .bind(sender_id)
    .bind(filename)
    .bind(mime)
    .bind(data)
    .bind(now_micros())
    .execute(pool)
    .await?;

    Ok(id)
}

pub struct StoredFile {
    pub filename: String,
    pub mime: String,
    pub data: Vec<u8>,
}

pub async fn load_file(pool: &SqlitePool, file_id: &str) -> anyhow::Result<Option<StoredFile>> {
    let row: Option<(String, String, Vec<u8>)> =
        sqlx::query_as("SELECT filename, mime, data FROM files WHERE id = ?")
            .bind(file_id)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(|(filename, mime, data)| StoredFile { filename, mime, data }))
}
