use chatline_core::{Message, MessageType, NewMessage, UserId};
use chrono::{SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::Deserialize;
use tracing::instrument;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{get, parse_enum, parse_timestamp};

const TABLE: &str = "messages";
const COLUMNS: &str = "id, sender_id, receiver_id, message_type, content, media_file, created_at";

/// Offset/limit window for history listings.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Page {
    pub skip: u32,
    pub limit: u32,
}

impl Page {
    pub const MAX_LIMIT: u32 = 500;

    fn clamped_limit(self) -> u32 {
        self.limit.min(Self::MAX_LIMIT)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self { skip: 0, limit: 100 }
    }
}

/// Append-only access to stored chat messages.
#[derive(Clone)]
pub struct MessageRepo {
    db: Database,
}

impl MessageRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a message. `id` and `created_at` are assigned here.
    #[instrument(skip_all, fields(sender_id = %msg.sender_id, receiver_id = %msg.receiver_id))]
    pub fn insert(&self, msg: &NewMessage) -> Result<Message, StoreError> {
        // Millisecond precision so the returned record equals what a later read yields.
        let created_at = Utc::now().trunc_subsecs(3);
        let media_file = msg.message_type.is_media().then(|| msg.content.clone());

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (sender_id, receiver_id, message_type, content, media_file, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    msg.sender_id.get(),
                    msg.receiver_id.get(),
                    msg.message_type.as_str(),
                    msg.content,
                    media_file,
                    created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
                ],
            )?;

            Ok(Message {
                id: conn.last_insert_rowid(),
                sender_id: msg.sender_id,
                receiver_id: msg.receiver_id,
                message_type: msg.message_type,
                content: msg.content.clone(),
                media_file,
                created_at,
            })
        })
    }

    #[instrument(skip(self))]
    pub fn get(&self, id: i64) -> Result<Message, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!("SELECT {COLUMNS} FROM messages WHERE id = ?1");
            conn.query_row(&sql, [id], |row| Ok(map_row(row)))
                .optional()?
                .ok_or_else(|| StoreError::NotFound(format!("message {id}")))?
        })
    }

    /// Messages sent or received by `user`, newest first.
    #[instrument(skip(self), fields(user_id = %user))]
    pub fn list_for_user(&self, user: UserId, page: Page) -> Result<Vec<Message>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM messages
             WHERE sender_id = ?1 OR receiver_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2 OFFSET ?3"
        );
        self.query(&sql, params![user.get(), page.clamped_limit(), page.skip])
    }

    /// Conversation between two users, oldest first.
    #[instrument(skip(self), fields(user_a = %a, user_b = %b))]
    pub fn list_between(&self, a: UserId, b: UserId, page: Page) -> Result<Vec<Message>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM messages
             WHERE (sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1)
             ORDER BY created_at ASC, id ASC
             LIMIT ?3 OFFSET ?4"
        );
        self.query(&sql, params![a.get(), b.get(), page.clamped_limit(), page.skip])
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
                .map_err(StoreError::from)
        })
    }

    fn query(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Message>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map(params, |row| Ok(map_row(row)))?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().collect()
        })
    }
}

fn map_row(row: &Row<'_>) -> Result<Message, StoreError> {
    let message_type: String = get(row, 3, TABLE, "message_type")?;
    let created_at: String = get(row, 6, TABLE, "created_at")?;
    Ok(Message {
        id: get(row, 0, TABLE, "id")?,
        sender_id: UserId::new(get(row, 1, TABLE, "sender_id")?),
        receiver_id: UserId::new(get(row, 2, TABLE, "receiver_id")?),
        message_type: parse_enum::<MessageType>(&message_type, TABLE, "message_type")?,
        content: get(row, 4, TABLE, "content")?,
        media_file: get(row, 5, TABLE, "media_file")?,
        created_at: parse_timestamp(&created_at, TABLE, "created_at")?,
    })
}
