//! SQLite message repository implementation.
//!
//! Implements `MessageRepository` from `mnemon-core` using sqlx with the
//! split read/write pool: raw queries, private row structs, reader for
//! SELECTs, writer for mutations.

use chrono::{DateTime, Utc};
use sqlx::Row;

use mnemon_core::repository::message::MessageRepository;
use mnemon_types::error::RepositoryError;
use mnemon_types::message::{ContentType, PendingMessage, StoredMessage, Story};

use super::pool::DatabasePool;

/// SQLite-backed implementation of `MessageRepository`.
pub struct SqliteMessageRepository {
    pool: DatabasePool,
}

impl SqliteMessageRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct MessageRow {
    id: i64,
    story_id: i64,
    content_type: String,
    content: String,
    extracted: i64,
    created_at: String,
    updated_at: String,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            story_id: row.try_get("story_id")?,
            content_type: row.try_get("content_type")?,
            content: row.try_get("content")?,
            extracted: row.try_get("extracted")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_message(self) -> Result<StoredMessage, RepositoryError> {
        let content_type: ContentType = self
            .content_type
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let content: serde_json::Value = serde_json::from_str(&self.content)
            .map_err(|e| RepositoryError::Query(format!("invalid message content: {e}")))?;

        Ok(StoredMessage {
            id: self.id,
            story_id: self.story_id,
            content_type,
            content,
            extracted: self.extracted != 0,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

struct StoryRow {
    id: i64,
    user_id: String,
    name: Option<String>,
    handler: String,
    created_at: String,
    updated_at: String,
}

impl StoryRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            name: row.try_get("name")?,
            handler: row.try_get("handler")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_story(self) -> Result<Story, RepositoryError> {
        Ok(Story {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            handler: self.handler,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

// ---------------------------------------------------------------------------
// MessageRepository implementation
// ---------------------------------------------------------------------------

impl MessageRepository for SqliteMessageRepository {
    async fn create_story(
        &self,
        user_id: &str,
        name: Option<&str>,
        handler: &str,
    ) -> Result<Story, RepositoryError> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO story (user_id, name, handler, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(name)
        .bind(handler)
        .bind(format_datetime(&now))
        .bind(format_datetime(&now))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(Story {
            id: result.last_insert_rowid(),
            user_id: user_id.to_string(),
            name: name.map(str::to_string),
            handler: handler.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn save_message(
        &self,
        story_id: i64,
        content_type: ContentType,
        content: &serde_json::Value,
    ) -> Result<StoredMessage, RepositoryError> {
        let now = Utc::now();
        let content_text = serde_json::to_string(content)
            .map_err(|e| RepositoryError::Query(format!("unserializable content: {e}")))?;
        let result = sqlx::query(
            r#"INSERT INTO message (story_id, content_type, content, extracted, created_at, updated_at)
               VALUES (?, ?, ?, 0, ?, ?)"#,
        )
        .bind(story_id)
        .bind(content_type.to_string())
        .bind(&content_text)
        .bind(format_datetime(&now))
        .bind(format_datetime(&now))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(StoredMessage {
            id: result.last_insert_rowid(),
            story_id,
            content_type,
            content: content.clone(),
            extracted: false,
            created_at: now,
            updated_at: now,
        })
    }

    async fn load_pending(&self, user_id: &str) -> Result<Vec<PendingMessage>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT m.id, m.story_id, m.content_type, m.content, m.extracted,
                      m.created_at, m.updated_at, s.user_id, s.handler
               FROM message m
               JOIN story s ON s.id = m.story_id
               WHERE s.user_id = ? AND m.extracted = 0
               ORDER BY m.created_at ASC, m.id ASC"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut pending = Vec::with_capacity(rows.len());
        for row in &rows {
            let message_row =
                MessageRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            let user_id: String = row
                .try_get("user_id")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            let handler: String = row
                .try_get("handler")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            pending.push(PendingMessage {
                message: message_row.into_message()?,
                user_id,
                handler,
            });
        }

        Ok(pending)
    }

    async fn messages_for_story(
        &self,
        story_id: i64,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM message WHERE story_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(story_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let message_row =
                MessageRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            messages.push(message_row.into_message()?);
        }

        Ok(messages)
    }
}

impl SqliteMessageRepository {
    /// Fetch one story by id.
    pub async fn get_story(&self, story_id: i64) -> Result<Option<Story>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM story WHERE id = ?")
            .bind(story_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let story_row =
                    StoryRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(story_row.into_story()?))
            }
            None => Ok(None),
        }
    }
}
