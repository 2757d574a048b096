//! Memory outbox: the staging half of the commit path.
//!
//! Memories live in LanceDB while messages live in SQLite, so a single
//! database transaction cannot span both. The commit path instead stages
//! every planned memory write into `memory_outbox` in the same SQLite
//! transaction that flips the batch's `extracted` flags, then drains the
//! staged rows into the vector store with at-least-once semantics. ADD rows
//! take their memory id from the outbox row id (AUTOINCREMENT, never
//! reused), so ids are allocated atomically with the flag flips.

use chrono::{DateTime, Utc};
use sqlx::Row;

use mnemon_types::error::RepositoryError;
use mnemon_types::memory::{DecisionPlan, PlannedWrite};

use super::message::{format_datetime, parse_datetime};
use super::pool::DatabasePool;

/// One staged memory write awaiting application to the vector store.
#[derive(Debug, Clone)]
pub struct OutboxRow {
    pub id: i64,
    /// "ADD" or "UPDATE".
    pub op: String,
    /// The action recorded on the resulting memory row.
    pub action: String,
    /// Target memory for UPDATE rows; ADD rows use `id` as the memory id.
    pub memory_id: Option<i64>,
    pub user_id: String,
    pub content: String,
    pub prev_content: Option<String>,
    pub category: String,
    pub importance: f32,
    pub confidence: f32,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

impl OutboxRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, RepositoryError> {
        let embedding_text: String = row
            .try_get("embedding")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let embedding: Vec<f32> = serde_json::from_str(&embedding_text)
            .map_err(|e| RepositoryError::Query(format!("invalid staged embedding: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(Self {
            id: row
                .try_get("id")
                .map_err(|e| RepositoryError::Query(e.to_string()))?,
            op: row
                .try_get("op")
                .map_err(|e| RepositoryError::Query(e.to_string()))?,
            action: row
                .try_get("action")
                .map_err(|e| RepositoryError::Query(e.to_string()))?,
            memory_id: row
                .try_get("memory_id")
                .map_err(|e| RepositoryError::Query(e.to_string()))?,
            user_id: row
                .try_get("user_id")
                .map_err(|e| RepositoryError::Query(e.to_string()))?,
            content: row
                .try_get("content")
                .map_err(|e| RepositoryError::Query(e.to_string()))?,
            prev_content: row
                .try_get("prev_content")
                .map_err(|e| RepositoryError::Query(e.to_string()))?,
            category: row
                .try_get("category")
                .map_err(|e| RepositoryError::Query(e.to_string()))?,
            importance: row
                .try_get("importance")
                .map_err(|e| RepositoryError::Query(e.to_string()))?,
            confidence: row
                .try_get("confidence")
                .map_err(|e| RepositoryError::Query(e.to_string()))?,
            embedding,
            created_at: parse_datetime(&created_at)?,
        })
    }
}

const INSERT_ROW_SQL: &str = r#"INSERT INTO memory_outbox
    (op, action, memory_id, user_id, content, prev_content, category, importance, confidence, embedding, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#;

/// Stage a decision plan and flip `extracted` on the batch, atomically.
///
/// Every staged write must have its embedding present in the plan's map;
/// a missing embedding aborts the transaction with nothing applied.
/// Returns the staged row ids, in write order.
pub async fn stage_commit(
    pool: &DatabasePool,
    user_id: &str,
    plan: &DecisionPlan,
    message_ids: &[i64],
) -> Result<Vec<i64>, RepositoryError> {
    let mut tx = pool
        .writer
        .begin()
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
    let now = Utc::now();
    let mut staged_ids = Vec::with_capacity(plan.writes.len());

    for write in &plan.writes {
        let embedding = plan.embeddings.get(write.text()).ok_or_else(|| {
            RepositoryError::Query("missing embedding for staged write".to_string())
        })?;
        let embedding_text = serde_json::to_string(embedding)
            .map_err(|e| RepositoryError::Query(format!("unserializable embedding: {e}")))?;

        let query = sqlx::query(INSERT_ROW_SQL);
        let query = match write {
            PlannedWrite::Add {
                text,
                category,
                importance,
                confidence,
            } => query
                .bind("ADD")
                .bind("ADD")
                .bind(None::<i64>)
                .bind(user_id)
                .bind(text)
                .bind(None::<String>)
                .bind(category)
                .bind(*importance)
                .bind(*confidence),
            PlannedWrite::Update {
                memory_id,
                text,
                prev_content,
            } => query
                .bind("UPDATE")
                .bind("UPDATE")
                .bind(Some(*memory_id))
                .bind(user_id)
                .bind(text)
                .bind(Some(prev_content.clone()))
                .bind("")
                .bind(0.0_f32)
                .bind(0.0_f32),
        };
        let result = query
            .bind(&embedding_text)
            .bind(format_datetime(&now))
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        staged_ids.push(result.last_insert_rowid());
    }

    if !message_ids.is_empty() {
        let placeholders = vec!["?"; message_ids.len()].join(", ");
        let sql = format!(
            "UPDATE message SET extracted = 1, updated_at = ? WHERE id IN ({placeholders})"
        );
        let mut query = sqlx::query(&sql).bind(format_datetime(&now));
        for id in message_ids {
            query = query.bind(id);
        }
        query
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
    }

    tx.commit()
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
    Ok(staged_ids)
}

/// Stage a single direct insert (the CRUD path), preserving the caller's
/// action tag. Returns the staged row id, which becomes the memory id.
pub async fn stage_insert(
    pool: &DatabasePool,
    memory: &mnemon_types::memory::NewMemory,
) -> Result<i64, RepositoryError> {
    let embedding_text = serde_json::to_string(&memory.embedding)
        .map_err(|e| RepositoryError::Query(format!("unserializable embedding: {e}")))?;
    let result = sqlx::query(INSERT_ROW_SQL)
        .bind("ADD")
        .bind(memory.action.to_string())
        .bind(None::<i64>)
        .bind(&memory.user_id)
        .bind(&memory.content)
        .bind(None::<String>)
        .bind(&memory.category)
        .bind(memory.importance)
        .bind(memory.confidence)
        .bind(&embedding_text)
        .bind(format_datetime(&Utc::now()))
        .execute(&pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
    Ok(result.last_insert_rowid())
}

/// Load every staged row, oldest first.
pub async fn load_rows(pool: &DatabasePool) -> Result<Vec<OutboxRow>, RepositoryError> {
    let rows = sqlx::query("SELECT * FROM memory_outbox ORDER BY id ASC")
        .fetch_all(&pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

    rows.iter().map(OutboxRow::from_row).collect()
}

/// Remove a staged row once it has been applied to the vector store.
pub async fn delete_row(pool: &DatabasePool, id: i64) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM memory_outbox WHERE id = ?")
        .bind(id)
        .execute(&pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
    Ok(())
}
