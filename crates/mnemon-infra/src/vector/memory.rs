//! LanceDB-backed memory store with outbox-based commits.
//!
//! Implements `MemoryStore` from `mnemon-core`. Search runs cosine-distance
//! vector queries against the shared memories table with a `user_id`
//! prefilter, over-fetching and then applying the similarity floor. Writes
//! go through the SQLite memory outbox: `commit` stages every planned write
//! in the same transaction that flips the batch's `extracted` flags, then
//! drains the staged rows into LanceDB. Draining is at-least-once -- each
//! row's application is delete-then-insert keyed by memory id, so a
//! re-drained row converges instead of duplicating.

use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field};
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::Table;

use mnemon_core::memory::store::MemoryStore;
use mnemon_types::error::RepositoryError;
use mnemon_types::memory::{
    CommitStats, DecisionPlan, MemoryAction, MemoryPatch, MemoryRecord, NewMemory, ScoredMemory,
    SearchOptions,
};

use crate::sqlite::outbox::{self, OutboxRow};
use crate::sqlite::DatabasePool;

use super::lance::LanceStore;
use super::schema::memory_schema;

/// What happened to one drained outbox row.
enum Applied {
    Added,
    Updated,
    /// UPDATE whose target memory no longer exists.
    Skipped,
}

/// LanceDB memory store paired with the SQLite outbox.
pub struct LanceMemoryStore {
    store: LanceStore,
    pool: DatabasePool,
}

impl LanceMemoryStore {
    pub fn new(store: LanceStore, pool: DatabasePool) -> Self {
        Self { store, pool }
    }

    /// Apply any outbox rows left over from an interrupted commit.
    ///
    /// Call once at startup, before the first extraction runs. Returns the
    /// number of rows drained.
    pub async fn recover(&self) -> Result<u64, RepositoryError> {
        let applied = self.drain_outbox().await?;
        if !applied.is_empty() {
            tracing::info!(rows = applied.len(), "recovered staged memory writes");
        }
        Ok(applied.len() as u64)
    }

    async fn drain_outbox(&self) -> Result<Vec<(i64, Applied)>, RepositoryError> {
        let rows = outbox::load_rows(&self.pool).await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let table = self.store.ensure_memories_table().await?;
        let mut applied = Vec::with_capacity(rows.len());
        for row in rows {
            let row_id = row.id;
            let outcome = self.apply_row(&table, row).await?;
            outbox::delete_row(&self.pool, row_id).await?;
            applied.push((row_id, outcome));
        }
        Ok(applied)
    }

    async fn apply_row(&self, table: &Table, row: OutboxRow) -> Result<Applied, RepositoryError> {
        if row.embedding.len() != self.store.dimension() {
            return Err(RepositoryError::Query(format!(
                "staged embedding dimension {} does not match store dimension {}",
                row.embedding.len(),
                self.store.dimension()
            )));
        }

        match row.op.as_str() {
            "ADD" => {
                let action: MemoryAction = row
                    .action
                    .parse()
                    .map_err(|e: String| RepositoryError::Query(e))?;
                let record = MemoryRecord {
                    id: row.id,
                    user_id: row.user_id,
                    content: row.content,
                    prev_content: None,
                    category: row.category,
                    importance: row.importance,
                    confidence: row.confidence,
                    action,
                    created_at: row.created_at,
                    updated_at: row.created_at,
                };
                self.replace_row(table, &record, &row.embedding).await?;
                Ok(Applied::Added)
            }
            "UPDATE" => {
                let target_id = row.memory_id.ok_or_else(|| {
                    RepositoryError::Query("UPDATE outbox row without memory_id".to_string())
                })?;
                let Some(mut record) = self.fetch_by_id(table, target_id).await? else {
                    tracing::warn!(
                        memory_id = target_id,
                        "staged UPDATE targets a missing memory; skipped"
                    );
                    return Ok(Applied::Skipped);
                };
                record.content = row.content;
                record.prev_content = row.prev_content;
                record.action = MemoryAction::Update;
                record.updated_at = row.created_at;
                self.replace_row(table, &record, &row.embedding).await?;
                Ok(Applied::Updated)
            }
            other => Err(RepositoryError::Query(format!(
                "unknown outbox op: '{other}'"
            ))),
        }
    }

    /// Delete-then-insert keyed by id, so re-application converges.
    async fn replace_row(
        &self,
        table: &Table,
        record: &MemoryRecord,
        embedding: &[f32],
    ) -> Result<(), RepositoryError> {
        table
            .delete(&format!("id = {}", record.id))
            .await
            .map_err(|e| RepositoryError::Query(format!("failed to delete memory row: {e}")))?;

        let batch = self.build_record_batch(record, embedding)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RepositoryError::Query(format!("failed to add memory row: {e}")))?;
        Ok(())
    }

    async fn fetch_by_id(
        &self,
        table: &Table,
        id: i64,
    ) -> Result<Option<MemoryRecord>, RepositoryError> {
        let results = table
            .query()
            .only_if(format!("id = {id}"))
            .execute()
            .await
            .map_err(|e| RepositoryError::Query(format!("memory lookup failed: {e}")))?;
        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| RepositoryError::Query(format!("failed to collect lookup: {e}")))?;

        for batch in &batches {
            let mut records = record_batch_to_records(batch)?;
            if !records.is_empty() {
                return Ok(Some(records.remove(0)));
            }
        }
        Ok(None)
    }

    fn build_record_batch(
        &self,
        record: &MemoryRecord,
        embedding: &[f32],
    ) -> Result<RecordBatch, RepositoryError> {
        let schema = Arc::new(memory_schema(self.store.dimension() as i32));

        let id_array = Int64Array::from(vec![record.id]);
        let user_id_array = StringArray::from(vec![record.user_id.clone()]);
        let content_array = StringArray::from(vec![record.content.clone()]);
        let prev_content_array = StringArray::from(vec![record.prev_content.clone()]);
        let category_array = StringArray::from(vec![record.category.clone()]);
        let importance_array = Float32Array::from(vec![record.importance]);
        let confidence_array = Float32Array::from(vec![record.confidence]);
        let action_array = StringArray::from(vec![record.action.to_string()]);
        let created_at_array = StringArray::from(vec![record.created_at.to_rfc3339()]);
        let updated_at_array = StringArray::from(vec![record.updated_at.to_rfc3339()]);

        let values = Float32Array::from(embedding.to_vec());
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vector_array = FixedSizeListArray::new(
            field,
            self.store.dimension() as i32,
            Arc::new(values),
            None,
        );

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(id_array),
                Arc::new(user_id_array),
                Arc::new(content_array),
                Arc::new(prev_content_array),
                Arc::new(category_array),
                Arc::new(importance_array),
                Arc::new(confidence_array),
                Arc::new(action_array),
                Arc::new(created_at_array),
                Arc::new(updated_at_array),
                Arc::new(vector_array),
            ],
        )
        .map_err(|e| RepositoryError::Query(format!("failed to build record batch: {e}")))
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<(), RepositoryError> {
        if embedding.len() != self.store.dimension() {
            return Err(RepositoryError::Query(format!(
                "embedding dimension {} does not match store dimension {}",
                embedding.len(),
                self.store.dimension()
            )));
        }
        Ok(())
    }
}

/// Escape a user id for inclusion in a Lance SQL filter literal.
fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Parse record batch rows back into domain records (vector column skipped).
fn record_batch_to_records(batch: &RecordBatch) -> Result<Vec<MemoryRecord>, RepositoryError> {
    let num_rows = batch.num_rows();
    if num_rows == 0 {
        return Ok(Vec::new());
    }

    fn string_col<'a>(
        batch: &'a RecordBatch,
        name: &str,
    ) -> Result<&'a StringArray, RepositoryError> {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| RepositoryError::Query(format!("missing column '{name}'")))
    }

    fn f32_col<'a>(
        batch: &'a RecordBatch,
        name: &str,
    ) -> Result<&'a Float32Array, RepositoryError> {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
            .ok_or_else(|| RepositoryError::Query(format!("missing column '{name}'")))
    }

    let id_col = batch
        .column_by_name("id")
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| RepositoryError::Query("missing column 'id'".to_string()))?;
    let user_id_col = string_col(batch, "user_id")?;
    let content_col = string_col(batch, "content")?;
    let prev_content_col = string_col(batch, "prev_content")?;
    let category_col = string_col(batch, "category")?;
    let importance_col = f32_col(batch, "importance")?;
    let confidence_col = f32_col(batch, "confidence")?;
    let action_col = string_col(batch, "action")?;
    let created_at_col = string_col(batch, "created_at")?;
    let updated_at_col = string_col(batch, "updated_at")?;

    let mut records = Vec::with_capacity(num_rows);
    for i in 0..num_rows {
        let action: MemoryAction = action_col
            .value(i)
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let prev_content = if prev_content_col.is_null(i) {
            None
        } else {
            Some(prev_content_col.value(i).to_string())
        };
        records.push(MemoryRecord {
            id: id_col.value(i),
            user_id: user_id_col.value(i).to_string(),
            content: content_col.value(i).to_string(),
            prev_content,
            category: category_col.value(i).to_string(),
            importance: importance_col.value(i),
            confidence: confidence_col.value(i),
            action,
            created_at: parse_timestamp(created_at_col.value(i)),
            updated_at: parse_timestamp(updated_at_col.value(i)),
        });
    }
    Ok(records)
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl MemoryStore for LanceMemoryStore {
    async fn insert(&self, memory: &NewMemory) -> Result<MemoryRecord, RepositoryError> {
        self.check_dimension(&memory.embedding)?;
        let staged_id = outbox::stage_insert(&self.pool, memory).await?;
        self.drain_outbox().await?;

        let table = self.store.ensure_memories_table().await?;
        self.fetch_by_id(&table, staged_id)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    async fn update(&self, id: i64, patch: &MemoryPatch) -> Result<MemoryRecord, RepositoryError> {
        self.check_dimension(&patch.embedding)?;
        let table = self.store.ensure_memories_table().await?;
        let mut record = self
            .fetch_by_id(&table, id)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        record.content = patch.content.clone();
        record.prev_content = patch.prev_content.clone();
        record.action = patch.action;
        record.updated_at = Utc::now();
        self.replace_row(&table, &record, &patch.embedding).await?;
        Ok(record)
    }

    async fn search(
        &self,
        embedding: &[f32],
        opts: &SearchOptions,
    ) -> Result<Vec<ScoredMemory>, RepositoryError> {
        if opts.top_k == 0 {
            return Ok(Vec::new());
        }
        self.check_dimension(embedding)?;
        let table = self.store.ensure_memories_table().await?;

        // Over-fetch to leave headroom for the similarity floor.
        let results = table
            .vector_search(embedding)
            .map_err(|e| RepositoryError::Query(format!("vector search setup failed: {e}")))?
            .distance_type(lancedb::DistanceType::Cosine)
            .only_if(format!("user_id = '{}'", escape_literal(&opts.user_id)))
            .limit(opts.top_k * 4)
            .execute()
            .await
            .map_err(|e| RepositoryError::Query(format!("vector search failed: {e}")))?;

        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| RepositoryError::Query(format!("failed to collect results: {e}")))?;

        let mut scored: Vec<ScoredMemory> = Vec::new();
        for batch in &batches {
            if batch.num_rows() == 0 {
                continue;
            }
            let distance_col = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>());
            let records = record_batch_to_records(batch)?;
            for (i, record) in records.into_iter().enumerate() {
                let distance = distance_col.map_or(0.0, |d| d.value(i));
                let similarity = 1.0 - distance;
                if similarity > opts.min_similarity {
                    scored.push(ScoredMemory { record, similarity });
                }
            }
        }

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(opts.top_k);
        Ok(scored)
    }

    async fn bulk_search(
        &self,
        embeddings: &[Vec<f32>],
        opts: &SearchOptions,
    ) -> Result<Vec<Vec<ScoredMemory>>, RepositoryError> {
        futures_util::future::try_join_all(
            embeddings.iter().map(|embedding| self.search(embedding, opts)),
        )
        .await
    }

    async fn commit(
        &self,
        user_id: &str,
        plan: &DecisionPlan,
        message_ids: &[i64],
    ) -> Result<CommitStats, RepositoryError> {
        for write in &plan.writes {
            let embedding = plan.embeddings.get(write.text()).ok_or_else(|| {
                RepositoryError::Query("missing embedding for staged write".to_string())
            })?;
            self.check_dimension(embedding)?;
        }

        // The SQLite transaction is the commit point: staged writes and flag
        // flips land together or not at all. A drain failure afterwards
        // leaves the rows staged; the next commit (or recover) re-drains.
        let staged_ids = outbox::stage_commit(&self.pool, user_id, plan, message_ids).await?;
        let applied = self.drain_outbox().await?;

        let mut stats = CommitStats::default();
        for (row_id, outcome) in applied {
            if !staged_ids.contains(&row_id) {
                continue;
            }
            match outcome {
                Applied::Added => stats.added += 1,
                Applied::Updated => stats.updated += 1,
                Applied::Skipped => {}
            }
        }
        Ok(stats)
    }

    fn dimension(&self) -> usize {
        self.store.dimension()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemon_core::repository::message::MessageRepository;
    use mnemon_types::message::ContentType;
    use serde_json::json;
    use std::collections::HashMap;

    use crate::sqlite::SqliteMessageRepository;

    const DIM: usize = 4;

    async fn setup() -> (LanceMemoryStore, SqliteMessageRepository, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = DatabasePool::new(&url).await.unwrap();
        let lance = LanceStore::connect(&dir.path().join("vectors"), DIM)
            .await
            .unwrap();
        (
            LanceMemoryStore::new(lance, pool.clone()),
            SqliteMessageRepository::new(pool),
            dir,
        )
    }

    fn unit(x: f32, y: f32, z: f32, w: f32) -> Vec<f32> {
        let v = vec![x, y, z, w];
        let norm: f32 = v.iter().map(|a| a * a).sum::<f32>().sqrt();
        v.into_iter().map(|a| a / norm).collect()
    }

    fn new_memory(user_id: &str, content: &str, embedding: Vec<f32>) -> NewMemory {
        NewMemory {
            user_id: user_id.to_string(),
            content: content.to_string(),
            embedding,
            category: "fact".to_string(),
            importance: 0.7,
            confidence: 0.9,
            action: MemoryAction::Add,
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_monotonic_ids() {
        let (store, _repo, _dir) = setup().await;

        let first = store
            .insert(&new_memory("u1", "first", unit(1.0, 0.0, 0.0, 0.0)))
            .await
            .unwrap();
        let second = store
            .insert(&new_memory("u1", "second", unit(0.0, 1.0, 0.0, 0.0)))
            .await
            .unwrap();

        assert!(second.id > first.id);
        assert_eq!(first.content, "first");
        assert_eq!(first.action, MemoryAction::Add);
        assert!(first.prev_content.is_none());
    }

    #[tokio::test]
    async fn test_insert_rejects_wrong_dimension() {
        let (store, _repo, _dir) = setup().await;
        let result = store
            .insert(&new_memory("u1", "bad", vec![1.0, 0.0]))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_search_orders_and_filters_by_similarity() {
        let (store, _repo, _dir) = setup().await;
        let query = unit(1.0, 0.0, 0.0, 0.0);

        store
            .insert(&new_memory("u1", "exact", unit(1.0, 0.0, 0.0, 0.0)))
            .await
            .unwrap();
        store
            .insert(&new_memory("u1", "close", unit(0.9, 0.435, 0.0, 0.0)))
            .await
            .unwrap();
        store
            .insert(&new_memory("u1", "mid", unit(0.5, 0.866, 0.0, 0.0)))
            .await
            .unwrap();
        store
            .insert(&new_memory("u1", "orthogonal", unit(0.0, 1.0, 0.0, 0.0)))
            .await
            .unwrap();

        let opts = SearchOptions {
            user_id: "u1".to_string(),
            top_k: 10,
            min_similarity: 0.4,
        };
        let hits = store.search(&query, &opts).await.unwrap();

        let contents: Vec<&str> = hits.iter().map(|h| h.record.content.as_str()).collect();
        assert_eq!(contents, vec!["exact", "close", "mid"]);
        for window in hits.windows(2) {
            assert!(window[0].similarity >= window[1].similarity);
        }
        for hit in &hits {
            assert!(hit.similarity > 0.4);
        }
    }

    #[tokio::test]
    async fn test_search_top_k_truncates() {
        let (store, _repo, _dir) = setup().await;
        for i in 0..6 {
            let angle = i as f32 * 0.1;
            store
                .insert(&new_memory(
                    "u1",
                    &format!("memory {i}"),
                    unit(angle.cos(), angle.sin(), 0.0, 0.0),
                ))
                .await
                .unwrap();
        }

        let opts = SearchOptions {
            user_id: "u1".to_string(),
            top_k: 2,
            min_similarity: 0.0,
        };
        let hits = store
            .search(&unit(1.0, 0.0, 0.0, 0.0), &opts)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_search_top_k_zero_returns_empty() {
        let (store, _repo, _dir) = setup().await;
        store
            .insert(&new_memory("u1", "anything", unit(1.0, 0.0, 0.0, 0.0)))
            .await
            .unwrap();

        let opts = SearchOptions {
            user_id: "u1".to_string(),
            top_k: 0,
            min_similarity: 0.0,
        };
        let hits = store
            .search(&unit(1.0, 0.0, 0.0, 0.0), &opts)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_search_scopes_by_user() {
        let (store, _repo, _dir) = setup().await;
        let embedding = unit(1.0, 0.0, 0.0, 0.0);
        store
            .insert(&new_memory("u1", "mine", embedding.clone()))
            .await
            .unwrap();
        store
            .insert(&new_memory("u2", "theirs", embedding.clone()))
            .await
            .unwrap();

        let opts = SearchOptions {
            user_id: "u1".to_string(),
            top_k: 10,
            min_similarity: 0.0,
        };
        let hits = store.search(&embedding, &opts).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.content, "mine");
    }

    #[tokio::test]
    async fn test_bulk_search_preserves_input_order() {
        let (store, _repo, _dir) = setup().await;
        store
            .insert(&new_memory("u1", "x axis", unit(1.0, 0.0, 0.0, 0.0)))
            .await
            .unwrap();
        store
            .insert(&new_memory("u1", "y axis", unit(0.0, 1.0, 0.0, 0.0)))
            .await
            .unwrap();

        let queries = vec![unit(0.0, 1.0, 0.0, 0.0), unit(1.0, 0.0, 0.0, 0.0)];
        let opts = SearchOptions {
            user_id: "u1".to_string(),
            top_k: 1,
            min_similarity: 0.5,
        };
        let results = store.bulk_search(&queries, &opts).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0][0].record.content, "y axis");
        assert_eq!(results[1][0].record.content, "x axis");
    }

    #[tokio::test]
    async fn test_update_replaces_fields() {
        let (store, _repo, _dir) = setup().await;
        let record = store
            .insert(&new_memory("u1", "lives in Portland", unit(1.0, 0.0, 0.0, 0.0)))
            .await
            .unwrap();

        let patch = MemoryPatch {
            content: "lives in Seattle".to_string(),
            prev_content: Some("lives in Portland".to_string()),
            embedding: unit(0.0, 1.0, 0.0, 0.0),
            action: MemoryAction::Update,
        };
        let updated = store.update(record.id, &patch).await.unwrap();

        assert_eq!(updated.id, record.id);
        assert_eq!(updated.content, "lives in Seattle");
        assert_eq!(updated.prev_content.as_deref(), Some("lives in Portland"));
        assert_eq!(updated.action, MemoryAction::Update);

        // The new embedding is live for search.
        let opts = SearchOptions {
            user_id: "u1".to_string(),
            top_k: 1,
            min_similarity: 0.9,
        };
        let hits = store
            .search(&unit(0.0, 1.0, 0.0, 0.0), &opts)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.content, "lives in Seattle");
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_not_found() {
        let (store, _repo, _dir) = setup().await;
        let patch = MemoryPatch {
            content: "x".to_string(),
            prev_content: None,
            embedding: unit(1.0, 0.0, 0.0, 0.0),
            action: MemoryAction::Update,
        };
        let result = store.update(424242, &patch).await;
        assert!(matches!(result, Err(RepositoryError::NotFound)));
    }

    #[tokio::test]
    async fn test_commit_applies_plan_and_flips_flags() {
        let (store, repo, _dir) = setup().await;
        let existing = store
            .insert(&new_memory("u1", "lives in Portland", unit(1.0, 0.0, 0.0, 0.0)))
            .await
            .unwrap();

        let story = repo.create_story("u1", None, "chat").await.unwrap();
        let m1 = repo
            .save_message(story.id, ContentType::Query, &json!({"question": "hi"}))
            .await
            .unwrap();
        let m2 = repo
            .save_message(story.id, ContentType::Response, &json!({"answer": "hello"}))
            .await
            .unwrap();

        let mut embeddings = HashMap::new();
        embeddings.insert("likes jasmine tea".to_string(), unit(0.0, 0.0, 1.0, 0.0));
        embeddings.insert("lives in Seattle".to_string(), unit(0.0, 1.0, 0.0, 0.0));
        let plan = DecisionPlan {
            writes: vec![
                mnemon_types::memory::PlannedWrite::Add {
                    text: "likes jasmine tea".to_string(),
                    category: "preference".to_string(),
                    importance: 0.6,
                    confidence: 0.9,
                },
                mnemon_types::memory::PlannedWrite::Update {
                    memory_id: existing.id,
                    text: "lives in Seattle".to_string(),
                    prev_content: "lives in Portland".to_string(),
                },
            ],
            embeddings,
        };

        let stats = store.commit("u1", &plan, &[m1.id, m2.id]).await.unwrap();
        assert_eq!(stats, CommitStats { added: 1, updated: 1 });

        // Flags flipped
        assert!(repo.load_pending("u1").await.unwrap().is_empty());

        // Update landed with prev_content
        let table = store.store.ensure_memories_table().await.unwrap();
        let updated = store
            .fetch_by_id(&table, existing.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.content, "lives in Seattle");
        assert_eq!(updated.prev_content.as_deref(), Some("lives in Portland"));
        assert_eq!(updated.action, MemoryAction::Update);

        // Outbox drained
        assert!(outbox::load_rows(&store.pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_skips_update_of_missing_target() {
        let (store, _repo, _dir) = setup().await;

        let mut embeddings = HashMap::new();
        embeddings.insert("orphan update".to_string(), unit(1.0, 0.0, 0.0, 0.0));
        let plan = DecisionPlan {
            writes: vec![mnemon_types::memory::PlannedWrite::Update {
                memory_id: 999_999,
                text: "orphan update".to_string(),
                prev_content: "whatever".to_string(),
            }],
            embeddings,
        };

        let stats = store.commit("u1", &plan, &[]).await.unwrap();
        assert_eq!(stats, CommitStats::default());
    }

    #[tokio::test]
    async fn test_recover_drains_leftover_rows() {
        let (store, _repo, _dir) = setup().await;

        // Simulate an interrupted commit: staged but never drained.
        let mut embeddings = HashMap::new();
        embeddings.insert("left behind".to_string(), unit(1.0, 0.0, 0.0, 0.0));
        let plan = DecisionPlan {
            writes: vec![mnemon_types::memory::PlannedWrite::Add {
                text: "left behind".to_string(),
                category: "fact".to_string(),
                importance: 0.5,
                confidence: 0.5,
            }],
            embeddings,
        };
        outbox::stage_commit(&store.pool, "u1", &plan, &[])
            .await
            .unwrap();

        let drained = store.recover().await.unwrap();
        assert_eq!(drained, 1);

        let opts = SearchOptions {
            user_id: "u1".to_string(),
            top_k: 5,
            min_similarity: 0.0,
        };
        let hits = store
            .search(&unit(1.0, 0.0, 0.0, 0.0), &opts)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.content, "left behind");

        // Second recover is a no-op.
        assert_eq!(store.recover().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bulk_fanout_scale() {
        let (store, _repo, _dir) = setup().await;
        for i in 0..12 {
            let angle = i as f32 * 0.5;
            store
                .insert(&new_memory(
                    "u1",
                    &format!("memory {i}"),
                    unit(angle.cos(), angle.sin(), 0.3, 0.0),
                ))
                .await
                .unwrap();
        }

        let queries: Vec<Vec<f32>> = (0..4)
            .map(|i| {
                let angle = i as f32 * 0.9;
                unit(angle.cos(), angle.sin(), 0.2, 0.0)
            })
            .collect();
        let opts = SearchOptions {
            user_id: "u1".to_string(),
            top_k: 5,
            min_similarity: 0.3,
        };
        let results = store.bulk_search(&queries, &opts).await.unwrap();

        assert_eq!(results.len(), 4);
        for list in &results {
            assert!(list.len() <= 5);
            for hit in list {
                assert!(hit.similarity > 0.3);
            }
            for window in list.windows(2) {
                assert!(window[0].similarity >= window[1].similarity);
            }
        }
    }
}
