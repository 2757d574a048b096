//! MemoryStore trait definition.
//!
//! The per-user vector index behind both extraction resolution and prompt
//! recall. Implementations live in mnemon-infra (e.g., `LanceMemoryStore`).
//! Uses native async fn in traits (RPITIT, Rust 2024 edition).

use mnemon_types::error::RepositoryError;
use mnemon_types::memory::{
    CommitStats, DecisionPlan, MemoryPatch, MemoryRecord, NewMemory, ScoredMemory, SearchOptions,
};

/// Vector-indexed memory storage with cosine top-K search.
///
/// Similarity is `1 - cosine_distance`. The index may be approximate; the
/// contract is still exact top-K within the `min_similarity` threshold.
pub trait MemoryStore: Send + Sync {
    /// Append a new memory.
    fn insert(
        &self,
        memory: &NewMemory,
    ) -> impl std::future::Future<Output = Result<MemoryRecord, RepositoryError>> + Send;

    /// Replace content, previous content, embedding, and action on an
    /// existing memory.
    fn update(
        &self,
        id: i64,
        patch: &MemoryPatch,
    ) -> impl std::future::Future<Output = Result<MemoryRecord, RepositoryError>> + Send;

    /// Return up to `top_k` memories owned by `opts.user_id` whose similarity
    /// to `embedding` strictly exceeds `opts.min_similarity`, sorted by
    /// similarity descending. An empty result is a valid success.
    fn search(
        &self,
        embedding: &[f32],
        opts: &SearchOptions,
    ) -> impl std::future::Future<Output = Result<Vec<ScoredMemory>, RepositoryError>> + Send;

    /// Fan out `search` over many query embeddings. The i-th inner list
    /// corresponds to the i-th query; results are independent (no cross-query
    /// deduplication).
    fn bulk_search(
        &self,
        embeddings: &[Vec<f32>],
        opts: &SearchOptions,
    ) -> impl std::future::Future<Output = Result<Vec<Vec<ScoredMemory>>, RepositoryError>> + Send;

    /// Apply a decision plan and flip `extracted` on every listed message,
    /// all-or-nothing. A failed commit leaves no partial state visible.
    fn commit(
        &self,
        user_id: &str,
        plan: &DecisionPlan,
        message_ids: &[i64],
    ) -> impl std::future::Future<Output = Result<CommitStats, RepositoryError>> + Send;

    /// The embedding dimension this store was created with.
    fn dimension(&self) -> usize;
}
