//! Prompt memory recall.
//!
//! The single read path from a free-text cue to a formatted prompt section.
//! Handlers are forbidden from touching the store directly; every recall
//! goes through this formatting contract so the LLM sees consistent memory
//! sections regardless of the calling handler. Recall absorbs all failures
//! into sentinel strings and never propagates an error into a handler.

use mnemon_types::memory::{ScoredMemory, SearchOptions};

use crate::llm::gateway::LlmGateway;
use crate::memory::store::MemoryStore;

/// Returned when the search succeeds but yields nothing.
pub const NO_MEMORIES: &str = "(No relevant memories found)";

/// Returned when embedding or search fails.
pub const MEMORIES_UNAVAILABLE: &str = "(Unable to load memories)";

/// Ranking bounds for one recall.
#[derive(Debug, Clone)]
pub struct RecallOptions {
    pub top_k: usize,
    pub min_similarity: f32,
}

impl Default for RecallOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_similarity: 0.3,
        }
    }
}

/// Read-side recall over the memory store.
pub struct MemoryRecall<S, G> {
    store: S,
    gateway: G,
}

impl<S, G> MemoryRecall<S, G>
where
    S: MemoryStore,
    G: LlmGateway,
{
    pub fn new(store: S, gateway: G) -> Self {
        Self { store, gateway }
    }

    /// Return the top-K memories relevant to `cue`, formatted for a prompt
    /// section: one memory per line, `- ` prefix, metadata in brackets.
    ///
    /// Depends only on the committed store state and the cue; failures are
    /// logged and mapped to [`MEMORIES_UNAVAILABLE`].
    pub async fn recall(&self, user_id: &str, cue: &str, opts: &RecallOptions) -> String {
        let cue_texts = [cue.to_string()];
        let embedding = match self.gateway.embed(&cue_texts).await {
            Ok(mut vectors) if !vectors.is_empty() => vectors.remove(0),
            Ok(_) => {
                tracing::warn!(user_id, "embedding returned no vector for recall cue");
                return MEMORIES_UNAVAILABLE.to_string();
            }
            Err(err) => {
                tracing::warn!(user_id, error = %err, "recall cue embedding failed");
                return MEMORIES_UNAVAILABLE.to_string();
            }
        };

        let search_opts = SearchOptions {
            user_id: user_id.to_string(),
            top_k: opts.top_k,
            min_similarity: opts.min_similarity,
        };
        let hits = match self.store.search(&embedding, &search_opts).await {
            Ok(hits) => hits,
            Err(err) => {
                tracing::warn!(user_id, error = %err, "recall search failed");
                return MEMORIES_UNAVAILABLE.to_string();
            }
        };

        if hits.is_empty() {
            return NO_MEMORIES.to_string();
        }
        format_memories(&hits)
    }
}

fn format_memories(hits: &[ScoredMemory]) -> String {
    hits.iter()
        .map(|hit| {
            format!(
                "- {} [{}, importance: {:.2}, confidence: {:.2}]",
                hit.record.content, hit.record.category, hit.record.importance,
                hit.record.confidence
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackend, ScriptedGateway};
    use mnemon_types::memory::{MemoryAction, NewMemory};

    const DIM: usize = 32;

    fn new_memory(user_id: &str, content: &str, embedding: Vec<f32>) -> NewMemory {
        NewMemory {
            user_id: user_id.to_string(),
            content: content.to_string(),
            embedding,
            category: "preference".to_string(),
            importance: 0.75,
            confidence: 0.9,
            action: MemoryAction::Add,
        }
    }

    #[tokio::test]
    async fn test_recall_formats_hits() {
        let backend = FakeBackend::new(DIM);
        let gateway = ScriptedGateway::new(DIM);
        let embedding = crate::testing::text_embedding("tea preferences", DIM);
        backend
            .insert(&new_memory("u1", "User prefers jasmine tea", embedding))
            .await
            .unwrap();

        let recall = MemoryRecall::new(backend, gateway);
        let section = recall
            .recall(
                "u1",
                "tea preferences",
                &RecallOptions {
                    top_k: 5,
                    min_similarity: 0.5,
                },
            )
            .await;

        assert_eq!(
            section,
            "- User prefers jasmine tea [preference, importance: 0.75, confidence: 0.90]"
        );
    }

    #[tokio::test]
    async fn test_recall_orders_by_similarity() {
        let backend = FakeBackend::new(DIM);
        let gateway = ScriptedGateway::new(DIM);
        let cue_embedding = crate::testing::text_embedding("cats", DIM);

        // Exact-cue embedding scores 1.0; a slightly perturbed copy scores lower.
        let mut near = cue_embedding.clone();
        near[0] += 0.4;
        backend
            .insert(&new_memory("u1", "Close match", near))
            .await
            .unwrap();
        backend
            .insert(&new_memory("u1", "Exact match", cue_embedding))
            .await
            .unwrap();

        let recall = MemoryRecall::new(backend, gateway);
        let section = recall
            .recall(
                "u1",
                "cats",
                &RecallOptions {
                    top_k: 5,
                    min_similarity: 0.1,
                },
            )
            .await;

        let lines: Vec<&str> = section.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("- Exact match"));
        assert!(lines[1].starts_with("- Close match"));
    }

    #[tokio::test]
    async fn test_recall_no_hits_sentinel() {
        let backend = FakeBackend::new(DIM);
        let gateway = ScriptedGateway::new(DIM);
        let recall = MemoryRecall::new(backend, gateway);
        let section = recall.recall("u1", "anything", &RecallOptions::default()).await;
        assert_eq!(section, NO_MEMORIES);
    }

    #[tokio::test]
    async fn test_recall_respects_user_scope() {
        let backend = FakeBackend::new(DIM);
        let gateway = ScriptedGateway::new(DIM);
        let embedding = crate::testing::text_embedding("secret", DIM);
        backend
            .insert(&new_memory("other-user", "Other user's memory", embedding))
            .await
            .unwrap();

        let recall = MemoryRecall::new(backend, gateway);
        let section = recall.recall("u1", "secret", &RecallOptions::default()).await;
        assert_eq!(section, NO_MEMORIES);
    }

    #[tokio::test]
    async fn test_recall_embedding_failure_is_absorbed() {
        let backend = FakeBackend::new(DIM);
        let gateway = ScriptedGateway::new(DIM);
        gateway.fail_embeddings();

        let recall = MemoryRecall::new(backend, gateway);
        let section = recall.recall("u1", "anything", &RecallOptions::default()).await;
        assert_eq!(section, MEMORIES_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_recall_top_k_zero_is_empty() {
        let backend = FakeBackend::new(DIM);
        let gateway = ScriptedGateway::new(DIM);
        let embedding = crate::testing::text_embedding("tea", DIM);
        backend
            .insert(&new_memory("u1", "User prefers tea", embedding))
            .await
            .unwrap();

        let recall = MemoryRecall::new(backend, gateway);
        let section = recall
            .recall(
                "u1",
                "tea",
                &RecallOptions {
                    top_k: 0,
                    min_similarity: 0.0,
                },
            )
            .await;
        assert_eq!(section, NO_MEMORIES);
    }
}
