//! The staged extraction pipeline.
//!
//! Strict stage order; every stage boundary is a suspension point. Failure
//! before the commit stage aborts the run with no side effects, and the
//! `extracted` flag makes a re-run of the same batch a no-op, so the
//! scheduler can retry freely.

use std::sync::Arc;

use chrono::Utc;

use mnemon_types::error::{ExtractError, GatewayError};
use mnemon_types::llm::{FactRetrieval, MemoryUpdate};
use mnemon_types::memory::{DecisionPlan, ExtractionStats, Fact, SearchOptions};

use crate::handler::HandlerRegistry;
use crate::llm::gateway::LlmGateway;
use crate::memory::store::MemoryStore;
use crate::repository::message::MessageRepository;

use super::{prompt, resolution, RESOLUTION_MIN_SIMILARITY, RESOLUTION_TOP_K};

/// Runs extractions for one deployment.
///
/// Generic over the three ports so mnemon-core never depends on
/// mnemon-infra; share it across workers behind an `Arc`.
pub struct MemoryExtractor<R, S, G> {
    repo: R,
    store: S,
    gateway: G,
    registry: Arc<HandlerRegistry>,
}

impl<R, S, G> MemoryExtractor<R, S, G>
where
    R: MessageRepository,
    S: MemoryStore,
    G: LlmGateway,
{
    pub fn new(repo: R, store: S, gateway: G, registry: Arc<HandlerRegistry>) -> Self {
        Self {
            repo,
            store,
            gateway,
            registry,
        }
    }

    /// Run one extraction for `user_id`.
    ///
    /// Returns the batch statistics; `messages_extracted` always reflects
    /// the entire consumed batch, regardless of dropped renderings or
    /// dropped decisions.
    #[tracing::instrument(name = "extract_memories", skip(self), fields(user_id = %user_id))]
    pub async fn extract(&self, user_id: &str) -> Result<ExtractionStats, ExtractError> {
        // Stage 1: load pending messages, oldest first.
        let pending = self.repo.load_pending(user_id).await?;
        if pending.is_empty() {
            return Ok(ExtractionStats::default());
        }
        let message_ids: Vec<i64> = pending.iter().map(|p| p.message.id).collect();

        // Stage 2: render through story handlers. An unregistered handler is
        // fatal for the batch; a schema-mismatched message is only dropped
        // from the rendering and still gets consumed below.
        let mut lines = Vec::with_capacity(pending.len());
        for item in &pending {
            let handler = self
                .registry
                .get(&item.handler)
                .ok_or_else(|| ExtractError::UnknownHandler(item.handler.clone()))?;
            match handler.message_to_string(&item.message) {
                Some(line) => lines.push(line),
                None => tracing::debug!(
                    message_id = item.message.id,
                    handler = %item.handler,
                    "message content failed handler schema; dropped from rendering"
                ),
            }
        }

        if lines.is_empty() {
            return self.finish(user_id, &DecisionPlan::default(), &message_ids, 0).await;
        }

        let conversation = lines.join("\n\n");
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let request = prompt::fact_retrieval_request(&conversation, &today);
        let value = self.gateway.complete_json(&request).await?;
        let retrieval: FactRetrieval = serde_json::from_value(value)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        let facts: Vec<Fact> = retrieval
            .facts
            .into_iter()
            .map(|mut f| {
                f.text = f.text.trim().to_string();
                f.clamped()
            })
            .filter(|f| !f.text.is_empty())
            .collect();

        tracing::debug!(fact_count = facts.len(), "facts retrieved");
        if facts.is_empty() {
            return self.finish(user_id, &DecisionPlan::default(), &message_ids, 0).await;
        }

        // Stage 3: embed fact texts, aligned by index.
        let texts: Vec<String> = facts.iter().map(|f| f.text.clone()).collect();
        let fact_embeddings = self.embed_checked(&texts).await?;

        // Stage 4: resolution context from bulk similarity search.
        let opts = SearchOptions {
            user_id: user_id.to_string(),
            top_k: RESOLUTION_TOP_K,
            min_similarity: RESOLUTION_MIN_SIMILARITY,
        };
        let results = self.store.bulk_search(&fact_embeddings, &opts).await?;
        let context = resolution::ResolutionContext::build(results, facts.len());

        // Stage 5: decide ADD vs UPDATE over the unified id namespace.
        let request = prompt::memory_update_request(
            &context.render_memories(),
            &context.render_facts(&facts),
        );
        let value = self.gateway.complete_json(&request).await?;
        let update: MemoryUpdate = serde_json::from_value(value)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        let (mut plan, to_embed) =
            resolution::build_decision_plan(&context, &facts, &fact_embeddings, &update.memory);
        if !to_embed.is_empty() {
            let embeddings = self.embed_checked(&to_embed).await?;
            for (text, embedding) in to_embed.into_iter().zip(embeddings) {
                plan.embeddings.insert(text, embedding);
            }
        }

        // Stage 6: commit atomically with the extracted-flag flips.
        self.finish(user_id, &plan, &message_ids, facts.len() as u64).await
    }

    /// Embed texts and verify count and dimension against the store.
    async fn embed_checked(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ExtractError> {
        let embeddings = self.gateway.embed(texts).await?;
        if embeddings.len() != texts.len() {
            return Err(GatewayError::InvalidResponse(format!(
                "embedding count {} does not match input count {}",
                embeddings.len(),
                texts.len()
            ))
            .into());
        }
        let expected = self.store.dimension();
        for embedding in &embeddings {
            if embedding.len() != expected {
                return Err(ExtractError::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                });
            }
        }
        Ok(embeddings)
    }

    async fn finish(
        &self,
        user_id: &str,
        plan: &DecisionPlan,
        message_ids: &[i64],
        facts_extracted: u64,
    ) -> Result<ExtractionStats, ExtractError> {
        let commit = self.store.commit(user_id, plan, message_ids).await?;
        let stats = ExtractionStats {
            facts_extracted,
            memories_added: commit.added,
            memories_updated: commit.updated,
            messages_extracted: message_ids.len() as u64,
        };
        tracing::info!(
            facts = stats.facts_extracted,
            added = stats.memories_added,
            updated = stats.memories_updated,
            messages = stats.messages_extracted,
            "extraction committed"
        );
        Ok(stats)
    }
}

impl<R, S, G> crate::schedule::Extract for MemoryExtractor<R, S, G>
where
    R: MessageRepository + 'static,
    S: MemoryStore + 'static,
    G: LlmGateway + 'static,
{
    async fn extract(&self, user_id: &str) -> Result<ExtractionStats, ExtractError> {
        MemoryExtractor::extract(self, user_id).await
    }
}
