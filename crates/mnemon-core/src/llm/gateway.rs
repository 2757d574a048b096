//! LlmGateway trait definition.
//!
//! Two operations: structured-output completion against a response schema,
//! and order-preserving batch embedding. Both are idempotent from the
//! engine's perspective; implementations may retry, cache, or batch as long
//! as the per-call contract holds. Implementations live in mnemon-infra
//! (e.g., `OpenAiGateway`).

use mnemon_types::error::GatewayError;
use mnemon_types::llm::StructuredRequest;

/// Gateway to the LLM provider for completions and embeddings.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait LlmGateway: Send + Sync {
    /// Run a structured-output completion. The returned value conforms to
    /// `request.schema`, or the call fails with
    /// [`GatewayError::InvalidResponse`]. No partial parsing.
    fn complete_json(
        &self,
        request: &StructuredRequest,
    ) -> impl std::future::Future<Output = Result<serde_json::Value, GatewayError>> + Send;

    /// Embed texts into fixed-dimension vectors, one per input, preserving
    /// input order. Empty input yields empty output without a provider call.
    fn embed(
        &self,
        texts: &[String],
    ) -> impl std::future::Future<Output = Result<Vec<Vec<f32>>, GatewayError>> + Send;

    /// The embedding model name (e.g., "text-embedding-3-small").
    fn model_name(&self) -> &str;

    /// The dimensionality of the output vectors. Must match the memory
    /// store's configured dimension.
    fn dimension(&self) -> usize;
}
