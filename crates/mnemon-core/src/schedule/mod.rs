//! The debounced extraction scheduler.
//!
//! A per-user deduplicated job queue that coalesces bursts of conversational
//! activity into a single background extraction with a bounded worst-case
//! latency, plus the worker pool that drains it.

pub mod rate_limit;
pub mod scheduler;

pub use scheduler::ExtractionScheduler;

use mnemon_types::error::ExtractError;
use mnemon_types::memory::ExtractionStats;

/// The port the scheduler drives: one extraction run per invocation.
///
/// Implemented by `extract::MemoryExtractor`; tests substitute counting
/// fakes. Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait Extract: Send + Sync {
    fn extract(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<ExtractionStats, ExtractError>> + Send;
}

impl<T: Extract> Extract for std::sync::Arc<T> {
    async fn extract(&self, user_id: &str) -> Result<ExtractionStats, ExtractError> {
        (**self).extract(user_id).await
    }
}
