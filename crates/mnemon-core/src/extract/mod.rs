//! The extraction pipeline: unprocessed message pairs in, committed
//! memories out.
//!
//! A run loads a user's pending messages, renders them through their story
//! handlers, asks the LLM for normalized facts, resolves each fact against
//! existing memories via vector similarity, decides ADD vs UPDATE with a
//! second LLM call, and commits the resulting plan atomically with the
//! messages' `extracted` flags.

pub mod pipeline;
pub mod prompt;
pub mod resolution;

pub use pipeline::MemoryExtractor;

/// How many candidate memories each fact is resolved against.
pub const RESOLUTION_TOP_K: usize = 3;

/// Similarity floor for a memory to count as a resolution candidate.
pub const RESOLUTION_MIN_SIMILARITY: f32 = 0.7;
