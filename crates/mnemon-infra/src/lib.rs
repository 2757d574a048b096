//! Infrastructure adapters for Mnemon.
//!
//! Implements the ports defined in `mnemon-core`: SQLite persistence for
//! stories, messages, and the memory outbox (sqlx, WAL, split read/write
//! pools), the LanceDB-backed memory store with cosine search, and the
//! OpenAI-compatible LLM gateway.

pub mod config;
pub mod llm;
pub mod sqlite;
pub mod vector;
