//! MessageRepository trait definition.
//!
//! The write side is what story handlers call after a conversation turn;
//! the read side is Stage 1 of the extraction pipeline. Implementations
//! live in mnemon-infra (e.g., `SqliteMessageRepository`).

use mnemon_types::error::RepositoryError;
use mnemon_types::message::{ContentType, PendingMessage, StoredMessage, Story};

/// Repository for stories and their conversation turns.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait MessageRepository: Send + Sync {
    /// Create a story owned by `user_id`, rendered by the named handler.
    fn create_story(
        &self,
        user_id: &str,
        name: Option<&str>,
        handler: &str,
    ) -> impl std::future::Future<Output = Result<Story, RepositoryError>> + Send;

    /// Persist one conversation turn. Messages start with `extracted = false`.
    fn save_message(
        &self,
        story_id: i64,
        content_type: ContentType,
        content: &serde_json::Value,
    ) -> impl std::future::Future<Output = Result<StoredMessage, RepositoryError>> + Send;

    /// Every unextracted message across the user's stories, joined to its
    /// story's handler name, ordered by `created_at` ascending.
    fn load_pending(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<PendingMessage>, RepositoryError>> + Send;

    /// All messages of one story, ordered by `created_at` ascending.
    fn messages_for_story(
        &self,
        story_id: i64,
    ) -> impl std::future::Future<Output = Result<Vec<StoredMessage>, RepositoryError>> + Send;
}
