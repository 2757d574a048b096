//! Conversation persistence types: stories and their messages.
//!
//! A story is the scoping container that maps messages to an owner and
//! names the handler able to render its message content. Messages carry
//! opaque, handler-defined JSON content and an `extracted` flag that flips
//! to true exactly once, atomically with the memory writes derived from
//! the message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Whether a message is the user's turn or the assistant's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Query,
    Response,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentType::Query => write!(f, "query"),
            ContentType::Response => write!(f, "response"),
        }
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "query" => Ok(ContentType::Query),
            "response" => Ok(ContentType::Response),
            other => Err(format!("invalid content type: '{other}'")),
        }
    }
}

/// A conversation container owned by a single user.
///
/// `handler` names the registered story handler that knows how to render
/// this story's messages to plain text for fact extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub id: i64,
    pub user_id: String,
    pub name: Option<String>,
    pub handler: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A persisted conversation turn.
///
/// `content` is opaque JSON whose shape is handler-specific; parsing into
/// the handler's typed shape happens at the rendering boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub story_id: i64,
    pub content_type: ContentType,
    pub content: serde_json::Value,
    /// Set once a successful extraction transaction has consumed this message.
    pub extracted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An unextracted message joined to its story's owner and handler name.
///
/// This is the row shape the extraction pipeline loads in its first stage.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub message: StoredMessage,
    pub user_id: String,
    pub handler: String,
}
