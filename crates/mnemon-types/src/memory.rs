//! Memory types for Mnemon.
//!
//! A memory is a persistent, embedded fact with an owner and a lifecycle
//! (ADD, then any number of UPDATEs). These types also cover the in-memory
//! shapes one extraction run passes between its stages: extracted facts,
//! the resolved decision plan, and the run statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// The last write operation that produced a memory row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MemoryAction {
    Add,
    Update,
    Delete,
}

impl fmt::Display for MemoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryAction::Add => write!(f, "ADD"),
            MemoryAction::Update => write!(f, "UPDATE"),
            MemoryAction::Delete => write!(f, "DELETE"),
        }
    }
}

impl FromStr for MemoryAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ADD" => Ok(MemoryAction::Add),
            "UPDATE" => Ok(MemoryAction::Update),
            "DELETE" => Ok(MemoryAction::Delete),
            other => Err(format!("invalid memory action: '{other}'")),
        }
    }
}

/// A persisted memory owned by a single user.
///
/// Invariants: the embedding stored alongside this record is the embedding
/// of `content` as of the last write, and on UPDATE `prev_content` holds the
/// replaced `content`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: i64,
    pub user_id: String,
    pub content: String,
    /// Last value of `content` before the most recent UPDATE.
    pub prev_content: Option<String>,
    /// Free-form tag assigned at fact extraction time.
    pub category: String,
    /// Importance score in [0, 1].
    pub importance: f32,
    /// Confidence score in [0, 1].
    pub confidence: f32,
    pub action: MemoryAction,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A memory with its cosine similarity to a query embedding.
///
/// `similarity = 1 - cosine_distance`.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub record: MemoryRecord,
    pub similarity: f32,
}

/// Arguments for inserting a new memory.
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub user_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub category: String,
    pub importance: f32,
    pub confidence: f32,
    pub action: MemoryAction,
}

/// Arguments for replacing fields on an existing memory.
#[derive(Debug, Clone)]
pub struct MemoryPatch {
    pub content: String,
    pub prev_content: Option<String>,
    pub embedding: Vec<f32>,
    pub action: MemoryAction,
}

/// Owner scope and ranking bounds for a similarity search.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub user_id: String,
    pub top_k: usize,
    /// Results must score strictly above this similarity.
    pub min_similarity: f32,
}

/// A normalized declarative statement extracted from a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub text: String,
    pub category: String,
    pub importance: f32,
    pub confidence: f32,
}

impl Fact {
    /// Clamp importance and confidence into [0, 1].
    pub fn clamped(mut self) -> Self {
        self.importance = self.importance.clamp(0.0, 1.0);
        self.confidence = self.confidence.clamp(0.0, 1.0);
        self
    }
}

/// One resolved write from the decision stage.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedWrite {
    /// Insert a brand-new memory carrying the source fact's metadata.
    Add {
        text: String,
        category: String,
        importance: f32,
        confidence: f32,
    },
    /// Refine an existing memory. `prev_content` is the target's content as
    /// observed during resolution.
    Update {
        memory_id: i64,
        text: String,
        prev_content: String,
    },
}

impl PlannedWrite {
    /// The text whose embedding this write needs.
    pub fn text(&self) -> &str {
        match self {
            PlannedWrite::Add { text, .. } => text,
            PlannedWrite::Update { text, .. } => text,
        }
    }
}

/// The output of the decision stage: resolved writes plus a text-to-embedding
/// map sized to exactly the texts the writes reference.
#[derive(Debug, Clone, Default)]
pub struct DecisionPlan {
    pub writes: Vec<PlannedWrite>,
    pub embeddings: HashMap<String, Vec<f32>>,
}

impl DecisionPlan {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Row counts from a committed decision plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitStats {
    pub added: u64,
    pub updated: u64,
}

/// Statistics returned by one extraction run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub facts_extracted: u64,
    pub memories_added: u64,
    pub memories_updated: u64,
    /// Size of the entire consumed batch, regardless of dropped decisions.
    pub messages_extracted: u64,
}

/// Observable lifecycle of a per-user extraction job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Waiting out the debounce window.
    Delayed,
    /// Timer fired (or the job was promoted); queued for a worker.
    Waiting,
    /// A worker is running the extraction.
    Active,
    Completed,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Delayed => write!(f, "delayed"),
            JobState::Waiting => write!(f, "waiting"),
            JobState::Active => write!(f, "active"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}
