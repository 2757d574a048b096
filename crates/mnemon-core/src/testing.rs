//! In-memory fakes shared by the crate's unit tests.
//!
//! `FakeBackend` implements both `MessageRepository` and `MemoryStore` over
//! one shared state so commit semantics (memory writes + extracted-flag
//! flips) can be asserted end to end. `ScriptedGateway` replays queued
//! completion payloads and produces deterministic text embeddings.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use mnemon_types::error::{GatewayError, RepositoryError};
use mnemon_types::llm::StructuredRequest;
use mnemon_types::memory::{
    CommitStats, DecisionPlan, MemoryAction, MemoryPatch, MemoryRecord, NewMemory, PlannedWrite,
    ScoredMemory, SearchOptions,
};
use mnemon_types::message::{ContentType, PendingMessage, StoredMessage, Story};

use crate::llm::gateway::LlmGateway;
use crate::memory::store::MemoryStore;
use crate::repository::message::MessageRepository;

/// Deterministic pseudo-embedding: identical texts map to identical unit
/// vectors; distinct texts are near-orthogonal at reasonable dimensions.
pub fn text_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in text.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    let mut state = hash | 1;
    let mut vector = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let unit = ((state >> 33) as f32 / (1u64 << 31) as f32) - 0.5;
        vector.push(unit);
    }
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[derive(Default)]
struct BackendState {
    next_story_id: i64,
    next_message_id: i64,
    next_memory_id: i64,
    stories: Vec<Story>,
    messages: Vec<StoredMessage>,
    memories: Vec<MemoryRecord>,
    embeddings: HashMap<i64, Vec<f32>>,
    fail_commit: bool,
}

/// Shared in-memory persistence implementing both core storage ports.
#[derive(Clone)]
pub struct FakeBackend {
    state: Arc<Mutex<BackendState>>,
    dimension: usize,
}

impl FakeBackend {
    pub fn new(dimension: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(BackendState::default())),
            dimension,
        }
    }

    /// Insert a memory directly, embedding its content deterministically.
    pub fn seed_memory(
        &self,
        user_id: &str,
        content: &str,
        category: &str,
        importance: f32,
        confidence: f32,
    ) -> i64 {
        let mut state = self.state.lock().unwrap();
        state.next_memory_id += 1;
        let id = state.next_memory_id;
        let now = Utc::now();
        state.memories.push(MemoryRecord {
            id,
            user_id: user_id.to_string(),
            content: content.to_string(),
            prev_content: None,
            category: category.to_string(),
            importance,
            confidence,
            action: MemoryAction::Add,
            created_at: now,
            updated_at: now,
        });
        state
            .embeddings
            .insert(id, text_embedding(content, self.dimension));
        id
    }

    pub fn memories_for(&self, user_id: &str) -> Vec<MemoryRecord> {
        self.state
            .lock()
            .unwrap()
            .memories
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn embedding_of(&self, memory_id: i64) -> Option<Vec<f32>> {
        self.state.lock().unwrap().embeddings.get(&memory_id).cloned()
    }

    /// True when every message across the user's stories is extracted.
    pub fn all_extracted(&self, user_id: &str) -> bool {
        let state = self.state.lock().unwrap();
        let story_ids: Vec<i64> = state
            .stories
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.id)
            .collect();
        state
            .messages
            .iter()
            .filter(|m| story_ids.contains(&m.story_id))
            .all(|m| m.extracted)
    }

    /// Make the next commit fail before mutating anything.
    pub fn fail_next_commit(&self) {
        self.state.lock().unwrap().fail_commit = true;
    }

    fn search_sync(&self, embedding: &[f32], opts: &SearchOptions) -> Vec<ScoredMemory> {
        if opts.top_k == 0 {
            return Vec::new();
        }
        let state = self.state.lock().unwrap();
        let mut scored: Vec<ScoredMemory> = state
            .memories
            .iter()
            .filter(|m| m.user_id == opts.user_id)
            .filter_map(|m| {
                let stored = state.embeddings.get(&m.id)?;
                let similarity = cosine(stored, embedding);
                (similarity > opts.min_similarity).then(|| ScoredMemory {
                    record: m.clone(),
                    similarity,
                })
            })
            .collect();
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(opts.top_k);
        scored
    }
}

impl MessageRepository for FakeBackend {
    async fn create_story(
        &self,
        user_id: &str,
        name: Option<&str>,
        handler: &str,
    ) -> Result<Story, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        state.next_story_id += 1;
        let now = Utc::now();
        let story = Story {
            id: state.next_story_id,
            user_id: user_id.to_string(),
            name: name.map(str::to_string),
            handler: handler.to_string(),
            created_at: now,
            updated_at: now,
        };
        state.stories.push(story.clone());
        Ok(story)
    }

    async fn save_message(
        &self,
        story_id: i64,
        content_type: ContentType,
        content: &serde_json::Value,
    ) -> Result<StoredMessage, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        if !state.stories.iter().any(|s| s.id == story_id) {
            return Err(RepositoryError::NotFound);
        }
        state.next_message_id += 1;
        let now = Utc::now();
        let message = StoredMessage {
            id: state.next_message_id,
            story_id,
            content_type,
            content: content.clone(),
            extracted: false,
            created_at: now,
            updated_at: now,
        };
        state.messages.push(message.clone());
        Ok(message)
    }

    async fn load_pending(&self, user_id: &str) -> Result<Vec<PendingMessage>, RepositoryError> {
        let state = self.state.lock().unwrap();
        let mut pending: Vec<PendingMessage> = state
            .messages
            .iter()
            .filter(|m| !m.extracted)
            .filter_map(|m| {
                let story = state
                    .stories
                    .iter()
                    .find(|s| s.id == m.story_id && s.user_id == user_id)?;
                Some(PendingMessage {
                    message: m.clone(),
                    user_id: story.user_id.clone(),
                    handler: story.handler.clone(),
                })
            })
            .collect();
        // Insertion ids break created_at ties deterministically.
        pending.sort_by_key(|p| (p.message.created_at, p.message.id));
        Ok(pending)
    }

    async fn messages_for_story(
        &self,
        story_id: i64,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        let state = self.state.lock().unwrap();
        let mut messages: Vec<StoredMessage> = state
            .messages
            .iter()
            .filter(|m| m.story_id == story_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| (m.created_at, m.id));
        Ok(messages)
    }
}

impl MemoryStore for FakeBackend {
    async fn insert(&self, memory: &NewMemory) -> Result<MemoryRecord, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        state.next_memory_id += 1;
        let id = state.next_memory_id;
        let now = Utc::now();
        let record = MemoryRecord {
            id,
            user_id: memory.user_id.clone(),
            content: memory.content.clone(),
            prev_content: None,
            category: memory.category.clone(),
            importance: memory.importance,
            confidence: memory.confidence,
            action: memory.action,
            created_at: now,
            updated_at: now,
        };
        state.memories.push(record.clone());
        state.embeddings.insert(id, memory.embedding.clone());
        Ok(record)
    }

    async fn update(&self, id: i64, patch: &MemoryPatch) -> Result<MemoryRecord, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let record = state
            .memories
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(RepositoryError::NotFound)?;
        record.content = patch.content.clone();
        record.prev_content = patch.prev_content.clone();
        record.action = patch.action;
        record.updated_at = Utc::now();
        let record = record.clone();
        state.embeddings.insert(id, patch.embedding.clone());
        Ok(record)
    }

    async fn search(
        &self,
        embedding: &[f32],
        opts: &SearchOptions,
    ) -> Result<Vec<ScoredMemory>, RepositoryError> {
        Ok(self.search_sync(embedding, opts))
    }

    async fn bulk_search(
        &self,
        embeddings: &[Vec<f32>],
        opts: &SearchOptions,
    ) -> Result<Vec<Vec<ScoredMemory>>, RepositoryError> {
        Ok(embeddings
            .iter()
            .map(|e| self.search_sync(e, opts))
            .collect())
    }

    async fn commit(
        &self,
        user_id: &str,
        plan: &DecisionPlan,
        message_ids: &[i64],
    ) -> Result<CommitStats, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_commit {
            state.fail_commit = false;
            return Err(RepositoryError::Query("injected commit failure".to_string()));
        }

        let mut stats = CommitStats::default();
        for write in &plan.writes {
            let embedding = plan
                .embeddings
                .get(write.text())
                .ok_or_else(|| {
                    RepositoryError::Query("missing embedding for staged write".to_string())
                })?
                .clone();
            match write {
                PlannedWrite::Add {
                    text,
                    category,
                    importance,
                    confidence,
                } => {
                    state.next_memory_id += 1;
                    let id = state.next_memory_id;
                    let now = Utc::now();
                    state.memories.push(MemoryRecord {
                        id,
                        user_id: user_id.to_string(),
                        content: text.clone(),
                        prev_content: None,
                        category: category.clone(),
                        importance: *importance,
                        confidence: *confidence,
                        action: MemoryAction::Add,
                        created_at: now,
                        updated_at: now,
                    });
                    state.embeddings.insert(id, embedding);
                    stats.added += 1;
                }
                PlannedWrite::Update {
                    memory_id,
                    text,
                    prev_content,
                } => {
                    if let Some(record) =
                        state.memories.iter_mut().find(|m| m.id == *memory_id)
                    {
                        record.content = text.clone();
                        record.prev_content = Some(prev_content.clone());
                        record.action = MemoryAction::Update;
                        record.updated_at = Utc::now();
                        state.embeddings.insert(*memory_id, embedding);
                        stats.updated += 1;
                    }
                }
            }
        }

        for message in &mut state.messages {
            if message_ids.contains(&message.id) {
                message.extracted = true;
                message.updated_at = Utc::now();
            }
        }
        Ok(stats)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[derive(Default)]
struct GatewayState {
    completions: VecDeque<serde_json::Value>,
    embed_calls: usize,
    fail_completions: bool,
    fail_embeddings: bool,
}

/// Gateway fake replaying scripted completion payloads.
pub struct ScriptedGateway {
    state: Arc<Mutex<GatewayState>>,
    dimension: usize,
}

impl ScriptedGateway {
    pub fn new(dimension: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(GatewayState::default())),
            dimension,
        }
    }

    pub fn push_completion(&self, value: serde_json::Value) {
        self.state.lock().unwrap().completions.push_back(value);
    }

    pub fn fail_completions(&self) {
        self.state.lock().unwrap().fail_completions = true;
    }

    pub fn fail_embeddings(&self) {
        self.state.lock().unwrap().fail_embeddings = true;
    }

    pub fn embed_calls(&self) -> usize {
        self.state.lock().unwrap().embed_calls
    }
}

impl LlmGateway for ScriptedGateway {
    async fn complete_json(
        &self,
        _request: &StructuredRequest,
    ) -> Result<serde_json::Value, GatewayError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_completions {
            return Err(GatewayError::Provider {
                message: "scripted completion failure".to_string(),
            });
        }
        state
            .completions
            .pop_front()
            .ok_or_else(|| GatewayError::InvalidResponse("no scripted completion".to_string()))
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GatewayError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_embeddings {
            return Err(GatewayError::Transport("scripted embedding failure".to_string()));
        }
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        state.embed_calls += 1;
        Ok(texts
            .iter()
            .map(|t| text_embedding(t, self.dimension))
            .collect())
    }

    fn model_name(&self) -> &str {
        "scripted-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
