//! Unified-id resolution context and decision plan construction.
//!
//! During one extraction run, existing candidate memories and newly
//! extracted facts share a single string-id namespace: memories take
//! `"1"..="n"` in first-encounter order, facts take `"n+1".."n+m"` in
//! extraction order. The decision LLM refers to either kind by id; anything
//! it emits that does not resolve cleanly is dropped, never fatal.

use std::collections::HashMap;

use mnemon_types::llm::{DecisionEvent, MemoryDecision};
use mnemon_types::memory::{DecisionPlan, Fact, MemoryRecord, PlannedWrite, ScoredMemory};

/// What a unified id points at.
pub enum UnifiedRef<'a> {
    Memory(&'a MemoryRecord),
    /// Index into the run's fact list.
    Fact(usize),
}

/// Candidate memories for one run, with the unified-id bookkeeping.
pub struct ResolutionContext {
    memories: Vec<MemoryRecord>,
    fact_count: usize,
}

impl ResolutionContext {
    /// Flatten bulk-search results into the unique candidate list.
    ///
    /// Deduplicates by memory id, first occurrence wins, preserving the
    /// order in which unique memories are first encountered.
    pub fn build(results: Vec<Vec<ScoredMemory>>, fact_count: usize) -> Self {
        let mut seen: HashMap<i64, ()> = HashMap::new();
        let mut memories = Vec::new();
        for scored in results.into_iter().flatten() {
            if seen.insert(scored.record.id, ()).is_none() {
                memories.push(scored.record);
            }
        }
        Self {
            memories,
            fact_count,
        }
    }

    pub fn memory_count(&self) -> usize {
        self.memories.len()
    }

    /// Resolve a unified id to a memory or a fact index.
    pub fn resolve(&self, id: &str) -> Option<UnifiedRef<'_>> {
        let n: usize = id.trim().parse().ok()?;
        if n == 0 {
            return None;
        }
        if n <= self.memories.len() {
            return Some(UnifiedRef::Memory(&self.memories[n - 1]));
        }
        let fact_index = n - self.memories.len() - 1;
        if fact_index < self.fact_count {
            return Some(UnifiedRef::Fact(fact_index));
        }
        None
    }

    /// Render the existing-memories block: one `{id}. {content}` line each.
    pub fn render_memories(&self) -> String {
        self.memories
            .iter()
            .enumerate()
            .map(|(i, m)| format!("{}. {}", i + 1, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Render the new-facts block, ids continuing after the memories.
    pub fn render_facts(&self, facts: &[Fact]) -> String {
        facts
            .iter()
            .enumerate()
            .map(|(i, f)| format!("{}. {}", self.memories.len() + i + 1, f.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Build a decision plan from the LLM's resolution output.
///
/// Returns the plan plus the texts that still need embedding: the
/// `embeddings` map is pre-seeded with Stage-3 fact embeddings wherever a
/// decision kept the fact text verbatim, and the caller batch-embeds the
/// remainder. Decisions that reference unknown ids, reference the wrong
/// kind, or carry empty text are skipped.
pub fn build_decision_plan(
    context: &ResolutionContext,
    facts: &[Fact],
    fact_embeddings: &[Vec<f32>],
    decisions: &[MemoryDecision],
) -> (DecisionPlan, Vec<String>) {
    let fact_embedding_by_text: HashMap<&str, &Vec<f32>> = facts
        .iter()
        .zip(fact_embeddings)
        .map(|(f, e)| (f.text.as_str(), e))
        .collect();

    let mut plan = DecisionPlan::default();
    let mut to_embed: Vec<String> = Vec::new();

    for decision in decisions {
        let text = decision.text.trim();
        if text.is_empty() {
            tracing::debug!(id = %decision.id, "decision with empty text skipped");
            continue;
        }

        let write = match (decision.event, context.resolve(&decision.id)) {
            (DecisionEvent::Add, Some(UnifiedRef::Fact(i))) => PlannedWrite::Add {
                text: text.to_string(),
                category: facts[i].category.clone(),
                importance: facts[i].importance,
                confidence: facts[i].confidence,
            },
            (DecisionEvent::Update, Some(UnifiedRef::Memory(memory))) => PlannedWrite::Update {
                memory_id: memory.id,
                text: text.to_string(),
                prev_content: memory.content.clone(),
            },
            _ => {
                tracing::debug!(
                    id = %decision.id,
                    event = ?decision.event,
                    "decision referenced an unresolvable id; skipped"
                );
                continue;
            }
        };

        let write_text = write.text();
        if !plan.embeddings.contains_key(write_text) {
            match fact_embedding_by_text.get(write_text) {
                Some(embedding) => {
                    plan.embeddings
                        .insert(write_text.to_string(), (*embedding).clone());
                }
                None if !to_embed.iter().any(|t| t == write_text) => {
                    to_embed.push(write_text.to_string());
                }
                None => {}
            }
        }
        plan.writes.push(write);
    }

    (plan, to_embed)
}
