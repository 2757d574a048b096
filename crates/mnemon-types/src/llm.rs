//! LLM gateway request/response types.
//!
//! The gateway exposes two operations: a structured-output completion that
//! must conform to a supplied JSON schema, and order-preserving batch
//! embedding. The response shapes here mirror the two prompt schemas the
//! extraction pipeline relies on.

use serde::{Deserialize, Serialize};

use crate::memory::Fact;

/// A structured-output completion request.
///
/// The gateway guarantees the returned value parses against `schema`, or the
/// call fails with `GatewayError::InvalidResponse`. No partial parsing.
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    pub system: String,
    pub prompt: String,
    /// Name advertised to the provider for the response schema.
    pub schema_name: String,
    pub schema: serde_json::Value,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
}

/// Fact-retrieval completion output: `{facts: [{text, category, importance, confidence}]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactRetrieval {
    pub facts: Vec<Fact>,
}

/// Whether a decision creates a new memory or refines an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DecisionEvent {
    Add,
    Update,
}

/// One resolution decision, keyed by a unified-namespace id.
///
/// For ADD the id names one of the newly extracted facts; for UPDATE it
/// names one of the existing candidate memories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryDecision {
    pub id: String,
    pub event: DecisionEvent,
    pub text: String,
}

/// Memory-update completion output: `{memory: [{id, event, text}]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryUpdate {
    pub memory: Vec<MemoryDecision>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fact_retrieval_deserialize() {
        let json = r#"{
            "facts": [
                {"text": "User lives in Portland, Oregon", "category": "fact", "importance": 0.8, "confidence": 0.95},
                {"text": "User prefers jasmine tea", "category": "preference", "importance": 0.5, "confidence": 0.9}
            ]
        }"#;
        let parsed: FactRetrieval = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.facts.len(), 2);
        assert_eq!(parsed.facts[0].category, "fact");
        assert!((parsed.facts[1].confidence - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn test_fact_retrieval_empty() {
        let parsed: FactRetrieval = serde_json::from_str(r#"{"facts": []}"#).unwrap();
        assert!(parsed.facts.is_empty());
    }

    #[test]
    fn test_memory_update_deserialize() {
        let json = r#"{
            "memory": [
                {"id": "1", "event": "UPDATE", "text": "User moved to Seattle"},
                {"id": "4", "event": "ADD", "text": "User prefers jasmine tea"}
            ]
        }"#;
        let parsed: MemoryUpdate = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.memory.len(), 2);
        assert_eq!(parsed.memory[0].event, DecisionEvent::Update);
        assert_eq!(parsed.memory[1].id, "4");
    }

    #[test]
    fn test_decision_event_rejects_lowercase() {
        let parsed: Result<DecisionEvent, _> = serde_json::from_str("\"add\"");
        assert!(parsed.is_err());
    }
}
