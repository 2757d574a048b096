//! Prompts and response schemas for the two extraction LLM calls.

use mnemon_types::llm::StructuredRequest;

/// System prompt for the fact-retrieval call.
///
/// Instructs the model to distill the conversation into normalized
/// declarative statements about the user and to suppress redundant or
/// trivial content.
const FACT_RETRIEVAL_SYSTEM_PROMPT: &str = r#"You are a fact extraction assistant. Distill the conversation into facts about the user that are worth remembering for future conversations.

Rules:
1. Each fact must be a single, self-contained declarative sentence in first person or about the user
2. Extract ONLY durable information: identity, location, preferences, goals, decisions, corrections
3. Do NOT include greetings, pleasantries, or trivial exchanges
4. Do NOT repeat the same information in multiple facts
5. Prefer specific statements over vague observations
6. Tag each fact with a category (e.g. "fact", "preference", "decision", "context", "correction")
7. Score importance and confidence between 0.0 and 1.0

Return JSON with a "facts" array. If nothing is worth extracting, return {"facts": []}."#;

/// System prompt for the memory-update (resolution) call.
///
/// Existing memories and new facts share one id namespace; the model refers
/// to either by id and decides, per fact, whether it is novel or refines an
/// existing memory.
const MEMORY_UPDATE_SYSTEM_PROMPT: &str = r#"You reconcile newly extracted facts with a user's existing memories. Existing memories and new facts are numbered in a single id sequence.

For each NEW FACT, output exactly one decision:
- event "ADD" with the fact's own id when the fact is new information. You may lightly rewrite the text for clarity.
- event "UPDATE" with an EXISTING MEMORY's id when the fact corrects or refines that memory. The text must be the full replacement content for that memory.

Rules:
1. Never reference ids that were not listed
2. Never output DELETE or any other event
3. If a fact duplicates an existing memory with no new information, omit it entirely
4. Keep texts as single self-contained sentences

Return JSON with a "memory" array of {id, event, text} objects. If no decisions are needed, return {"memory": []}."#;

/// JSON schema for the fact-retrieval response.
pub fn fact_retrieval_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "facts": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "text": {"type": "string"},
                        "category": {"type": "string"},
                        "importance": {"type": "number", "minimum": 0.0, "maximum": 1.0},
                        "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0}
                    },
                    "required": ["text", "category", "importance", "confidence"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["facts"],
        "additionalProperties": false
    })
}

/// JSON schema for the memory-update response.
pub fn memory_update_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "memory": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "string"},
                        "event": {"type": "string", "enum": ["ADD", "UPDATE"]},
                        "text": {"type": "string"}
                    },
                    "required": ["id", "event", "text"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["memory"],
        "additionalProperties": false
    })
}

/// Build the fact-retrieval request for a rendered conversation.
pub fn fact_retrieval_request(conversation: &str, today: &str) -> StructuredRequest {
    StructuredRequest {
        system: FACT_RETRIEVAL_SYSTEM_PROMPT.to_string(),
        prompt: format!("Today's date is {today}.\n\nConversation:\n\n{conversation}"),
        schema_name: "fact_retrieval".to_string(),
        schema: fact_retrieval_schema(),
        max_tokens: 2048,
        temperature: Some(0.0),
    }
}

/// Build the memory-update request from the rendered unified-id blocks.
pub fn memory_update_request(memories_block: &str, facts_block: &str) -> StructuredRequest {
    let memories_block = if memories_block.is_empty() {
        "(none)"
    } else {
        memories_block
    };
    StructuredRequest {
        system: MEMORY_UPDATE_SYSTEM_PROMPT.to_string(),
        prompt: format!("EXISTING MEMORIES:\n{memories_block}\n\nNEW FACTS:\n{facts_block}"),
        schema_name: "memory_update".to_string(),
        schema: memory_update_schema(),
        max_tokens: 2048,
        temperature: Some(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fact_retrieval_request_carries_date_and_conversation() {
        let request = fact_retrieval_request("User: hi\n\nAssistant: hello", "2026-08-02");
        assert!(request.prompt.contains("2026-08-02"));
        assert!(request.prompt.contains("User: hi"));
        assert_eq!(request.schema_name, "fact_retrieval");
        assert_eq!(request.temperature, Some(0.0));
    }

    #[test]
    fn test_memory_update_request_empty_memories_block() {
        let request = memory_update_request("", "1. User lives in Portland");
        assert!(request.prompt.contains("(none)"));
        assert!(request.prompt.contains("NEW FACTS"));
    }

    #[test]
    fn test_schemas_require_expected_fields() {
        let facts = fact_retrieval_schema();
        assert_eq!(facts["required"][0], "facts");
        let item_required = &facts["properties"]["facts"]["items"]["required"];
        assert!(item_required.as_array().unwrap().iter().any(|v| v == "text"));

        let update = memory_update_schema();
        let events = &update["properties"]["memory"]["items"]["properties"]["event"]["enum"];
        assert_eq!(events.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_system_prompts_state_key_rules() {
        assert!(FACT_RETRIEVAL_SYSTEM_PROMPT.contains("declarative sentence"));
        assert!(FACT_RETRIEVAL_SYSTEM_PROMPT.contains(r#"{"facts": []}"#));
        assert!(MEMORY_UPDATE_SYSTEM_PROMPT.contains("\"ADD\""));
        assert!(MEMORY_UPDATE_SYSTEM_PROMPT.contains("\"UPDATE\""));
        assert!(MEMORY_UPDATE_SYSTEM_PROMPT.contains("single id sequence"));
    }
}
