//! Built-in plain chat handler.
//!
//! Query content is `{"question": string}`, response content is
//! `{"answer": string}`. Anything else fails schema validation and is
//! dropped from rendering.

use serde::Deserialize;

use mnemon_types::message::{ContentType, StoredMessage};

use super::StoryHandler;

#[derive(Deserialize)]
struct ChatQuery {
    question: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    answer: String,
}

/// Handler for free-form chat stories.
pub struct ChatHandler;

impl StoryHandler for ChatHandler {
    fn name(&self) -> &'static str {
        "chat"
    }

    fn message_to_string(&self, message: &StoredMessage) -> Option<String> {
        match message.content_type {
            ContentType::Query => {
                let query: ChatQuery = serde_json::from_value(message.content.clone()).ok()?;
                Some(format!("User: {}", query.question))
            }
            ContentType::Response => {
                let response: ChatResponse =
                    serde_json::from_value(message.content.clone()).ok()?;
                Some(format!("Assistant: {}", response.answer))
            }
        }
    }
}
