//! LLM gateway adapters.

pub mod openai;
pub mod wire;

pub use openai::OpenAiGateway;
