//! LLM gateway port.

pub mod gateway;
