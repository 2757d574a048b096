//! Persistence trait definitions for stories and messages.

pub mod message;
