//! Story handlers: pluggable renderers for handler-specific message content.
//!
//! Each handler names itself and knows how to render its own message shapes
//! to a single plain-text line for the fact-extraction prompt. A central
//! registry maps handler name to handler object; stories carry the handler
//! name, and rendering dispatches on that string at extraction time.

pub mod chat;
pub mod registry;

pub use chat::ChatHandler;
pub use registry::HandlerRegistry;

use mnemon_types::message::StoredMessage;

/// A registered story handler.
///
/// `message_to_string` is a pure function from the handler's typed message
/// content to one rendered line (`User: ...` / `Assistant: ...`). Content
/// that fails the handler's schema returns `None`; the extraction pipeline
/// drops such messages from the rendered conversation but still consumes
/// them, so a malformed turn can never stall a user's queue.
pub trait StoryHandler: Send + Sync {
    /// The name stories reference this handler by.
    fn name(&self) -> &'static str;

    /// Render one stored message, or `None` if its content does not match
    /// this handler's schema.
    fn message_to_string(&self, message: &StoredMessage) -> Option<String>;
}
