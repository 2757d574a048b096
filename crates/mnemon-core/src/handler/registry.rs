//! Handler registry: name-to-handler dispatch for story rendering.
//!
//! Write-once, read-many: populate with explicit `register` calls during
//! startup, before the first extraction runs. Lookups clone the `Arc`, so
//! the registry can be shared freely across workers.

use std::collections::HashMap;
use std::sync::Arc;

use super::chat::ChatHandler;
use super::StoryHandler;

/// Registry mapping handler names to handler objects.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn StoryHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Create a registry pre-populated with the built-in handlers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ChatHandler));
        registry
    }

    /// Register a handler under its own name. Re-registering a name replaces
    /// the previous handler.
    pub fn register(&mut self, handler: Arc<dyn StoryHandler>) {
        let name = handler.name();
        if self.handlers.insert(name, handler).is_some() {
            tracing::warn!(handler = name, "handler re-registered; previous replaced");
        }
    }

    /// Look up a handler by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn StoryHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Registered handler names, unordered.
    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }
}
