//! LanceDB-backed vector memory store.

pub mod lance;
pub mod memory;
pub mod schema;

pub use lance::LanceStore;
pub use memory::LanceMemoryStore;
