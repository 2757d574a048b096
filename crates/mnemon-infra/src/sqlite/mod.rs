//! SQLite persistence: split read/write pools, the message repository, and
//! the memory outbox used by the commit path.

pub mod message;
pub mod outbox;
pub mod pool;

pub use message::SqliteMessageRepository;
pub use pool::DatabasePool;
