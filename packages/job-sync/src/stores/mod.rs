//! Storage implementations for the local job store.
//!
//! Available backends:
//! - `MemoryStore` - In-memory storage (always available)
//! - `FileStore` - Single JSON document on disk (always available)
//! - `SqliteStore` - SQLite key-value table (requires `sqlite` feature)

pub mod file;
pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file::FileStore;
pub use memory::MemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
