//! hub-store - Durable local state
//!
//! This crate persists the small amount of client-side state that must
//! survive restarts (the user's custom prompt template) in a SQLite file,
//! and provides an in-memory store for tests and ephemeral runs.

mod memory;
mod schema;
mod sqlite;

pub use memory::MemorySlotStore;
pub use sqlite::SqliteSlotStore;

// Re-export schema for testing/migrations
pub use schema::{SCHEMA, SCHEMA_VERSION};
