//! Durable storage
//!
//! A single SQLite file holds cached records, per-resource sync state,
//! provider credentials and the sync run audit log.

mod sqlite;

pub use sqlite::SqliteStore;
