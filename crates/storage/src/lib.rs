//! PatchScout Storage - SQLite persistence
//!
//! Implements the [`patchscout_common::Storage`] trait on top of a `sqlx`
//! SQLite pool. Deleting a scan cascades to its vulnerabilities and tool
//! results through foreign keys.

mod schema;
mod sqlite;

pub use sqlite::SqliteStorage;

/// Database used when none is configured.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://patchscout.db";
