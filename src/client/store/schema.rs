//! Database Schema Definitions
//!
//! Schema version and DDL of the structured queue database.

/// Name of the structured database file
pub const DATABASE_FILE: &str = "offline-actions.db";

/// Current database schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Schema migration versions
pub const MIGRATION_VERSIONS: &[i32] = &[1];

/// Statements of migration 1: one key-ordered collection per action kind
pub const MIGRATION_1: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS punch_queue (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        created_at TEXT NOT NULL,
        payload TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS vacation_queue (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        created_at TEXT NOT NULL,
        payload TEXT NOT NULL
    )",
];

/// Check if database needs migration
pub fn needs_migration(current_version: i32) -> bool {
    current_version < CURRENT_SCHEMA_VERSION
}

/// Get pending migrations
pub fn get_pending_migrations(current_version: i32) -> Vec<i32> {
    MIGRATION_VERSIONS
        .iter()
        .filter(|&&v| v > current_version)
        .cloned()
        .collect()
}

/// Statements belonging to a migration version
pub fn migration_statements(version: i32) -> &'static [&'static str] {
    match version {
        1 => MIGRATION_1,
        _ => &[],
    }
}
