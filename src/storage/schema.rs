//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Harrow database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track orchestrator runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    outcome TEXT
);

-- One row per search task, keyed by a stable hash of the search term
CREATE TABLE IF NOT EXISTS tasks (
    key TEXT PRIMARY KEY,
    search_term TEXT NOT NULL,
    source_ref TEXT,
    cursor TEXT,
    status TEXT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    empty_streak INTEGER NOT NULL DEFAULT 0,
    pages_fetched INTEGER NOT NULL DEFAULT 0,
    records_found INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    owner_identity TEXT,
    retry_at TEXT,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
CREATE INDEX IF NOT EXISTS idx_tasks_retry_at ON tasks(retry_at);

-- Extracted records, deduplicated on their upstream identifier
CREATE TABLE IF NOT EXISTS records (
    record_id TEXT PRIMARY KEY,
    name TEXT,
    url TEXT,
    payload TEXT NOT NULL,
    task_key TEXT NOT NULL REFERENCES tasks(key),
    identity_id TEXT NOT NULL,
    found_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_task ON records(task_key);

-- Identity health at the end of the latest run, rebuilt each run
CREATE TABLE IF NOT EXISTS identities (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    consecutive_failures INTEGER NOT NULL DEFAULT 0,
    last_used_at TEXT
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
