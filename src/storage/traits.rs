//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::TaskStatus;
use crate::storage::{NewRecord, RunOutcome, RunRecord, TaskRecord};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines all database operations needed by the orchestrator.
pub trait Store {
    // ===== Run Management =====

    /// Creates a new run row and returns its ID
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Marks a run as finished with its outcome and a finish timestamp
    fn finish_run(&mut self, run_id: i64, outcome: RunOutcome) -> StorageResult<()>;

    // ===== Task Management =====

    /// Inserts a task or replaces its mutable fields
    ///
    /// This is the per-page durability point: the engine calls it after
    /// every page so at most one page of work is lost on crash.
    fn upsert_task(&mut self, task: &TaskRecord) -> StorageResult<()>;

    /// Gets a task by key
    fn get_task(&self, key: &str) -> StorageResult<TaskRecord>;

    /// Loads all tasks
    fn load_tasks(&self) -> StorageResult<Vec<TaskRecord>>;

    /// Atomically claims the next eligible task for a worker
    ///
    /// Eligible means Pending, or a retryable failure whose `retry_at`
    /// deadline has passed. Pending tasks are claimed before retries. The
    /// selected task is marked InProgress with the given owner inside the
    /// same transaction, so no two workers can claim the same task.
    fn next_eligible(&mut self, owner_identity: &str) -> StorageResult<Option<TaskRecord>>;

    /// Returns non-terminal tasks to Pending ownership-free state
    ///
    /// Called once at startup so tasks stranded InProgress by a crash or
    /// interrupt become claimable again. Returns the number of tasks reset.
    fn reset_in_progress(&mut self) -> StorageResult<usize>;

    /// Resets every non-terminal task to a fresh Pending state
    ///
    /// Used by fresh mode. Terminal tasks and already-persisted records are
    /// left alone.
    fn reset_non_terminal(&mut self) -> StorageResult<usize>;

    /// True when no task remains in a claimable or in-flight state
    fn backlog_drained(&self) -> StorageResult<bool>;

    // ===== Record Sink =====

    /// Persists a record, deduplicating on `record_id`
    ///
    /// Returns true if the record was new, false if it was already present.
    fn insert_record(&mut self, record: &NewRecord) -> StorageResult<bool>;

    /// Total number of persisted records
    fn count_records(&self) -> StorageResult<u64>;

    // ===== Identity Health =====

    /// Replaces the identity health table with the given snapshot
    fn save_identity_health(
        &mut self,
        health: &[crate::identity::IdentityHealth],
    ) -> StorageResult<()>;

    // ===== Statistics =====

    /// Counts tasks grouped by status
    fn count_tasks_by_status(&self) -> StorageResult<HashMap<TaskStatus, u64>>;

    /// Permanently failed tasks with their last error, for run summaries
    fn permanently_failed_tasks(&self) -> StorageResult<Vec<TaskRecord>>;

    /// IDs of identities recorded as retired
    fn retired_identities(&self) -> StorageResult<Vec<String>>;

    /// Sum of pages fetched across all tasks
    fn total_pages_fetched(&self) -> StorageResult<u64>;
}
