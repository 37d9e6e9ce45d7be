//! Storage module for persisting orchestration state
//!
//! This module handles all database operations for the orchestrator,
//! including:
//! - SQLite database initialization and schema management
//! - Task state persistence and atomic claiming
//! - Deduplicated record storage
//! - Run tracking and resumption support

mod schema;
mod sqlite;
mod traits;

pub use schema::initialize_schema;
pub use sqlite::SqliteStore;
pub use traits::{Store, StorageError, StorageResult};

use crate::state::TaskStatus;
use crate::HarrowError;

use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStore)` - Successfully initialized storage
/// * `Err(HarrowError)` - Failed to initialize storage
pub fn open_store(path: &Path) -> Result<SqliteStore, HarrowError> {
    SqliteStore::new(path)
}

/// Represents a task row in the database
#[derive(Debug, Clone)]
pub struct TaskRecord {
    /// Stable key: 16-hex-char SHA-256 prefix of the search term
    pub key: String,
    pub search_term: String,
    /// The backlog line the task came from, when it was a URL
    pub source_ref: Option<String>,
    /// Opaque continuation cursor from the last successful page
    pub cursor: Option<String>,
    pub status: TaskStatus,
    pub retry_count: u32,
    pub empty_streak: u32,
    pub pages_fetched: u32,
    pub records_found: u64,
    pub last_error: Option<String>,
    pub owner_identity: Option<String>,
    /// Earliest instant a parked task becomes eligible again (RFC 3339)
    pub retry_at: Option<String>,
    pub updated_at: String,
}

impl TaskRecord {
    /// Creates a fresh pending task for a search term
    pub fn new_pending(key: &str, search_term: &str, source_ref: Option<&str>) -> Self {
        Self {
            key: key.to_string(),
            search_term: search_term.to_string(),
            source_ref: source_ref.map(str::to_string),
            cursor: None,
            status: TaskStatus::Pending,
            retry_count: 0,
            empty_streak: 0,
            pages_fetched: 0,
            records_found: 0,
            last_error: None,
            owner_identity: None,
            retry_at: None,
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// A record ready to be persisted to the sink
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub record_id: String,
    pub name: Option<String>,
    pub url: Option<String>,
    pub payload: serde_json::Value,
    pub task_key: String,
    pub identity_id: String,
}

/// Represents an orchestrator run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub outcome: Option<RunOutcome>,
}

/// Status of a run row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Finished,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Finished => "finished",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "finished" => Some(Self::Finished),
            _ => None,
        }
    }
}

/// How a run ended
///
/// Every completed process maps to exactly one of these, and each has a
/// distinct process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every task reached a terminal status
    BacklogDrained,

    /// Work remained but every identity was retired
    IdentitiesExhausted,

    /// A shutdown signal stopped the run early
    Interrupted,
}

impl RunOutcome {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::BacklogDrained => "backlog_drained",
            Self::IdentitiesExhausted => "identities_exhausted",
            Self::Interrupted => "interrupted",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "backlog_drained" => Some(Self::BacklogDrained),
            "identities_exhausted" => Some(Self::IdentitiesExhausted),
            "interrupted" => Some(Self::Interrupted),
            _ => None,
        }
    }

    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BacklogDrained => 0,
            Self::IdentitiesExhausted => 2,
            Self::Interrupted => 130,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_roundtrip() {
        for status in &[RunStatus::Running, RunStatus::Finished] {
            let parsed = RunStatus::from_db_string(status.to_db_string());
            assert_eq!(Some(*status), parsed);
        }
    }

    #[test]
    fn test_run_outcome_roundtrip() {
        for outcome in &[
            RunOutcome::BacklogDrained,
            RunOutcome::IdentitiesExhausted,
            RunOutcome::Interrupted,
        ] {
            let parsed = RunOutcome::from_db_string(outcome.to_db_string());
            assert_eq!(Some(*outcome), parsed);
        }
    }

    #[test]
    fn test_run_outcome_exit_codes_distinct() {
        assert_eq!(RunOutcome::BacklogDrained.exit_code(), 0);
        assert_eq!(RunOutcome::IdentitiesExhausted.exit_code(), 2);
        assert_eq!(RunOutcome::Interrupted.exit_code(), 130);
    }

    #[test]
    fn test_new_pending_task() {
        let task = TaskRecord::new_pending("abc123", "rust jobs", Some("https://x/?q=rust+jobs"));
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 0);
        assert!(task.cursor.is_none());
        assert!(task.owner_identity.is_none());
        assert_eq!(task.source_ref.as_deref(), Some("https://x/?q=rust+jobs"));
    }
}
