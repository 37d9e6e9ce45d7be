//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Store trait.

use crate::identity::IdentityHealth;
use crate::state::TaskStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{StorageError, StorageResult, Store};
use crate::storage::{NewRecord, RunOutcome, RunRecord, RunStatus, TaskRecord};
use crate::HarrowError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

const TASK_COLUMNS: &str = "key, search_term, source_ref, cursor, status, retry_count, \
     empty_streak, pages_fetched, records_found, last_error, owner_identity, retry_at, updated_at";

/// SQLite storage backend
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Creates a new SqliteStore instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(HarrowError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, HarrowError> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        // Initialize schema
        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self, HarrowError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn task_from_row(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
        Ok(TaskRecord {
            key: row.get(0)?,
            search_term: row.get(1)?,
            source_ref: row.get(2)?,
            cursor: row.get(3)?,
            status: TaskStatus::from_db_string(&row.get::<_, String>(4)?)
                .unwrap_or(TaskStatus::Failed),
            retry_count: row.get(5)?,
            empty_streak: row.get(6)?,
            pages_fetched: row.get(7)?,
            records_found: row.get::<_, i64>(8)? as u64,
            last_error: row.get(9)?,
            owner_identity: row.get(10)?,
            retry_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }
}

impl Store for SqliteStore {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, started_at, finished_at, config_hash, status, outcome
             FROM runs ORDER BY id DESC LIMIT 1",
        )?;

        let run = stmt
            .query_row([], |row| {
                Ok(RunRecord {
                    id: row.get(0)?,
                    started_at: row.get(1)?,
                    finished_at: row.get(2)?,
                    config_hash: row.get(3)?,
                    status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
                        .unwrap_or(RunStatus::Running),
                    outcome: row
                        .get::<_, Option<String>>(5)?
                        .as_deref()
                        .and_then(RunOutcome::from_db_string),
                })
            })
            .optional()?;

        Ok(run)
    }

    fn finish_run(&mut self, run_id: i64, outcome: RunOutcome) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, outcome = ?3 WHERE id = ?4",
            params![
                RunStatus::Finished.to_db_string(),
                now,
                outcome.to_db_string(),
                run_id
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Task Management =====

    fn upsert_task(&mut self, task: &TaskRecord) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO tasks (key, search_term, source_ref, cursor, status, retry_count,
                 empty_streak, pages_fetched, records_found, last_error, owner_identity,
                 retry_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(key) DO UPDATE SET
                 cursor = excluded.cursor,
                 status = excluded.status,
                 retry_count = excluded.retry_count,
                 empty_streak = excluded.empty_streak,
                 pages_fetched = excluded.pages_fetched,
                 records_found = excluded.records_found,
                 last_error = excluded.last_error,
                 owner_identity = excluded.owner_identity,
                 retry_at = excluded.retry_at,
                 updated_at = excluded.updated_at",
            params![
                task.key,
                task.search_term,
                task.source_ref,
                task.cursor,
                task.status.to_db_string(),
                task.retry_count,
                task.empty_streak,
                task.pages_fetched,
                task.records_found as i64,
                task.last_error,
                task.owner_identity,
                task.retry_at,
                now,
            ],
        )?;
        Ok(())
    }

    fn get_task(&self, key: &str) -> StorageResult<TaskRecord> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM tasks WHERE key = ?1", TASK_COLUMNS))?;

        let task = stmt
            .query_row(params![key], Self::task_from_row)
            .map_err(|_| StorageError::TaskNotFound(key.to_string()))?;

        Ok(task)
    }

    fn load_tasks(&self) -> StorageResult<Vec<TaskRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM tasks ORDER BY key", TASK_COLUMNS))?;

        let tasks = stmt
            .query_map([], Self::task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tasks)
    }

    fn next_eligible(&mut self, owner_identity: &str) -> StorageResult<Option<TaskRecord>> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        // Pending tasks are claimed before parked retries; within each
        // class the least recently touched task goes first
        let selected = tx
            .query_row(
                &format!(
                    "SELECT {} FROM tasks
                     WHERE status = 'pending'
                        OR (status IN ('failed', 'rate_limited')
                            AND (retry_at IS NULL OR retry_at <= ?1))
                     ORDER BY CASE WHEN status = 'pending' THEN 0 ELSE 1 END,
                              updated_at ASC
                     LIMIT 1",
                    TASK_COLUMNS
                ),
                params![now],
                Self::task_from_row,
            )
            .optional()?;

        let mut task = match selected {
            Some(task) => task,
            None => return Ok(None),
        };

        // Claim inside the same transaction so no other worker can take it
        tx.execute(
            "UPDATE tasks SET status = ?1, owner_identity = ?2, retry_at = NULL,
                 updated_at = ?3
             WHERE key = ?4",
            params![
                TaskStatus::InProgress.to_db_string(),
                owner_identity,
                now,
                task.key
            ],
        )?;
        tx.commit()?;

        task.status = TaskStatus::InProgress;
        task.owner_identity = Some(owner_identity.to_string());
        task.retry_at = None;
        task.updated_at = now;

        Ok(Some(task))
    }

    fn reset_in_progress(&mut self) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let reset = self.conn.execute(
            "UPDATE tasks SET status = ?1, owner_identity = NULL, updated_at = ?2
             WHERE status = ?3",
            params![
                TaskStatus::Pending.to_db_string(),
                now,
                TaskStatus::InProgress.to_db_string()
            ],
        )?;
        Ok(reset)
    }

    fn reset_non_terminal(&mut self) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let reset = self.conn.execute(
            "UPDATE tasks SET status = 'pending', cursor = NULL, retry_count = 0,
                 empty_streak = 0, pages_fetched = 0, records_found = 0,
                 last_error = NULL, owner_identity = NULL, retry_at = NULL,
                 updated_at = ?1
             WHERE status NOT IN ('completed', 'completed_no_cursor',
                                  'completed_zero_streak', 'permanently_failed')",
            params![now],
        )?;
        Ok(reset)
    }

    fn backlog_drained(&self) -> StorageResult<bool> {
        let remaining: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tasks
             WHERE status IN ('pending', 'in_progress', 'failed', 'rate_limited')",
            [],
            |row| row.get(0),
        )?;
        Ok(remaining == 0)
    }

    // ===== Record Sink =====

    fn insert_record(&mut self, record: &NewRecord) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let payload = serde_json::to_string(&record.payload)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO records
                 (record_id, name, url, payload, task_key, identity_id, found_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.record_id,
                record.name,
                record.url,
                payload,
                record.task_key,
                record.identity_id,
                now,
            ],
        )?;

        Ok(inserted > 0)
    }

    fn count_records(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Identity Health =====

    fn save_identity_health(&mut self, health: &[IdentityHealth]) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM identities", [])?;

        for entry in health {
            tx.execute(
                "INSERT INTO identities (id, status, consecutive_failures, last_used_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    entry.id,
                    entry.status.to_db_string(),
                    entry.consecutive_failures,
                    entry.last_used_at.map(|t| t.to_rfc3339()),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    // ===== Statistics =====

    fn count_tasks_by_status(&self) -> StorageResult<HashMap<TaskStatus, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM tasks GROUP BY status")?;

        let mut counts = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (status_str, count) = row?;
            if let Some(status) = TaskStatus::from_db_string(&status_str) {
                counts.insert(status, count as u64);
            }
        }

        Ok(counts)
    }

    fn permanently_failed_tasks(&self) -> StorageResult<Vec<TaskRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE status = 'permanently_failed' ORDER BY key",
            TASK_COLUMNS
        ))?;

        let tasks = stmt
            .query_map([], Self::task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tasks)
    }

    fn retired_identities(&self) -> StorageResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM identities WHERE status = 'retired' ORDER BY id")?;

        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(ids)
    }

    fn total_pages_fetched(&self) -> StorageResult<u64> {
        let total: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(pages_fetched), 0) FROM tasks",
            [],
            |row| row.get(0),
        )?;
        Ok(total as u64)
    }
}
