//! Worker pool dispatcher
//!
//! This module owns a whole run: it seeds the task backlog, recovers tasks
//! stranded by a previous interrupt, spawns the worker pool, and records
//! how the run ended. Each worker repeatedly acquires an identity, claims
//! an eligible task, and hands both to the pagination engine.

use crate::backlog::BacklogEntry;
use crate::classify::FailureCategory;
use crate::engine::{run_task, EngineOutcome, EngineSettings, PageFetcher, RecordExtractor};
use crate::identity::{AcquireOutcome, IdentityPool, ReleaseOutcome};
use crate::storage::{StorageError, Store, TaskRecord};
use crate::HarrowError;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub use crate::storage::RunOutcome;

/// How long an idle worker waits before re-checking for eligible work
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Upper bound on one blocked-pool wait, so shutdown stays responsive
const MAX_BLOCKED_WAIT: Duration = Duration::from_secs(5);

/// Coordinates a run of the worker pool over the task backlog
pub struct Dispatcher<S: Store + Send + 'static> {
    store: Arc<Mutex<S>>,
    pool: Arc<IdentityPool>,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn RecordExtractor>,
    settings: EngineSettings,
    workers_per_identity: u32,
}

impl<S: Store + Send + 'static> Dispatcher<S> {
    pub fn new(
        store: Arc<Mutex<S>>,
        pool: Arc<IdentityPool>,
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn RecordExtractor>,
        settings: EngineSettings,
        workers_per_identity: u32,
    ) -> Self {
        Self {
            store,
            pool,
            fetcher,
            extractor,
            settings,
            workers_per_identity,
        }
    }

    /// Inserts backlog entries that have no task row yet
    ///
    /// Existing tasks keep their state, so a resumed run continues where it
    /// stopped.
    fn seed_backlog(&self, backlog: &[BacklogEntry]) -> Result<usize, StorageError> {
        let mut store = self.store.lock().unwrap();
        let mut seeded = 0;

        for entry in backlog {
            match store.get_task(&entry.key) {
                Ok(_) => {}
                Err(StorageError::TaskNotFound(_)) => {
                    let task = TaskRecord::new_pending(
                        &entry.key,
                        &entry.search_term,
                        entry.source_ref.as_deref(),
                    );
                    store.upsert_task(&task)?;
                    seeded += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(seeded)
    }

    /// Runs the worker pool to one of the three run outcomes
    ///
    /// The outcome is recorded on the run row before returning.
    pub async fn run(
        &self,
        run_id: i64,
        backlog: &[BacklogEntry],
        shutdown: watch::Receiver<bool>,
    ) -> Result<RunOutcome, HarrowError> {
        let seeded = self.seed_backlog(backlog)?;
        let recovered = self.store.lock().unwrap().reset_in_progress()?;
        if recovered > 0 {
            info!(tasks = recovered, "Recovered tasks stranded in progress");
        }

        let worker_count = self.pool.usable_count() * self.workers_per_identity as usize;
        info!(
            seeded,
            workers = worker_count,
            identities = self.pool.usable_count(),
            "Starting run"
        );

        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let store = Arc::clone(&self.store);
            let pool = Arc::clone(&self.pool);
            let fetcher = Arc::clone(&self.fetcher);
            let extractor = Arc::clone(&self.extractor);
            let settings = self.settings.clone();
            let shutdown = shutdown.clone();

            handles.push(tokio::spawn(async move {
                worker_loop(
                    worker_id, store, pool, fetcher, extractor, settings, shutdown,
                )
                .await
            }));
        }

        for handle in handles {
            handle
                .await
                .map_err(|e| HarrowError::Internal(format!("worker panicked: {}", e)))??;
        }

        let outcome = if *shutdown.borrow() {
            RunOutcome::Interrupted
        } else if self.store.lock().unwrap().backlog_drained()? {
            RunOutcome::BacklogDrained
        } else {
            RunOutcome::IdentitiesExhausted
        };

        {
            let mut store = self.store.lock().unwrap();
            store.save_identity_health(&self.pool.snapshot())?;
            store.finish_run(run_id, outcome)?;
        }

        info!(outcome = ?outcome, "Run finished");
        Ok(outcome)
    }
}

/// One worker: acquire identity, claim task, run the engine, release
async fn worker_loop<S: Store + Send + 'static>(
    worker_id: usize,
    store: Arc<Mutex<S>>,
    pool: Arc<IdentityPool>,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn RecordExtractor>,
    settings: EngineSettings,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), StorageError> {
    loop {
        if *shutdown.borrow() {
            debug!(worker = worker_id, "Worker stopping on shutdown");
            return Ok(());
        }

        let identity = match pool.acquire() {
            AcquireOutcome::Acquired(identity) => identity,
            AcquireOutcome::Exhausted => {
                warn!(worker = worker_id, "Identity pool exhausted, worker stopping");
                return Ok(());
            }
            AcquireOutcome::Blocked { retry_after } => {
                let wait = retry_after.min(MAX_BLOCKED_WAIT);
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = shutdown.changed() => {}
                }
                continue;
            }
        };

        let claimed = {
            let mut store = store.lock().unwrap();
            store.next_eligible(&identity.id)?
        };

        let mut task = match claimed {
            Some(task) => task,
            None => {
                pool.release(&identity.id, ReleaseOutcome::Success);

                if store.lock().unwrap().backlog_drained()? {
                    debug!(worker = worker_id, "Backlog drained, worker stopping");
                    return Ok(());
                }

                // Remaining tasks are in flight elsewhere or parked on a
                // retry deadline
                tokio::select! {
                    _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => {}
                    _ = shutdown.changed() => {}
                }
                continue;
            }
        };

        debug!(
            worker = worker_id,
            task = %task.key,
            identity = %identity.id,
            "Claimed task"
        );

        let outcome = run_task(
            &mut task,
            &identity,
            fetcher.as_ref(),
            extractor.as_ref(),
            &store,
            &settings,
            &shutdown,
        )
        .await?;

        match outcome {
            EngineOutcome::Completed(_) => {
                pool.release(&identity.id, ReleaseOutcome::Success);
            }
            EngineOutcome::Faulted(category) => {
                let release = match category {
                    FailureCategory::Network
                    | FailureCategory::RateLimit
                    | FailureCategory::SessionInvalid => ReleaseOutcome::Failure(category),
                    // Parse and fatal failures indict the task, not the
                    // identity that fetched it
                    FailureCategory::ParseError | FailureCategory::Fatal => {
                        ReleaseOutcome::Success
                    }
                };
                pool.release(&identity.id, release);
            }
            EngineOutcome::Interrupted => {
                pool.release(&identity.id, ReleaseOutcome::Success);
                return Ok(());
            }
        }
    }
}
