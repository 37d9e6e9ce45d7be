//! The per-task pagination loop
//!
//! `run_task` owns one claimed task from first fetch to the point it either
//! terminates, parks on a classified failure, or yields to a shutdown
//! signal. Task state is persisted after every page, so a crash loses at
//! most one page of work.

use crate::classify::{classify, with_jitter, BackoffPolicy, FailureCategory, FailureSignal};
use crate::engine::{PageFetcher, RecordExtractor};
use crate::identity::Identity;
use crate::state::TaskStatus;
use crate::storage::{NewRecord, StorageResult, Store, TaskRecord};
use chrono::Utc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Engine tuning knobs, derived from the orchestrator config
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_retries: u32,
    pub zero_streak_limit: u32,
    pub max_pages_per_task: u32,
    pub page_delay: Duration,
    pub backoff: BackoffPolicy,
}

/// How one engine invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOutcome {
    /// The task reached a terminal success status
    Completed(TaskStatus),

    /// A classified failure parked or permanently failed the task; the
    /// category tells the dispatcher how to treat the identity
    Faulted(FailureCategory),

    /// The shutdown signal fired; the task was returned to Pending
    Interrupted,
}

/// Applies a classified failure to the task and returns its category
///
/// Retryable failures consume one unit of retry budget and park the task
/// with a jittered backoff deadline; a retryable failure arriving with the
/// budget already spent, or any non-retryable failure, permanently fails
/// the task.
fn apply_failure(task: &mut TaskRecord, signal: &FailureSignal, settings: &EngineSettings) -> FailureCategory {
    let classification = classify(signal, task.retry_count, &settings.backoff);

    task.last_error = Some(signal.to_string());
    task.owner_identity = None;

    if !classification.retryable || task.retry_count >= settings.max_retries {
        task.status = TaskStatus::PermanentlyFailed;
        task.retry_at = None;
    } else {
        task.retry_count += 1;
        task.status = match classification.category {
            FailureCategory::RateLimit => TaskStatus::RateLimited,
            _ => TaskStatus::Failed,
        };

        let delay = with_jitter(classification.backoff);
        let deadline =
            Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        task.retry_at = Some(deadline.to_rfc3339());
    }

    classification.category
}

/// Runs one claimed task until it terminates, faults, or is interrupted
///
/// # Arguments
///
/// * `task` - The claimed task (InProgress, owned by this worker)
/// * `identity` - The identity all fetches go through
/// * `fetcher` / `extractor` - The fetch and extraction seams
/// * `store` - Shared store; locked only for short synchronous sections
/// * `settings` - Engine thresholds
/// * `shutdown` - Watch channel flipped to true on shutdown
pub async fn run_task<S: Store>(
    task: &mut TaskRecord,
    identity: &Identity,
    fetcher: &dyn PageFetcher,
    extractor: &dyn RecordExtractor,
    store: &Mutex<S>,
    settings: &EngineSettings,
    shutdown: &watch::Receiver<bool>,
) -> StorageResult<EngineOutcome> {
    loop {
        if *shutdown.borrow() {
            task.status = TaskStatus::Pending;
            task.owner_identity = None;
            store.lock().unwrap().upsert_task(task)?;
            return Ok(EngineOutcome::Interrupted);
        }

        let page = match fetcher
            .fetch_page(&task.search_term, task.cursor.as_deref(), identity)
            .await
        {
            Ok(page) => page,
            Err(signal) => {
                let category = apply_failure(task, &signal, settings);
                store.lock().unwrap().upsert_task(task)?;
                warn!(
                    task = %task.key,
                    identity = %identity.id,
                    error = %signal,
                    status = %task.status,
                    "Page fetch failed"
                );
                return Ok(EngineOutcome::Faulted(category));
            }
        };

        let items = match extractor.extract(&page) {
            Ok(items) => items,
            Err(signal) => {
                let category = apply_failure(task, &signal, settings);
                store.lock().unwrap().upsert_task(task)?;
                warn!(
                    task = %task.key,
                    identity = %identity.id,
                    error = %signal,
                    status = %task.status,
                    "Page extraction failed"
                );
                return Ok(EngineOutcome::Faulted(category));
            }
        };

        task.pages_fetched += 1;

        // Submit records to the sink; only genuinely new ones count
        let mut new_records = 0u64;
        {
            let mut store = store.lock().unwrap();
            for item in &items {
                let record = NewRecord {
                    record_id: item.id.clone(),
                    name: item.name.clone(),
                    url: item.url.clone(),
                    payload: item.payload.clone(),
                    task_key: task.key.clone(),
                    identity_id: identity.id.clone(),
                };
                if store.insert_record(&record)? {
                    new_records += 1;
                }
            }
        }
        task.records_found += new_records;

        // The streak counts pages with zero net-new records, so a drained
        // result set that keeps echoing known records still terminates
        if new_records == 0 {
            task.empty_streak += 1;
        } else {
            task.empty_streak = 0;
        }

        let next_cursor = extractor.next_cursor(&page);

        let terminal = if task.empty_streak >= settings.zero_streak_limit {
            Some(TaskStatus::CompletedZeroStreak)
        } else if next_cursor.is_none() {
            Some(TaskStatus::CompletedNoCursor)
        } else if task.pages_fetched >= settings.max_pages_per_task {
            Some(TaskStatus::Completed)
        } else {
            None
        };

        task.cursor = next_cursor;

        if let Some(status) = terminal {
            task.status = status;
            task.owner_identity = None;
            task.retry_at = None;
            store.lock().unwrap().upsert_task(task)?;
            info!(
                task = %task.key,
                status = %status,
                pages = task.pages_fetched,
                records = task.records_found,
                "Task finished"
            );
            return Ok(EngineOutcome::Completed(status));
        }

        // Per-page durability point
        store.lock().unwrap().upsert_task(task)?;

        // Polite inter-page delay, cut short by shutdown
        let mut shutdown_rx = shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(with_jitter(settings.page_delay)) => {}
            _ = shutdown_rx.changed() => {}
        }
    }
}
