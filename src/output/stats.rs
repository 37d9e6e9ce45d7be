//! Statistics generation from the orchestration database
//!
//! This module provides functionality for extracting and displaying
//! run statistics from the storage layer.

use crate::state::TaskStatus;
use crate::storage::Store;
use crate::HarrowError;
use std::collections::HashMap;

/// Run statistics summary
#[derive(Debug, Clone)]
pub struct RunStatistics {
    /// Total number of tasks
    pub total_tasks: u64,

    /// Count of tasks by status
    pub tasks_by_status: HashMap<TaskStatus, u64>,

    /// Total number of unique records persisted
    pub total_records: u64,

    /// Total pages fetched across all tasks
    pub total_pages: u64,

    /// Permanently failed tasks with their last error
    pub failed_tasks: Vec<(String, Option<String>)>,

    /// Identities retired during the latest run
    pub retired_identities: Vec<String>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `store` - The storage backend to query
///
/// # Returns
///
/// * `Ok(RunStatistics)` - Successfully loaded statistics
/// * `Err(HarrowError)` - Failed to query statistics
pub fn load_statistics(store: &dyn Store) -> Result<RunStatistics, HarrowError> {
    let tasks_by_status = store.count_tasks_by_status()?;
    let total_tasks = tasks_by_status.values().sum();
    let total_records = store.count_records()?;
    let total_pages = store.total_pages_fetched()?;

    let failed_tasks = store
        .permanently_failed_tasks()?
        .into_iter()
        .map(|task| (task.search_term, task.last_error))
        .collect();

    let retired_identities = store.retired_identities()?;

    Ok(RunStatistics {
        total_tasks,
        tasks_by_status,
        total_records,
        total_pages,
        failed_tasks,
        retired_identities,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &RunStatistics) {
    println!("=== Run Statistics ===\n");

    println!("Overview:");
    println!("  Total tasks: {}", stats.total_tasks);
    println!("  Pages fetched: {}", stats.total_pages);
    println!("  Unique records: {}", stats.total_records);
    println!();

    println!("Tasks by Status:");
    // Sort statuses by count (descending)
    let mut status_counts: Vec<_> = stats.tasks_by_status.iter().collect();
    status_counts.sort_by(|a, b| b.1.cmp(a.1));

    for (status, count) in status_counts {
        let percentage = if stats.total_tasks > 0 {
            (*count as f64 / stats.total_tasks as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!();

    if !stats.failed_tasks.is_empty() {
        println!("Permanently Failed Tasks ({}):", stats.failed_tasks.len());
        for (term, error) in &stats.failed_tasks {
            match error {
                Some(error) => println!("  - {} ({})", term, error),
                None => println!("  - {}", term),
            }
        }
        println!();
    }

    if !stats.retired_identities.is_empty() {
        println!("Retired Identities ({}):", stats.retired_identities.len());
        for id in &stats.retired_identities {
            println!("  - {}", id);
        }
        println!();
    }

    // A task counts as done once it reaches any terminal success status
    let completed: u64 = stats
        .tasks_by_status
        .iter()
        .filter(|(status, _)| status.is_success())
        .map(|(_, count)| count)
        .sum();
    let completion_rate = if stats.total_tasks > 0 {
        (completed as f64 / stats.total_tasks as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Completion Rate: {:.1}% ({} / {} tasks finished)",
        completion_rate, completed, stats.total_tasks
    );
}
