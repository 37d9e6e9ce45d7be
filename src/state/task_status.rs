//! Task status definitions for tracking crawl progress
//!
//! This module defines all possible states a task can be in during its
//! pagination lifecycle.

use std::fmt;

/// Represents the current state of a crawl task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    // ===== Active States =====
    /// Task has been created from the backlog but never attempted
    Pending,

    /// Task is currently owned by a worker
    InProgress,

    // ===== Retryable Failure States =====
    /// Last page fetch hit a rate limit; eligible again after backoff
    RateLimited,

    /// Last page fetch failed with a retryable error; eligible again after backoff
    Failed,

    // ===== Terminal Success States =====
    /// Task reached its page budget
    Completed,

    /// The API stopped returning a continuation cursor
    CompletedNoCursor,

    /// The configured number of consecutive pages without a new record
    /// was reached
    CompletedZeroStreak,

    // ===== Terminal Failure State =====
    /// Retry budget exhausted or an unrecoverable error occurred
    PermanentlyFailed,
}

impl TaskStatus {
    /// Returns true if this is a terminal state (the task is never mutated again)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed
                | Self::CompletedNoCursor
                | Self::CompletedZeroStreak
                | Self::PermanentlyFailed
        )
    }

    /// Returns true if this represents a successful completion
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::CompletedNoCursor | Self::CompletedZeroStreak
        )
    }

    /// Returns true if the task is parked in a retryable failure state
    pub fn is_retryable_failure(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Failed)
    }

    /// Converts the task status to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::RateLimited => "rate_limited",
            Self::Failed => "failed",
            Self::Completed => "completed",
            Self::CompletedNoCursor => "completed_no_cursor",
            Self::CompletedZeroStreak => "completed_zero_streak",
            Self::PermanentlyFailed => "permanently_failed",
        }
    }

    /// Parses a task status from a database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "rate_limited" => Some(Self::RateLimited),
            "failed" => Some(Self::Failed),
            "completed" => Some(Self::Completed),
            "completed_no_cursor" => Some(Self::CompletedNoCursor),
            "completed_zero_streak" => Some(Self::CompletedZeroStreak),
            "permanently_failed" => Some(Self::PermanentlyFailed),
            _ => None,
        }
    }

    /// Returns all possible task statuses
    pub fn all_statuses() -> Vec<Self> {
        vec![
            Self::Pending,
            Self::InProgress,
            Self::RateLimited,
            Self::Failed,
            Self::Completed,
            Self::CompletedNoCursor,
            Self::CompletedZeroStreak,
            Self::PermanentlyFailed,
        ]
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
