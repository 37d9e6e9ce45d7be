//! Harrow: a resilient batch crawl orchestrator
//!
//! This crate drives a backlog of paginated search tasks through a pool of
//! crawl identities, classifying every failure, retrying within bounded
//! budgets, and persisting all state to SQLite so an interrupted run
//! resumes exactly where it stopped.

pub mod backlog;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod identity;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Harrow operations
#[derive(Debug, Error)]
pub enum HarrowError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No usable identities: {0}")]
    NoIdentities(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Harrow operations
pub type Result<T> = std::result::Result<T, HarrowError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use dispatch::{Dispatcher, RunOutcome};
pub use state::{IdentityStatus, TaskStatus};
