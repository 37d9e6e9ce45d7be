//! Pagination engine
//!
//! This module drives one task through its paginated search: fetch a page
//! with the worker's identity, extract records, submit them to the sink,
//! advance the cursor, and decide whether the task terminates, parks on a
//! failure, or keeps going. The fetch and extraction seams are traits so
//! the loop can be exercised without a network.

mod extract;
mod fetch;
mod paginator;

pub use extract::{JsonExtractor, RecordExtractor};
pub use fetch::HttpFetcher;
pub use paginator::{run_task, EngineOutcome, EngineSettings};

use crate::classify::FailureSignal;
use crate::identity::Identity;
use async_trait::async_trait;

/// One raw page of API response
#[derive(Debug, Clone)]
pub struct RawPage {
    pub body: serde_json::Value,
}

/// One record extracted from a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordItem {
    /// Upstream identifier, the deduplication key
    pub id: String,
    pub name: Option<String>,
    pub url: Option<String>,
    /// The full node payload, persisted verbatim
    pub payload: serde_json::Value,
}

/// Fetches one page of search results
///
/// Implementations map every failure to a `FailureSignal` so the engine can
/// classify it; they never panic on bad upstream behavior.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(
        &self,
        search_term: &str,
        cursor: Option<&str>,
        identity: &Identity,
    ) -> Result<RawPage, FailureSignal>;
}
