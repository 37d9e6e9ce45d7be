//! Record extraction from raw API pages
//!
//! The upstream response is a GraphQL-shaped JSON document. The extractor
//! walks `data.results.edges[].node` for records and
//! `data.results.page_info.end_cursor` for the continuation cursor.

use crate::classify::FailureSignal;
use crate::engine::{RawPage, RecordItem};
use serde_json::Value;
use tracing::debug;

/// Extracts records and the continuation cursor from a raw page
pub trait RecordExtractor: Send + Sync {
    /// Extracts the records on this page
    ///
    /// A page with an unexpected shape yields a `FailureSignal` rather than
    /// silently returning nothing, so shape drift is retried and eventually
    /// surfaces as a permanent failure instead of a quiet empty run.
    fn extract(&self, page: &RawPage) -> Result<Vec<RecordItem>, FailureSignal>;

    /// Reads the continuation cursor, if the API offered one
    fn next_cursor(&self, page: &RawPage) -> Option<String>;
}

/// Extractor for the GraphQL search-result shape
#[derive(Debug, Default)]
pub struct JsonExtractor;

impl JsonExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Surfaces an explicit error payload as a failure signal
    fn check_api_errors(body: &Value) -> Result<(), FailureSignal> {
        let errors = match body.get("errors").and_then(Value::as_array) {
            Some(errors) if !errors.is_empty() => errors,
            _ => return Ok(()),
        };

        let message = errors
            .iter()
            .filter_map(|e| e.get("message").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("; ");

        if message.to_lowercase().contains("permission") {
            Err(FailureSignal::PermissionDenied(message))
        } else {
            Err(FailureSignal::ApiErrors(message))
        }
    }
}

impl RecordExtractor for JsonExtractor {
    fn extract(&self, page: &RawPage) -> Result<Vec<RecordItem>, FailureSignal> {
        Self::check_api_errors(&page.body)?;

        let edges = page
            .body
            .pointer("/data/results/edges")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                FailureSignal::MalformedBody("missing data.results.edges".to_string())
            })?;

        let mut items = Vec::with_capacity(edges.len());
        for edge in edges {
            let node = match edge.get("node") {
                Some(node) => node,
                None => continue,
            };

            // A node without an id cannot be deduplicated; skip it
            let id = match node.get("id").and_then(Value::as_str) {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => {
                    debug!("Skipping node without an id");
                    continue;
                }
            };

            items.push(RecordItem {
                id,
                name: node.get("name").and_then(Value::as_str).map(str::to_string),
                url: node.get("url").and_then(Value::as_str).map(str::to_string),
                payload: node.clone(),
            });
        }

        Ok(items)
    }

    fn next_cursor(&self, page: &RawPage) -> Option<String> {
        page.body
            .pointer("/data/results/page_info/end_cursor")
            .and_then(Value::as_str)
            .filter(|cursor| !cursor.is_empty())
            .map(str::to_string)
    }
}
