//! Backlog file parsing
//!
//! The backlog is a plain text file with one search per line. A line is
//! either a bare search term or a full search URL whose `q` query parameter
//! holds the term. Blank lines and `#` comments are skipped, order is
//! preserved, and duplicate terms are dropped.

use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;
use url::Url;

/// One entry from the backlog file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacklogEntry {
    /// Stable task key: 16-hex-char SHA-256 prefix of the search term
    pub key: String,

    /// The search term itself
    pub search_term: String,

    /// The original backlog line, when it was a URL
    pub source_ref: Option<String>,
}

/// Derives the stable task key for a search term
pub fn task_key(search_term: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(search_term.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

/// Extracts the search term from one backlog line
///
/// Returns None for lines that look like URLs but carry no `q` parameter.
fn parse_line(line: &str) -> Option<(String, Option<String>)> {
    if line.starts_with("http://") || line.starts_with("https://") {
        let url = match Url::parse(line) {
            Ok(url) => url,
            Err(e) => {
                warn!(line = %line, error = %e, "Skipping unparseable backlog URL");
                return None;
            }
        };

        let term = url
            .query_pairs()
            .find(|(name, _)| name == "q")
            .map(|(_, value)| value.into_owned());

        match term {
            Some(term) if !term.trim().is_empty() => {
                Some((term.trim().to_string(), Some(line.to_string())))
            }
            _ => {
                warn!(line = %line, "Skipping backlog URL without a q parameter");
                None
            }
        }
    } else {
        Some((line.to_string(), None))
    }
}

/// Loads the backlog file into an ordered, deduplicated list of entries
///
/// # Arguments
///
/// * `path` - Path to the backlog file
///
/// # Returns
///
/// * `Ok(Vec<BacklogEntry>)` - Entries in file order, duplicates dropped
/// * `Err(ConfigError)` - Failed to read the file
pub fn load_backlog(path: &Path) -> Result<Vec<BacklogEntry>, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (search_term, source_ref) = match parse_line(line) {
            Some(parsed) => parsed,
            None => continue,
        };

        if !seen.insert(search_term.clone()) {
            continue;
        }

        entries.push(BacklogEntry {
            key: task_key(&search_term),
            search_term,
            source_ref,
        });
    }

    Ok(entries)
}
