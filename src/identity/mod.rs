//! Identity management for Harrow
//!
//! An identity is the bundle of credential material and network egress
//! (cookie header, optional bearer token, optional proxy) that a worker
//! fetches pages with. This module loads identities from a JSON file and
//! provides the health-tracking pool workers acquire them from.

mod pool;

pub use pool::{AcquireOutcome, IdentityHealth, IdentityPool, PoolConfig, ReleaseOutcome};

use crate::ConfigError;
use serde::Deserialize;
use std::path::Path;
use tracing::warn;

/// Credential material attached to an identity
#[derive(Debug, Clone)]
pub struct AuthMaterial {
    /// Cookie header value sent verbatim on every request
    pub cookie_header: String,

    /// Optional bearer token for APIs that require one alongside cookies
    pub access_token: Option<String>,
}

/// A single crawl identity
#[derive(Debug, Clone)]
pub struct Identity {
    /// Stable identifier, used in logs and persistence
    pub id: String,

    pub auth: AuthMaterial,

    /// Optional proxy URL (http, https, or socks5) for this identity's egress
    pub proxy_url: Option<String>,
}

/// On-disk shape of one identities-file entry
#[derive(Debug, Deserialize)]
struct IdentityEntry {
    id: String,
    cookie: String,
    #[serde(rename = "access-token", default)]
    access_token: Option<String>,
    #[serde(default)]
    proxy: Option<String>,
}

/// Returns true if the cookie value is an unfilled template placeholder
fn is_placeholder(cookie: &str) -> bool {
    let trimmed = cookie.trim();
    trimmed.is_empty() || trimmed.starts_with('<') || trimmed.contains("PASTE")
}

/// Loads identities from a JSON file
///
/// Entries with placeholder or empty credential material are skipped with a
/// warning instead of failing the run, so a partially filled-in identities
/// file still works.
///
/// # Arguments
///
/// * `path` - Path to the JSON identities file (an array of entries)
///
/// # Returns
///
/// * `Ok(Vec<Identity>)` - The usable identities, in file order
/// * `Err(ConfigError)` - Failed to read or parse the file
pub fn load_identities(path: &Path) -> Result<Vec<Identity>, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let entries: Vec<IdentityEntry> = serde_json::from_str(&content)?;

    let mut identities = Vec::with_capacity(entries.len());
    for entry in entries {
        if is_placeholder(&entry.cookie) {
            warn!(identity = %entry.id, "Skipping identity with placeholder credentials");
            continue;
        }

        identities.push(Identity {
            id: entry.id,
            auth: AuthMaterial {
                cookie_header: entry.cookie,
                access_token: entry.access_token,
            },
            proxy_url: entry.proxy,
        });
    }

    Ok(identities)
}
