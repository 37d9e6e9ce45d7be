//! HTTP page fetcher
//!
//! This module performs the actual network fetches, including:
//! - Building one HTTP client per identity (proxy, cookie header)
//! - POSTing the search request with the continuation cursor
//! - Mapping transport and status errors to failure signals
//! - Detecting rate-limit and login/checkpoint markers in response bodies

use crate::classify::FailureSignal;
use crate::engine::{PageFetcher, RawPage};
use crate::identity::Identity;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, COOKIE};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:122.0) Gecko/20100101 Firefox/122.0";

/// Some endpoints prefix JSON bodies with an anti-hijacking guard
const JSON_GUARD_PREFIX: &str = "for (;;);";

/// Network fetcher that POSTs search requests through per-identity clients
pub struct HttpFetcher {
    endpoint: String,
    timeout: Duration,
    clients: Mutex<HashMap<String, Client>>,
}

impl HttpFetcher {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            timeout,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Builds the HTTP client for one identity
    fn build_client(&self, identity: &Identity) -> Result<Client, reqwest::Error> {
        let mut headers = HeaderMap::new();
        if let Ok(cookie) = HeaderValue::from_str(&identity.auth.cookie_header) {
            headers.insert(COOKIE, cookie);
        }

        let mut builder = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(self.timeout)
            .connect_timeout(Duration::from_secs(10))
            .default_headers(headers)
            .gzip(true)
            .brotli(true);

        if let Some(proxy_url) = &identity.proxy_url {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        }

        builder.build()
    }

    /// Gets or builds the cached client for an identity
    fn client_for(&self, identity: &Identity) -> Result<Client, FailureSignal> {
        let mut clients = self.clients.lock().unwrap();
        if let Some(client) = clients.get(&identity.id) {
            return Ok(client.clone());
        }

        let client = self
            .build_client(identity)
            .map_err(|e| FailureSignal::Connect(format!("client build failed: {}", e)))?;
        clients.insert(identity.id.clone(), client.clone());
        Ok(client)
    }
}

/// Strips the anti-hijacking guard prefix if present
fn strip_json_guard(body: &str) -> &str {
    body.strip_prefix(JSON_GUARD_PREFIX).unwrap_or(body).trim()
}

/// Scans a response body for failure markers the status code did not show
fn detect_body_markers(body: &str) -> Option<FailureSignal> {
    let lowered = body.to_lowercase();

    if lowered.contains("checkpoint_required") || lowered.contains("/checkpoint/") {
        return Some(FailureSignal::CheckpointRequired);
    }
    if lowered.contains("login_required") || lowered.contains("/login/?next=") {
        return Some(FailureSignal::LoginRedirect);
    }
    if lowered.contains("rate limit") || lowered.contains("temporarily blocked") {
        return Some(FailureSignal::RateLimitMarker);
    }

    None
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_page(
        &self,
        search_term: &str,
        cursor: Option<&str>,
        identity: &Identity,
    ) -> Result<RawPage, FailureSignal> {
        let client = self.client_for(identity)?;

        let mut request = client.post(&self.endpoint).json(&serde_json::json!({
            "q": search_term,
            "cursor": cursor,
        }));

        if let Some(token) = &identity.auth.access_token {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                request = request.header(AUTHORIZATION, value);
            }
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FailureSignal::Timeout
            } else {
                FailureSignal::Connect(e.to_string())
            }
        })?;

        // Redirects to the login or checkpoint flow mean the session died
        let final_path = response.url().path().to_string();
        if final_path.starts_with("/login") {
            return Err(FailureSignal::LoginRedirect);
        }
        if final_path.starts_with("/checkpoint") {
            return Err(FailureSignal::CheckpointRequired);
        }

        let status = response.status();
        if !status.is_success() {
            return Err(FailureSignal::HttpStatus(status.as_u16()));
        }

        let text = response
            .text()
            .await
            .map_err(|e| FailureSignal::Connect(e.to_string()))?;

        if let Some(signal) = detect_body_markers(&text) {
            return Err(signal);
        }

        let stripped = strip_json_guard(&text);
        let body: serde_json::Value = serde_json::from_str(stripped).map_err(|e| {
            debug!(error = %e, "Response body is not JSON");
            FailureSignal::MalformedBody(e.to_string())
        })?;

        Ok(RawPage { body })
    }
}
