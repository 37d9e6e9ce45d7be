use serde::Deserialize;

/// Main configuration structure for Harrow
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    pub api: ApiConfig,
    pub output: OutputConfig,
}

/// Orchestrator behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum retries per task before it is permanently failed
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Consecutive failures before an identity is retired
    #[serde(rename = "retirement-threshold", default = "default_retirement_threshold")]
    pub retirement_threshold: u32,

    /// Consecutive pages without a new record before a task is drained
    #[serde(rename = "zero-streak-limit", default = "default_zero_streak_limit")]
    pub zero_streak_limit: u32,

    /// Page budget per task
    #[serde(rename = "max-pages-per-task", default = "default_max_pages_per_task")]
    pub max_pages_per_task: u32,

    /// Concurrent workers per healthy identity
    #[serde(rename = "workers-per-identity", default = "default_workers_per_identity")]
    pub workers_per_identity: u32,

    /// Per-request timeout (seconds)
    #[serde(rename = "fetch-timeout-secs", default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Delay between consecutive page fetches within one task (milliseconds)
    #[serde(rename = "page-delay-ms", default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
}

/// Backoff tuning configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BackoffConfig {
    /// Base delay for exponential backoff (seconds)
    #[serde(rename = "base-secs", default = "default_backoff_base_secs")]
    pub base_secs: f64,

    /// Upper bound on any computed backoff (seconds)
    #[serde(rename = "cap-secs", default = "default_backoff_cap_secs")]
    pub cap_secs: f64,

    /// Flat delay for rate-limit failures (seconds)
    #[serde(rename = "rate-limit-secs", default = "default_rate_limit_secs")]
    pub rate_limit_secs: f64,

    /// Cooldown before a penalized identity becomes available again (seconds)
    #[serde(rename = "identity-cooldown-secs", default = "default_identity_cooldown_secs")]
    pub identity_cooldown_secs: f64,

    /// Parse errors tolerated per task before the failure is treated as fatal
    #[serde(rename = "parse-error-limit", default = "default_parse_error_limit")]
    pub parse_error_limit: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_secs: default_backoff_base_secs(),
            cap_secs: default_backoff_cap_secs(),
            rate_limit_secs: default_rate_limit_secs(),
            identity_cooldown_secs: default_identity_cooldown_secs(),
            parse_error_limit: default_parse_error_limit(),
        }
    }
}

/// Upstream API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Endpoint URL that search pages are fetched from
    pub endpoint: String,

    /// Path to the JSON file holding identity credentials
    #[serde(rename = "identities-path")]
    pub identities_path: String,

    /// Path to the backlog file of search terms/URLs
    #[serde(rename = "backlog-path")]
    pub backlog_path: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

fn default_max_retries() -> u32 {
    2
}

fn default_retirement_threshold() -> u32 {
    3
}

fn default_zero_streak_limit() -> u32 {
    3
}

fn default_max_pages_per_task() -> u32 {
    1000
}

fn default_workers_per_identity() -> u32 {
    1
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_page_delay_ms() -> u64 {
    250
}

fn default_backoff_base_secs() -> f64 {
    2.0
}

fn default_backoff_cap_secs() -> f64 {
    300.0
}

fn default_rate_limit_secs() -> f64 {
    60.0
}

fn default_identity_cooldown_secs() -> f64 {
    120.0
}

fn default_parse_error_limit() -> u32 {
    2
}

impl Config {
    /// Builds the backoff policy used by the failure classifier
    pub fn backoff_policy(&self) -> crate::classify::BackoffPolicy {
        crate::classify::BackoffPolicy {
            base: std::time::Duration::from_secs_f64(self.backoff.base_secs),
            cap: std::time::Duration::from_secs_f64(self.backoff.cap_secs),
            rate_limit: std::time::Duration::from_secs_f64(self.backoff.rate_limit_secs),
            parse_error_limit: self.backoff.parse_error_limit,
        }
    }
}
