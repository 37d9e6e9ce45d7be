//! Failure classification and backoff policy
//!
//! This module maps raw failure signals (transport errors, HTTP status
//! codes, response-body markers) into a category and a retry/backoff
//! decision. Classification is a pure function so the dispatcher and the
//! pagination engine can share one set of rules.

use rand::Rng;
use std::fmt;
use std::time::Duration;

/// A raw failure signal observed while fetching or decoding a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureSignal {
    /// The request exceeded its deadline
    Timeout,

    /// Connection-level failure (refused, reset, DNS, TLS)
    Connect(String),

    /// Non-success HTTP status with no more specific marker
    HttpStatus(u16),

    /// The response body carried an explicit rate-limit marker
    RateLimitMarker,

    /// The response redirected to a login page
    LoginRedirect,

    /// The response demanded an account checkpoint/re-verification
    CheckpointRequired,

    /// The response body could not be decoded into the expected shape
    MalformedBody(String),

    /// The API returned an explicit permission-denied error
    PermissionDenied(String),

    /// The API returned a generic error payload
    ApiErrors(String),
}

impl fmt::Display for FailureSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "request timeout"),
            Self::Connect(msg) => write!(f, "connection error: {}", msg),
            Self::HttpStatus(code) => write!(f, "HTTP {}", code),
            Self::RateLimitMarker => write!(f, "rate limit marker in response"),
            Self::LoginRedirect => write!(f, "redirected to login"),
            Self::CheckpointRequired => write!(f, "checkpoint required"),
            Self::MalformedBody(msg) => write!(f, "malformed body: {}", msg),
            Self::PermissionDenied(msg) => write!(f, "permission denied: {}", msg),
            Self::ApiErrors(msg) => write!(f, "api errors: {}", msg),
        }
    }
}

/// Failure category taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    /// Transient transport failure; retry the task with backoff
    Network,

    /// Rate limiting; retry with a larger backoff and rotate the identity
    RateLimit,

    /// The identity's session material was rejected; penalize the identity
    /// and retry the task on a different one
    SessionInvalid,

    /// The response could not be decoded; retry a bounded number of times
    ParseError,

    /// Unrecoverable; the task is permanently failed immediately
    Fatal,
}

/// The classification derived from a failure signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureClassification {
    pub category: FailureCategory,
    pub retryable: bool,
    pub backoff: Duration,
}

/// Backoff tuning knobs (from the `[backoff]` config section)
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Base delay for exponential backoff
    pub base: Duration,

    /// Upper bound on any computed backoff
    pub cap: Duration,

    /// Flat delay applied to rate-limit classifications
    pub rate_limit: Duration,

    /// Number of parse errors tolerated before the failure becomes fatal
    pub parse_error_limit: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(2),
            cap: Duration::from_secs(300),
            rate_limit: Duration::from_secs(60),
            parse_error_limit: 2,
        }
    }
}

impl BackoffPolicy {
    /// Computes the exponential backoff for a given retry count: `base * 2^retry`,
    /// capped. Jitter is added separately by the caller via `with_jitter`.
    pub fn exponential(&self, retry_count: u32) -> Duration {
        let factor = 2u32.checked_pow(retry_count.min(16)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// Classifies a failure signal into a category and retry decision
///
/// This is deterministic: the same signal, retry count, and policy always
/// produce the same classification. Randomized jitter is applied only when
/// the delay is actually slept on (see `with_jitter`).
///
/// # Rules
///
/// | Signal | Category | Retryable |
/// |--------|----------|-----------|
/// | Timeout, Connect, HTTP 5xx | Network | yes |
/// | HTTP 429, rate-limit marker | RateLimit | yes (rotates identity) |
/// | Login redirect, checkpoint, HTTP 401 | SessionInvalid | yes (on another identity) |
/// | Malformed body, API errors | ParseError | yes, up to parse-error-limit |
/// | Permission denied, HTTP 4xx other | Fatal | no |
pub fn classify(
    signal: &FailureSignal,
    retry_count: u32,
    policy: &BackoffPolicy,
) -> FailureClassification {
    match signal {
        FailureSignal::Timeout | FailureSignal::Connect(_) => FailureClassification {
            category: FailureCategory::Network,
            retryable: true,
            backoff: policy.exponential(retry_count),
        },
        FailureSignal::HttpStatus(code) if *code >= 500 => FailureClassification {
            category: FailureCategory::Network,
            retryable: true,
            backoff: policy.exponential(retry_count),
        },
        FailureSignal::HttpStatus(429) | FailureSignal::RateLimitMarker => {
            FailureClassification {
                category: FailureCategory::RateLimit,
                retryable: true,
                backoff: policy.rate_limit.max(policy.exponential(retry_count)),
            }
        }
        FailureSignal::HttpStatus(401)
        | FailureSignal::LoginRedirect
        | FailureSignal::CheckpointRequired => FailureClassification {
            category: FailureCategory::SessionInvalid,
            retryable: true,
            backoff: policy.exponential(retry_count),
        },
        FailureSignal::MalformedBody(_) | FailureSignal::ApiErrors(_) => {
            if retry_count >= policy.parse_error_limit {
                FailureClassification {
                    category: FailureCategory::Fatal,
                    retryable: false,
                    backoff: Duration::ZERO,
                }
            } else {
                FailureClassification {
                    category: FailureCategory::ParseError,
                    retryable: true,
                    backoff: policy.exponential(retry_count),
                }
            }
        }
        FailureSignal::PermissionDenied(_) | FailureSignal::HttpStatus(_) => {
            FailureClassification {
                category: FailureCategory::Fatal,
                retryable: false,
                backoff: Duration::ZERO,
            }
        }
    }
}

/// Adds up to 25% random jitter to a delay
///
/// Jitter keeps concurrent workers that failed at the same instant from
/// retrying in lockstep.
pub fn with_jitter(delay: Duration) -> Duration {
    if delay.is_zero() {
        return delay;
    }
    let jitter = rand::thread_rng().gen_range(0.0..0.25);
    delay + delay.mul_f64(jitter)
}
