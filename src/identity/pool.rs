//! Identity pool with per-identity health tracking
//!
//! Workers acquire an identity before claiming a task and release it with
//! the outcome afterwards. The pool parks rate-limited and session-invalid
//! identities on a cooldown, retires identities that fail too many times in
//! a row, and hands out the least recently used healthy identity.

use crate::classify::FailureCategory;
use crate::identity::Identity;
use crate::state::IdentityStatus;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Pool tuning knobs
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Consecutive failures before an identity is retired
    pub retirement_threshold: u32,

    /// Cooldown applied after a rate-limit failure
    pub rate_limit_cooldown: Duration,

    /// Cooldown applied after a session-invalid failure
    pub session_cooldown: Duration,
}

/// Result of an acquire attempt
#[derive(Debug, Clone)]
pub enum AcquireOutcome {
    /// An identity was handed out; release it when done
    Acquired(Identity),

    /// No identity is available right now, but at least one is cooling down
    Blocked { retry_after: Duration },

    /// Every identity is retired; the run cannot make further progress
    Exhausted,
}

/// Outcome reported when releasing an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The page work succeeded (or failed for reasons the identity is not
    /// responsible for); resets the consecutive failure counter
    Success,

    /// The identity is implicated in the failure
    Failure(FailureCategory),
}

/// Per-identity bookkeeping
struct Slot {
    identity: Identity,
    status: IdentityStatus,
    consecutive_failures: u32,
    last_used_at: Option<DateTime<Utc>>,
    last_acquired: Option<Instant>,
    cooldown_until: Option<Instant>,
}

/// Snapshot of one identity's health, for persistence and reporting
#[derive(Debug, Clone)]
pub struct IdentityHealth {
    pub id: String,
    pub status: IdentityStatus,
    pub consecutive_failures: u32,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Thread-safe pool of crawl identities
pub struct IdentityPool {
    slots: Mutex<Vec<Slot>>,
    config: PoolConfig,
}

impl IdentityPool {
    /// Creates a pool from loaded identities
    pub fn new(identities: Vec<Identity>, config: PoolConfig) -> Self {
        let slots = identities
            .into_iter()
            .map(|identity| Slot {
                identity,
                status: IdentityStatus::Available,
                consecutive_failures: 0,
                last_used_at: None,
                last_acquired: None,
                cooldown_until: None,
            })
            .collect();

        Self {
            slots: Mutex::new(slots),
            config,
        }
    }

    /// Number of identities that are not retired
    pub fn usable_count(&self) -> usize {
        let slots = self.slots.lock().unwrap();
        slots.iter().filter(|s| !s.status.is_retired()).count()
    }

    /// Total number of identities in the pool
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attempts to acquire an identity
    ///
    /// Identities whose cooldown has elapsed are returned to the available
    /// set first, then the least recently used available identity is handed
    /// out and marked busy.
    pub fn acquire(&self) -> AcquireOutcome {
        let now = Instant::now();
        let mut slots = self.slots.lock().unwrap();

        // Requeue identities whose cooldown has elapsed
        for slot in slots.iter_mut() {
            if slot.status.is_cooling() {
                if let Some(until) = slot.cooldown_until {
                    if now >= until {
                        debug!(identity = %slot.identity.id, "Cooldown elapsed, identity available again");
                        slot.status = IdentityStatus::Available;
                        slot.cooldown_until = None;
                    }
                }
            }
        }

        // Least recently used available identity
        let candidate = slots
            .iter_mut()
            .filter(|s| s.status == IdentityStatus::Available)
            .min_by_key(|s| s.last_acquired);

        if let Some(slot) = candidate {
            slot.status = IdentityStatus::Busy;
            slot.last_acquired = Some(now);
            slot.last_used_at = Some(Utc::now());
            return AcquireOutcome::Acquired(slot.identity.clone());
        }

        // Nothing available: blocked if anything is busy or cooling,
        // exhausted if everything is retired
        let shortest_cooldown = slots
            .iter()
            .filter(|s| s.status.is_cooling())
            .filter_map(|s| s.cooldown_until)
            .map(|until| until.saturating_duration_since(now))
            .min();

        let any_busy = slots.iter().any(|s| s.status == IdentityStatus::Busy);

        match shortest_cooldown {
            Some(retry_after) => AcquireOutcome::Blocked { retry_after },
            None if any_busy => AcquireOutcome::Blocked {
                retry_after: Duration::from_millis(100),
            },
            None => AcquireOutcome::Exhausted,
        }
    }

    /// Releases a previously acquired identity with its outcome
    ///
    /// A success resets the consecutive failure counter. A failure
    /// increments it; reaching the retirement threshold permanently removes
    /// the identity, otherwise it is parked on the cooldown matching the
    /// failure category.
    pub fn release(&self, identity_id: &str, outcome: ReleaseOutcome) {
        let mut slots = self.slots.lock().unwrap();

        let slot = match slots.iter_mut().find(|s| s.identity.id == identity_id) {
            Some(slot) => slot,
            None => {
                warn!(identity = %identity_id, "Released unknown identity");
                return;
            }
        };

        if slot.status.is_retired() {
            return;
        }

        match outcome {
            ReleaseOutcome::Success => {
                slot.consecutive_failures = 0;
                slot.status = IdentityStatus::Available;
                slot.cooldown_until = None;
            }
            ReleaseOutcome::Failure(category) => {
                slot.consecutive_failures += 1;

                if slot.consecutive_failures >= self.config.retirement_threshold {
                    info!(
                        identity = %identity_id,
                        failures = slot.consecutive_failures,
                        "Retiring identity after consecutive failures"
                    );
                    slot.status = IdentityStatus::Retired;
                    slot.cooldown_until = None;
                    return;
                }

                match category {
                    FailureCategory::RateLimit => {
                        slot.status = IdentityStatus::RateLimited;
                        slot.cooldown_until =
                            Some(Instant::now() + self.config.rate_limit_cooldown);
                    }
                    FailureCategory::SessionInvalid => {
                        slot.status = IdentityStatus::SessionInvalid;
                        slot.cooldown_until = Some(Instant::now() + self.config.session_cooldown);
                    }
                    // Network failures count toward retirement but the
                    // identity stays immediately available
                    _ => {
                        slot.status = IdentityStatus::Available;
                        slot.cooldown_until = None;
                    }
                }
            }
        }
    }

    /// Returns a health snapshot of every identity
    pub fn snapshot(&self) -> Vec<IdentityHealth> {
        let slots = self.slots.lock().unwrap();
        slots
            .iter()
            .map(|s| IdentityHealth {
                id: s.identity.id.clone(),
                status: s.status,
                consecutive_failures: s.consecutive_failures,
                last_used_at: s.last_used_at,
            })
            .collect()
    }
}
