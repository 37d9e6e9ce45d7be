//! Identity status definitions for the identity pool

use std::fmt;

/// Represents the health state of a crawl identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityStatus {
    /// Identity is healthy and can be acquired
    Available,

    /// Identity is currently held by a worker
    Busy,

    /// Identity hit a rate limit; parked until its cooldown elapses
    RateLimited,

    /// Identity's session material was rejected; parked until its cooldown elapses
    SessionInvalid,

    /// Identity failed too many times in a row and was permanently removed
    Retired,
}

impl IdentityStatus {
    /// Returns true if the identity can never be selected again
    pub fn is_retired(&self) -> bool {
        matches!(self, Self::Retired)
    }

    /// Returns true if the identity is parked in a cooldown state
    pub fn is_cooling(&self) -> bool {
        matches!(self, Self::RateLimited | Self::SessionInvalid)
    }

    /// Converts the identity status to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Busy => "busy",
            Self::RateLimited => "rate_limited",
            Self::SessionInvalid => "session_invalid",
            Self::Retired => "retired",
        }
    }

    /// Parses an identity status from a database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "available" => Some(Self::Available),
            "busy" => Some(Self::Busy),
            "rate_limited" => Some(Self::RateLimited),
            "session_invalid" => Some(Self::SessionInvalid),
            "retired" => Some(Self::Retired),
            _ => None,
        }
    }
}

impl fmt::Display for IdentityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retired() {
        assert!(IdentityStatus::Retired.is_retired());
        assert!(!IdentityStatus::Available.is_retired());
        assert!(!IdentityStatus::RateLimited.is_retired());
    }

    #[test]
    fn test_is_cooling() {
        assert!(IdentityStatus::RateLimited.is_cooling());
        assert!(IdentityStatus::SessionInvalid.is_cooling());

        assert!(!IdentityStatus::Available.is_cooling());
        assert!(!IdentityStatus::Busy.is_cooling());
        assert!(!IdentityStatus::Retired.is_cooling());
    }

    #[test]
    fn test_roundtrip_db_string() {
        for status in [
            IdentityStatus::Available,
            IdentityStatus::Busy,
            IdentityStatus::RateLimited,
            IdentityStatus::SessionInvalid,
            IdentityStatus::Retired,
        ] {
            let parsed = IdentityStatus::from_db_string(status.to_db_string());
            assert_eq!(Some(status), parsed);
        }
    }

    #[test]
    fn test_from_db_string_invalid() {
        assert_eq!(IdentityStatus::from_db_string("bogus"), None);
    }
}
