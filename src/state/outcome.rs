/// Per-URL outcomes and fetch classifications
///
/// A URL is claimed once in the dedup index as `Pending` and moves to exactly
/// one terminal outcome.
use std::fmt;

/// The recorded outcome of a claimed URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UrlOutcome {
    // ===== Active =====
    /// Claimed; queued, waiting for a retry, or in flight
    Pending,

    // ===== Terminal success =====
    /// Fetched successfully; not a product page
    Succeeded,

    /// Fetched successfully and matched a product pattern
    Product,

    // ===== Terminal failure =====
    /// Permanent failure, or transient failure after the last retry
    Failed,

    /// Disallowed by robots.txt
    Blocked,

    // ===== Terminal skip =====
    /// Discarded without fetching (frontier eviction or domain product limit)
    Dropped,
}

impl UrlOutcome {
    /// Returns true if no further processing will happen for the URL
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Returns true if the URL was fetched successfully
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Product)
    }

    /// Converts the outcome to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Product => "product",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
            Self::Dropped => "dropped",
        }
    }

    /// Parses an outcome from its database string representation
    ///
    /// Returns None if the string doesn't match any known outcome.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "succeeded" => Some(Self::Succeeded),
            "product" => Some(Self::Product),
            "failed" => Some(Self::Failed),
            "blocked" => Some(Self::Blocked),
            "dropped" => Some(Self::Dropped),
            _ => None,
        }
    }

    /// Returns all possible outcomes
    pub fn all() -> &'static [UrlOutcome] {
        &[
            Self::Pending,
            Self::Succeeded,
            Self::Product,
            Self::Failed,
            Self::Blocked,
            Self::Dropped,
        ]
    }
}

impl fmt::Display for UrlOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// How a single fetch attempt ended, as seen by politeness and retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchClass {
    /// 2xx response
    Success,
    /// Timeout, connection error or 5xx; worth retrying
    Transient,
    /// HTTP 429; retried, and the domain backs off immediately
    Throttled,
    /// Other 4xx, robots disallow or undecodable content; never retried
    Permanent,
    /// The crawl was stopping and the fetch was abandoned
    Cancelled,
}

impl FetchClass {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient | Self::Throttled | Self::Cancelled)
    }

    /// Returns true if the attempt counts against the domain's health
    pub fn is_domain_failure(&self) -> bool {
        matches!(self, Self::Transient | Self::Throttled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_outcomes() {
        assert!(!UrlOutcome::Pending.is_terminal());
        for outcome in &UrlOutcome::all()[1..] {
            assert!(outcome.is_terminal(), "{} should be terminal", outcome);
        }
    }

    #[test]
    fn test_success() {
        assert!(UrlOutcome::Succeeded.is_success());
        assert!(UrlOutcome::Product.is_success());
        assert!(!UrlOutcome::Blocked.is_success());
        assert!(!UrlOutcome::Dropped.is_success());
    }

    #[test]
    fn test_db_string_roundtrip() {
        for outcome in UrlOutcome::all() {
            let parsed = UrlOutcome::from_db_string(outcome.to_db_string());
            assert_eq!(parsed, Some(*outcome));
        }
        assert_eq!(UrlOutcome::from_db_string("fetching"), None);
    }

    #[test]
    fn test_fetch_class() {
        assert!(FetchClass::Transient.is_transient());
        assert!(FetchClass::Throttled.is_transient());
        assert!(FetchClass::Cancelled.is_transient());
        assert!(!FetchClass::Permanent.is_transient());
        assert!(!FetchClass::Success.is_transient());

        assert!(FetchClass::Throttled.is_domain_failure());
        assert!(!FetchClass::Cancelled.is_domain_failure());
        assert!(!FetchClass::Permanent.is_domain_failure());
    }
}
