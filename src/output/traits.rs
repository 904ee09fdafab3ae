//! Output traits and types
//!
//! This module defines the product sink interface, the product record it
//! receives and the end-of-run crawl summary.

use crate::state::UrlOutcome;
use crate::url::{CanonicalUrl, Domain};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// A URL classified as a product page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductMatch {
    /// Monotonically increasing; doubles as the sink checkpoint
    pub seq: u64,
    pub url: CanonicalUrl,
    pub domain: Domain,

    /// Source of the pattern that matched
    pub pattern: String,

    /// Page the product link was found on; `None` when the product was a seed
    pub found_on: Option<CanonicalUrl>,

    pub discovered_at: DateTime<Utc>,
}

/// Receives product matches as they are found
///
/// Products are emitted in `seq` order. After a restart the controller
/// replays every stored product with a `seq` above [`ProductSink::checkpoint`].
pub trait ProductSink: Send {
    fn emit(&mut self, product: &ProductMatch) -> OutputResult<()>;

    /// Highest `seq` durably accepted so far (0 if none)
    fn checkpoint(&self) -> u64;

    fn flush(&mut self) -> OutputResult<()>;
}

/// Per-domain results for a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSummary {
    pub domain: Domain,

    /// Requests sent, robots.txt fetches and retries included
    pub dispatched: u64,

    /// URLs fetched successfully, products included
    pub succeeded: u64,

    /// URLs that failed for good
    pub failed: u64,

    /// URLs disallowed by robots.txt
    pub blocked: u64,

    pub products: u64,

    /// URLs still waiting in the frontier when the run ended
    pub pending: u64,
}

impl DomainSummary {
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            ..Self::default()
        }
    }

    /// URLs of this domain with a fetch outcome
    pub fn settled(&self) -> u64 {
        self.succeeded + self.failed + self.blocked
    }

    /// Percentage of settled URLs that were fetched successfully
    pub fn success_rate(&self) -> f64 {
        let settled = self.settled();
        if settled == 0 {
            return 0.0;
        }
        (self.succeeded as f64 / settled as f64) * 100.0
    }
}

/// Summary of a crawl run
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub run_id: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    /// "completed" when the crawl drained, "interrupted" after a shutdown
    pub status: String,
    pub config_hash: String,

    /// Outcome counts over every URL the dedup index has seen
    pub outcomes: BTreeMap<UrlOutcome, u64>,

    /// Products emitted during this run
    pub products_emitted: u64,

    /// URLs left in the frontier (including scheduled retries)
    pub frontier_remaining: u64,

    pub domains: Vec<DomainSummary>,
}

impl Default for CrawlSummary {
    fn default() -> Self {
        Self {
            run_id: None,
            started_at: Utc::now(),
            finished_at: None,
            status: "running".to_string(),
            config_hash: String::new(),
            outcomes: BTreeMap::new(),
            products_emitted: 0,
            frontier_remaining: 0,
            domains: Vec::new(),
        }
    }
}

impl CrawlSummary {
    /// Creates a new empty crawl summary
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, outcome: UrlOutcome) -> u64 {
        self.outcomes.get(&outcome).copied().unwrap_or(0)
    }

    /// Total URLs claimed in the dedup index
    pub fn urls_seen(&self) -> u64 {
        self.outcomes.values().sum()
    }

    /// Returns the number of URLs in terminal outcomes
    pub fn total_terminal(&self) -> u64 {
        self.outcomes
            .iter()
            .filter(|(outcome, _)| outcome.is_terminal())
            .map(|(_, count)| count)
            .sum()
    }

    /// Percentage of terminal URLs that were fetched successfully
    pub fn success_rate(&self) -> f64 {
        let terminal = self.total_terminal();
        if terminal == 0 {
            return 0.0;
        }
        let succeeded = self.count(UrlOutcome::Succeeded) + self.count(UrlOutcome::Product);
        (succeeded as f64 / terminal as f64) * 100.0
    }

    /// Percentage of terminal URLs that failed or were blocked
    pub fn error_rate(&self) -> f64 {
        let terminal = self.total_terminal();
        if terminal == 0 {
            return 0.0;
        }
        let errors = self.count(UrlOutcome::Failed) + self.count(UrlOutcome::Blocked);
        (errors as f64 / terminal as f64) * 100.0
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_seconds())
    }

    pub fn is_complete(&self) -> bool {
        self.status == "completed"
    }

    pub fn domain(&self, domain: &str) -> Option<&DomainSummary> {
        self.domains.iter().find(|d| d.domain.as_str() == domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary_with(counts: &[(UrlOutcome, u64)]) -> CrawlSummary {
        let mut summary = CrawlSummary::new();
        for (outcome, count) in counts {
            summary.outcomes.insert(*outcome, *count);
        }
        summary
    }

    #[test]
    fn test_rates() {
        let summary = summary_with(&[
            (UrlOutcome::Succeeded, 50),
            (UrlOutcome::Product, 30),
            (UrlOutcome::Failed, 15),
            (UrlOutcome::Blocked, 5),
            (UrlOutcome::Pending, 10),
        ]);

        assert_eq!(summary.urls_seen(), 110);
        assert_eq!(summary.total_terminal(), 100);
        assert_eq!(summary.success_rate(), 80.0);
        assert_eq!(summary.error_rate(), 20.0);
    }

    #[test]
    fn test_rates_with_no_urls() {
        let summary = CrawlSummary::new();
        assert_eq!(summary.success_rate(), 0.0);
        assert_eq!(summary.error_rate(), 0.0);
        assert!(!summary.is_complete());
    }

    #[test]
    fn test_domain_success_rate() {
        let mut domain = DomainSummary::new(Domain::new("shop.com"));
        assert_eq!(domain.success_rate(), 0.0);

        domain.dispatched = 9;
        domain.succeeded = 3;
        domain.failed = 1;
        assert_eq!(domain.success_rate(), 75.0);

        domain.blocked = 2;
        assert_eq!(domain.settled(), 6);
        assert_eq!(domain.success_rate(), 50.0);
    }

    #[test]
    fn test_product_match_serializes_urls_as_strings() {
        let product = ProductMatch {
            seq: 7,
            url: CanonicalUrl::restore("https://shop.com/p/1").unwrap(),
            domain: Domain::new("shop.com"),
            pattern: "/p/".to_string(),
            found_on: None,
            discovered_at: Utc::now(),
        };

        let json = serde_json::to_value(&product).unwrap();
        assert_eq!(json["url"], "https://shop.com/p/1");
        assert_eq!(json["domain"], "shop.com");
        assert_eq!(json["seq"], 7);
        assert!(json["found_on"].is_null());
    }
}
