//! Statistics generation from the crawl database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::state::UrlOutcome;
use crate::storage::{RunRecord, Storage};
use crate::ScoutError;
use std::collections::HashMap;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Most recent run, if any
    pub latest_run: Option<RunRecord>,

    /// Total number of URLs in the dedup snapshot
    pub total_urls: u64,

    /// Count of URLs by outcome
    pub urls_by_outcome: HashMap<UrlOutcome, u64>,

    /// URLs still waiting in the frontier snapshot
    pub frontier_pending: u64,

    /// Products logged per domain, most first
    pub products_by_domain: Vec<(String, u64)>,
}

impl CrawlStatistics {
    pub fn count(&self, outcome: UrlOutcome) -> u64 {
        self.urls_by_outcome.get(&outcome).copied().unwrap_or(0)
    }

    pub fn total_products(&self) -> u64 {
        self.products_by_domain.iter().map(|(_, count)| count).sum()
    }
}

/// Loads statistics from storage
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(ScoutError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<CrawlStatistics, ScoutError> {
    let urls_by_outcome = storage.count_by_outcome()?;

    Ok(CrawlStatistics {
        latest_run: storage.get_latest_run()?,
        total_urls: urls_by_outcome.values().sum(),
        urls_by_outcome,
        frontier_pending: storage.count_frontier()?,
        products_by_domain: storage.count_products_by_domain()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    if let Some(run) = &stats.latest_run {
        println!("Latest run: #{} ({}), started {}", run.id, run.status.to_db_string(), run.started_at);
        println!();
    }

    println!("Overview:");
    println!("  URLs seen: {}", stats.total_urls);
    println!("  Frontier pending: {}", stats.frontier_pending);
    println!("  Products logged: {}", stats.total_products());
    println!("  Domains with products: {}", stats.products_by_domain.len());
    println!();

    println!("URLs by Outcome:");
    let mut outcome_counts: Vec<_> = stats.urls_by_outcome.iter().collect();
    outcome_counts.sort_by(|a, b| b.1.cmp(a.1));

    for (outcome, count) in outcome_counts {
        let percentage = if stats.total_urls > 0 {
            (*count as f64 / stats.total_urls as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", outcome, count, percentage);
    }
    println!();

    if !stats.products_by_domain.is_empty() {
        println!("Top Domains by Products:");
        for (domain, count) in stats.products_by_domain.iter().take(20) {
            println!("  - {}: {}", domain, count);
        }
        println!();
    }
}
