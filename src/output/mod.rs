//! Output module for product sinks, crawl summaries and reports
//!
//! This module handles:
//! - Delivering product matches to a [`ProductSink`]
//! - Generating markdown summaries of crawl results
//! - Exporting products as per-domain JSON files
//! - Reading crawl statistics back from storage

mod export;
mod markdown;
mod sink;
pub mod stats;
mod traits;

pub use export::{export_products, group_by_domain, ExportReport};
pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use sink::{JsonLinesSink, MemorySink};
pub use stats::{load_statistics, print_statistics, CrawlStatistics};
pub use traits::{CrawlSummary, DomainSummary, OutputError, OutputResult, ProductMatch, ProductSink};

use crate::storage::Storage;
use crate::ScoutError;
use chrono::{DateTime, Utc};
use std::path::Path;

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw).ok().map(|at| at.with_timezone(&Utc))
}

/// Rebuilds a crawl summary from the latest stored run and snapshot
pub fn summary_from_storage(storage: &dyn Storage) -> Result<CrawlSummary, ScoutError> {
    let mut summary = CrawlSummary::new();

    if let Some(run) = storage.get_latest_run()? {
        summary.run_id = Some(run.id);
        summary.status = run.status.to_db_string().to_string();
        summary.config_hash = run.config_hash;
        if let Some(started_at) = parse_timestamp(&run.started_at) {
            summary.started_at = started_at;
        }
        summary.finished_at = run.finished_at.as_deref().and_then(parse_timestamp);
    }

    summary.outcomes = storage.count_by_outcome()?.into_iter().collect();
    summary.frontier_remaining = storage.count_frontier()?;
    summary.products_emitted = storage.last_product_seq()?;
    summary.domains = storage.load_domain_stats()?;
    Ok(summary)
}

/// Exports every product in the storage log to `dir`
pub fn export_from_storage(storage: &dyn Storage, dir: &Path) -> Result<ExportReport, ScoutError> {
    let products = storage.products_after(0)?;
    Ok(export_products(&products, dir, Utc::now())?)
}
