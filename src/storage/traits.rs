//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::crawler::FrontierEntry;
use crate::output::{DomainSummary, ProductMatch};
use crate::state::UrlOutcome;
use crate::storage::{RunRecord, RunStatus};
use crate::url::CanonicalUrl;
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Snapshots replace the previous snapshot wholesale. The product log is
/// append-only.
pub trait Storage: Send {
    // ===== Run Management =====

    /// Creates a new crawl run and returns its ID
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Updates the status of a run
    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Marks a run as completed with a finish timestamp
    fn complete_run(&mut self, run_id: i64) -> StorageResult<()>;

    // ===== Snapshots =====

    /// Replaces the frontier, dedup and domain-stats snapshots in one transaction
    ///
    /// Either all three are written or the previous snapshot stays intact.
    fn save_snapshot(
        &mut self,
        entries: &[FrontierEntry],
        records: &[(CanonicalUrl, UrlOutcome)],
        stats: &[DomainSummary],
    ) -> StorageResult<()>;

    fn load_frontier(&self) -> StorageResult<Vec<FrontierEntry>>;

    fn load_dedup(&self) -> StorageResult<Vec<(CanonicalUrl, UrlOutcome)>>;

    fn load_domain_stats(&self) -> StorageResult<Vec<DomainSummary>>;

    /// Clears frontier, dedup and domain snapshots; keeps runs and the product log
    fn reset_crawl_state(&mut self) -> StorageResult<()>;

    // ===== Product Log =====

    /// Appends a product to the log
    fn append_product(&mut self, run_id: i64, product: &ProductMatch) -> StorageResult<()>;

    /// Products with `seq` strictly greater than `seq`, in order
    fn products_after(&self, seq: u64) -> StorageResult<Vec<ProductMatch>>;

    /// Highest `seq` in the log (0 if empty)
    fn last_product_seq(&self) -> StorageResult<u64>;

    // ===== Statistics =====

    /// Counts snapshot URLs by outcome
    fn count_by_outcome(&self) -> StorageResult<HashMap<UrlOutcome, u64>>;

    /// Number of URLs in the frontier snapshot
    fn count_frontier(&self) -> StorageResult<u64>;

    /// Product counts per domain, most products first
    fn count_products_by_domain(&self) -> StorageResult<Vec<(String, u64)>>;
}
