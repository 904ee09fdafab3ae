//! Product Scout: a polite e-commerce product URL crawler
//!
//! This crate discovers product-page URLs across many shop domains. It keeps a
//! per-domain frontier of canonical URLs, claims every URL exactly once in a
//! concurrent dedup index, and dispatches fetches through a bounded worker pool
//! that honours per-domain crawl delays, concurrency caps and failure backoff.

pub mod config;
pub mod crawler;
pub mod output;
pub mod robots;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Product Scout operations
#[derive(Debug, Error)]
pub enum ScoutError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Crawl is draining; new seeds are not accepted")]
    SeedsClosed,

    #[error("Crawl has already been started")]
    AlreadyStarted,

    #[error("Crawl has not been started")]
    NotStarted,

    #[error("Crawl task failed: {0}")]
    Task(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid public suffix list: {0}")]
    SuffixList(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

// Re-export commonly used types
pub use config::{Config, CrawlRules};
pub use crawler::{CrawlController, Frontier, FrontierEntry, DedupIndex, Scheduler};
pub use output::{CrawlSummary, ProductMatch, ProductSink};
pub use state::{DomainPhase, DomainState, UrlOutcome};
pub use url::{CanonicalUrl, Canonicalizer, Domain, DomainResolver};
