//! Crawler module for polite, concurrent product discovery
//!
//! This module contains the core crawling logic, including:
//! - The frontier of pending URLs and the dedup index of claimed ones
//! - Per-domain scheduling: crawl delay, concurrency caps, failure backoff
//! - HTTP fetching, link extraction and retry decisions
//! - The controller that runs the worker pool and owns the crawl lifecycle
//!
//! # Example
//!
//! ```no_run
//! use product_scout::config::load_config_with_hash;
//! use product_scout::crawler::CrawlController;
//! use std::path::Path;
//!
//! # async fn run() -> Result<(), product_scout::ScoutError> {
//! let (config, hash) = load_config_with_hash(Path::new("scout.toml"))?;
//! let seeds = config.seed_urls();
//! let mut controller = CrawlController::from_config(config, &hash)?;
//! controller.start(seeds)?;
//! let summary = controller.drain().await?;
//! println!("{} products", summary.products_emitted);
//! # Ok(())
//! # }
//! ```

mod context;
mod controller;
mod coordinator;
mod dedup;
mod fetcher;
mod frontier;
mod parser;
mod retry;
mod scheduler;

pub use context::{CrawlContext, ProductSlot, SeedOutcome};
pub use controller::{CrawlController, ResumeReport};
pub use coordinator::{classify_status, link_priority, Coordinator, Disposition, FetchReport};
pub use dedup::DedupIndex;
pub use fetcher::{build_http_client, user_agent_string, FetchError, FetchResponse, Fetcher, HttpFetcher};
pub use frontier::{Frontier, FrontierEntry, PushOutcome, SEED_PRIORITY};
pub use parser::{HtmlLinkExtractor, LinkExtractor};
pub use retry::{RetryDecision, RetryPolicy};
pub use scheduler::{Dispatch, Scheduler};
