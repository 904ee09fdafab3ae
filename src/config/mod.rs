//! Configuration module for Product Scout
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! and compiling them into the [`CrawlRules`] consulted while crawling.
//!
//! # Example
//!
//! ```no_run
//! use product_scout::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("scout.toml")).unwrap();
//! println!("Worker budget: {}", config.crawler.global_worker_budget);
//! ```

mod parser;
mod rules;
mod types;
mod validation;

// Re-export types
pub use rules::CrawlRules;
pub use types::{
    Config, CrawlerConfig, DomainEntry, LinkScope, OutputConfig, UrlConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
