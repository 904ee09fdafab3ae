//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `UrlOutcome`: Outcome recorded for each claimed URL (pending, product, failed, etc.)
//! - `FetchClass`: How a fetch attempt ended (success, transient, permanent, ...)
//! - `DomainState`: Per-domain politeness state: phase, crawl delay, concurrency and backoff

mod domain_state;
mod outcome;

// Re-export main types
pub use domain_state::{DomainPhase, DomainState};
pub use outcome::{FetchClass, UrlOutcome};
