//! Robots.txt caching implementation
//!
//! Entries are keyed by origin (scheme, host and port) and expire after 24 hours.

use crate::robots::ParsedRobots;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Cached robots.txt data for an origin
#[derive(Debug, Clone)]
pub struct CachedRobots {
    pub content: ParsedRobots,

    /// When the robots.txt was fetched
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    /// Creates a new CachedRobots stamped with the current time
    pub fn new(content: ParsedRobots) -> Self {
        Self {
            content,
            fetched_at: Utc::now(),
        }
    }

    /// Checks if the cached robots.txt is older than 24 hours
    pub fn is_stale(&self) -> bool {
        self.age() > Duration::hours(24)
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }
}

/// Concurrent robots.txt cache shared by all fetch workers
#[derive(Debug, Default)]
pub struct RobotsCache {
    entries: DashMap<String, CachedRobots>,
    /// Held while an origin's robots.txt is being fetched
    fetch_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached rules for an origin unless they are stale
    pub fn get_fresh(&self, origin: &str) -> Option<ParsedRobots> {
        self.entries
            .get(origin)
            .filter(|cached| !cached.is_stale())
            .map(|cached| cached.content.clone())
    }

    /// Lock serializing robots.txt fetches for one origin
    ///
    /// A worker that finds the cache empty takes this lock and checks the
    /// cache again before fetching, so concurrent misses cost one request.
    pub fn fetch_lock(&self, origin: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.fetch_locks
                .entry(origin.to_string())
                .or_default()
                .value(),
        )
    }

    pub fn insert(&self, origin: &str, robots: ParsedRobots) {
        self.entries
            .insert(origin.to_string(), CachedRobots::new(robots));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    fn backdate(&self, origin: &str, hours: i64) {
        if let Some(mut cached) = self.entries.get_mut(origin) {
            cached.fetched_at = Utc::now() - Duration::hours(hours);
        }
    }
}
