//! State shared by the controller loop and fetch workers
//!
//! One [`CrawlContext`] exists per crawl and is owned by its controller;
//! workers hold it through an `Arc`. The frontier is the only structure
//! behind a single lock, and that lock is never held across an await.

use crate::config::{Config, CrawlRules};
use crate::crawler::dedup::DedupIndex;
use crate::crawler::frontier::{Frontier, FrontierEntry, PushOutcome};
use crate::crawler::scheduler::Scheduler;
use crate::robots::RobotsCache;
use crate::state::UrlOutcome;
use crate::url::{CanonicalUrl, Canonicalizer, Domain, DomainResolver};
use crate::{ConfigError, UrlError};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::path::Path;

/// Result of admitting a seed URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedOutcome {
    Queued(CanonicalUrl),
    /// Already claimed earlier in this crawl
    AlreadySeen(CanonicalUrl),
    /// Claimed, but the frontier was full and the seed ranked lowest
    Dropped(CanonicalUrl),
}

/// Whether a product match for a domain may be emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductSlot {
    Granted,
    /// Granted, and the domain has now reached its product limit
    GrantedLast,
    Exhausted,
}

pub struct CrawlContext {
    pub config: Config,
    pub rules: CrawlRules,
    pub canonicalizer: Canonicalizer,
    pub resolver: DomainResolver,
    pub dedup: DedupIndex,
    pub frontier: Mutex<Frontier>,
    pub scheduler: Scheduler,
    pub robots: RobotsCache,
    product_counts: DashMap<Domain, u32>,
}

impl CrawlContext {
    /// Builds the context for `config`
    ///
    /// The public suffix list comes from `urls.suffix-list-path` when set,
    /// otherwise from the bundled snapshot.
    ///
    /// # Returns
    ///
    /// * `Err(ConfigError)` - A pattern failed to compile or the suffix list is unreadable
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let resolver = match &config.urls.suffix_list_path {
            Some(path) => DomainResolver::from_file(Path::new(path))?,
            None => DomainResolver::bundled()?,
        };
        Self::with_resolver(config, resolver)
    }

    pub fn with_resolver(config: Config, resolver: DomainResolver) -> Result<Self, ConfigError> {
        let rules = CrawlRules::compile(&config, &resolver)?;
        let canonicalizer = Canonicalizer::new(rules.tracking_params.clone());
        let scheduler = Scheduler::new(config.crawler.clone(), rules.delay_overrides().clone());
        let frontier = Frontier::new(config.crawler.frontier_capacity);

        Ok(Self {
            config,
            rules,
            canonicalizer,
            resolver,
            dedup: DedupIndex::new(),
            frontier: Mutex::new(frontier),
            scheduler,
            robots: RobotsCache::new(),
            product_counts: DashMap::new(),
        })
    }

    /// Canonicalizes, claims and queues a seed URL
    pub fn admit_seed(&self, raw: &str) -> Result<SeedOutcome, UrlError> {
        let url = self.canonicalizer.canonicalize(raw)?;
        let domain = self.resolver.registrable_domain(&url);
        let entry = FrontierEntry::seed(url.clone(), domain);

        let mut frontier = self.frontier.lock();
        if !self.dedup.try_claim(&url) {
            return Ok(SeedOutcome::AlreadySeen(url));
        }
        if self.push_locked(&mut frontier, entry) {
            Ok(SeedOutcome::Queued(url))
        } else {
            Ok(SeedOutcome::Dropped(url))
        }
    }

    /// Claims and queues discovered entries; returns how many were queued
    ///
    /// Each claim and its push happen under the frontier lock, so a snapshot
    /// never sees a `Pending` URL that is missing from the frontier.
    pub fn claim_and_enqueue(&self, entries: Vec<FrontierEntry>) -> usize {
        let mut frontier = self.frontier.lock();
        let mut queued = 0;
        for entry in entries {
            if self.dedup.try_claim(&entry.url) && self.push_locked(&mut frontier, entry) {
                queued += 1;
            }
        }
        queued
    }

    /// Pushes an already claimed entry into the frontier
    ///
    /// Entries squeezed out by the capacity policy (the evicted victim, or
    /// the entry itself when rejected) are marked `Dropped`. Returns false
    /// if `entry` itself was not queued.
    pub fn enqueue(&self, entry: FrontierEntry) -> bool {
        self.enqueue_all(vec![entry]) == 1
    }

    /// Pushes claimed entries under one frontier lock; returns how many were queued
    pub fn enqueue_all(&self, entries: Vec<FrontierEntry>) -> usize {
        let mut frontier = self.frontier.lock();
        let mut queued = 0;
        for entry in entries {
            if self.push_locked(&mut frontier, entry) {
                queued += 1;
            }
        }
        queued
    }

    /// Queues entries from a frontier snapshot
    ///
    /// Entries whose URL already has a terminal outcome are skipped; unknown
    /// URLs are claimed as `Pending`.
    pub fn restore_frontier(&self, entries: Vec<FrontierEntry>) -> usize {
        let mut frontier = self.frontier.lock();
        let mut queued = 0;
        for entry in entries {
            match self.dedup.outcome(&entry.url) {
                Some(outcome) if outcome.is_terminal() => continue,
                Some(_) => {}
                None => self.dedup.mark_outcome(&entry.url, UrlOutcome::Pending),
            }
            if self.push_locked(&mut frontier, entry) {
                queued += 1;
            }
        }
        queued
    }

    fn push_locked(&self, frontier: &mut Frontier, entry: FrontierEntry) -> bool {
        let url = entry.url.clone();
        let (queued, dropped) = match frontier.push(entry) {
            PushOutcome::Queued => (true, None),
            PushOutcome::Duplicate => (false, None),
            PushOutcome::Evicted(victim) => (true, Some(victim.url)),
            PushOutcome::Rejected => (false, Some(url)),
        };
        if let Some(dropped) = dropped {
            tracing::warn!("Frontier full; dropped {}", dropped);
            self.dedup.mark_outcome(&dropped, UrlOutcome::Dropped);
        }
        queued
    }

    /// Copies the frontier and the dedup index as of one instant
    pub fn snapshot_state(&self) -> (Vec<FrontierEntry>, Vec<(CanonicalUrl, UrlOutcome)>) {
        let frontier = self.frontier.lock();
        (frontier.entries(), self.dedup.snapshot())
    }

    /// Reserves a product slot for `domain`
    pub fn claim_product_slot(&self, domain: &Domain) -> ProductSlot {
        let limit = self.config.crawler.max_products_per_domain;
        let mut count = self.product_counts.entry(domain.clone()).or_insert(0);

        match limit {
            Some(limit) if *count >= limit => ProductSlot::Exhausted,
            Some(limit) => {
                *count += 1;
                if *count >= limit {
                    ProductSlot::GrantedLast
                } else {
                    ProductSlot::Granted
                }
            }
            None => {
                *count += 1;
                ProductSlot::Granted
            }
        }
    }

    /// Returns true once `domain` has reached `max-products-per-domain`
    pub fn product_limit_reached(&self, domain: &Domain) -> bool {
        match self.config.crawler.max_products_per_domain {
            Some(limit) => self.product_count(domain) >= limit,
            None => false,
        }
    }

    pub fn product_count(&self, domain: &Domain) -> u32 {
        self.product_counts.get(domain).map_or(0, |count| *count)
    }

    /// Sets product counts, e.g. from a restored dedup index
    pub fn restore_product_counts<I>(&self, counts: I)
    where
        I: IntoIterator<Item = (Domain, u32)>,
    {
        for (domain, count) in counts {
            self.product_counts.insert(domain, count);
        }
    }

    /// Removes every pending entry of `domain` and marks them `Dropped`
    pub fn drop_domain(&self, domain: &Domain) -> usize {
        let mut frontier = self.frontier.lock();
        let removed = frontier.drop_domain(domain);
        for entry in &removed {
            self.dedup.mark_outcome(&entry.url, UrlOutcome::Dropped);
        }
        removed.len()
    }

    pub fn frontier_len(&self) -> usize {
        self.frontier.lock().len()
    }
}
