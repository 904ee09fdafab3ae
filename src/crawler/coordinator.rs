//! Fetch coordinator - executes a single dispatched fetch
//!
//! This module contains the per-URL pipeline run by each worker:
//! - robots.txt obedience
//! - The fetch itself, bounded by the request timeout and the cancel token
//! - Classification of the result and the retry decision
//! - Link discovery: canonicalize, filter, claim and queue
//! - Product classification of the fetched URL

use crate::crawler::context::{CrawlContext, ProductSlot};
use crate::crawler::fetcher::{FetchError, FetchResponse, Fetcher};
use crate::crawler::frontier::{FrontierEntry, SEED_PRIORITY};
use crate::crawler::parser::LinkExtractor;
use crate::crawler::retry::{RetryDecision, RetryPolicy};
use crate::robots::{fetch_robots, origin_of};
use crate::state::{FetchClass, UrlOutcome};
use crate::url::{classify_link, CanonicalUrl};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Priority lost per link hop from a seed
const DEPTH_PENALTY: u32 = 10;

/// Priority gained by links that already look like product pages
const PRODUCT_BONUS: u32 = 50;

/// What the controller must do with a finished dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// The URL reached a terminal outcome (already recorded in the dedup index)
    Finished(UrlOutcome),
    /// Transient failure with retries left; re-queue after the delay
    Retry { after: Duration },
    /// Cancelled mid-flight; the URL stays `Pending`
    Abandoned,
    /// The dispatch was spent on robots.txt; queue the entry again as is
    Deferred,
}

/// Result of one dispatch
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub entry: FrontierEntry,
    pub class: FetchClass,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub disposition: Disposition,

    /// Newly claimed links queued from this page
    pub discovered: usize,

    /// Matching product pattern, when the URL is a product to emit
    pub product: Option<String>,
}

impl FetchReport {
    fn new(entry: FrontierEntry, class: FetchClass, disposition: Disposition) -> Self {
        Self {
            entry,
            class,
            status: None,
            error: None,
            disposition,
            discovered: 0,
            product: None,
        }
    }
}

/// Outcome of talking to the network for one entry
enum Attempt {
    Blocked,
    Cancelled,
    /// The origin's robots.txt was missing from the cache and has now been loaded
    RobotsLoaded,
    Response(FetchResponse),
    Failed(FetchError),
}

/// Classifies an HTTP status
///
/// | Status | Class |
/// |--------|-------|
/// | 2xx | Success |
/// | 429 | Throttled |
/// | 5xx | Transient |
/// | anything else | Permanent |
pub fn classify_status(status: u16) -> FetchClass {
    match status {
        200..=299 => FetchClass::Success,
        429 => FetchClass::Throttled,
        500..=599 => FetchClass::Transient,
        _ => FetchClass::Permanent,
    }
}

fn classify_error(error: &FetchError) -> FetchClass {
    match error {
        FetchError::Cancelled => FetchClass::Cancelled,
        e if e.is_transient() => FetchClass::Transient,
        _ => FetchClass::Permanent,
    }
}

/// Priority of a link found at `depth`
pub fn link_priority(depth: u32, looks_like_product: bool) -> u32 {
    let base = SEED_PRIORITY.saturating_sub(DEPTH_PENALTY.saturating_mul(depth));
    if looks_like_product {
        base + PRODUCT_BONUS
    } else {
        base
    }
}

/// Runs dispatched fetches against shared crawl state
pub struct Coordinator {
    ctx: Arc<CrawlContext>,
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn LinkExtractor>,
    retry: RetryPolicy,
    robots_agent: String,
}

impl Coordinator {
    /// Creates a new coordinator
    ///
    /// # Arguments
    ///
    /// * `ctx` - Shared crawl state
    /// * `fetcher` - Used for pages and robots.txt alike
    /// * `extractor` - Pulls hrefs out of fetched bodies
    pub fn new(ctx: Arc<CrawlContext>, fetcher: Arc<dyn Fetcher>, extractor: Arc<dyn LinkExtractor>) -> Self {
        let retry = RetryPolicy::from_config(&ctx.config.crawler);
        let robots_agent = ctx.config.user_agent.crawler_name.clone();
        Self {
            ctx,
            fetcher,
            extractor,
            retry,
            robots_agent,
        }
    }

    pub fn context(&self) -> &Arc<CrawlContext> {
        &self.ctx
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.ctx.config.crawler.request_timeout_ms)
    }

    /// Fetches one entry and settles its outcome
    ///
    /// The scheduler has already recorded the dispatch; this records the
    /// completion exactly once, whatever happens. Terminal outcomes are
    /// written to the dedup index here; retries, deferred and abandoned
    /// entries are handed back to the controller through the report.
    ///
    /// When robots.txt for the entry's origin is not cached, the dispatch
    /// fetches it instead of the page and the entry comes back `Deferred`,
    /// so the page request waits out the crawl delay like any other.
    pub async fn dispatch(&self, entry: FrontierEntry, cancel: &CancellationToken) -> FetchReport {
        let attempt = self.attempt(&entry, cancel).await;

        let class = match &attempt {
            Attempt::Blocked => FetchClass::Permanent,
            Attempt::Cancelled => FetchClass::Cancelled,
            Attempt::RobotsLoaded => FetchClass::Success,
            Attempt::Response(response) => classify_status(response.status),
            Attempt::Failed(error) => classify_error(error),
        };
        if matches!(attempt, Attempt::RobotsLoaded) {
            self.ctx.scheduler.release(&entry.domain, Instant::now());
        } else {
            self.ctx
                .scheduler
                .record_completion(&entry.domain, class, Instant::now());
        }

        match attempt {
            Attempt::Blocked => {
                tracing::info!("URL {} disallowed by robots.txt", entry.url);
                self.ctx.dedup.mark_outcome(&entry.url, UrlOutcome::Blocked);
                let mut report = FetchReport::new(entry, class, Disposition::Finished(UrlOutcome::Blocked));
                report.error = Some("Disallowed by robots.txt".to_string());
                report
            }
            Attempt::Cancelled => FetchReport::new(entry, class, Disposition::Abandoned),
            Attempt::RobotsLoaded => {
                tracing::debug!("Loaded robots.txt for {}; {} goes back to the frontier", entry.domain, entry.url);
                FetchReport::new(entry, class, Disposition::Deferred)
            }
            Attempt::Response(response) => self.settle_response(entry, class, response),
            Attempt::Failed(error) => {
                let message = error.to_string();
                let mut report = self.settle_failure(entry, class, &message);
                report.error = Some(message);
                report
            }
        }
    }

    async fn attempt(&self, entry: &FrontierEntry, cancel: &CancellationToken) -> Attempt {
        if self.ctx.config.crawler.obey_robots {
            let Some(robots) = self.ctx.robots.get_fresh(&origin_of(&entry.url)) else {
                return self.load_robots(entry, cancel).await;
            };
            if !robots.is_allowed(entry.url.as_str(), &self.robots_agent) {
                return Attempt::Blocked;
            }
        }

        let timeout = self.request_timeout();
        tracing::debug!("Fetching {}", entry.url);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            fetched = tokio::time::timeout(timeout, self.fetcher.fetch(&entry.url, timeout)) => {
                fetched.unwrap_or(Err(FetchError::Timeout))
            }
        };

        match result {
            Ok(response) => Attempt::Response(response),
            Err(FetchError::Cancelled) => Attempt::Cancelled,
            Err(error) => Attempt::Failed(error),
        }
    }

    /// Fetches and caches robots.txt for the entry's origin
    ///
    /// Only one worker fetches a given origin at a time; a worker that waited
    /// on another's fetch finds the rules cached and sends nothing.
    async fn load_robots(&self, entry: &FrontierEntry, cancel: &CancellationToken) -> Attempt {
        let origin = origin_of(&entry.url);
        let lock = self.ctx.robots.fetch_lock(&origin);

        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Attempt::Cancelled,
            guard = lock.lock_owned() => guard,
        };
        if self.ctx.robots.get_fresh(&origin).is_some() {
            return Attempt::RobotsLoaded;
        }

        let robots = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Attempt::Cancelled,
            robots = fetch_robots(self.fetcher.as_ref(), &entry.url, self.request_timeout()) => robots,
        };

        if let Some(delay) = robots.crawl_delay(&self.robots_agent) {
            self.ctx.scheduler.apply_robots_delay(&entry.domain, delay);
        }
        self.ctx.robots.insert(&origin, robots);

        Attempt::RobotsLoaded
    }

    fn settle_response(&self, entry: FrontierEntry, class: FetchClass, response: FetchResponse) -> FetchReport {
        let status = response.status;

        if class != FetchClass::Success {
            let message = format!("HTTP {}", status);
            let mut report = self.settle_failure(entry, class, &message);
            report.status = Some(status);
            report.error = Some(message);
            return report;
        }

        // Product classification first, so links from the page that fills
        // the domain's quota are not queued
        let mut product = None;
        let mut outcome = UrlOutcome::Succeeded;
        if let Some(pattern) = self.ctx.rules.match_product(&entry.url, &entry.domain) {
            match self.ctx.claim_product_slot(&entry.domain) {
                ProductSlot::Granted => {
                    product = Some(pattern.as_str().to_string());
                    outcome = UrlOutcome::Product;
                }
                ProductSlot::GrantedLast => {
                    product = Some(pattern.as_str().to_string());
                    outcome = UrlOutcome::Product;
                    let dropped = self.ctx.drop_domain(&entry.domain);
                    tracing::info!(
                        "Domain {} reached its product limit; dropped {} pending URLs",
                        entry.domain,
                        dropped
                    );
                }
                ProductSlot::Exhausted => {
                    tracing::debug!("Product limit reached for {}; not emitting {}", entry.domain, entry.url);
                }
            }
        }

        let discovered = if response.is_html() {
            self.discover_links(&entry, &response)
        } else {
            tracing::debug!(
                "Skipping link extraction for {} ({})",
                entry.url,
                response.content_type.as_deref().unwrap_or("unknown type")
            );
            0
        };

        self.ctx.dedup.mark_outcome(&entry.url, outcome);
        tracing::debug!("Fetched {} (HTTP {}, {} new links)", entry.url, status, discovered);

        let mut report = FetchReport::new(entry, class, Disposition::Finished(outcome));
        report.status = Some(status);
        report.discovered = discovered;
        report.product = product;
        report
    }

    fn settle_failure(&self, entry: FrontierEntry, class: FetchClass, message: &str) -> FetchReport {
        if class.is_transient() {
            if let RetryDecision::Retry { after } = self.retry.decide(entry.attempt_count) {
                tracing::warn!(
                    "Transient failure for {} ({}); retry {}/{} in {:?}",
                    entry.url,
                    message,
                    entry.attempt_count + 1,
                    self.retry.max_retries,
                    after
                );
                return FetchReport::new(entry, class, Disposition::Retry { after });
            }
            tracing::warn!("Giving up on {} after {} retries: {}", entry.url, entry.attempt_count, message);
        } else {
            tracing::debug!("Permanent failure for {}: {}", entry.url, message);
        }

        self.ctx.dedup.mark_outcome(&entry.url, UrlOutcome::Failed);
        FetchReport::new(entry, class, Disposition::Finished(UrlOutcome::Failed))
    }

    /// Extracts, filters, claims and queues the links of a fetched page
    ///
    /// Relative links resolve against the post-redirect URL. Returns how
    /// many links entered the frontier.
    fn discover_links(&self, entry: &FrontierEntry, response: &FetchResponse) -> usize {
        let depth = entry.depth + 1;
        if depth > self.ctx.config.crawler.max_depth {
            tracing::debug!("Not following links from {}: max depth reached", entry.url);
            return 0;
        }

        let base = self
            .ctx
            .canonicalizer
            .canonicalize(&response.final_url)
            .unwrap_or_else(|_| entry.url.clone());

        let mut candidates = Vec::new();
        for href in self.extractor.extract_links(&response.body) {
            let link = match self.ctx.canonicalizer.canonicalize_with_base(&href, &base) {
                Ok(link) => link,
                Err(e) => {
                    tracing::debug!("Dropping link {:?} on {}: {}", href, entry.url, e);
                    continue;
                }
            };

            if let Some(candidate) = self.admit_link(entry, link, depth) {
                candidates.push(candidate);
            }
        }

        self.ctx.claim_and_enqueue(candidates)
    }

    fn admit_link(&self, entry: &FrontierEntry, link: CanonicalUrl, depth: u32) -> Option<FrontierEntry> {
        let domain = self.ctx.resolver.registrable_domain(&link);

        let decision = classify_link(&link, &domain, &entry.domain, &self.ctx.rules);
        if !decision.should_follow() {
            tracing::trace!("Not following {} ({:?})", link, decision);
            return None;
        }

        if self.ctx.product_limit_reached(&domain) || self.ctx.dedup.seen(&link) {
            return None;
        }

        let looks_like_product = self.ctx.rules.match_product(&link, &domain).is_some();
        Some(FrontierEntry::discovered(
            link,
            domain,
            link_priority(depth, looks_like_product),
            depth,
            entry.url.clone(),
        ))
    }
}
