//! Domain scheduler: politeness and fairness
//!
//! This module handles:
//! - Per-domain concurrency caps, crawl delays and failure backoff
//! - Round-robin selection across ready domains so one large site cannot
//!   starve the rest
//! - Computing when the next domain becomes dispatchable, so the controller
//!   can sleep instead of polling
//!
//! Each domain's state lives behind its own mutex; no lock spans domains.
//! The global worker budget is enforced by the controller's semaphore.

use crate::config::CrawlerConfig;
use crate::crawler::frontier::{Frontier, FrontierEntry};
use crate::state::{DomainPhase, DomainState, FetchClass};
use crate::url::Domain;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Whether a domain may receive a fetch right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Ready,
    /// Held back by crawl delay (`until` set) or by its concurrency cap (`None`)
    Limited { until: Option<Instant> },
    /// In a failure backoff window
    Suspended { until: Instant },
}

pub struct Scheduler {
    config: CrawlerConfig,
    default_delay: Duration,
    delay_overrides: HashMap<Domain, Duration>,
    domains: DashMap<Domain, Arc<Mutex<DomainState>>>,
    /// Last domain served; selection resumes after it
    cursor: Mutex<Option<Domain>>,
}

impl Scheduler {
    /// Creates a new scheduler
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `delay_overrides` - Per-domain crawl delays replacing `crawl-delay-ms`
    pub fn new(config: CrawlerConfig, delay_overrides: HashMap<Domain, Duration>) -> Self {
        Self {
            default_delay: Duration::from_millis(config.crawl_delay_ms),
            config,
            delay_overrides,
            domains: DashMap::new(),
            cursor: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    /// Configured crawl delay for a domain, before any robots.txt adjustment
    pub fn base_delay(&self, domain: &Domain) -> Duration {
        self.delay_overrides
            .get(domain)
            .copied()
            .unwrap_or(self.default_delay)
    }

    fn state(&self, domain: &Domain) -> Arc<Mutex<DomainState>> {
        self.domains
            .entry(domain.clone())
            .or_insert_with(|| Arc::new(Mutex::new(DomainState::new(self.base_delay(domain)))))
            .clone()
    }

    fn existing_state(&self, domain: &Domain) -> Option<Arc<Mutex<DomainState>>> {
        self.domains.get(domain).map(|state| Arc::clone(state.value()))
    }

    /// Decides whether `domain` may receive a fetch at `now`
    pub fn decide(&self, domain: &Domain, now: Instant) -> Dispatch {
        let Some(state) = self.existing_state(domain) else {
            return Dispatch::Ready;
        };
        let state = state.lock();

        if let Some(until) = state.backoff_until.filter(|until| *until > now) {
            return Dispatch::Suspended { until };
        }

        if state.can_dispatch(&self.config, now) {
            Dispatch::Ready
        } else if state.active_fetches >= self.config.max_concurrent_per_domain {
            Dispatch::Limited { until: None }
        } else {
            Dispatch::Limited {
                until: state.ready_at(),
            }
        }
    }

    /// Pops the next entry to fetch, or None if no domain is ready
    ///
    /// Ready domains are visited in sorted order starting after the last
    /// domain served, so every ready domain gets a turn before any domain
    /// gets a second one. The chosen domain's dispatch is recorded before
    /// returning.
    pub fn next_dispatch(&self, frontier: &mut Frontier, now: Instant) -> Option<FrontierEntry> {
        let ready = frontier.list_ready_domains(|domain| self.decide(domain, now) != Dispatch::Ready);
        if ready.is_empty() {
            return None;
        }

        let mut cursor = self.cursor.lock();
        let start = cursor
            .as_ref()
            .and_then(|last| ready.iter().position(|domain| domain > last))
            .unwrap_or(0);

        for domain in ready[start..].iter().chain(ready[..start].iter()) {
            let state = self.state(domain);
            let mut state = state.lock();

            if !state.can_dispatch(&self.config, now) {
                continue;
            }

            if let Some(entry) = frontier.pop(domain) {
                state.record_dispatch(now);
                *cursor = Some(domain.clone());
                tracing::trace!("Dispatching {} (domain {})", entry.url, domain);
                return Some(entry);
            }
        }

        None
    }

    /// Records the end of a fetch against `domain`
    ///
    /// Returns the backoff window if the domain was suspended.
    pub fn record_completion(&self, domain: &Domain, class: FetchClass, now: Instant) -> Option<Duration> {
        let state = self.state(domain);
        let mut state = state.lock();
        let window = state.record_completion(&self.config, now, class);

        if let Some(window) = window {
            tracing::warn!(
                "Domain {} backing off for {:?} after {} consecutive failures",
                domain,
                window,
                state.consecutive_failures
            );
        }

        window
    }

    /// Ends a dispatch that did not fetch the page itself
    ///
    /// Used when the slot went to robots.txt. The domain cools down from
    /// `now` but its failure streak is left alone.
    pub fn release(&self, domain: &Domain, now: Instant) {
        let state = self.state(domain);
        let mut state = state.lock();
        state.record_completion(&self.config, now, FetchClass::Cancelled);
    }

    /// Raises a domain's crawl delay to a robots.txt Crawl-delay if it is longer
    pub fn apply_robots_delay(&self, domain: &Domain, delay: Duration) {
        let state = self.state(domain);
        let mut state = state.lock();
        if delay > state.crawl_delay {
            tracing::debug!("Domain {} crawl delay raised to {:?} by robots.txt", domain, delay);
            state.raise_crawl_delay(delay);
        }
    }

    /// Earliest instant at which a domain with pending entries can be dispatched
    ///
    /// Domains held only by their concurrency cap are skipped; a completion
    /// report wakes the controller for those.
    pub fn next_wake(&self, frontier: &Frontier, now: Instant) -> Option<Instant> {
        frontier
            .domains()
            .filter_map(|domain| match self.decide(domain, now) {
                Dispatch::Ready => Some(now),
                Dispatch::Limited { until } => until,
                Dispatch::Suspended { until } => Some(until),
            })
            .min()
    }

    /// Current phase of a domain
    pub fn phase(&self, domain: &Domain, has_pending: bool, now: Instant) -> DomainPhase {
        match self.existing_state(domain) {
            Some(state) => state.lock().refresh_phase(now, has_pending),
            None if has_pending => DomainPhase::Ready,
            None => DomainPhase::Idle,
        }
    }

    /// Copy of a domain's state, if it has been scheduled before
    pub fn domain_state(&self, domain: &Domain) -> Option<DomainState> {
        self.existing_state(domain).map(|state| state.lock().clone())
    }

    /// Copies of all domain states, sorted by domain
    pub fn domain_states(&self) -> Vec<(Domain, DomainState)> {
        let handles: Vec<(Domain, Arc<Mutex<DomainState>>)> = self
            .domains
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut states: Vec<(Domain, DomainState)> = handles
            .into_iter()
            .map(|(domain, state)| (domain, state.lock().clone()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    /// Total fetches in flight across domains
    pub fn in_flight(&self) -> u32 {
        self.domain_states()
            .iter()
            .map(|(_, state)| state.active_fetches)
            .sum()
    }
}
