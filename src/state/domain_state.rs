use crate::config::CrawlerConfig;
use crate::state::FetchClass;
use std::time::Duration;
use tokio::time::Instant;

/// Scheduling phase of a domain
///
/// `Idle → Ready → Dispatched → Cooling → Ready`, or `→ Backoff → Ready`
/// after repeated transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainPhase {
    /// No pending URLs
    Idle,
    /// Pending URLs and allowed to dispatch now
    Ready,
    /// At least one fetch in flight
    Dispatched,
    /// Waiting out the crawl delay
    Cooling,
    /// Suspended after repeated failures
    Backoff,
}

impl DomainPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Ready => "ready",
            Self::Dispatched => "dispatched",
            Self::Cooling => "cooling",
            Self::Backoff => "backoff",
        }
    }
}

/// Tracks the politeness state of a domain during crawling
///
/// Instants come from `tokio::time` so paused-clock tests observe the same
/// timeline the scheduler does. Always mutated under the domain's own lock.
#[derive(Debug, Clone)]
pub struct DomainState {
    pub phase: DomainPhase,

    /// Fetches currently in flight against this domain
    pub active_fetches: u32,

    pub last_dispatch: Option<Instant>,

    pub last_completion: Option<Instant>,

    /// Effective spacing between requests (config or override, raised by robots.txt)
    pub crawl_delay: Duration,

    /// Dispatch is suspended until this instant
    pub backoff_until: Option<Instant>,

    pub consecutive_failures: u32,

    /// Requests sent to this domain
    pub dispatched: u64,
}

impl DomainState {
    /// Creates a new DomainState with the given crawl delay
    pub fn new(crawl_delay: Duration) -> Self {
        Self {
            phase: DomainPhase::Idle,
            active_fetches: 0,
            last_dispatch: None,
            last_completion: None,
            crawl_delay,
            backoff_until: None,
            consecutive_failures: 0,
            dispatched: 0,
        }
    }

    /// Returns the earliest instant the crawl delay and backoff allow a dispatch
    ///
    /// `None` means nothing holds the domain back in time.
    pub fn ready_at(&self) -> Option<Instant> {
        let after_dispatch = self.last_dispatch.map(|t| t + self.crawl_delay);
        let after_completion = self.last_completion.map(|t| t + self.crawl_delay);

        [after_dispatch, after_completion, self.backoff_until]
            .into_iter()
            .flatten()
            .max()
    }

    /// Checks if a fetch can be dispatched to this domain
    ///
    /// This method enforces:
    /// - The per-domain concurrency cap
    /// - The crawl delay since the last dispatch and the last completion
    /// - Any active backoff window
    ///
    /// The global worker budget is checked by the caller.
    pub fn can_dispatch(&self, config: &CrawlerConfig, now: Instant) -> bool {
        if self.active_fetches >= config.max_concurrent_per_domain {
            return false;
        }

        self.ready_at().map_or(true, |ready| now >= ready)
    }

    /// Returns the time left before the delay and backoff allow a dispatch
    ///
    /// Returns None if nothing holds the domain back at `now`.
    pub fn time_until_ready(&self, now: Instant) -> Option<Duration> {
        self.ready_at()
            .filter(|ready| *ready > now)
            .map(|ready| ready - now)
    }

    /// Returns true while a backoff window is open
    pub fn is_backing_off(&self, now: Instant) -> bool {
        self.backoff_until.map_or(false, |until| now < until)
    }

    /// Records that a fetch was dispatched to this domain
    pub fn record_dispatch(&mut self, now: Instant) {
        self.active_fetches += 1;
        self.dispatched += 1;
        self.last_dispatch = Some(now);
        self.phase = DomainPhase::Dispatched;
    }

    /// Records the end of a fetch attempt
    ///
    /// Transient failures accumulate; once `consecutive_failures` exceeds
    /// `failure-threshold` the domain backs off for
    /// `min(cap, base * 2^(failures - threshold - 1))`. A 429 opens a backoff
    /// window immediately. Success resets the failure count.
    ///
    /// # Returns
    ///
    /// * `Some(window)` - A backoff window was opened
    /// * `None` - The domain simply cools down
    pub fn record_completion(
        &mut self,
        config: &CrawlerConfig,
        now: Instant,
        class: FetchClass,
    ) -> Option<Duration> {
        self.active_fetches = self.active_fetches.saturating_sub(1);
        self.last_completion = Some(now);

        if class.is_domain_failure() {
            self.consecutive_failures += 1;
        } else if class == FetchClass::Success {
            self.consecutive_failures = 0;
        }

        let over_threshold = self.consecutive_failures > config.failure_threshold;
        let window = if over_threshold {
            let exponent = self.consecutive_failures - config.failure_threshold - 1;
            Some(backoff_window(config, exponent))
        } else if class == FetchClass::Throttled {
            Some(backoff_window(config, 0))
        } else {
            None
        };

        if let Some(window) = window {
            let until = now + window;
            self.backoff_until = Some(self.backoff_until.map_or(until, |prev| prev.max(until)));
        }

        self.phase = if self.active_fetches > 0 {
            DomainPhase::Dispatched
        } else if window.is_some() {
            DomainPhase::Backoff
        } else {
            DomainPhase::Cooling
        };

        window
    }

    /// Raises the crawl delay (e.g. to honour a robots.txt Crawl-delay); never lowers it
    pub fn raise_crawl_delay(&mut self, delay: Duration) {
        if delay > self.crawl_delay {
            self.crawl_delay = delay;
        }
    }

    /// Recomputes the phase from timing state and whether URLs are pending
    pub fn refresh_phase(&mut self, now: Instant, has_pending: bool) -> DomainPhase {
        self.phase = if self.active_fetches > 0 {
            DomainPhase::Dispatched
        } else if self.is_backing_off(now) {
            DomainPhase::Backoff
        } else if !has_pending {
            DomainPhase::Idle
        } else if self.time_until_ready(now).is_some() {
            DomainPhase::Cooling
        } else {
            DomainPhase::Ready
        };
        self.phase
    }
}

fn backoff_window(config: &CrawlerConfig, exponent: u32) -> Duration {
    let base = Duration::from_millis(config.backoff_base_ms);
    let cap = Duration::from_millis(config.backoff_cap_ms);
    let factor = 1u32.checked_shl(exponent.min(31)).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(cap)
}
