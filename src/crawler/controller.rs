//! Crawl controller - owns the crawl loop and its lifecycle
//!
//! The controller admits seeds, runs the dispatch loop on a background task
//! and hands control back through [`CrawlController::drain`] (finish
//! everything reachable) or [`CrawlController::shutdown`] (stop dispatching,
//! give in-flight fetches a grace period, then cancel them).
//!
//! The loop is the only place that:
//! - pulls work from the scheduler and spawns workers
//! - re-queues retries once their delay has passed
//! - stamps product sequence numbers and writes them to storage and the sink
//! - snapshots crawl state

use crate::config::Config;
use crate::crawler::context::{CrawlContext, SeedOutcome};
use crate::crawler::coordinator::{Coordinator, Disposition, FetchReport};
use crate::crawler::fetcher::{Fetcher, HttpFetcher};
use crate::crawler::frontier::FrontierEntry;
use crate::crawler::parser::{HtmlLinkExtractor, LinkExtractor};
use crate::output::{CrawlSummary, DomainSummary, JsonLinesSink, ProductMatch, ProductSink};
use crate::state::{DomainPhase, FetchClass, UrlOutcome};
use crate::storage::{open_storage, RunStatus, Storage};
use crate::url::{CanonicalUrl, Domain};
use crate::ScoutError;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Sleep used when nothing is scheduled; the loop is woken by reports or signals
const IDLE_WAIT: Duration = Duration::from_secs(3600);

/// Lower bound on a timed wake, so a just-due deadline cannot spin the loop
const MIN_WAKE: Duration = Duration::from_millis(1);

/// What a resume restored
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumeReport {
    /// Frontier entries restored from the snapshot
    pub restored: usize,
    /// Pending URLs that were in flight at interruption and are queued again
    pub requeued: usize,
    /// Logged products re-delivered to the sink
    pub replayed: usize,
    /// URLs known to the dedup index
    pub seen: usize,
    pub run_id: Option<i64>,
}

/// Signals from the controller handle to the loop
#[derive(Default)]
struct Signals {
    draining: AtomicBool,
    wake: Notify,
}

/// Message sent by a worker when its dispatch ends
enum WorkerMessage {
    Report(FetchReport),
    /// The dispatch panicked
    Crashed { entry: FrontierEntry, reason: String },
}

/// Drives a crawl from seeds to summary
pub struct CrawlController {
    ctx: Arc<CrawlContext>,
    coordinator: Arc<Coordinator>,
    sink: Option<Box<dyn ProductSink>>,
    storage: Option<Box<dyn Storage>>,
    config_hash: String,
    run_id: Option<i64>,
    /// Requests per domain made by earlier runs of a resumed crawl
    baseline: HashMap<Domain, u64>,
    signals: Arc<Signals>,
    stop: CancellationToken,
    cancel: CancellationToken,
    handle: Option<JoinHandle<CrawlSummary>>,
}

impl CrawlController {
    /// Creates a controller without persistence
    ///
    /// # Arguments
    ///
    /// * `config` - Validated crawl configuration
    /// * `fetcher` - Used for pages and robots.txt
    /// * `extractor` - Pulls links out of fetched pages
    /// * `sink` - Receives every product match exactly once
    pub fn new(
        config: Config,
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<dyn LinkExtractor>,
        sink: Box<dyn ProductSink>,
    ) -> Result<Self, ScoutError> {
        crate::config::validate(&config)?;
        let ctx = Arc::new(CrawlContext::new(config)?);
        let coordinator = Arc::new(Coordinator::new(Arc::clone(&ctx), fetcher, extractor));

        Ok(Self {
            ctx,
            coordinator,
            sink: Some(sink),
            storage: None,
            config_hash: String::new(),
            run_id: None,
            baseline: HashMap::new(),
            signals: Arc::new(Signals::default()),
            stop: CancellationToken::new(),
            cancel: CancellationToken::new(),
            handle: None,
        })
    }

    /// Creates a controller wired to the HTTP fetcher, the JSON lines product
    /// file and the SQLite database named in `config.output`
    pub fn from_config(config: Config, config_hash: &str) -> Result<Self, ScoutError> {
        let fetcher = Arc::new(HttpFetcher::new(&config.user_agent)?);
        let sink = JsonLinesSink::open(Path::new(&config.output.products_path))?;
        let storage = open_storage(Path::new(&config.output.database_path))?;

        Ok(Self::new(config, fetcher, Arc::new(HtmlLinkExtractor::new()), Box::new(sink))?
            .with_storage(Box::new(storage), config_hash))
    }

    /// Persists runs, snapshots and the product log to `storage`
    pub fn with_storage(mut self, storage: Box<dyn Storage>, config_hash: &str) -> Self {
        self.storage = Some(storage);
        self.config_hash = config_hash.to_string();
        self
    }

    pub fn context(&self) -> &Arc<CrawlContext> {
        &self.ctx
    }

    pub fn run_id(&self) -> Option<i64> {
        self.run_id
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Restores crawl state from storage
    ///
    /// Loads the dedup index and frontier snapshot, queues again any URL
    /// still `Pending` that the snapshot does not hold, and re-delivers
    /// logged products past the sink's checkpoint. A resumable run is
    /// reopened instead of starting a new one.
    ///
    /// Must be called before [`CrawlController::start`].
    pub fn resume(&mut self) -> Result<ResumeReport, ScoutError> {
        if self.handle.is_some() {
            return Err(ScoutError::AlreadyStarted);
        }
        let ctx = &self.ctx;
        let (Some(storage), Some(sink)) = (self.storage.as_mut(), self.sink.as_mut()) else {
            return Ok(ResumeReport::default());
        };

        let records = storage.load_dedup()?;
        let entries = storage.load_frontier()?;

        let mut product_counts: HashMap<Domain, u32> = HashMap::new();
        for (url, outcome) in &records {
            if *outcome == UrlOutcome::Product {
                *product_counts.entry(ctx.resolver.registrable_domain(url)).or_insert(0) += 1;
            }
        }
        ctx.dedup.restore(records);
        ctx.restore_product_counts(product_counts);

        let snapshot_urls: HashSet<CanonicalUrl> = entries.iter().map(|entry| entry.url.clone()).collect();
        let restored = ctx.restore_frontier(entries);

        // Snapshots are taken with every claim settled into the frontier, so
        // this only finds URLs in state written by something else.
        let orphans: Vec<FrontierEntry> = ctx
            .dedup
            .pending()
            .into_iter()
            .filter(|url| !snapshot_urls.contains(url))
            .map(|url| {
                let domain = ctx.resolver.registrable_domain(&url);
                FrontierEntry::seed(url, domain)
            })
            .collect();
        let requeued = ctx.enqueue_all(orphans);

        self.baseline = storage
            .load_domain_stats()?
            .into_iter()
            .map(|summary| (summary.domain.clone(), summary.dispatched))
            .collect();

        if let Some(run) = storage.get_latest_run()? {
            if run.status.is_resumable() {
                storage.update_run_status(run.id, RunStatus::Running)?;
                self.run_id = Some(run.id);
            }
        }

        let replay = storage.products_after(sink.checkpoint())?;
        for product in &replay {
            sink.emit(product)?;
        }
        sink.flush()?;

        let report = ResumeReport {
            restored,
            requeued,
            replayed: replay.len(),
            seen: ctx.dedup.len(),
            run_id: self.run_id,
        };
        info!(
            "Resumed crawl state: {} URLs seen, {} queued from snapshot, {} re-queued, {} products replayed",
            report.seen, report.restored, report.requeued, report.replayed
        );
        Ok(report)
    }

    /// Admits `seeds` and starts the crawl loop
    ///
    /// Returns the number of seeds queued. Invalid seeds are logged and skipped.
    pub fn start<I, S>(&mut self, seeds: I) -> Result<usize, ScoutError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.handle.is_some() {
            return Err(ScoutError::AlreadyStarted);
        }
        let mut next_seq = 0;
        if let Some(storage) = self.storage.as_mut() {
            if self.run_id.is_none() {
                self.run_id = Some(storage.create_run(&self.config_hash)?);
            }
            next_seq = storage.last_product_seq()?;
        }
        let sink = self.sink.take().ok_or(ScoutError::AlreadyStarted)?;
        let next_seq = next_seq.max(sink.checkpoint());
        let storage = self.storage.take();
        let queued = self.admit(seeds);

        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        let crawl = CrawlLoop {
            ctx: Arc::clone(&self.ctx),
            coordinator: Arc::clone(&self.coordinator),
            sink,
            storage,
            run_id: self.run_id,
            config_hash: self.config_hash.clone(),
            baseline: std::mem::take(&mut self.baseline),
            next_seq,
            signals: Arc::clone(&self.signals),
            stop: self.stop.clone(),
            cancel: self.cancel.clone(),
            permits: Arc::new(Semaphore::new(self.ctx.config.crawler.global_worker_budget as usize)),
            reports_tx,
            reports_rx,
            in_flight: HashMap::new(),
            retries: BTreeMap::new(),
            retry_seq: 0,
            completions: 0,
            products_emitted: 0,
            started_at: Utc::now(),
        };

        info!(
            "Starting crawl (run {:?}) with {} new seeds, {} URLs queued",
            self.run_id,
            queued,
            self.ctx.frontier_len()
        );
        self.handle = Some(tokio::spawn(crawl.run()));
        Ok(queued)
    }

    /// Adds seeds to a running (or not yet started) crawl
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of seeds queued
    /// * `Err(ScoutError::SeedsClosed)` - The crawl is draining or shutting down
    pub fn add_seeds<I, S>(&self, seeds: I) -> Result<usize, ScoutError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.signals.draining.load(Ordering::SeqCst) {
            return Err(ScoutError::SeedsClosed);
        }
        let queued = self.admit(seeds);
        self.signals.wake.notify_one();
        Ok(queued)
    }

    fn admit<I, S>(&self, seeds: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut queued = 0;
        for seed in seeds {
            let seed = seed.as_ref();
            match self.ctx.admit_seed(seed) {
                Ok(SeedOutcome::Queued(url)) => {
                    debug!("Seed queued: {}", url);
                    queued += 1;
                }
                Ok(SeedOutcome::AlreadySeen(url)) => debug!("Seed already seen: {}", url),
                Ok(SeedOutcome::Dropped(url)) => warn!("Seed dropped, frontier full: {}", url),
                Err(e) => warn!("Invalid seed {}: {}", seed, e),
            }
        }
        queued
    }

    /// Stops accepting seeds and waits until every reachable URL is settled
    ///
    /// Cancel safe: if the returned future is dropped, the crawl keeps
    /// draining and [`CrawlController::shutdown`] can still be called.
    pub async fn drain(&mut self) -> Result<CrawlSummary, ScoutError> {
        let handle = self.handle.as_mut().ok_or(ScoutError::NotStarted)?;
        self.signals.draining.store(true, Ordering::SeqCst);
        self.signals.wake.notify_one();

        let joined = handle.await;
        self.handle = None;
        joined.map_err(|e| ScoutError::Task(e.to_string()))
    }

    /// Stops dispatching and waits up to `grace` for in-flight fetches
    ///
    /// Fetches still running after `grace` are cancelled; their URLs stay
    /// `Pending` and are saved in the frontier snapshot.
    pub async fn shutdown(&mut self, grace: Duration) -> Result<CrawlSummary, ScoutError> {
        let handle = self.handle.as_mut().ok_or(ScoutError::NotStarted)?;
        self.signals.draining.store(true, Ordering::SeqCst);
        self.stop.cancel();

        let joined = match tokio::time::timeout(grace, &mut *handle).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!("In-flight fetches still running after {:?}; cancelling", grace);
                self.cancel.cancel();
                handle.await
            }
        };
        self.handle = None;
        joined.map_err(|e| ScoutError::Task(e.to_string()))
    }
}

impl Drop for CrawlController {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop.cancel();
            self.cancel.cancel();
        }
    }
}

/// State owned by the background crawl task
struct CrawlLoop {
    ctx: Arc<CrawlContext>,
    coordinator: Arc<Coordinator>,
    sink: Box<dyn ProductSink>,
    storage: Option<Box<dyn Storage>>,
    run_id: Option<i64>,
    config_hash: String,
    /// Requests per domain made by earlier runs of a resumed crawl
    baseline: HashMap<Domain, u64>,
    next_seq: u64,
    signals: Arc<Signals>,
    stop: CancellationToken,
    cancel: CancellationToken,
    permits: Arc<Semaphore>,
    reports_tx: mpsc::UnboundedSender<WorkerMessage>,
    reports_rx: mpsc::UnboundedReceiver<WorkerMessage>,
    in_flight: HashMap<CanonicalUrl, FrontierEntry>,
    /// Keyed by due time, then insertion order
    retries: BTreeMap<(Instant, u64), FrontierEntry>,
    retry_seq: u64,
    completions: u64,
    products_emitted: u64,
    started_at: DateTime<Utc>,
}

impl CrawlLoop {
    async fn run(mut self) -> CrawlSummary {
        loop {
            let stopping = self.stop.is_cancelled();
            if !stopping {
                let now = Instant::now();
                self.promote_due_retries(now);
                self.fill_workers(now);
            }
            if self.is_finished(stopping) {
                break;
            }

            let wake_at = if stopping { None } else { self.next_wake(Instant::now()) };
            let sleep = tokio::time::sleep_until(wake_at.unwrap_or_else(|| Instant::now() + IDLE_WAIT));

            tokio::select! {
                biased;
                _ = self.stop.cancelled(), if !stopping => {
                    info!("Shutdown requested; {} fetches in flight", self.in_flight.len());
                }
                Some(message) = self.reports_rx.recv() => self.handle_message(message),
                _ = self.signals.wake.notified() => {}
                _ = sleep, if wake_at.is_some() => {}
            }
        }

        self.finish()
    }

    fn is_finished(&self, stopping: bool) -> bool {
        if !self.in_flight.is_empty() {
            return false;
        }
        if stopping {
            return true;
        }
        self.signals.draining.load(Ordering::SeqCst) && self.retries.is_empty() && self.ctx.frontier_len() == 0
    }

    /// Earliest instant at which a dispatch or a retry becomes due
    fn next_wake(&self, now: Instant) -> Option<Instant> {
        let dispatch_at = if self.permits.available_permits() > 0 {
            let frontier = self.ctx.frontier.lock();
            self.ctx.scheduler.next_wake(&frontier, now)
        } else {
            None
        };
        let retry_at = self.retries.keys().next().map(|(at, _)| *at);

        dispatch_at
            .into_iter()
            .chain(retry_at)
            .min()
            .map(|at| at.max(now + MIN_WAKE))
    }

    fn promote_due_retries(&mut self, now: Instant) {
        while let Some(due) = self.retries.first_entry() {
            if due.key().0 > now {
                break;
            }
            let entry = due.remove();
            if self.ctx.product_limit_reached(&entry.domain) {
                self.ctx.dedup.mark_outcome(&entry.url, UrlOutcome::Dropped);
                continue;
            }
            debug!("Retrying {} (attempt {})", entry.url, entry.attempt_count + 1);
            self.ctx.enqueue(entry);
        }
    }

    fn fill_workers(&mut self, now: Instant) {
        while let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() {
            let next = {
                let mut frontier = self.ctx.frontier.lock();
                self.ctx.scheduler.next_dispatch(&mut frontier, now)
            };
            match next {
                Some(entry) => self.spawn_worker(entry, permit),
                None => break,
            }
        }
    }

    fn spawn_worker(&mut self, entry: FrontierEntry, permit: OwnedSemaphorePermit) {
        debug!("Dispatching {} (depth {}, priority {})", entry.url, entry.depth, entry.priority);
        self.in_flight.insert(entry.url.clone(), entry.clone());

        let coordinator = Arc::clone(&self.coordinator);
        let cancel = self.cancel.clone();
        let reports = self.reports_tx.clone();
        let fallback = entry.clone();

        tokio::spawn(async move {
            let worker = tokio::spawn(async move { coordinator.dispatch(entry, &cancel).await });
            let message = match worker.await {
                Ok(report) => WorkerMessage::Report(report),
                Err(e) => WorkerMessage::Crashed {
                    entry: fallback,
                    reason: e.to_string(),
                },
            };
            drop(permit);
            // The loop only stops receiving once nothing is in flight.
            let _ = reports.send(message);
        });
    }

    fn handle_message(&mut self, message: WorkerMessage) {
        match message {
            WorkerMessage::Report(report) => self.handle_report(report),
            WorkerMessage::Crashed { entry, reason } => {
                error!("Worker for {} panicked: {}", entry.url, reason);
                self.in_flight.remove(&entry.url);
                self.ctx
                    .scheduler
                    .record_completion(&entry.domain, FetchClass::Permanent, Instant::now());
                self.ctx.dedup.mark_outcome(&entry.url, UrlOutcome::Failed);
                self.after_completion();
            }
        }
    }

    fn handle_report(&mut self, report: FetchReport) {
        self.in_flight.remove(&report.entry.url);

        match report.disposition {
            Disposition::Finished(outcome) => {
                debug!(
                    "{} -> {} ({} links queued)",
                    report.entry.url, outcome, report.discovered
                );
                if let Some(pattern) = report.product {
                    self.emit_product(&report.entry, pattern);
                }
            }
            Disposition::Retry { after } => {
                let mut entry = report.entry;
                entry.attempt_count += 1;
                self.retries.insert((Instant::now() + after, self.retry_seq), entry);
                self.retry_seq += 1;
            }
            Disposition::Abandoned => {
                debug!("Fetch of {} cancelled; keeping it pending", report.entry.url);
                self.ctx.enqueue(report.entry);
            }
            Disposition::Deferred => {
                self.ctx.enqueue(report.entry);
            }
        }

        self.after_completion();
    }

    fn after_completion(&mut self) {
        self.completions += 1;
        let interval = u64::from(self.ctx.config.crawler.snapshot_interval.max(1));
        if self.completions % interval == 0 {
            self.snapshot();
            info!(
                "Progress: {} fetches completed, {} URLs seen, {} queued, {} in flight, {} products, {} domains backing off",
                self.completions,
                self.ctx.dedup.len(),
                self.ctx.frontier_len(),
                self.in_flight.len(),
                self.products_emitted,
                self.domains_in_backoff(Instant::now())
            );
        }
    }

    /// Stamps, logs and delivers one product
    ///
    /// The storage log is written before the sink so a crash in between is
    /// repaired by the replay on resume.
    fn emit_product(&mut self, entry: &FrontierEntry, pattern: String) {
        self.next_seq += 1;
        let product = ProductMatch {
            seq: self.next_seq,
            url: entry.url.clone(),
            domain: entry.domain.clone(),
            pattern,
            found_on: entry.found_on.clone(),
            discovered_at: Utc::now(),
        };

        if let (Some(storage), Some(run_id)) = (self.storage.as_mut(), self.run_id) {
            if let Err(e) = storage.append_product(run_id, &product) {
                error!("Failed to log product {}: {}", product.url, e);
            }
        }
        if let Err(e) = self.sink.emit(&product) {
            error!("Failed to emit product {}: {}", product.url, e);
        }

        self.products_emitted += 1;
        info!("Product found: {} (pattern {})", product.url, product.pattern);
    }

    fn domains_in_backoff(&self, now: Instant) -> usize {
        let frontier = self.ctx.frontier.lock();
        self.ctx
            .scheduler
            .domain_states()
            .iter()
            .filter(|(domain, _)| {
                let has_pending = frontier.pending_for(domain) > 0;
                self.ctx.scheduler.phase(domain, has_pending, now) == DomainPhase::Backoff
            })
            .count()
    }

    /// Per-domain results
    ///
    /// URL counts come from the dedup `records`, which already span every
    /// run of a resumed crawl; request counts add the earlier runs' totals.
    fn domain_summaries(&self, records: &[(CanonicalUrl, UrlOutcome)]) -> Vec<DomainSummary> {
        let mut summaries: BTreeMap<Domain, DomainSummary> = BTreeMap::new();

        for (domain, dispatched) in &self.baseline {
            summary_entry(&mut summaries, domain).dispatched += dispatched;
        }
        for (domain, state) in self.ctx.scheduler.domain_states() {
            summary_entry(&mut summaries, &domain).dispatched += state.dispatched;
        }

        for (url, outcome) in records {
            let domain = self.ctx.resolver.registrable_domain(url);
            let summary = summary_entry(&mut summaries, &domain);
            match outcome {
                outcome if outcome.is_success() => summary.succeeded += 1,
                UrlOutcome::Failed => summary.failed += 1,
                UrlOutcome::Blocked => summary.blocked += 1,
                UrlOutcome::Pending => summary.pending += 1,
                _ => {}
            }
        }

        for (domain, summary) in summaries.iter_mut() {
            summary.products = u64::from(self.ctx.product_count(domain));
        }
        summaries.into_values().collect()
    }

    /// Frontier (with retries and in-flight entries) and dedup records as of now
    ///
    /// In-flight URLs are recorded `Pending` even if their worker already
    /// settled them, since the loop has not yet emitted their product.
    fn capture_state(&self) -> (Vec<FrontierEntry>, Vec<(CanonicalUrl, UrlOutcome)>) {
        let (mut entries, mut records) = self.ctx.snapshot_state();
        entries.extend(self.retries.values().cloned());
        entries.extend(self.in_flight.values().cloned());

        for (url, outcome) in records.iter_mut() {
            if self.in_flight.contains_key(url) {
                *outcome = UrlOutcome::Pending;
            }
        }
        (entries, records)
    }

    /// Saves frontier, dedup index and domain stats in one transaction
    fn snapshot(&mut self) {
        if self.storage.is_none() {
            return;
        }

        let (entries, records) = self.capture_state();
        let domains = self.domain_summaries(&records);

        let Some(storage) = self.storage.as_mut() else {
            return;
        };
        match storage.save_snapshot(&entries, &records, &domains) {
            Ok(()) => debug!("Snapshot saved: {} queued, {} seen", entries.len(), records.len()),
            Err(e) => error!("Failed to save snapshot: {}", e),
        }
    }

    fn finish(mut self) -> CrawlSummary {
        let interrupted = self.stop.is_cancelled();

        if let Err(e) = self.sink.flush() {
            error!("Failed to flush product sink: {}", e);
        }
        self.snapshot();

        if let (Some(storage), Some(run_id)) = (self.storage.as_mut(), self.run_id) {
            let updated = if interrupted {
                storage.update_run_status(run_id, RunStatus::Interrupted)
            } else {
                storage.complete_run(run_id)
            };
            if let Err(e) = updated {
                error!("Failed to update run {}: {}", run_id, e);
            }
        }

        let summary = CrawlSummary {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: Some(Utc::now()),
            status: if interrupted { "interrupted" } else { "completed" }.to_string(),
            config_hash: self.config_hash.clone(),
            outcomes: self.ctx.dedup.count_by_outcome().into_iter().collect(),
            products_emitted: self.products_emitted,
            frontier_remaining: (self.ctx.frontier_len() + self.retries.len()) as u64,
            domains: self.domain_summaries(&self.ctx.dedup.snapshot()),
        };

        info!(
            "Crawl {}: {} URLs seen, {} products emitted, {} left queued",
            summary.status,
            summary.urls_seen(),
            summary.products_emitted,
            summary.frontier_remaining
        );
        summary
    }
}

fn summary_entry<'a>(summaries: &'a mut BTreeMap<Domain, DomainSummary>, domain: &Domain) -> &'a mut DomainSummary {
    summaries
        .entry(domain.clone())
        .or_insert_with(|| DomainSummary::new(domain.clone()))
}
