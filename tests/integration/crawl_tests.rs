//! Integration tests for the crawler
//!
//! The end-to-end test uses wiremock to serve a small shop over real HTTP.
//! Timing tests use a scripted in-memory fetcher on a paused tokio clock,
//! so crawl delays and backoff are observed exactly.

use async_trait::async_trait;
use parking_lot::Mutex;
use product_scout::config::Config;
use product_scout::crawler::{
    CrawlController, FetchError, FetchResponse, Fetcher, HtmlLinkExtractor, HttpFetcher,
};
use product_scout::output::MemorySink;
use product_scout::storage::SqliteStorage;
use product_scout::{CanonicalUrl, UrlOutcome};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// What the scripted fetcher does for a path
#[derive(Clone)]
enum Script {
    Page(u16, &'static str),
    /// Never answers
    Hang,
}

/// In-memory fetcher answering by URL path and recording when each call started
#[derive(Default)]
struct ScriptedFetcher {
    scripts: HashMap<&'static str, Script>,
    calls: Mutex<Vec<(CanonicalUrl, Instant)>>,
}

impl ScriptedFetcher {
    fn with(mut self, path: &'static str, script: Script) -> Self {
        self.scripts.insert(path, script);
        self
    }

    fn calls_to(&self, path: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .iter()
            .filter(|(url, _)| url.path() == path)
            .map(|(_, at)| *at)
            .collect()
    }

    fn paths(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(url, _)| url.path().to_string()).collect()
    }

    fn hosts(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(url, _)| url.host().to_string()).collect()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &CanonicalUrl, _timeout: Duration) -> Result<FetchResponse, FetchError> {
        self.calls.lock().push((url.clone(), Instant::now()));

        let (status, body) = match self.scripts.get(url.path()) {
            Some(Script::Page(status, body)) => (*status, *body),
            Some(Script::Hang) => return std::future::pending().await,
            None => (200, "<html><body>nothing here</body></html>"),
        };
        Ok(FetchResponse {
            status,
            final_url: url.to_string(),
            content_type: Some("text/html".to_string()),
            body: body.to_string(),
        })
    }
}

fn scripted_config() -> Config {
    let mut config = Config::default();
    config.crawler.crawl_delay_ms = 0;
    config.crawler.obey_robots = false;
    config
}

fn scripted_controller(config: Config, fetcher: Arc<ScriptedFetcher>, sink: MemorySink) -> CrawlController {
    CrawlController::new(config, fetcher, Arc::new(HtmlLinkExtractor::new()), Box::new(sink))
        .expect("Failed to build controller")
}

fn html_page() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw("<html><body>page</body></html>", "text/html")
}

#[tokio::test]
async fn test_end_to_end_finds_three_products() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nAllow: /"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<html><body>
                <a href="/products/alpha?utm_source=home">Alpha</a>
                <a href="/p/beta">Beta</a>
                <a href="/item/gamma">Gamma</a>
                <a href="/collections/summer">Summer</a>
                <a href="/brands/acme">Acme</a>
            </body></html>"#,
            "text/html",
        ))
        .mount(&mock_server)
        .await;

    for page in ["/products/alpha", "/p/beta", "/item/gamma", "/collections/summer", "/brands/acme"] {
        Mock::given(method("GET"))
            .and(path(page))
            .respond_with(html_page())
            .mount(&mock_server)
            .await;
    }

    let mut config = Config::default();
    config.crawler.crawl_delay_ms = 0;
    let fetcher = Arc::new(HttpFetcher::new(&config.user_agent).expect("Failed to build HTTP client"));
    let sink = MemorySink::new();
    let mut controller =
        CrawlController::new(config, fetcher, Arc::new(HtmlLinkExtractor::new()), Box::new(sink.clone()))
            .expect("Failed to build controller");

    controller
        .start([format!("{}/", mock_server.uri())])
        .expect("Failed to start crawl");
    let summary = controller.drain().await.expect("Crawl failed");

    let found: BTreeSet<String> = sink
        .products()
        .iter()
        .map(|product| product.url.path().to_string())
        .collect();
    let expected: BTreeSet<String> = ["/item/gamma", "/p/beta", "/products/alpha"]
        .into_iter()
        .map(str::to_string)
        .collect();

    assert_eq!(found, expected);
    assert_eq!(sink.products().len(), 3);
    assert_eq!(summary.products_emitted, 3);
    assert_eq!(summary.count(UrlOutcome::Product), 3);
    assert_eq!(summary.count(UrlOutcome::Succeeded), 3);
    assert_eq!(summary.frontier_remaining, 0);
    assert_eq!(controller.context().frontier_len(), 0);
    assert!(summary.is_complete());

    // Sequence numbers are dense and start at 1
    let seqs: Vec<u64> = sink.products().iter().map(|product| product.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_robots_disallow_blocks_urls() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /p/"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<a href="/p/secret">Secret</a><a href="/products/open">Open</a>"#,
            "text/html",
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/products/open"))
        .respond_with(html_page())
        .mount(&mock_server)
        .await;

    let mut config = Config::default();
    config.crawler.crawl_delay_ms = 0;
    let fetcher = Arc::new(HttpFetcher::new(&config.user_agent).expect("Failed to build HTTP client"));
    let sink = MemorySink::new();
    let mut controller =
        CrawlController::new(config, fetcher, Arc::new(HtmlLinkExtractor::new()), Box::new(sink.clone()))
            .expect("Failed to build controller");

    controller.start([format!("{}/", mock_server.uri())]).unwrap();
    let summary = controller.drain().await.unwrap();

    assert_eq!(summary.count(UrlOutcome::Blocked), 1);
    assert_eq!(sink.products().len(), 1);
    assert_eq!(sink.products()[0].url.path(), "/products/open");
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_retry_then_fail() {
    let mut config = scripted_config();
    config.crawler.max_retries = 3;
    config.crawler.backoff_base_ms = 100;
    config.crawler.backoff_cap_ms = 10_000;
    config.crawler.failure_threshold = 100;

    let fetcher = Arc::new(ScriptedFetcher::default().with("/", Script::Page(503, "")));
    let mut controller = scripted_controller(config, Arc::clone(&fetcher), MemorySink::new());

    controller.start(["https://flaky.com/"]).unwrap();
    let summary = controller.drain().await.unwrap();

    let calls = fetcher.calls_to("/");
    assert_eq!(calls.len(), 4, "one attempt plus exactly three retries");

    let intervals: Vec<Duration> = calls.windows(2).map(|pair| pair[1] - pair[0]).collect();
    for (retry, interval) in intervals.iter().enumerate() {
        assert!(*interval >= Duration::from_millis(100 << retry));
    }
    assert!(intervals.windows(2).all(|pair| pair[0] <= pair[1]));

    let url = CanonicalUrl::restore("https://flaky.com/").unwrap();
    assert_eq!(controller.context().dedup.outcome(&url), Some(UrlOutcome::Failed));
    assert_eq!(summary.count(UrlOutcome::Failed), 1);
    assert_eq!(summary.frontier_remaining, 0);
}

#[tokio::test(start_paused = true)]
async fn test_politeness_spacing() {
    let mut config = scripted_config();
    config.crawler.crawl_delay_ms = 1_000;
    config.crawler.max_concurrent_per_domain = 2;
    config.crawler.obey_robots = true;

    let fetcher = Arc::new(ScriptedFetcher::default().with(
        "/",
        Script::Page(
            200,
            r#"<a href="/p/1">1</a><a href="/p/2">2</a><a href="/p/3">3</a>
               <a href="https://www.slow.com/p/4">4</a>"#,
        ),
    ));
    let mut controller = scripted_controller(config, Arc::clone(&fetcher), MemorySink::new());

    controller.start(["https://slow.com/"]).unwrap();
    let summary = controller.drain().await.unwrap();
    assert_eq!(summary.products_emitted, 4);

    // robots.txt for both hosts counts against the domain's crawl delay
    let calls: Vec<(String, Instant)> = fetcher
        .calls
        .lock()
        .iter()
        .map(|(url, at)| (url.to_string(), *at))
        .collect();
    assert_eq!(calls.len(), 7);
    assert_eq!(calls[0].0, "https://slow.com/robots.txt");
    assert_eq!(calls[1].0, "https://slow.com/");
    assert_eq!(fetcher.calls_to("/robots.txt").len(), 2);

    let mut starts: Vec<Instant> = calls.iter().map(|(_, at)| *at).collect();
    starts.sort();
    for pair in starts.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(1_000));
    }
}

#[tokio::test(start_paused = true)]
async fn test_domains_are_served_fairly() {
    let mut config = scripted_config();
    config.crawler.crawl_delay_ms = 0;
    config.crawler.global_worker_budget = 1;

    let fetcher = Arc::new(ScriptedFetcher::default());
    let mut controller = scripted_controller(config, Arc::clone(&fetcher), MemorySink::new());

    let busy: Vec<String> = (0..200).map(|i| format!("https://busy.com/page/{}", i)).collect();
    controller.start(busy).unwrap();
    controller.add_seeds(["https://quiet.com/page/0"]).unwrap();
    controller.drain().await.unwrap();

    let hosts = fetcher.hosts();
    assert_eq!(hosts.len(), 201);
    let quiet_position = hosts.iter().position(|host| host == "quiet.com");
    assert!(matches!(quiet_position, Some(p) if p < 2), "quiet.com served at {:?}", quiet_position);

    let quiet = CanonicalUrl::restore("https://quiet.com/page/0").unwrap();
    assert_eq!(controller.context().dedup.outcome(&quiet), Some(UrlOutcome::Succeeded));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_keeps_in_flight_url_pending() {
    let mut config = scripted_config();
    config.crawler.request_timeout_ms = 60_000;

    let fetcher = Arc::new(ScriptedFetcher::default().with("/", Script::Hang));
    let mut controller = scripted_controller(config, Arc::clone(&fetcher), MemorySink::new());

    controller.start(["https://stuck.com/"]).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(fetcher.calls_to("/").len(), 1);

    let summary = controller.shutdown(Duration::from_secs(1)).await.unwrap();

    let url = CanonicalUrl::restore("https://stuck.com/").unwrap();
    assert_eq!(controller.context().dedup.outcome(&url), Some(UrlOutcome::Pending));
    assert_eq!(summary.status, "interrupted");
    assert_eq!(summary.frontier_remaining, 1);
    assert!(controller.add_seeds(["https://other.com/"]).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_resume_after_shutdown() {
    let dir = tempfile::TempDir::new().unwrap();
    let db_path = dir.path().join("scout.db");
    let home = r#"<a href="/p/1">1</a><a href="/p/2">2</a>"#;

    let mut config = scripted_config();
    config.crawler.max_concurrent_per_domain = 2;

    // First run: /p/2 never answers and is interrupted
    let first_sink = MemorySink::new();
    let first_fetcher = Arc::new(
        ScriptedFetcher::default()
            .with("/", Script::Page(200, home))
            .with("/p/2", Script::Hang),
    );
    let mut first = scripted_controller(config.clone(), Arc::clone(&first_fetcher), first_sink.clone())
        .with_storage(Box::new(SqliteStorage::new(&db_path).unwrap()), "hash");

    first.start(["https://shop.com/"]).unwrap();
    for _ in 0..100 {
        if first_sink.len() == 1 && first_fetcher.calls_to("/p/2").len() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let interrupted = first.shutdown(Duration::from_secs(1)).await.unwrap();
    assert_eq!(interrupted.status, "interrupted");
    assert_eq!(first_sink.len(), 1);

    // Second run: a fresh sink receives the logged product, then the rest
    let second_sink = MemorySink::new();
    let second_fetcher = Arc::new(ScriptedFetcher::default().with("/", Script::Page(200, home)));
    let mut second = scripted_controller(config, Arc::clone(&second_fetcher), second_sink.clone())
        .with_storage(Box::new(SqliteStorage::new(&db_path).unwrap()), "hash");

    let resumed = second.resume().unwrap();
    assert_eq!(resumed.replayed, 1);
    assert_eq!(resumed.run_id, interrupted.run_id);
    assert_eq!(resumed.seen, 3);

    assert_eq!(second.start(["https://shop.com/"]).unwrap(), 0);
    let summary = second.drain().await.unwrap();

    assert_eq!(second_fetcher.paths(), vec!["/p/2".to_string()]);
    let products: Vec<(u64, String)> = second_sink
        .products()
        .iter()
        .map(|product| (product.seq, product.url.path().to_string()))
        .collect();
    assert_eq!(products, vec![(1, "/p/1".to_string()), (2, "/p/2".to_string())]);
    assert_eq!(summary.count(UrlOutcome::Product), 2);
    assert_eq!(summary.count(UrlOutcome::Pending), 0);
    assert!(summary.is_complete());
}
