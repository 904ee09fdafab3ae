use serde::Deserialize;

/// Main configuration structure for Product Scout
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub urls: UrlConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "domain")]
    pub domains: Vec<DomainEntry>,
}

impl Config {
    /// Seed URLs of every configured domain, in file order
    ///
    /// A domain entry without explicit seeds contributes its home page.
    pub fn seed_urls(&self) -> Vec<String> {
        self.domains
            .iter()
            .flat_map(|entry| {
                if entry.seeds.is_empty() {
                    vec![format!("https://{}/", entry.domain)]
                } else {
                    entry.seeds.clone()
                }
            })
            .collect()
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of in-flight fetches against a single domain
    #[serde(rename = "max-concurrent-per-domain", default = "default_max_concurrent_per_domain")]
    pub max_concurrent_per_domain: u32,

    /// Total number of fetches allowed in flight across all domains
    #[serde(rename = "global-worker-budget", default = "default_global_worker_budget")]
    pub global_worker_budget: u32,

    /// Minimum spacing between requests to the same domain (milliseconds)
    #[serde(rename = "crawl-delay-ms", default = "default_crawl_delay_ms")]
    pub crawl_delay_ms: u64,

    /// Per-request timeout (milliseconds)
    #[serde(rename = "request-timeout-ms", default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Retries granted to a URL after a transient failure
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(rename = "backoff-base-ms", default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(rename = "backoff-cap-ms", default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,

    /// Consecutive transient failures tolerated before a domain backs off
    #[serde(rename = "failure-threshold", default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Upper bound on pending frontier entries
    #[serde(rename = "frontier-capacity", default = "default_frontier_capacity")]
    pub frontier_capacity: usize,

    /// Maximum link depth from a seed URL
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// Stop emitting products for a domain once this many were found
    #[serde(rename = "max-products-per-domain", default)]
    pub max_products_per_domain: Option<u32>,

    #[serde(rename = "obey-robots", default = "default_true")]
    pub obey_robots: bool,

    /// Number of completed fetches between state snapshots
    #[serde(rename = "snapshot-interval", default = "default_snapshot_interval")]
    pub snapshot_interval: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_per_domain: default_max_concurrent_per_domain(),
            global_worker_budget: default_global_worker_budget(),
            crawl_delay_ms: default_crawl_delay_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            failure_threshold: default_failure_threshold(),
            frontier_capacity: default_frontier_capacity(),
            max_depth: default_max_depth(),
            max_products_per_domain: None,
            obey_robots: true,
            snapshot_interval: default_snapshot_interval(),
        }
    }
}

fn default_max_concurrent_per_domain() -> u32 {
    2
}

fn default_global_worker_budget() -> u32 {
    16
}

fn default_crawl_delay_ms() -> u64 {
    500
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_cap_ms() -> u64 {
    30_000
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_frontier_capacity() -> usize {
    100_000
}

fn default_max_depth() -> u32 {
    5
}

fn default_snapshot_interval() -> u32 {
    50
}

fn default_true() -> bool {
    true
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "ProductScout".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/bot".to_string(),
            contact_email: "bot@example.com".to_string(),
        }
    }
}

/// Which discovered links are allowed into the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LinkScope {
    /// Only links on the same registrable domain as the page they were found on
    #[default]
    SameDomain,
    /// Only links whose host matches an `allow-list` pattern
    AllowList,
}

/// URL normalization, classification and filtering configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UrlConfig {
    /// Regexes matched against query parameter keys; matches are stripped
    #[serde(rename = "tracking-params", default = "default_tracking_params")]
    pub tracking_params: Vec<String>,

    /// Regexes matched against URL paths; the first match marks a product page
    #[serde(rename = "product-patterns", default = "default_product_patterns")]
    pub product_patterns: Vec<String>,

    /// Regexes matched against URL paths; matching links are never queued
    #[serde(rename = "exclude-patterns", default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    /// Domain patterns (e.g. "facebook.com" or "*.facebook.com") never crawled
    #[serde(rename = "deny-domains", default = "default_deny_domains")]
    pub deny_domains: Vec<String>,

    #[serde(rename = "link-scope", default)]
    pub link_scope: LinkScope,

    /// Host patterns followed when `link-scope = "allow-list"`
    #[serde(rename = "allow-list", default)]
    pub allow_list: Vec<String>,

    /// Public suffix list file; the bundled snapshot is used when absent
    #[serde(rename = "suffix-list-path", default)]
    pub suffix_list_path: Option<String>,
}

impl Default for UrlConfig {
    fn default() -> Self {
        Self {
            tracking_params: default_tracking_params(),
            product_patterns: default_product_patterns(),
            exclude_patterns: default_exclude_patterns(),
            deny_domains: default_deny_domains(),
            link_scope: LinkScope::default(),
            allow_list: Vec::new(),
            suffix_list_path: None,
        }
    }
}

fn to_strings(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|p| p.to_string()).collect()
}

fn default_tracking_params() -> Vec<String> {
    to_strings(crate::url::DEFAULT_TRACKING_PARAMS)
}

fn default_product_patterns() -> Vec<String> {
    to_strings(crate::url::DEFAULT_PRODUCT_PATTERNS)
}

fn default_exclude_patterns() -> Vec<String> {
    to_strings(crate::url::DEFAULT_EXCLUDE_PATTERNS)
}

fn default_deny_domains() -> Vec<String> {
    to_strings(&[
        "facebook.com",
        "twitter.com",
        "instagram.com",
        "youtube.com",
    ])
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Path to the JSON-lines product log
    #[serde(rename = "products-path")]
    pub products_path: String,

    /// Path to the markdown summary file
    #[serde(rename = "summary-path")]
    pub summary_path: String,

    /// Directory receiving per-domain JSON exports
    #[serde(rename = "export-dir", default)]
    pub export_dir: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: "./scout.db".to_string(),
            products_path: "./products.jsonl".to_string(),
            summary_path: "./summary.md".to_string(),
            export_dir: None,
        }
    }
}

/// Per-domain seeds and overrides
#[derive(Debug, Clone, Deserialize)]
pub struct DomainEntry {
    /// Domain the entry applies to (e.g., "shop.com")
    pub domain: String,

    /// Seed URLs to start crawling from
    #[serde(default)]
    pub seeds: Vec<String>,

    /// Site-specific product patterns, checked before the common ones
    #[serde(rename = "product-patterns", default)]
    pub product_patterns: Vec<String>,

    /// Overrides `crawler.crawl-delay-ms` for this domain
    #[serde(rename = "crawl-delay-ms", default)]
    pub crawl_delay_ms: Option<u64>,
}
