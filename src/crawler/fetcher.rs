//! HTTP fetcher
//!
//! The crawl core only sees the [`Fetcher`] trait: one GET per call, bounded by
//! a timeout, returning the status and body or a classified error.
//! [`HttpFetcher`] is the reqwest-backed implementation.

use crate::config::UserAgentConfig;
use crate::url::CanonicalUrl;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use thiserror::Error;

/// A response received from a server, whatever its status
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    /// URL after redirects
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: String,
}

impl FetchResponse {
    /// Returns true when the body should be searched for links
    ///
    /// A missing Content-Type is treated as HTML.
    pub fn is_html(&self) -> bool {
        self.content_type.as_deref().map_or(true, |ct| {
            let ct = ct.to_ascii_lowercase();
            ct.contains("text/html") || ct.contains("application/xhtml")
        })
    }
}

/// Failure to obtain a response at all
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("undecodable response body: {0}")]
    Body(String),

    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Returns true if retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Body(_))
    }
}

/// Fetches a single URL
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &CanonicalUrl, timeout: Duration) -> Result<FetchResponse, FetchError>;
}

/// Formats the crawler's user agent string
///
/// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
pub fn user_agent_string(config: &UserAgentConfig) -> String {
    format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    )
}

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use product_scout::config::UserAgentConfig;
/// use product_scout::crawler::build_http_client;
///
/// let client = build_http_client(&UserAgentConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent_string(config))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// reqwest-backed [`Fetcher`]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &CanonicalUrl, timeout: Duration) -> Result<FetchResponse, FetchError> {
        let response = self
            .client
            .get(url.as_str())
            .timeout(timeout)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Body(e.to_string())
            }
        })?;

        Ok(FetchResponse {
            status,
            final_url,
            content_type,
            body,
        })
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_connect() {
        FetchError::Connect(e.to_string())
    } else {
        FetchError::Request(e.to_string())
    }
}
