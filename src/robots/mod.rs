//! Robots.txt handling module
//!
//! robots.txt is fetched through the same [`Fetcher`] as pages, parsed with the
//! robotstxt crate and cached per origin for 24 hours.

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsCache};
pub use parser::ParsedRobots;

use crate::crawler::Fetcher;
use crate::url::CanonicalUrl;
use std::time::Duration;
use url::Url;

/// Returns the origin key ("scheme://host[:port]") robots.txt rules apply to
pub fn origin_of(url: &CanonicalUrl) -> String {
    url.as_url().origin().ascii_serialization()
}

/// Returns the robots.txt URL for the origin of `url`
pub fn robots_url(url: &CanonicalUrl) -> Option<CanonicalUrl> {
    let mut robots = Url::parse(&origin_of(url)).ok()?;
    robots.set_path("/robots.txt");
    CanonicalUrl::restore(robots.as_str()).ok()
}

/// Fetches robots.txt for the origin of `url`
///
/// Never fails: a missing file, an error status or a network failure all
/// yield [`ParsedRobots::allow_all`].
pub async fn fetch_robots(fetcher: &dyn Fetcher, url: &CanonicalUrl, timeout: Duration) -> ParsedRobots {
    let Some(target) = robots_url(url) else {
        return ParsedRobots::allow_all();
    };

    let fetch = fetcher.fetch(&target, timeout);
    match tokio::time::timeout(timeout, fetch).await {
        Ok(Ok(response)) => {
            tracing::debug!("Fetched {} (HTTP {})", target, response.status);
            ParsedRobots::from_response(response.status, &response.body)
        }
        Ok(Err(e)) => {
            tracing::debug!("Could not fetch {}: {}; allowing all", target, e);
            ParsedRobots::allow_all()
        }
        Err(_) => {
            tracing::debug!("Timed out fetching {}; allowing all", target);
            ParsedRobots::allow_all()
        }
    }
}
