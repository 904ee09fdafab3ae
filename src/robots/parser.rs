//! Robots.txt parser implementation
//!
//! Allow/Disallow matching is delegated to the robotstxt crate; Crawl-delay,
//! which it does not expose, is read with a small line scanner.

use robotstxt::DefaultMatcher;
use std::time::Duration;

/// Upper bound accepted for a Crawl-delay directive
const MAX_CRAWL_DELAY: Duration = Duration::from_secs(60);

/// Parsed robots.txt data for one origin
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt content (empty string means allow all)
    content: String,
    allow_all: bool,
}

impl ParsedRobots {
    /// Creates a new ParsedRobots from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            allow_all: false,
        }
    }

    /// Creates a permissive ParsedRobots that allows everything
    ///
    /// Used when robots.txt is missing or cannot be fetched.
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            allow_all: true,
        }
    }

    /// Interprets a robots.txt response
    ///
    /// | Status | Result |
    /// |--------|--------|
    /// | 2xx | Parse the body |
    /// | anything else | Allow all |
    pub fn from_response(status: u16, body: &str) -> Self {
        if (200..300).contains(&status) {
            Self::from_content(body)
        } else {
            Self::allow_all()
        }
    }

    pub fn is_allow_all(&self) -> bool {
        self.allow_all || self.content.trim().is_empty()
    }

    /// Checks if a URL is allowed for the given user agent token
    ///
    /// # Arguments
    ///
    /// * `url` - The full URL (or path) to check
    /// * `user_agent` - The crawler's product token (e.g. "ProductScout")
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.is_allow_all() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Gets the crawl delay for a specific user agent
    ///
    /// A group naming the agent wins over the `*` group. Values above one
    /// minute are clamped; negative or unparsable values are ignored.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        if self.is_allow_all() {
            return None;
        }

        let normalized_agent = user_agent.to_lowercase();
        let mut group_agents: Vec<String> = Vec::new();
        let mut in_agent_lines = false;
        let mut wildcard_delay: Option<f64> = None;
        let mut agent_delay: Option<f64> = None;

        for line in self.content.lines() {
            // Strip trailing comments
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            if key == "user-agent" {
                // Consecutive User-agent lines share one group
                if !in_agent_lines {
                    group_agents.clear();
                }
                group_agents.push(value.to_lowercase());
                in_agent_lines = true;
                continue;
            }
            in_agent_lines = false;

            if key != "crawl-delay" {
                continue;
            }

            let Ok(delay) = value.parse::<f64>() else {
                continue;
            };
            if !delay.is_finite() || delay < 0.0 {
                continue;
            }

            if group_agents
                .iter()
                .any(|ua| ua != "*" && normalized_agent.contains(ua.as_str()))
            {
                agent_delay = Some(delay);
            } else if group_agents.iter().any(|ua| ua == "*") {
                wildcard_delay = Some(delay);
            }
        }

        agent_delay
            .or(wildcard_delay)
            .map(|seconds| Duration::from_secs_f64(seconds).min(MAX_CRAWL_DELAY))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AGENT: &str = "ProductScout";

    #[test]
    fn test_allow_all() {
        let robots = ParsedRobots::allow_all();
        assert!(robots.is_allowed("https://shop.com/any/path", AGENT));
        assert!(robots.is_allowed("https://shop.com/admin", AGENT));
    }

    #[test]
    fn test_parse_disallow_all() {
        let robots = ParsedRobots::from_content("User-agent: *\nDisallow: /");
        assert!(!robots.is_allowed("https://shop.com/", AGENT));
        assert!(!robots.is_allowed("https://shop.com/products/1", AGENT));
    }

    #[test]
    fn test_parse_disallow_specific() {
        let robots = ParsedRobots::from_content("User-agent: *\nDisallow: /checkout");
        assert!(robots.is_allowed("https://shop.com/products/1", AGENT));
        assert!(!robots.is_allowed("https://shop.com/checkout", AGENT));
        assert!(!robots.is_allowed("https://shop.com/checkout/step-2", AGENT));
    }

    #[test]
    fn test_parse_allow_and_disallow() {
        let content = "User-agent: *\nDisallow: /catalog\nAllow: /catalog/public";
        let robots = ParsedRobots::from_content(content);
        assert!(!robots.is_allowed("https://shop.com/catalog", AGENT));
        assert!(robots.is_allowed("https://shop.com/catalog/public", AGENT));
    }

    #[test]
    fn test_parse_specific_user_agent() {
        let content = "User-agent: ProductScout\nDisallow: /\n\nUser-agent: *\nAllow: /";
        let robots = ParsedRobots::from_content(content);
        assert!(robots.is_allowed("https://shop.com/page", "OtherBot"));
        assert!(!robots.is_allowed("https://shop.com/page", AGENT));
    }

    #[test]
    fn test_from_response() {
        let robots = ParsedRobots::from_response(200, "User-agent: *\nDisallow: /");
        assert!(!robots.is_allowed("https://shop.com/", AGENT));

        assert!(ParsedRobots::from_response(404, "").is_allow_all());
        assert!(ParsedRobots::from_response(503, "User-agent: *\nDisallow: /").is_allow_all());
    }

    #[test]
    fn test_invalid_robots_txt_allows() {
        let robots = ParsedRobots::from_content("This is not valid robots.txt {{{");
        assert!(robots.is_allowed("https://shop.com/any/path", AGENT));
    }

    #[test]
    fn test_crawl_delay_wildcard() {
        let robots = ParsedRobots::from_content("User-agent: *\nCrawl-delay: 10\nDisallow: /admin");
        assert_eq!(robots.crawl_delay(AGENT), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_crawl_delay_specific_agent_wins() {
        let content = "User-agent: ProductScout\nCrawl-delay: 5\n\nUser-agent: *\nCrawl-delay: 10";
        let robots = ParsedRobots::from_content(content);
        assert_eq!(robots.crawl_delay(AGENT), Some(Duration::from_secs(5)));
        assert_eq!(robots.crawl_delay("OtherBot"), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_crawl_delay_after_rules() {
        let content = "User-agent: *\nDisallow: /cart\nCrawl-delay: 2.5";
        let robots = ParsedRobots::from_content(content);
        assert_eq!(robots.crawl_delay(AGENT), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_crawl_delay_multiple_user_agents() {
        let content = "User-agent: BotA\nUser-agent: BotB\nCrawl-delay: 3";
        let robots = ParsedRobots::from_content(content);
        assert_eq!(robots.crawl_delay("BotA"), Some(Duration::from_secs(3)));
        assert_eq!(robots.crawl_delay("BotB"), Some(Duration::from_secs(3)));
        assert_eq!(robots.crawl_delay("BotC"), None);
    }

    #[test]
    fn test_crawl_delay_clamped_and_invalid() {
        let robots = ParsedRobots::from_content("User-agent: *\nCrawl-delay: 3600");
        assert_eq!(robots.crawl_delay(AGENT), Some(MAX_CRAWL_DELAY));

        let robots = ParsedRobots::from_content("User-agent: *\nCrawl-delay: soon");
        assert_eq!(robots.crawl_delay(AGENT), None);
    }

    #[test]
    fn test_crawl_delay_case_insensitive() {
        let robots = ParsedRobots::from_content("USER-AGENT: productscout\ncrawl-delay: 7");
        assert_eq!(robots.crawl_delay(AGENT), Some(Duration::from_secs(7)));
    }
}
