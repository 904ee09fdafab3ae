//! Link extraction
//!
//! The crawl core asks a [`LinkExtractor`] for raw hrefs and resolves them
//! itself through the canonicalizer. [`HtmlLinkExtractor`] pulls them out of
//! HTML with `scraper`.

use scraper::{Html, Selector};

/// Pulls raw link targets out of a fetched page body
pub trait LinkExtractor: Send + Sync {
    /// Returns hrefs as written in the page; relative ones are resolved by the caller
    fn extract_links(&self, body: &str) -> Vec<String>;
}

/// Extracts anchors and canonical links from HTML
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags anywhere in the document
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` and `data:` links
/// - Fragment-only links (same-page anchors)
///
/// `rel="nofollow"` links are followed.
#[derive(Debug, Clone, Default)]
pub struct HtmlLinkExtractor;

impl HtmlLinkExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl LinkExtractor for HtmlLinkExtractor {
    fn extract_links(&self, body: &str) -> Vec<String> {
        let document = Html::parse_document(body);
        let mut links = Vec::new();

        if let Ok(a_selector) = Selector::parse("a[href]") {
            for element in document.select(&a_selector) {
                if element.value().attr("download").is_some() {
                    continue;
                }

                if let Some(href) = element.value().attr("href").and_then(accept_href) {
                    links.push(href);
                }
            }
        }

        if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
            for element in document.select(&canonical_selector) {
                if let Some(href) = element.value().attr("href").and_then(accept_href) {
                    links.push(href);
                }
            }
        }

        links
    }
}

/// Returns the trimmed href, or None if it can never lead to a crawlable page
fn accept_href(href: &str) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    Some(href.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links(html: &str) -> Vec<String> {
        HtmlLinkExtractor::new().extract_links(html)
    }

    #[test]
    fn test_extract_absolute_and_relative_links() {
        let html = r#"
            <html><body>
                <a href="https://other.com/page">Absolute</a>
                <a href="/products/1">Root relative</a>
                <a href="item/2">Path relative</a>
            </body></html>
        "#;
        assert_eq!(links(html), vec!["https://other.com/page", "/products/1", "item/2"]);
    }

    #[test]
    fn test_hrefs_are_trimmed() {
        let html = r#"<html><body><a href="  /p/1  ">Link</a></body></html>"#;
        assert_eq!(links(html), vec!["/p/1"]);
    }

    #[test]
    fn test_skip_special_schemes() {
        let html = r#"
            <html><body>
                <a href="javascript:void(0)">JS</a>
                <a href="JavaScript:alert(1)">JS upper</a>
                <a href="mailto:sales@shop.com">Email</a>
                <a href="tel:+1234567890">Call</a>
                <a href="data:text/html,<h1>x</h1>">Data</a>
            </body></html>
        "#;
        assert!(links(html).is_empty());
    }

    #[test]
    fn test_skip_download_link() {
        let html = r#"<html><body><a href="/catalog.pdf" download>Download</a></body></html>"#;
        assert!(links(html).is_empty());
    }

    #[test]
    fn test_skip_fragment_only() {
        let html = r##"<html><body><a href="#reviews">Jump</a><a href="">Empty</a></body></html>"##;
        assert!(links(html).is_empty());
    }

    #[test]
    fn test_follow_nofollow_links() {
        let html = r#"<html><body><a href="/p/9" rel="nofollow">Link</a></body></html>"#;
        assert_eq!(links(html), vec!["/p/9"]);
    }

    #[test]
    fn test_extract_canonical_link() {
        let html = r#"<html><head><link rel="canonical" href="https://shop.com/p/1" /></head><body></body></html>"#;
        assert_eq!(links(html), vec!["https://shop.com/p/1"]);
    }

    #[test]
    fn test_malformed_html_still_yields_links() {
        let html = r#"<div><a href="/products/1">unclosed <p><a href="/products/2">"#;
        assert_eq!(links(html), vec!["/products/1", "/products/2"]);
    }
}
