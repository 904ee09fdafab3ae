use crate::url::CanonicalUrl;
use crate::ConfigError;
use regex::Regex;

/// Path patterns that mark a product page by default
pub const DEFAULT_PRODUCT_PATTERNS: &[&str] = &[
    "/product[s]?/",
    "/p/",
    "/item[s]?/",
    "/pd/",
    "/shop/product[s]?",
    "/good[s]?/",
];

/// Path patterns for pages that never lead to products
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[
    "/login",
    "/register",
    "/cart",
    "/checkout",
    "/wishlist",
    "/account",
    "/blog",
    "/article",
    "/search",
    "/contact",
    "/about",
    "/faq",
    "/help",
    "/support",
    "/privacy",
    "/terms",
    "/policy",
    "/sitemap",
    r"\.xml$",
    r"\.pdf$",
    r"\.jpg$",
    r"\.png$",
    r"\.gif$",
];

/// A regex compiled from configuration, remembering its source text
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    regex: Regex,
}

impl CompiledPattern {
    pub fn compile(source: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(source)
            .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", source, e)))?;
        Ok(Self { regex })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// The pattern as written in the configuration
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

/// Product patterns are ordinary compiled patterns matched against the path
pub type ProductPattern = CompiledPattern;

/// Compiles [`DEFAULT_PRODUCT_PATTERNS`]
pub fn default_product_patterns() -> Vec<ProductPattern> {
    DEFAULT_PRODUCT_PATTERNS
        .iter()
        .filter_map(|p| CompiledPattern::compile(p).ok())
        .collect()
}

/// Returns the first pattern matching the URL path, or `None` for non-products
///
/// # Examples
///
/// ```
/// use product_scout::url::{classify_product, default_product_patterns, Canonicalizer};
///
/// let canonicalizer = Canonicalizer::with_defaults();
/// let patterns = default_product_patterns();
///
/// let product = canonicalizer.canonicalize("https://shop.com/products/123").unwrap();
/// assert!(classify_product(&product, &patterns).is_some());
///
/// let about = canonicalizer.canonicalize("https://shop.com/about").unwrap();
/// assert!(classify_product(&about, &patterns).is_none());
/// ```
pub fn classify_product<'a>(
    url: &CanonicalUrl,
    patterns: &'a [ProductPattern],
) -> Option<&'a ProductPattern> {
    patterns.iter().find(|pattern| pattern.is_match(url.path()))
}

/// Checks if a domain matches a wildcard pattern
///
/// This function supports two types of patterns:
/// 1. Exact match: "shop.com" matches only "shop.com"
/// 2. Wildcard match: "*.shop.com" matches:
///    - "shop.com" (the bare domain)
///    - "eu.shop.com" (single subdomain)
///    - "static.eu.shop.com" (nested subdomains)
///
/// # Examples
///
/// ```
/// use product_scout::url::matches_wildcard;
///
/// assert!(matches_wildcard("shop.com", "shop.com"));
/// assert!(!matches_wildcard("shop.com", "other.com"));
///
/// assert!(matches_wildcard("*.shop.com", "shop.com"));
/// assert!(matches_wildcard("*.shop.com", "eu.shop.com"));
/// assert!(!matches_wildcard("*.shop.com", "shop.org"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    if let Some(base) = pattern.strip_prefix("*.") {
        candidate == base
            || (candidate.len() > base.len()
                && candidate.ends_with(base)
                && candidate.as_bytes()[candidate.len() - base.len() - 1] == b'.')
    } else {
        candidate == pattern
    }
}
