use crate::url::matcher::CompiledPattern;
use crate::UrlError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use url::{form_urlencoded, Url};

/// Query parameter keys stripped by default (regexes over the key)
pub const DEFAULT_TRACKING_PARAMS: &[&str] = &[
    "^utm_",
    "^fbclid$",
    "^gclid$",
    "^mc_eid$",
    "^yclid$",
    "^_ga$",
];

/// A URL in canonical form
///
/// Only [`Canonicalizer`] produces these, so two `CanonicalUrl`s compare equal
/// exactly when the raw URLs they came from name the same resource under the
/// normalization rules. Equality, hashing and ordering use the serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalUrl(Url);

impl CanonicalUrl {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    /// Lowercase host; canonical URLs always carry one
    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or_default()
    }

    pub fn path(&self) -> &str {
        self.0.path()
    }

    /// Rebuilds a canonical URL from its serialized form
    ///
    /// Used when loading snapshots. A string produced by [`CanonicalUrl::as_str`]
    /// is a fixed point of canonicalization, so only the structural checks are
    /// repeated here.
    pub fn restore(serialized: &str) -> Result<Self, UrlError> {
        let url = Url::parse(serialized).map_err(|e| UrlError::Parse(e.to_string()))?;
        check_scheme(&url)?;
        if url.host_str().map_or(true, str::is_empty) {
            return Err(UrlError::MissingDomain);
        }
        Ok(Self(url))
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CanonicalUrl {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CanonicalUrl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        CanonicalUrl::restore(&raw).map_err(serde::de::Error::custom)
    }
}

/// Turns raw URL strings into [`CanonicalUrl`]s
///
/// # Normalization Steps
///
/// 1. Parse the URL (resolving against a base when one is given); reject
///    anything that is not http/https or has no host
/// 2. Lowercase the scheme and host
/// 3. Drop the port when it is the scheme's default
/// 4. Drop the fragment and any userinfo
/// 5. Remove query parameters whose key matches a tracking pattern
/// 6. Stable-sort the remaining parameters by key; drop an empty query
/// 7. Collapse duplicate slashes and resolve `.`/`..` segments, keeping a
///    trailing slash if the path had one
///
/// Canonicalization is idempotent: feeding the output back in yields the same URL.
#[derive(Debug, Clone)]
pub struct Canonicalizer {
    tracking: Vec<CompiledPattern>,
}

impl Canonicalizer {
    pub fn new(tracking: Vec<CompiledPattern>) -> Self {
        Self { tracking }
    }

    /// Canonicalizer using [`DEFAULT_TRACKING_PARAMS`]
    pub fn with_defaults() -> Self {
        let tracking = DEFAULT_TRACKING_PARAMS
            .iter()
            .filter_map(|p| CompiledPattern::compile(p).ok())
            .collect();
        Self { tracking }
    }

    /// Canonicalizes an absolute URL
    ///
    /// # Examples
    ///
    /// ```
    /// use product_scout::url::Canonicalizer;
    ///
    /// let canonicalizer = Canonicalizer::with_defaults();
    /// let url = canonicalizer
    ///     .canonicalize("HTTP://Shop.COM:80/p?utm_source=x&id=5#top")
    ///     .unwrap();
    /// assert_eq!(url.as_str(), "http://shop.com/p?id=5");
    /// ```
    pub fn canonicalize(&self, raw: &str) -> Result<CanonicalUrl, UrlError> {
        let url = Url::parse(raw.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
        self.normalize(url)
    }

    /// Canonicalizes a possibly-relative href found on the page at `base`
    pub fn canonicalize_with_base(
        &self,
        raw: &str,
        base: &CanonicalUrl,
    ) -> Result<CanonicalUrl, UrlError> {
        let url = base
            .as_url()
            .join(raw.trim())
            .map_err(|e| UrlError::Parse(e.to_string()))?;
        self.normalize(url)
    }

    fn normalize(&self, mut url: Url) -> Result<CanonicalUrl, UrlError> {
        check_scheme(&url)?;

        // The url crate already lowercases special-scheme hosts; this covers
        // anything it leaves alone.
        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_lowercase(),
            _ => return Err(UrlError::MissingDomain),
        };
        if url.host_str() != Some(host.as_str()) {
            url.set_host(Some(&host))
                .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;
        }

        if url.port().is_some() && url.port() == default_port(url.scheme()) {
            let _ = url.set_port(None);
        }

        url.set_fragment(None);
        let _ = url.set_username("");
        let _ = url.set_password(None);

        if let Some(query) = url.query() {
            let query = self.filter_and_sort_query(query);
            url.set_query(query.as_deref());
        }

        let path = normalize_path(url.path());
        url.set_path(&path);

        Ok(CanonicalUrl(url))
    }

    /// Drops tracking parameters and sorts the rest by decoded key
    ///
    /// Segments are kept byte for byte; only the key is decoded, for matching
    /// and ordering. Returns None when nothing is left.
    fn filter_and_sort_query(&self, query: &str) -> Option<String> {
        let mut params: Vec<(String, &str)> = query
            .split('&')
            .filter(|segment| !segment.is_empty())
            .map(|segment| (decode_key(segment), segment))
            .filter(|(key, _)| !self.is_tracking_param(key))
            .collect();

        // Stable: repeated keys keep their relative order
        params.sort_by(|a, b| a.0.cmp(&b.0));

        if params.is_empty() {
            return None;
        }
        let segments: Vec<&str> = params.into_iter().map(|(_, segment)| segment).collect();
        Some(segments.join("&"))
    }

    fn is_tracking_param(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.tracking.iter().any(|pattern| pattern.is_match(&key))
    }
}

impl Default for Canonicalizer {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn check_scheme(url: &Url) -> Result<(), UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }
    Ok(())
}

/// Form-decodes the key part of a `key=value` query segment
fn decode_key(segment: &str) -> String {
    let raw_key = segment.split_once('=').map_or(segment, |(key, _)| key);
    form_urlencoded::parse(raw_key.as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
        .unwrap_or_default()
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

/// Collapses empty and `.` segments and resolves `..`, keeping a trailing slash
fn normalize_path(path: &str) -> String {
    let trailing_slash = path.len() > 1 && path.ends_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    let mut result = format!("/{}", segments.join("/"));
    if trailing_slash {
        result.push('/');
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canon(raw: &str) -> String {
        Canonicalizer::with_defaults()
            .canonicalize(raw)
            .unwrap()
            .as_str()
            .to_string()
    }

    #[test]
    fn test_equivalent_forms_collapse() {
        let expected = "http://shop.com/p?id=5";
        assert_eq!(canon("http://Shop.com:80/p?utm_source=x&id=5#top"), expected);
        assert_eq!(canon("HTTP://SHOP.COM/p?id=5"), expected);
        assert_eq!(canon("http://shop.com//p?id=5&fbclid=abc"), expected);
        assert_eq!(canon("http://shop.com/a/../p?id=5"), expected);
    }

    #[test]
    fn test_idempotent() {
        let canonicalizer = Canonicalizer::with_defaults();
        let inputs = [
            "https://Shop.com:443/Products/./Shoe/?b=2&a=1&utm_medium=mail#reviews",
            "http://shop.com:8080//x//y/../z?q=a%20b&q=c",
            "https://shop.com",
            "https://shop.com/search?q=red+shoes&gclid=1",
            "http://shop.com/p?flag&q=%E4&a=1;b=2",
        ];

        for raw in inputs {
            let once = canonicalizer.canonicalize(raw).unwrap();
            let twice = canonicalizer.canonicalize(once.as_str()).unwrap();
            assert_eq!(once, twice, "not idempotent for {}", raw);
        }
    }

    #[test]
    fn test_query_sorted_stably_by_key() {
        assert_eq!(
            canon("https://shop.com/list?z=1&a=2&m=3&a=1"),
            "https://shop.com/list?a=2&a=1&m=3&z=1"
        );
    }

    #[test]
    fn test_query_segments_kept_verbatim() {
        assert_eq!(canon("http://shop.com/p?flag"), "http://shop.com/p?flag");
        assert_eq!(canon("http://shop.com/p?a=1;b=2"), "http://shop.com/p?a=1;b=2");
        assert_eq!(canon("http://shop.com/p?q=red+shoes&b=x%3Dy"), "http://shop.com/p?b=x%3Dy&q=red+shoes");
        assert_eq!(canon("http://shop.com/p?b=1&&a=2&"), "http://shop.com/p?a=2&b=1");
    }

    #[test]
    fn test_non_utf8_escapes_stay_distinct() {
        let e4 = canon("http://shop.com/search?q=%E4");
        let e5 = canon("http://shop.com/search?q=%E5");
        assert_eq!(e4, "http://shop.com/search?q=%E4");
        assert_ne!(e4, e5);
        assert_eq!(canon("http://shop.com/p?%E4=1"), "http://shop.com/p?%E4=1");
    }

    #[test]
    fn test_all_tracking_params_removed_drops_query() {
        assert_eq!(
            canon("https://shop.com/page?utm_source=x&gclid=y&_ga=z&yclid=1&mc_eid=2"),
            "https://shop.com/page"
        );
        assert_eq!(canon("https://shop.com/page?"), "https://shop.com/page");
    }

    #[test]
    fn test_tracking_key_match_is_case_insensitive() {
        assert_eq!(canon("https://shop.com/p?UTM_Source=x&id=1"), "https://shop.com/p?id=1");
    }

    #[test]
    fn test_non_default_port_kept() {
        assert_eq!(canon("http://shop.com:8080/p"), "http://shop.com:8080/p");
        assert_eq!(canon("https://shop.com:80/p"), "https://shop.com:80/p");
    }

    #[test]
    fn test_trailing_slash_preserved() {
        assert_eq!(canon("https://shop.com/category/"), "https://shop.com/category/");
        assert_eq!(canon("https://shop.com/category"), "https://shop.com/category");
    }

    #[test]
    fn test_scheme_and_www_not_rewritten() {
        assert_eq!(canon("http://www.shop.com/"), "http://www.shop.com/");
    }

    #[test]
    fn test_userinfo_stripped() {
        assert_eq!(canon("https://user:pw@shop.com/p"), "https://shop.com/p");
    }

    #[test]
    fn test_parent_directory_at_root() {
        assert_eq!(canon("https://shop.com/../../p"), "https://shop.com/p");
    }

    #[test]
    fn test_relative_resolution() {
        let canonicalizer = Canonicalizer::with_defaults();
        let base = canonicalizer
            .canonicalize("https://shop.com/category/shoes/")
            .unwrap();

        let resolved = canonicalizer
            .canonicalize_with_base("../products/1?utm_campaign=x", &base)
            .unwrap();
        assert_eq!(resolved.as_str(), "https://shop.com/category/products/1");

        let absolute = canonicalizer
            .canonicalize_with_base("https://other.com/p/2", &base)
            .unwrap();
        assert_eq!(absolute.as_str(), "https://other.com/p/2");
    }

    #[test]
    fn test_invalid_scheme() {
        let canonicalizer = Canonicalizer::with_defaults();
        assert!(matches!(
            canonicalizer.canonicalize("ftp://shop.com/file"),
            Err(UrlError::InvalidScheme(_))
        ));
        assert!(canonicalizer.canonicalize("mailto:sales@shop.com").is_err());
    }

    #[test]
    fn test_malformed_url() {
        let canonicalizer = Canonicalizer::with_defaults();
        assert!(matches!(
            canonicalizer.canonicalize("not a url"),
            Err(UrlError::Parse(_))
        ));
        assert!(canonicalizer.canonicalize("").is_err());
    }

    #[test]
    fn test_restore_is_fixed_point() {
        let canonical = Canonicalizer::with_defaults()
            .canonicalize("https://shop.com/p/1?b=1&a=2")
            .unwrap();
        let restored = CanonicalUrl::restore(canonical.as_str()).unwrap();
        assert_eq!(canonical, restored);
    }

    #[test]
    fn test_serde_as_string() {
        let canonical = Canonicalizer::with_defaults()
            .canonicalize("https://shop.com/p/1")
            .unwrap();
        let json = serde_json::to_string(&canonical).unwrap();
        assert_eq!(json, "\"https://shop.com/p/1\"");

        let back: CanonicalUrl = serde_json::from_str(&json).unwrap();
        assert_eq!(back, canonical);
    }
}
