use crate::config::types::{Config, LinkScope};
use crate::url::{classify_product, CanonicalUrl, CompiledPattern, Domain, DomainResolver};
use crate::ConfigError;
use std::collections::HashMap;
use std::time::Duration;

/// Configuration compiled into the form the crawler consults per URL
///
/// Built once at startup; every regex in the configuration is compiled here,
/// and per-domain entries are keyed by registrable domain.
#[derive(Debug, Clone)]
pub struct CrawlRules {
    pub tracking_params: Vec<CompiledPattern>,
    pub product_patterns: Vec<CompiledPattern>,
    pub exclude_patterns: Vec<CompiledPattern>,
    pub deny_domains: Vec<String>,
    pub link_scope: LinkScope,
    pub allow_list: Vec<String>,
    site_patterns: HashMap<Domain, Vec<CompiledPattern>>,
    delay_overrides: HashMap<Domain, Duration>,
}

impl CrawlRules {
    /// Compiles the pattern lists and per-domain entries of `config`
    ///
    /// # Returns
    ///
    /// * `Err(ConfigError::InvalidPattern)` - A regex failed to compile
    pub fn compile(config: &Config, resolver: &DomainResolver) -> Result<Self, ConfigError> {
        let mut site_patterns = HashMap::new();
        let mut delay_overrides = HashMap::new();

        for entry in &config.domains {
            let domain = resolver.domain_for_host(&entry.domain);

            if !entry.product_patterns.is_empty() {
                let patterns = compile_all(&entry.product_patterns)?;
                site_patterns
                    .entry(domain.clone())
                    .or_insert_with(Vec::new)
                    .extend(patterns);
            }

            if let Some(delay) = entry.crawl_delay_ms {
                delay_overrides.insert(domain, Duration::from_millis(delay));
            }
        }

        Ok(Self {
            tracking_params: compile_all(&config.urls.tracking_params)?,
            product_patterns: compile_all(&config.urls.product_patterns)?,
            exclude_patterns: compile_all(&config.urls.exclude_patterns)?,
            deny_domains: lowercase_all(&config.urls.deny_domains),
            link_scope: config.urls.link_scope,
            allow_list: lowercase_all(&config.urls.allow_list),
            site_patterns,
            delay_overrides,
        })
    }

    /// Returns the pattern that marks `url` as a product page, if any
    ///
    /// Site-specific patterns for `domain` are checked before the common list.
    pub fn match_product(&self, url: &CanonicalUrl, domain: &Domain) -> Option<&CompiledPattern> {
        self.site_patterns
            .get(domain)
            .and_then(|patterns| classify_product(url, patterns))
            .or_else(|| classify_product(url, &self.product_patterns))
    }

    /// Returns true if the URL path matches an exclusion pattern
    pub fn is_excluded(&self, url: &CanonicalUrl) -> bool {
        self.exclude_patterns
            .iter()
            .any(|pattern| pattern.is_match(url.path()))
    }

    /// Returns all per-domain crawl-delay overrides
    pub fn delay_overrides(&self) -> &HashMap<Domain, Duration> {
        &self.delay_overrides
    }
}

fn compile_all(patterns: &[String]) -> Result<Vec<CompiledPattern>, ConfigError> {
    patterns.iter().map(|p| CompiledPattern::compile(p)).collect()
}

fn lowercase_all(patterns: &[String]) -> Vec<String> {
    patterns.iter().map(|p| p.to_lowercase()).collect()
}
