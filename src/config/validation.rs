use crate::config::types::{Config, CrawlerConfig, DomainEntry, LinkScope, UrlConfig, UserAgentConfig};
use crate::ConfigError;
use regex::Regex;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_url_config(&config.urls)?;
    validate_output_config(&config.output)?;
    validate_domain_entries(&config.domains)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_per_domain < 1 || config.max_concurrent_per_domain > 64 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_per_domain must be between 1 and 64, got {}",
            config.max_concurrent_per_domain
        )));
    }

    if config.global_worker_budget < 1 || config.global_worker_budget > 1024 {
        return Err(ConfigError::Validation(format!(
            "global_worker_budget must be between 1 and 1024, got {}",
            config.global_worker_budget
        )));
    }

    if config.request_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "request_timeout_ms must be >= 100ms, got {}ms",
            config.request_timeout_ms
        )));
    }

    if config.backoff_base_ms < 1 {
        return Err(ConfigError::Validation(
            "backoff_base_ms must be >= 1ms".to_string(),
        ));
    }

    if config.backoff_base_ms > config.backoff_cap_ms {
        return Err(ConfigError::Validation(format!(
            "backoff_base_ms ({}) cannot exceed backoff_cap_ms ({})",
            config.backoff_base_ms, config.backoff_cap_ms
        )));
    }

    if config.frontier_capacity < 1 {
        return Err(ConfigError::Validation(
            "frontier_capacity must be >= 1".to_string(),
        ));
    }

    if config.snapshot_interval < 1 {
        return Err(ConfigError::Validation(
            "snapshot_interval must be >= 1".to_string(),
        ));
    }

    if config.max_products_per_domain == Some(0) {
        return Err(ConfigError::Validation(
            "max_products_per_domain must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates URL handling configuration
///
/// Every regex is compiled once here so a bad pattern stops the crawl before
/// it starts rather than silently never matching.
fn validate_url_config(config: &UrlConfig) -> Result<(), ConfigError> {
    validate_regexes("tracking-params", &config.tracking_params)?;
    validate_regexes("product-patterns", &config.product_patterns)?;
    validate_regexes("exclude-patterns", &config.exclude_patterns)?;

    for pattern in &config.deny_domains {
        validate_domain_pattern(pattern)?;
    }

    for pattern in &config.allow_list {
        validate_domain_pattern(pattern)?;
    }

    if config.link_scope == LinkScope::AllowList && config.allow_list.is_empty() {
        return Err(ConfigError::Validation(
            "link-scope = \"allow-list\" requires a non-empty allow-list".to_string(),
        ));
    }

    if let Some(path) = &config.suffix_list_path {
        if path.is_empty() {
            return Err(ConfigError::Validation(
                "suffix_list_path cannot be empty when set".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &crate::config::types::OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.products_path.is_empty() {
        return Err(ConfigError::Validation(
            "products_path cannot be empty".to_string(),
        ));
    }

    if config.summary_path.is_empty() {
        return Err(ConfigError::Validation(
            "summary_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates per-domain entries
fn validate_domain_entries(domains: &[DomainEntry]) -> Result<(), ConfigError> {
    for entry in domains {
        validate_domain_string(&entry.domain)?;

        for seed in &entry.seeds {
            let url = Url::parse(seed).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e))
            })?;

            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(ConfigError::Validation(format!(
                    "Seed URL '{}' must use http or https",
                    seed
                )));
            }
        }

        validate_regexes(
            &format!("product-patterns of '{}'", entry.domain),
            &entry.product_patterns,
        )?;

        if let Some(delay) = entry.crawl_delay_ms {
            if delay > 3_600_000 {
                return Err(ConfigError::Validation(format!(
                    "crawl_delay_ms for '{}' must be at most one hour, got {}ms",
                    entry.domain, delay
                )));
            }
        }
    }

    Ok(())
}

fn validate_regexes(field: &str, patterns: &[String]) -> Result<(), ConfigError> {
    for pattern in patterns {
        Regex::new(pattern).map_err(|e| {
            ConfigError::InvalidPattern(format!("{} entry '{}': {}", field, pattern, e))
        })?;
    }
    Ok(())
}

/// Validates a domain pattern (supports wildcards)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    if let Some(domain) = pattern.strip_prefix("*.") {
        validate_domain_string(domain)?;
    } else {
        validate_domain_string(pattern)?;
    }

    Ok(())
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'shop.com')",
            domain
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
