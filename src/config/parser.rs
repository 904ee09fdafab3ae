use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use product_scout::config::load_config;
///
/// let config = load_config(Path::new("scout.toml")).unwrap();
/// println!("Crawl delay: {}ms", config.crawler.crawl_delay_ms);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// This is used to detect if the configuration has changed between crawl runs.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkScope;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const FULL_CONFIG: &str = r#"
[crawler]
max-concurrent-per-domain = 3
global-worker-budget = 24
crawl-delay-ms = 750
max-retries = 4
backoff-base-ms = 250
backoff-cap-ms = 8000
frontier-capacity = 5000
max-products-per-domain = 200
obey-robots = false

[user-agent]
crawler-name = "TestScout"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[urls]
tracking-params = ["^utm_", "^ref$"]
product-patterns = ["/products?/"]
link-scope = "allow-list"
allow-list = ["*.shop.com"]

[output]
database-path = "./test.db"
products-path = "./products.jsonl"
summary-path = "./summary.md"

[[domain]]
domain = "shop.com"
seeds = ["https://shop.com/"]
product-patterns = ["/catalog/\\d+"]
crawl-delay-ms = 2000
"#;

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(FULL_CONFIG);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.max_concurrent_per_domain, 3);
        assert_eq!(config.crawler.global_worker_budget, 24);
        assert_eq!(config.crawler.crawl_delay_ms, 750);
        assert_eq!(config.crawler.max_products_per_domain, Some(200));
        assert!(!config.crawler.obey_robots);
        assert_eq!(config.user_agent.crawler_name, "TestScout");
        assert_eq!(config.urls.link_scope, LinkScope::AllowList);
        assert_eq!(config.urls.tracking_params, vec!["^utm_", "^ref$"]);
        assert_eq!(config.domains.len(), 1);
        assert_eq!(config.domains[0].crawl_delay_ms, Some(2000));
    }

    #[test]
    fn test_seed_urls_fall_back_to_home_page() {
        let mut config = parse_config(FULL_CONFIG).unwrap();
        config.domains.push(crate::config::DomainEntry {
            domain: "other.co.uk".to_string(),
            seeds: vec![],
            product_patterns: vec![],
            crawl_delay_ms: None,
        });

        assert_eq!(
            config.seed_urls(),
            vec!["https://shop.com/".to_string(), "https://other.co.uk/".to_string()]
        );
    }

    #[test]
    fn test_omitted_fields_take_defaults() {
        let content = r#"
[crawler]

[user-agent]
crawler-name = "TestScout"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[output]
database-path = "./test.db"
products-path = "./products.jsonl"
summary-path = "./summary.md"
"#;

        let config = parse_config(content).unwrap();
        assert_eq!(config.crawler.max_depth, 5);
        assert_eq!(config.crawler.max_retries, 3);
        assert!(config.crawler.obey_robots);
        assert_eq!(config.urls.link_scope, LinkScope::SameDomain);
        assert!(config.urls.deny_domains.contains(&"facebook.com".to_string()));
        assert!(!config.urls.product_patterns.is_empty());
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/scout.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let content = FULL_CONFIG.replace("global-worker-budget = 24", "global-worker-budget = 0");
        let file = create_temp_config(&content);
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
