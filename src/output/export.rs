//! JSON export of discovered products
//!
//! Writes one `<domain>_<timestamp>.json` file per domain holding its product
//! URLs, plus `all_domains_<timestamp>.json` mapping each domain to its list.

use crate::output::traits::{OutputResult, ProductMatch};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Files written by an export
#[derive(Debug, Clone, Default)]
pub struct ExportReport {
    pub domain_files: Vec<PathBuf>,
    pub combined_file: Option<PathBuf>,
    pub products: usize,
}

/// Groups product URLs by domain, keeping first-seen order and dropping repeats
pub fn group_by_domain(products: &[ProductMatch]) -> BTreeMap<String, Vec<String>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for product in products {
        let urls = grouped.entry(product.domain.to_string()).or_default();
        let url = product.url.to_string();
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    grouped
}

/// Writes per-domain and combined JSON files into `dir`
pub fn export_products(products: &[ProductMatch], dir: &Path, at: DateTime<Utc>) -> OutputResult<ExportReport> {
    fs::create_dir_all(dir)?;

    let timestamp = at.format("%Y%m%d_%H%M%S").to_string();
    let grouped = group_by_domain(products);
    let mut report = ExportReport::default();

    for (domain, urls) in &grouped {
        let path = dir.join(format!("{}_{}.json", domain.replace('.', "_"), timestamp));
        fs::write(&path, serde_json::to_string_pretty(urls)?)?;
        report.products += urls.len();
        report.domain_files.push(path);
    }

    let combined = dir.join(format!("all_domains_{}.json", timestamp));
    fs::write(&combined, serde_json::to_string_pretty(&grouped)?)?;
    report.combined_file = Some(combined);

    tracing::info!(
        "Exported {} product URLs across {} domains to {}",
        report.products,
        grouped.len(),
        dir.display()
    );
    for (domain, urls) in &grouped {
        tracing::info!("  - {}: {} products", domain, urls.len());
    }

    Ok(report)
}
