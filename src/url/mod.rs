//! URL handling module for Product Scout
//!
//! This module provides URL canonicalization, registrable-domain resolution,
//! product classification and the link filter applied to discovered links.

mod canonical;
mod domain;
mod matcher;

use crate::config::{CrawlRules, LinkScope};

// Re-export main types and functions
pub use canonical::{CanonicalUrl, Canonicalizer, DEFAULT_TRACKING_PARAMS};
pub use domain::{Domain, DomainResolver};
pub use matcher::{
    classify_product, default_product_patterns, matches_wildcard, CompiledPattern,
    ProductPattern, DEFAULT_EXCLUDE_PATTERNS, DEFAULT_PRODUCT_PATTERNS,
};

/// What to do with a link discovered on a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkDecision {
    /// Link may enter the frontier
    Follow,
    /// Host matches a deny-domains pattern
    Denied,
    /// Path matches an exclusion pattern
    Excluded,
    /// Link falls outside the configured link scope
    OutOfScope,
}

impl LinkDecision {
    /// Returns true if the link should be claimed and queued
    pub fn should_follow(&self) -> bool {
        matches!(self, Self::Follow)
    }
}

/// Decides whether a discovered link is followed
///
/// Checks run in the following priority order:
/// 1. Deny-domains (against both the host and the registrable domain)
/// 2. Exclusion patterns (against the path)
/// 3. Link scope: same registrable domain as the page, or the allow-list
///
/// # Arguments
///
/// * `link` - The canonicalized link
/// * `link_domain` - Registrable domain of `link`
/// * `page_domain` - Registrable domain of the page the link was found on
/// * `rules` - Compiled crawl rules
pub fn classify_link(
    link: &CanonicalUrl,
    link_domain: &Domain,
    page_domain: &Domain,
    rules: &CrawlRules,
) -> LinkDecision {
    let host = link.host();

    // Priority 1: deny-domains
    for pattern in &rules.deny_domains {
        if matches_wildcard(pattern, host) || matches_wildcard(pattern, link_domain.as_str()) {
            return LinkDecision::Denied;
        }
    }

    // Priority 2: exclusion patterns
    if rules.is_excluded(link) {
        return LinkDecision::Excluded;
    }

    // Priority 3: scope
    let in_scope = match rules.link_scope {
        LinkScope::SameDomain => link_domain == page_domain,
        LinkScope::AllowList => rules
            .allow_list
            .iter()
            .any(|pattern| matches_wildcard(pattern, host)),
    };

    if in_scope {
        LinkDecision::Follow
    } else {
        LinkDecision::OutOfScope
    }
}
