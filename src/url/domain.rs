use crate::url::CanonicalUrl;
use crate::ConfigError;
use parking_lot::RwLock;
use publicsuffix::{List, Psl};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::path::Path;
use url::Host;

const BUNDLED_SUFFIX_LIST: &str = include_str!("../../data/public_suffix_list.dat");

/// A registrable domain (e.g. "shop.co.uk" for "www.shop.co.uk")
///
/// Politeness, fairness and link scoping all key on this value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Domain(String);

impl Domain {
    pub fn new(domain: impl Into<String>) -> Self {
        Self(domain.into().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Domain {
    fn from(domain: &str) -> Self {
        Self::new(domain)
    }
}

/// Maps hosts to registrable domains using a public suffix list
///
/// The list sits behind a lock so a long-running crawl can swap in a fresh
/// copy with [`DomainResolver::reload`].
pub struct DomainResolver {
    list: RwLock<List>,
}

impl fmt::Debug for DomainResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainResolver").finish_non_exhaustive()
    }
}

impl DomainResolver {
    /// Resolver backed by the suffix list snapshot shipped with the crate
    pub fn bundled() -> Result<Self, ConfigError> {
        Self::from_list_str(BUNDLED_SUFFIX_LIST)
    }

    /// Resolver backed by a suffix list file in the publicsuffix.org format
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_list_str(&content)
    }

    pub fn from_list_str(content: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            list: RwLock::new(parse_list(content)?),
        })
    }

    /// Replaces the suffix list; later lookups use the new rules
    pub fn reload(&self, content: &str) -> Result<(), ConfigError> {
        let list = parse_list(content)?;
        *self.list.write() = list;
        Ok(())
    }

    /// Returns the registrable domain of a canonical URL's host
    ///
    /// IP literals and hosts without a registrable part (e.g. "localhost")
    /// map to the host itself.
    pub fn registrable_domain(&self, url: &CanonicalUrl) -> Domain {
        match url.as_url().host() {
            Some(Host::Domain(host)) => self.lookup(host),
            Some(host) => Domain::new(host.to_string()),
            None => Domain::new(url.host()),
        }
    }

    /// Returns the registrable domain of a bare host name
    pub fn domain_for_host(&self, host: &str) -> Domain {
        let host = host.trim_end_matches('.').to_lowercase();
        if host.parse::<IpAddr>().is_ok() {
            return Domain::new(host);
        }
        self.lookup(&host)
    }

    /// Returns true if both URLs share a registrable domain
    pub fn same_domain(&self, a: &CanonicalUrl, b: &CanonicalUrl) -> bool {
        a.host() == b.host() || self.registrable_domain(a) == self.registrable_domain(b)
    }

    fn lookup(&self, host: &str) -> Domain {
        let list = self.list.read();
        list.domain(host.as_bytes())
            .and_then(|domain| std::str::from_utf8(domain.as_bytes()).ok().map(Domain::new))
            .unwrap_or_else(|| Domain::new(host))
    }
}

fn parse_list(content: &str) -> Result<List, ConfigError> {
    content
        .parse::<List>()
        .map_err(|e| ConfigError::SuffixList(e.to_string()))
}
