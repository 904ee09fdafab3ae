//! Dedup index: one claim per canonical URL
//!
//! Backed by a sharded `DashMap`; `try_claim` is a single entry-API
//! test-and-set, so exactly one of any number of concurrent callers wins.

use crate::state::UrlOutcome;
use crate::url::CanonicalUrl;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct DedupIndex {
    records: DashMap<CanonicalUrl, UrlOutcome>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims a URL for crawling
    ///
    /// # Returns
    ///
    /// * `true` - The URL was unseen and is now recorded as `Pending`
    /// * `false` - Some caller already claimed it
    pub fn try_claim(&self, url: &CanonicalUrl) -> bool {
        match self.records.entry(url.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(UrlOutcome::Pending);
                true
            }
        }
    }

    /// Records the outcome for a URL, claiming it if necessary
    pub fn mark_outcome(&self, url: &CanonicalUrl, outcome: UrlOutcome) {
        self.records.insert(url.clone(), outcome);
    }

    pub fn seen(&self, url: &CanonicalUrl) -> bool {
        self.records.contains_key(url)
    }

    pub fn outcome(&self, url: &CanonicalUrl) -> Option<UrlOutcome> {
        self.records.get(url).map(|record| *record.value())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Counts records per outcome
    pub fn count_by_outcome(&self) -> HashMap<UrlOutcome, u64> {
        let mut counts = HashMap::new();
        for record in self.records.iter() {
            *counts.entry(*record.value()).or_insert(0) += 1;
        }
        counts
    }

    /// URLs still `Pending`
    pub fn pending(&self) -> Vec<CanonicalUrl> {
        self.records
            .iter()
            .filter(|record| *record.value() == UrlOutcome::Pending)
            .map(|record| record.key().clone())
            .collect()
    }

    /// Copies every record for persistence
    pub fn snapshot(&self) -> Vec<(CanonicalUrl, UrlOutcome)> {
        self.records
            .iter()
            .map(|record| (record.key().clone(), *record.value()))
            .collect()
    }

    /// Loads records from a snapshot, overwriting any existing entries
    pub fn restore<I>(&self, records: I)
    where
        I: IntoIterator<Item = (CanonicalUrl, UrlOutcome)>,
    {
        for (url, outcome) in records {
            self.records.insert(url, outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::Canonicalizer;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    fn url(raw: &str) -> CanonicalUrl {
        Canonicalizer::with_defaults().canonicalize(raw).unwrap()
    }

    #[test]
    fn test_first_claim_wins() {
        let index = DedupIndex::new();
        let target = url("https://shop.com/p/1");

        assert!(index.try_claim(&target));
        assert!(!index.try_claim(&target));
        assert_eq!(index.outcome(&target), Some(UrlOutcome::Pending));
    }

    #[test]
    fn test_equivalent_urls_share_a_claim() {
        let index = DedupIndex::new();
        assert!(index.try_claim(&url("https://shop.com/p/1?utm_source=mail")));
        assert!(!index.try_claim(&url("https://SHOP.com:443/p/1#reviews")));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_exactly_one_concurrent_claim() {
        const THREADS: usize = 32;

        let index = Arc::new(DedupIndex::new());
        let target = url("https://shop.com/products/contested");
        let barrier = Arc::new(Barrier::new(THREADS));
        let winners = Arc::new(AtomicUsize::new(0));

        std::thread::scope(|scope| {
            for _ in 0..THREADS {
                let index = Arc::clone(&index);
                let barrier = Arc::clone(&barrier);
                let winners = Arc::clone(&winners);
                let target = target.clone();
                scope.spawn(move || {
                    barrier.wait();
                    if index.try_claim(&target) {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mark_outcome_and_counts() {
        let index = DedupIndex::new();
        let a = url("https://shop.com/p/1");
        let b = url("https://shop.com/about");
        let c = url("https://shop.com/p/2");

        index.try_claim(&a);
        index.try_claim(&b);
        index.try_claim(&c);
        index.mark_outcome(&a, UrlOutcome::Product);
        index.mark_outcome(&b, UrlOutcome::Succeeded);

        let counts = index.count_by_outcome();
        assert_eq!(counts.get(&UrlOutcome::Product), Some(&1));
        assert_eq!(counts.get(&UrlOutcome::Succeeded), Some(&1));
        assert_eq!(counts.get(&UrlOutcome::Pending), Some(&1));
        assert_eq!(index.pending(), vec![c]);
    }

    #[test]
    fn test_snapshot_restore() {
        let index = DedupIndex::new();
        let a = url("https://shop.com/p/1");
        index.try_claim(&a);
        index.mark_outcome(&a, UrlOutcome::Failed);

        let restored = DedupIndex::new();
        restored.restore(index.snapshot());
        assert!(restored.seen(&a));
        assert_eq!(restored.outcome(&a), Some(UrlOutcome::Failed));
        assert!(!restored.try_claim(&a));
    }
}
