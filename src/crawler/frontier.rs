//! Frontier store: pending URLs partitioned by domain
//!
//! Each domain keeps its own ordered queue (highest priority first, FIFO among
//! equals). A second index orders every entry by (priority, age) so the
//! capacity policy can find its eviction victim without scanning domains.

use crate::url::{CanonicalUrl, Domain};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Priority given to seed URLs
pub const SEED_PRIORITY: u32 = 100;

/// A URL waiting to be fetched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontierEntry {
    pub url: CanonicalUrl,
    pub domain: Domain,

    /// Higher values are fetched first
    pub priority: u32,

    pub discovered_at: DateTime<Utc>,

    /// Retries already granted to this URL
    pub attempt_count: u32,

    /// Link distance from a seed (seeds are depth 0)
    pub depth: u32,

    /// Page the URL was discovered on; `None` for seeds
    pub found_on: Option<CanonicalUrl>,
}

impl FrontierEntry {
    pub fn seed(url: CanonicalUrl, domain: Domain) -> Self {
        Self {
            url,
            domain,
            priority: SEED_PRIORITY,
            discovered_at: Utc::now(),
            attempt_count: 0,
            depth: 0,
            found_on: None,
        }
    }

    pub fn discovered(
        url: CanonicalUrl,
        domain: Domain,
        priority: u32,
        depth: u32,
        found_on: CanonicalUrl,
    ) -> Self {
        Self {
            url,
            domain,
            priority,
            discovered_at: Utc::now(),
            attempt_count: 0,
            depth,
            found_on: Some(found_on),
        }
    }
}

/// Result of [`Frontier::push`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// The URL is already pending
    Duplicate,
    /// Queued after evicting the returned entry to stay within capacity
    Evicted(FrontierEntry),
    /// The frontier is full and the new entry ranks lowest, so it was dropped
    Rejected,
}

type QueueKey = (Reverse<u32>, u64);

/// Pending URLs, partitioned by registrable domain
#[derive(Debug)]
pub struct Frontier {
    queues: BTreeMap<Domain, BTreeMap<QueueKey, FrontierEntry>>,

    /// (priority, insertion seq, domain): first element is the eviction victim
    by_rank: BTreeSet<(u32, u64, Domain)>,

    members: HashSet<CanonicalUrl>,
    capacity: usize,
    next_seq: u64,
}

impl Frontier {
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: BTreeMap::new(),
            by_rank: BTreeSet::new(),
            members: HashSet::new(),
            capacity: capacity.max(1),
            next_seq: 0,
        }
    }

    /// Adds an entry; idempotent by URL
    ///
    /// When the frontier is full the lowest-priority entry is evicted, oldest
    /// first among equals. The incoming entry counts as the newest candidate,
    /// so it is rejected only when its priority is strictly lower than every
    /// pending entry.
    pub fn push(&mut self, entry: FrontierEntry) -> PushOutcome {
        if self.members.contains(&entry.url) {
            return PushOutcome::Duplicate;
        }

        let mut victim = None;
        if self.members.len() >= self.capacity {
            let lowest = match self.by_rank.first() {
                Some(lowest) => lowest.clone(),
                None => return PushOutcome::Rejected,
            };
            if entry.priority < lowest.0 {
                return PushOutcome::Rejected;
            }
            victim = self.remove_ranked(&lowest);
        }

        self.insert(entry);

        match victim {
            Some(victim) => PushOutcome::Evicted(victim),
            None => PushOutcome::Queued,
        }
    }

    /// Removes and returns the next entry for a domain
    ///
    /// Highest priority first; among equal priorities, first in first out.
    pub fn pop(&mut self, domain: &Domain) -> Option<FrontierEntry> {
        let queue = self.queues.get_mut(domain)?;
        let ((Reverse(priority), seq), entry) = queue.pop_first()?;
        if queue.is_empty() {
            self.queues.remove(domain);
        }

        self.by_rank.remove(&(priority, seq, domain.clone()));
        self.members.remove(&entry.url);
        Some(entry)
    }

    /// Returns domains with pending entries that `is_limited` does not hold back
    ///
    /// Domains are returned in sorted order, which round-robin selection relies on.
    pub fn list_ready_domains<F>(&self, mut is_limited: F) -> Vec<Domain>
    where
        F: FnMut(&Domain) -> bool,
    {
        self.queues
            .keys()
            .filter(|domain| !is_limited(domain))
            .cloned()
            .collect()
    }

    /// All domains with pending entries, sorted
    pub fn domains(&self) -> impl Iterator<Item = &Domain> {
        self.queues.keys()
    }

    /// Removes every pending entry of a domain
    pub fn drop_domain(&mut self, domain: &Domain) -> Vec<FrontierEntry> {
        let Some(queue) = self.queues.remove(domain) else {
            return Vec::new();
        };

        queue
            .into_iter()
            .map(|((Reverse(priority), seq), entry)| {
                self.by_rank.remove(&(priority, seq, domain.clone()));
                self.members.remove(&entry.url);
                entry
            })
            .collect()
    }

    /// Copies of all pending entries, domain by domain in pop order
    pub fn entries(&self) -> Vec<FrontierEntry> {
        self.queues
            .values()
            .flat_map(|queue| queue.values().cloned())
            .collect()
    }

    pub fn contains(&self, url: &CanonicalUrl) -> bool {
        self.members.contains(url)
    }

    pub fn pending_for(&self, domain: &Domain) -> usize {
        self.queues.get(domain).map_or(0, |queue| queue.len())
    }

    pub fn domain_count(&self) -> usize {
        self.queues.len()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn insert(&mut self, entry: FrontierEntry) {
        let seq = self.next_seq;
        self.next_seq += 1;

        self.members.insert(entry.url.clone());
        self.by_rank.insert((entry.priority, seq, entry.domain.clone()));
        self.queues
            .entry(entry.domain.clone())
            .or_default()
            .insert((Reverse(entry.priority), seq), entry);
    }

    fn remove_ranked(&mut self, rank: &(u32, u64, Domain)) -> Option<FrontierEntry> {
        let (priority, seq, domain) = rank;
        self.by_rank.remove(rank);

        let queue = self.queues.get_mut(domain)?;
        let entry = queue.remove(&(Reverse(*priority), *seq))?;
        if queue.is_empty() {
            self.queues.remove(domain);
        }
        self.members.remove(&entry.url);
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::Canonicalizer;

    fn entry(raw: &str, domain: &str, priority: u32) -> FrontierEntry {
        let url = Canonicalizer::with_defaults().canonicalize(raw).unwrap();
        let mut entry = FrontierEntry::seed(url, Domain::new(domain));
        entry.priority = priority;
        entry
    }

    #[test]
    fn test_push_is_idempotent() {
        let mut frontier = Frontier::new(10);
        assert_eq!(frontier.push(entry("https://a.com/1", "a.com", 10)), PushOutcome::Queued);
        assert_eq!(frontier.push(entry("https://a.com/1", "a.com", 50)), PushOutcome::Duplicate);
        assert_eq!(frontier.len(), 1);
    }

    #[test]
    fn test_pop_priority_then_fifo() {
        let mut frontier = Frontier::new(10);
        frontier.push(entry("https://a.com/low", "a.com", 10));
        frontier.push(entry("https://a.com/first", "a.com", 50));
        frontier.push(entry("https://a.com/second", "a.com", 50));

        let domain = Domain::new("a.com");
        assert_eq!(frontier.pop(&domain).unwrap().url.path(), "/first");
        assert_eq!(frontier.pop(&domain).unwrap().url.path(), "/second");
        assert_eq!(frontier.pop(&domain).unwrap().url.path(), "/low");
        assert!(frontier.pop(&domain).is_none());
        assert!(frontier.is_empty());
        assert_eq!(frontier.domain_count(), 0);
    }

    #[test]
    fn test_popped_url_can_be_pushed_again() {
        let mut frontier = Frontier::new(10);
        frontier.push(entry("https://a.com/1", "a.com", 10));
        let popped = frontier.pop(&Domain::new("a.com")).unwrap();
        assert_eq!(frontier.push(popped), PushOutcome::Queued);
    }

    #[test]
    fn test_list_ready_domains_sorted_and_filtered() {
        let mut frontier = Frontier::new(10);
        frontier.push(entry("https://c.com/1", "c.com", 10));
        frontier.push(entry("https://a.com/1", "a.com", 10));
        frontier.push(entry("https://b.com/1", "b.com", 10));

        let all = frontier.list_ready_domains(|_| false);
        assert_eq!(all, vec![Domain::new("a.com"), Domain::new("b.com"), Domain::new("c.com")]);

        let ready = frontier.list_ready_domains(|d| d.as_str() == "b.com");
        assert_eq!(ready, vec![Domain::new("a.com"), Domain::new("c.com")]);
    }

    #[test]
    fn test_eviction_drops_lowest_priority_oldest_first() {
        let mut frontier = Frontier::new(3);
        frontier.push(entry("https://a.com/old-low", "a.com", 10));
        frontier.push(entry("https://b.com/new-low", "b.com", 10));
        frontier.push(entry("https://a.com/high", "a.com", 90));

        match frontier.push(entry("https://c.com/mid", "c.com", 50)) {
            PushOutcome::Evicted(victim) => assert_eq!(victim.url.path(), "/old-low"),
            other => panic!("expected eviction, got {:?}", other),
        }
        assert_eq!(frontier.len(), 3);
        assert!(!frontier.contains(&entry("https://a.com/old-low", "a.com", 10).url));

        match frontier.push(entry("https://c.com/mid2", "c.com", 10)) {
            PushOutcome::Evicted(victim) => assert_eq!(victim.url.path(), "/new-low"),
            other => panic!("expected eviction, got {:?}", other),
        }
        assert_eq!(frontier.pending_for(&Domain::new("b.com")), 0);
    }

    #[test]
    fn test_lowest_new_entry_is_rejected() {
        let mut frontier = Frontier::new(2);
        frontier.push(entry("https://a.com/1", "a.com", 50));
        frontier.push(entry("https://a.com/2", "a.com", 50));

        assert_eq!(frontier.push(entry("https://a.com/3", "a.com", 5)), PushOutcome::Rejected);
        assert_eq!(frontier.len(), 2);
    }

    #[test]
    fn test_drop_domain() {
        let mut frontier = Frontier::new(10);
        frontier.push(entry("https://a.com/1", "a.com", 10));
        frontier.push(entry("https://a.com/2", "a.com", 20));
        frontier.push(entry("https://b.com/1", "b.com", 10));

        let dropped = frontier.drop_domain(&Domain::new("a.com"));
        assert_eq!(dropped.len(), 2);
        assert_eq!(frontier.len(), 1);
        assert!(frontier.drop_domain(&Domain::new("a.com")).is_empty());

        // capacity bookkeeping follows the removal
        match frontier.push(entry("https://c.com/1", "c.com", 1)) {
            PushOutcome::Queued => {}
            other => panic!("expected queued, got {:?}", other),
        }
    }

    #[test]
    fn test_entries_snapshot() {
        let mut frontier = Frontier::new(10);
        frontier.push(entry("https://b.com/1", "b.com", 10));
        frontier.push(entry("https://a.com/1", "a.com", 10));
        frontier.push(entry("https://a.com/2", "a.com", 30));

        let paths: Vec<String> = frontier
            .entries()
            .iter()
            .map(|e| format!("{}{}", e.domain, e.url.path()))
            .collect();
        assert_eq!(paths, vec!["a.com/2", "a.com/1", "b.com/1"]);
    }
}
