//! Crawl frontier: deduplicated FIFO of pending fetches

use super::normalize_url;
use std::collections::{HashSet, VecDeque};
use url::Url;

/// A unit of crawl work
#[derive(Debug, Clone)]
pub struct CrawlTask {
    pub url: Url,
    pub depth: u32,
}

/// Breadth-first queue that rejects URLs it has already accepted
///
/// Deduplication keys on the normalized URL, so fragment-only and
/// trailing-slash variants collapse into one visit.
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<CrawlTask>,
    seen: HashSet<String>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a URL at the given depth, returns false for duplicates
    pub fn push(&mut self, url: Url, depth: u32) -> bool {
        let key = normalize_url(&url);
        if !self.seen.insert(key) {
            return false;
        }
        self.queue.push_back(CrawlTask { url, depth });
        true
    }

    /// Record a URL as visited without queueing it
    ///
    /// Used for redirect targets, so a page reached twice through
    /// different redirects is only kept once.
    pub fn mark_seen(&mut self, url: &Url) -> bool {
        self.seen.insert(normalize_url(url))
    }

    /// Take up to `n` tasks off the front of the queue
    pub fn pop_batch(&mut self, n: usize) -> Vec<CrawlTask> {
        let count = self.queue.len().min(n);
        self.queue.drain(..count).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of distinct URLs accepted so far
    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_push_preserves_fifo_order() {
        let mut frontier = Frontier::new();
        assert!(frontier.push(url("https://example.com/a"), 0));
        assert!(frontier.push(url("https://example.com/b"), 1));

        let batch = frontier.pop_batch(10);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].url.path(), "/a");
        assert_eq!(batch[0].depth, 0);
        assert_eq!(batch[1].url.path(), "/b");
        assert_eq!(batch[1].depth, 1);
        assert!(frontier.is_empty());
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut frontier = Frontier::new();
        assert!(frontier.push(url("https://example.com/page"), 0));
        assert!(!frontier.push(url("https://example.com/page"), 1));
        assert_eq!(frontier.pop_batch(10).len(), 1);
    }

    #[test]
    fn test_normalized_variants_collapse() {
        let mut frontier = Frontier::new();
        assert!(frontier.push(url("https://example.com/page/"), 0));
        assert!(!frontier.push(url("https://example.com/page"), 0));
        assert!(!frontier.push(url("https://example.com/page#section"), 0));
        assert_eq!(frontier.seen_len(), 1);
    }

    #[test]
    fn test_pop_batch_caps_at_queue_len() {
        let mut frontier = Frontier::new();
        frontier.push(url("https://example.com/a"), 0);
        frontier.push(url("https://example.com/b"), 0);
        frontier.push(url("https://example.com/c"), 0);

        let batch = frontier.pop_batch(2);
        assert_eq!(batch.len(), 2);
        assert_eq!(frontier.pop_batch(2).len(), 1);
    }

    #[test]
    fn test_mark_seen_blocks_later_push() {
        let mut frontier = Frontier::new();
        assert!(frontier.mark_seen(&url("https://example.com/final")));
        assert!(!frontier.push(url("https://example.com/final"), 0));
        assert!(!frontier.mark_seen(&url("https://example.com/final")));
    }
}
