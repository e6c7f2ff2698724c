//! Crawl frontier
//!
//! This module handles:
//! - Ordering pending targets by depth, then insertion order
//! - Deduplicating targets by normalized URL across queued and visited state
//! - Enforcing the depth bound and the domain scope on push
//! - Holding rate-limited targets until their retry delay has elapsed
//! - Tracking in-flight work so workers know when the crawl is drained

use crate::url::{has_non_crawlable_extension, normalize_url, DomainScope};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::Instant;
use thiserror::Error;

/// A URL scheduled for fetching
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget {
    /// Absolute, normalized URL
    pub url: String,
    /// Hops from a seed (seeds are depth 0)
    pub depth: u32,
    /// Page the URL was discovered on
    pub originating_url: Option<String>,
    /// Rate-limit retries already spent on this target
    pub attempt: u32,
}

/// Errors from the frontier
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrontierError {
    #[error("Frontier is empty")]
    Empty,
}

/// What happened to a pushed URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Accepted; carries the normalized URL and its insertion sequence number
    Queued { url: String, seq: u64 },
    /// Already queued or visited
    AlreadySeen,
    DepthExceeded,
    OutOfScope,
    /// Path ends in an archive, media or office extension
    NonCrawlable,
    /// Not an absolute http(s) URL
    Invalid,
}

/// What a worker should do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    Target(FetchTarget),
    /// Nothing ready; wake at the instant if given, otherwise when in-flight work completes
    Wait(Option<Instant>),
    /// Nothing queued, deferred, or in flight
    Drained,
}

#[derive(Debug)]
struct QueuedTarget {
    target: FetchTarget,
    seq: u64,
}

// BinaryHeap is a max-heap: reverse so the lowest (depth, seq) pops first
impl Ord for QueuedTarget {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .target
            .depth
            .cmp(&self.target.depth)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedTarget {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedTarget {
    fn eq(&self, other: &Self) -> bool {
        self.target.depth == other.target.depth && self.seq == other.seq
    }
}

impl Eq for QueuedTarget {}

/// Frontier of pending fetch targets
///
/// The frontier is shared behind a mutex; checking and marking a URL as seen
/// happen in the same `push` call, so two workers cannot queue the same URL.
pub struct Frontier {
    queue: BinaryHeap<QueuedTarget>,
    deferred: Vec<(Instant, QueuedTarget)>,
    seen: HashSet<String>,
    scope: DomainScope,
    max_depth: u32,
    next_seq: u64,
    in_flight: usize,
}

impl Frontier {
    /// Creates an empty frontier
    ///
    /// # Arguments
    ///
    /// * `max_depth` - Deepest depth accepted (0 = seeds only)
    /// * `scope` - Domain scope predicate applied on push
    pub fn new(max_depth: u32, scope: DomainScope) -> Self {
        Self {
            queue: BinaryHeap::new(),
            deferred: Vec::new(),
            seen: HashSet::new(),
            scope,
            max_depth,
            next_seq: 0,
            in_flight: 0,
        }
    }

    /// Marks a URL as already visited so pushes of it become no-ops
    pub fn mark_visited(&mut self, url: &str) {
        match normalize_url(url) {
            Ok(normalized) => {
                self.seen.insert(normalized.to_string());
            }
            Err(_) => {
                self.seen.insert(url.to_string());
            }
        }
    }

    /// Offers a URL to the frontier
    ///
    /// # Returns
    ///
    /// * `PushOutcome::Queued` - The URL was accepted
    /// * anything else - The URL was dropped, and the variant says why
    pub fn push(&mut self, url: &str, depth: u32, originating_url: Option<&str>) -> PushOutcome {
        let Ok(normalized) = normalize_url(url) else {
            return PushOutcome::Invalid;
        };

        if depth > self.max_depth {
            return PushOutcome::DepthExceeded;
        }
        if self.seen.contains(normalized.as_str()) {
            return PushOutcome::AlreadySeen;
        }
        if !self.scope.allows(&normalized) {
            return PushOutcome::OutOfScope;
        }
        if has_non_crawlable_extension(&normalized) {
            return PushOutcome::NonCrawlable;
        }

        let url = normalized.to_string();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.seen.insert(url.clone());
        self.queue.push(QueuedTarget {
            target: FetchTarget {
                url: url.clone(),
                depth,
                originating_url: originating_url.map(str::to_string),
                attempt: 0,
            },
            seq,
        });

        PushOutcome::Queued { url, seq }
    }

    /// Re-queues a checkpointed target from an earlier run, keeping its position
    pub fn restore(&mut self, target: FetchTarget, seq: u64) -> bool {
        if !self.seen.insert(target.url.clone()) {
            return false;
        }
        self.next_seq = self.next_seq.max(seq + 1);
        self.queue.push(QueuedTarget { target, seq });
        true
    }

    /// Removes the next target, ordered by depth then insertion order
    ///
    /// The caller owns the target until it calls [`Frontier::complete`] or
    /// [`Frontier::defer`].
    pub fn pop(&mut self) -> Result<FetchTarget, FrontierError> {
        let queued = self.queue.pop().ok_or(FrontierError::Empty)?;
        self.in_flight += 1;
        Ok(queued.target)
    }

    /// Releases deferred targets that are due, then pops
    pub fn next(&mut self, now: Instant) -> Next {
        let mut index = 0;
        while index < self.deferred.len() {
            if self.deferred[index].0 <= now {
                let (_, queued) = self.deferred.swap_remove(index);
                self.queue.push(queued);
            } else {
                index += 1;
            }
        }

        if let Ok(target) = self.pop() {
            return Next::Target(target);
        }

        if let Some(wake) = self.deferred.iter().map(|(at, _)| *at).min() {
            Next::Wait(Some(wake))
        } else if self.in_flight > 0 {
            Next::Wait(None)
        } else {
            Next::Drained
        }
    }

    /// Puts a popped target back, to become ready at `ready_at`
    ///
    /// The target keeps its depth; its attempt counter is incremented.
    pub fn defer(&mut self, mut target: FetchTarget, ready_at: Instant) {
        target.attempt += 1;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.in_flight = self.in_flight.saturating_sub(1);
        self.deferred.push((ready_at, QueuedTarget { target, seq }));
    }

    /// Marks a popped target as finished
    pub fn complete(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Targets queued or deferred
    pub fn len(&self) -> usize {
        self.queue.len() + self.deferred.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Number of distinct URLs ever accepted or marked visited
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    fn same_domain(seed: &str) -> DomainScope {
        DomainScope::SameDomainAs(
            [crate::url::registrable_domain(seed)]
                .into_iter()
                .collect::<HashSet<_>>(),
        )
    }

    fn frontier(max_depth: u32) -> Frontier {
        Frontier::new(max_depth, same_domain("example.com"))
    }

    #[test]
    fn test_push_dedups() {
        let mut f = frontier(2);
        assert!(matches!(
            f.push("https://example.com/a", 0, None),
            PushOutcome::Queued { seq: 0, .. }
        ));
        assert_eq!(
            f.push("https://example.com/a#frag", 1, None),
            PushOutcome::AlreadySeen
        );
        assert_eq!(f.len(), 1);
    }

    #[test]
    fn test_push_rejects_depth_scope_and_extension() {
        let mut f = frontier(1);
        assert_eq!(
            f.push("https://example.com/deep", 2, None),
            PushOutcome::DepthExceeded
        );
        assert_eq!(
            f.push("https://other.com/x", 1, None),
            PushOutcome::OutOfScope
        );
        assert_eq!(
            f.push("https://example.com/data.zip", 1, None),
            PushOutcome::NonCrawlable
        );
        assert_eq!(f.push("not a url", 0, None), PushOutcome::Invalid);
        assert!(f.is_empty());
    }

    #[test]
    fn test_seeds_only_at_depth_zero() {
        let mut f = frontier(0);
        assert!(matches!(
            f.push("https://example.com/", 0, None),
            PushOutcome::Queued { .. }
        ));
        assert_eq!(
            f.push("https://example.com/y", 1, Some("https://example.com/")),
            PushOutcome::DepthExceeded
        );
    }

    #[test]
    fn test_pop_orders_by_depth_then_fifo() {
        let mut f = frontier(3);
        f.push("https://example.com/d2", 2, None);
        f.push("https://example.com/a", 1, None);
        f.push("https://example.com/b", 1, None);
        f.push("https://example.com/", 0, None);

        let order: Vec<String> = std::iter::from_fn(|| f.pop().ok())
            .map(|t| t.url)
            .collect();
        assert_eq!(
            order,
            vec![
                "https://example.com/",
                "https://example.com/a",
                "https://example.com/b",
                "https://example.com/d2",
            ]
        );
    }

    #[test]
    fn test_pop_empty() {
        let mut f = frontier(1);
        assert_eq!(f.pop(), Err(FrontierError::Empty));
    }

    #[test]
    fn test_visited_urls_are_skipped() {
        let mut f = frontier(1);
        f.mark_visited("https://example.com/done/");
        assert_eq!(
            f.push("https://example.com/done", 0, None),
            PushOutcome::AlreadySeen
        );
    }

    #[test]
    fn test_next_waits_for_in_flight_then_drains() {
        let mut f = frontier(1);
        f.push("https://example.com/", 0, None);
        let now = Instant::now();

        assert!(matches!(f.next(now), Next::Target(_)));
        assert_eq!(f.next(now), Next::Wait(None));
        f.complete();
        assert_eq!(f.next(now), Next::Drained);
    }

    #[test]
    fn test_deferred_target_keeps_depth() {
        let mut f = frontier(2);
        f.push("https://example.com/busy", 1, None);
        let now = Instant::now();

        let Next::Target(target) = f.next(now) else {
            panic!("expected a target");
        };
        let ready_at = now + Duration::from_millis(50);
        f.defer(target, ready_at);

        assert_eq!(f.next(now), Next::Wait(Some(ready_at)));

        let Next::Target(retried) = f.next(ready_at) else {
            panic!("expected the deferred target");
        };
        assert_eq!(retried.depth, 1);
        assert_eq!(retried.attempt, 1);
    }

    #[test]
    fn test_restore_keeps_sequence() {
        let mut f = frontier(2);
        let target = FetchTarget {
            url: "https://example.com/resumed".to_string(),
            depth: 1,
            originating_url: None,
            attempt: 0,
        };
        assert!(f.restore(target.clone(), 7));
        assert!(!f.restore(target, 7));

        assert!(matches!(
            f.push("https://example.com/new", 1, None),
            PushOutcome::Queued { seq: 8, .. }
        ));
        assert_eq!(f.pop().unwrap().url, "https://example.com/resumed");
    }
}
