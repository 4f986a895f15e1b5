//! Bounded top-K collection of scored documents.
//!
//! Each scoring worker owns one [`TopKCollector`]; collectors are then merged
//! into a single global top-K. Ranking is by descending similarity with ties
//! broken by ascending document ID, which makes results deterministic.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::collection::document::Document;

/// A scored candidate.
#[derive(Debug, Clone)]
pub(crate) struct ScoredDocument {
    pub(crate) similarity: f32,
    pub(crate) document: Arc<Document>,
}

impl ScoredDocument {
    /// Total ranking order: `Less` means `self` ranks ahead of `other`.
    fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .similarity
            .total_cmp(&self.similarity)
            .then_with(|| self.document.id.cmp(&other.document.id))
    }
}

// Max-heap keyed on rank: the top of the heap is the worst kept candidate.
impl PartialEq for ScoredDocument {
    fn eq(&self, other: &Self) -> bool {
        self.rank_cmp(other) == Ordering::Equal
    }
}

impl Eq for ScoredDocument {}

impl PartialOrd for ScoredDocument {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredDocument {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank_cmp(other)
    }
}

/// Keeps the `capacity` best candidates seen so far.
#[derive(Debug)]
pub(crate) struct TopKCollector {
    capacity: usize,
    heap: BinaryHeap<ScoredDocument>,
    seen: usize,
}

impl TopKCollector {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity.saturating_add(1)),
            seen: 0,
        }
    }

    pub(crate) fn collect(&mut self, candidate: ScoredDocument) {
        self.seen += 1;
        if self.capacity == 0 {
            return;
        }
        if self.heap.len() < self.capacity {
            self.heap.push(candidate);
            return;
        }
        if let Some(worst) = self.heap.peek()
            && candidate < *worst
        {
            self.heap.pop();
            self.heap.push(candidate);
        }
    }

    /// Fold another collector into this one.
    pub(crate) fn merge(mut self, other: TopKCollector) -> Self {
        let seen = self.seen + other.seen;
        for candidate in other.heap {
            self.collect(candidate);
        }
        self.seen = seen;
        self
    }

    /// Number of candidates offered, kept or not.
    pub(crate) fn seen(&self) -> usize {
        self.seen
    }

    /// Kept candidates, best first.
    pub(crate) fn into_sorted(self) -> Vec<ScoredDocument> {
        // Ascending by `Ord` is best-first, since `Less` ranks ahead.
        self.heap.into_sorted_vec()
    }
}
