//! Bounded top-k selection.
//!
//! Candidates are kept in a max-heap keyed on distance so the current worst
//! retained entry is available in O(1). Once the heap holds `k` entries a
//! new candidate is admitted only when its distance is strictly smaller
//! than that worst entry, which it then replaces.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Result entry returned by PQ and flat search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    pub id: usize,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy)]
struct HeapEntry {
    distance: f32,
    id: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Fixed-capacity collection of the `k` smallest `(distance, id)` pairs seen.
#[derive(Debug, Clone)]
pub struct TopK {
    k: usize,
    heap: BinaryHeap<HeapEntry>,
}

impl TopK {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k),
        }
    }

    pub fn capacity(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Largest distance currently retained.
    pub fn worst(&self) -> Option<f32> {
        self.heap.peek().map(|entry| entry.distance)
    }

    /// Offer a candidate. Returns whether it was retained.
    ///
    /// Every candidate is admitted while fewer than `k` are held. After
    /// that a candidate must order strictly before the current worst under
    /// `f32::total_cmp`, so `-inf` beats everything and NaN loses to everything.
    #[inline]
    pub fn push(&mut self, distance: f32, id: usize) -> bool {
        if self.k == 0 {
            return false;
        }
        if self.heap.len() < self.k {
            self.heap.push(HeapEntry { distance, id });
            return true;
        }
        match self.heap.peek_mut() {
            Some(mut worst) if distance.total_cmp(&worst.distance) == Ordering::Less => {
                *worst = HeapEntry { distance, id };
                true
            }
            _ => false,
        }
    }

    /// Drain the retained entries in ascending distance order.
    pub fn into_sorted_vec(self) -> Vec<SearchResult> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|entry| SearchResult {
                id: entry.id,
                distance: entry.distance,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_keeps_smallest_and_orders_ascending() {
        let mut topk = TopK::new(3);
        for (id, distance) in [0.9f32, 0.1, 0.5, 0.3, 0.7].into_iter().enumerate() {
            topk.push(distance, id);
        }
        let ids: Vec<usize> = topk.into_sorted_vec().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3, 2]);
    }

    #[test]
    fn test_equal_distance_is_not_admitted_when_full() {
        let mut topk = TopK::new(1);
        assert!(topk.push(0.5, 0));
        assert!(!topk.push(0.5, 1));
        assert_eq!(topk.into_sorted_vec()[0].id, 0);
    }

    #[test]
    fn test_zero_capacity_admits_nothing() {
        let mut empty = TopK::new(0);
        assert!(!empty.push(0.0, 0));
        assert!(empty.is_empty());
    }

    #[test]
    fn test_infinite_distances_are_ranked_not_dropped() {
        let mut topk = TopK::new(3);
        assert!(topk.push(-8e19, 0));
        assert!(topk.push(f32::NEG_INFINITY, 1));
        assert!(topk.push(8e19, 2));
        assert!(!topk.push(f32::INFINITY, 3));
        assert!(topk.push(0.5, 4));
        assert_eq!(topk.worst(), Some(0.5));

        let results = topk.into_sorted_vec();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].id, 1);
        assert_eq!(results[0].distance, f32::NEG_INFINITY);
        assert_eq!(results.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 0, 4]);
    }

    #[test]
    fn test_nan_fills_spare_capacity_and_is_evicted_first() {
        let mut topk = TopK::new(2);
        assert!(topk.push(f32::NAN.abs(), 0));
        assert!(topk.push(1.0, 1));
        assert!(topk.push(2.0, 2));
        let ids: Vec<usize> = topk.into_sorted_vec().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    proptest! {
        #[test]
        fn prop_bounded_sorted_and_dominating(
            distances in proptest::collection::vec(-10.0f32..10.0, 0..200),
            k in 0usize..20,
        ) {
            let mut topk = TopK::new(k);
            for (id, &distance) in distances.iter().enumerate() {
                topk.push(distance, id);
            }
            let results = topk.into_sorted_vec();
            prop_assert!(results.len() <= k);
            prop_assert_eq!(results.len(), k.min(distances.len()));
            prop_assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));

            let kept: std::collections::HashSet<usize> = results.iter().map(|r| r.id).collect();
            if let Some(max_kept) = results.last().map(|r| r.distance) {
                for (id, &distance) in distances.iter().enumerate() {
                    if !kept.contains(&id) {
                        prop_assert!(max_kept <= distance);
                    }
                }
            }
        }
    }
}
