//! Result containers: a bounded k-nearest heap and the sorted list it freezes into.

use crate::relation::Oid;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// An object together with its distance to the query.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Neighbor {
    pub distance: f64,
    pub oid: Oid,
}

impl Neighbor {
    pub fn new(oid: Oid, distance: f64) -> Self {
        Self { distance, oid }
    }
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Ascending by distance, ties broken by object id.
impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.oid.cmp(&other.oid))
    }
}

/// Max-heap holding the `k` best neighbors seen so far.
#[derive(Debug, Clone)]
pub struct KnnHeap {
    k: usize,
    heap: BinaryHeap<Neighbor>,
}

impl KnnHeap {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k + 1),
        }
    }

    /// Offer a candidate; it is kept only if it beats the current k-th best.
    ///
    /// Returns `true` if the candidate was kept.
    pub fn insert(&mut self, candidate: Neighbor) -> bool {
        if self.heap.len() < self.k {
            self.heap.push(candidate);
            return true;
        }
        match self.heap.peek() {
            Some(worst) if candidate < *worst => {
                self.heap.pop();
                self.heap.push(candidate);
                true
            }
            _ => false,
        }
    }

    /// Distance of the k-th best candidate, or infinity while fewer than k are known.
    pub fn k_distance(&self) -> f64 {
        if self.heap.len() < self.k {
            return f64::INFINITY;
        }
        self.heap.peek().map_or(f64::INFINITY, |n| n.distance)
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Freeze into a list ordered by (distance, oid).
    pub fn into_list(self) -> DistanceList {
        DistanceList {
            neighbors: self.heap.into_sorted_vec(),
        }
    }
}

/// Neighbors sorted ascending by (distance, oid).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DistanceList {
    neighbors: Vec<Neighbor>,
}

impl DistanceList {
    /// Sort arbitrary neighbors into a list.
    pub fn from_unsorted(mut neighbors: Vec<Neighbor>) -> Self {
        neighbors.sort_unstable();
        Self { neighbors }
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&Neighbor> {
        self.neighbors.get(i)
    }

    /// The farthest neighbor, i.e. the k-distance of a full KNN result.
    pub fn last(&self) -> Option<&Neighbor> {
        self.neighbors.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Neighbor> {
        self.neighbors.iter()
    }

    pub fn oids(&self) -> Vec<Oid> {
        self.neighbors.iter().map(|n| n.oid).collect()
    }

    pub fn as_slice(&self) -> &[Neighbor] {
        &self.neighbors
    }

    pub fn into_vec(self) -> Vec<Neighbor> {
        self.neighbors
    }
}

impl IntoIterator for DistanceList {
    type Item = Neighbor;
    type IntoIter = std::vec::IntoIter<Neighbor>;

    fn into_iter(self) -> Self::IntoIter {
        self.neighbors.into_iter()
    }
}

impl<'a> IntoIterator for &'a DistanceList {
    type Item = &'a Neighbor;
    type IntoIter = std::slice::Iter<'a, Neighbor>;

    fn into_iter(self) -> Self::IntoIter {
        self.neighbors.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(oid: u32, distance: f64) -> Neighbor {
        Neighbor::new(Oid(oid), distance)
    }

    #[test]
    fn test_neighbor_ordering_breaks_ties_by_oid() {
        assert!(n(0, 1.0) < n(1, 2.0));
        assert!(n(1, 1.0) < n(2, 1.0));
        assert!(n(5, 0.5) < n(2, 1.0));
        assert_eq!(n(3, 1.0), n(3, 1.0));
    }

    #[test]
    fn test_bounded_insert() {
        let mut heap = KnnHeap::new(2);
        assert_eq!(heap.k_distance(), f64::INFINITY);
        assert!(heap.insert(n(0, 5.0)));
        assert!(heap.insert(n(1, 1.0)));
        assert_eq!(heap.k_distance(), 5.0);
        assert!(heap.insert(n(2, 3.0)));
        assert!(!heap.insert(n(3, 4.0)));

        assert_eq!(heap.len(), 2);
        assert_eq!(heap.k_distance(), 3.0);
        let list = heap.into_list();
        assert_eq!(list.oids(), vec![Oid(1), Oid(2)]);
    }

    #[test]
    fn test_ties_keep_smaller_oid() {
        let mut heap = KnnHeap::new(2);
        heap.insert(n(7, 1.0));
        heap.insert(n(9, 2.0));
        assert!(heap.insert(n(4, 2.0)));
        assert!(!heap.insert(n(8, 2.0)));
        assert_eq!(heap.into_list().oids(), vec![Oid(7), Oid(4)]);
    }

    #[test]
    fn test_into_list_sorted() {
        let mut heap = KnnHeap::new(10);
        for (i, d) in [5.0, 1.0, 3.0, 2.0, 1.0].iter().enumerate() {
            heap.insert(n(i as u32, *d));
        }
        let list = heap.into_list();
        assert_eq!(list.len(), 5);
        for pair in list.as_slice().windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        assert_eq!(list.get(0).unwrap().oid, Oid(1));
        assert_eq!(list.last().unwrap().distance, 5.0);
    }

    #[test]
    fn test_from_unsorted() {
        let list = DistanceList::from_unsorted(vec![n(2, 0.3), n(1, 0.3), n(0, 0.9)]);
        assert_eq!(list.oids(), vec![Oid(1), Oid(2), Oid(0)]);
        assert!(DistanceList::default().is_empty());
    }
}
