//! Best-first branch-and-bound traversal shared by the tree searchers.
//!
//! A tree family only has to say how to expand one node into candidates
//! with distance lower bounds; KNN, range and the incremental priority
//! cursor are written once on top of that.

use super::heap::{DistanceList, KnnHeap, Neighbor};
use crate::error::Result;
use crate::page::PageId;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A subtree still to be visited, or an object whose exact distance is known.
#[derive(Debug, Clone, Copy)]
pub enum Candidate {
    Node {
        page: PageId,
        /// Lower bound on the distance from the query to anything below `page`.
        bound: f64,
        /// Exact distance from the query to the node's routing object, if any.
        pivot: Option<f64>,
    },
    Object(Neighbor),
}

impl Candidate {
    pub fn root() -> Self {
        Candidate::Node {
            page: PageId::ROOT,
            bound: 0.0,
            pivot: None,
        }
    }

    fn key(&self) -> f64 {
        match self {
            Candidate::Node { bound, .. } => *bound,
            Candidate::Object(n) => n.distance,
        }
    }
}

/// One query against one tree.
pub trait SearchTree {
    /// Expand the node at `page` into `out`.
    ///
    /// Objects are reported with their exact distance, child nodes with a
    /// lower bound. Candidates whose distance or bound exceeds `threshold`
    /// may be left out.
    fn expand(
        &self,
        page: PageId,
        pivot: Option<f64>,
        threshold: f64,
        out: &mut Vec<Candidate>,
    ) -> Result<()>;
}

/// Queue element ordered so that `BinaryHeap` pops the smallest key first.
/// At equal keys nodes come before objects, objects by ascending id.
struct Queued(Candidate);

impl Queued {
    fn rank(&self) -> (u8, u32) {
        match self.0 {
            Candidate::Node { page, .. } => (0, page.0),
            Candidate::Object(n) => (1, n.oid.0),
        }
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .0
            .key()
            .total_cmp(&self.0.key())
            .then_with(|| other.rank().cmp(&self.rank()))
    }
}

/// The `k` nearest objects, ordered by (distance, oid).
pub fn knn_search(tree: &impl SearchTree, k: usize) -> Result<DistanceList> {
    let mut knn = KnnHeap::new(k);
    let mut queue = BinaryHeap::new();
    let mut buffer = Vec::new();
    queue.push(Queued(Candidate::root()));

    while let Some(Queued(candidate)) = queue.pop() {
        // ties are still expanded so that id tie-breaks match a linear scan
        if candidate.key() > knn.k_distance() {
            break;
        }
        if let Candidate::Node { page, pivot, .. } = candidate {
            tree.expand(page, pivot, knn.k_distance(), &mut buffer)?;
            for c in buffer.drain(..) {
                match c {
                    Candidate::Object(n) => {
                        knn.insert(n);
                    }
                    node => queue.push(Queued(node)),
                }
            }
        }
    }
    Ok(knn.into_list())
}

/// All objects within `radius` (inclusive), ordered by (distance, oid).
pub fn range_search(tree: &impl SearchTree, radius: f64) -> Result<DistanceList> {
    let mut found = Vec::new();
    let mut stack = vec![Candidate::root()];
    let mut buffer = Vec::new();

    while let Some(candidate) = stack.pop() {
        if let Candidate::Node { page, pivot, .. } = candidate {
            tree.expand(page, pivot, radius, &mut buffer)?;
            for c in buffer.drain(..) {
                match c {
                    Candidate::Object(n) if n.distance <= radius => found.push(n),
                    Candidate::Object(_) => {}
                    Candidate::Node { bound, .. } if bound <= radius => stack.push(c),
                    Candidate::Node { .. } => {}
                }
            }
        }
    }
    Ok(DistanceList::from_unsorted(found))
}

/// Incremental nearest-neighbor iterator.
///
/// Yields every object of the tree in (distance, oid) order, expanding
/// nodes only as far as needed; callers may stop at any point. An error
/// ends the iteration.
pub struct PriorityCursor<S> {
    tree: S,
    queue: BinaryHeap<Queued>,
    buffer: Vec<Candidate>,
}

impl<S: SearchTree> PriorityCursor<S> {
    pub fn new(tree: S) -> Self {
        let mut queue = BinaryHeap::new();
        queue.push(Queued(Candidate::root()));
        Self {
            tree,
            queue,
            buffer: Vec::new(),
        }
    }

    /// Lower bound on the distance of every object not yet returned.
    pub fn peek_distance(&self) -> Option<f64> {
        self.queue.peek().map(|q| q.0.key())
    }
}

impl<S: SearchTree> Iterator for PriorityCursor<S> {
    type Item = Result<Neighbor>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(Queued(candidate)) = self.queue.pop() {
            match candidate {
                Candidate::Object(n) => return Some(Ok(n)),
                Candidate::Node { page, pivot, .. } => {
                    if let Err(e) = self.tree.expand(page, pivot, f64::INFINITY, &mut self.buffer) {
                        self.queue.clear();
                        return Some(Err(e));
                    }
                    self.queue.extend(self.buffer.drain(..).map(Queued));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::Oid;

    /// Two-level tree over points on a line: the root (page 1) has two
    /// children, page 2 holding 0..5 and page 3 holding 5..10.
    struct LineTree {
        query: f64,
    }

    impl LineTree {
        fn interval(page: PageId) -> (u32, u32) {
            if page == PageId(2) {
                (0, 5)
            } else {
                (5, 10)
            }
        }

        fn bound(&self, (lo, hi): (u32, u32)) -> f64 {
            let (lo, hi) = (lo as f64, (hi - 1) as f64);
            if self.query < lo {
                lo - self.query
            } else if self.query > hi {
                self.query - hi
            } else {
                0.0
            }
        }
    }

    impl SearchTree for LineTree {
        fn expand(
            &self,
            page: PageId,
            _pivot: Option<f64>,
            threshold: f64,
            out: &mut Vec<Candidate>,
        ) -> Result<()> {
            if page == PageId::ROOT {
                for child in [PageId(2), PageId(3)] {
                    let bound = self.bound(Self::interval(child));
                    if bound <= threshold {
                        out.push(Candidate::Node {
                            page: child,
                            bound,
                            pivot: None,
                        });
                    }
                }
                return Ok(());
            }
            let (lo, hi) = Self::interval(page);
            for i in lo..hi {
                let distance = (i as f64 - self.query).abs();
                if distance <= threshold {
                    out.push(Candidate::Object(Neighbor::new(Oid(i), distance)));
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_knn_search() {
        let result = knn_search(&LineTree { query: 4.6 }, 3).unwrap();
        assert_eq!(result.oids(), vec![Oid(5), Oid(4), Oid(6)]);
    }

    #[test]
    fn test_knn_ties_prefer_smaller_oid() {
        let result = knn_search(&LineTree { query: 4.5 }, 1).unwrap();
        assert_eq!(result.oids(), vec![Oid(4)]);
    }

    #[test]
    fn test_knn_more_than_available() {
        let result = knn_search(&LineTree { query: 0.0 }, 50).unwrap();
        assert_eq!(result.len(), 10);
    }

    #[test]
    fn test_range_search_inclusive() {
        let result = range_search(&LineTree { query: 5.0 }, 1.0).unwrap();
        assert_eq!(result.oids(), vec![Oid(5), Oid(4), Oid(6)]);
    }

    #[test]
    fn test_priority_cursor_order() {
        let cursor = PriorityCursor::new(LineTree { query: 7.0 });
        let order: Vec<Oid> = cursor.map(|n| n.unwrap().oid).collect();
        assert_eq!(
            order,
            [7, 6, 8, 5, 9, 4, 3, 2, 1, 0].map(Oid).to_vec()
        );
    }

    #[test]
    fn test_priority_cursor_stops_early() {
        let mut cursor = PriorityCursor::new(LineTree { query: 0.0 });
        assert_eq!(cursor.next().unwrap().unwrap().oid, Oid(0));
        assert_eq!(cursor.next().unwrap().unwrap().oid, Oid(1));
        assert!(cursor.peek_distance().unwrap() >= 1.0);
    }
}
