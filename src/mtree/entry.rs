//! M-tree entries.

use crate::page::{Page, PageId};
use crate::relation::Oid;
use crate::tree::{Node, TreeEntry};
use serde::{Deserialize, Serialize};

/// An entry of an M-tree node.
///
/// `parent_distance` is the distance to the routing object of the node the
/// entry lives in (zero in the root). `knn_distance` is only maintained by
/// the MkMax variant: the object's k_max-distance in a leaf, the largest
/// k_max-distance below a routing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MTreeEntry {
    Leaf {
        oid: Oid,
        parent_distance: f64,
        knn_distance: Option<f64>,
    },
    Routing {
        child: PageId,
        routing: Oid,
        covering_radius: f64,
        parent_distance: f64,
        knn_distance: Option<f64>,
    },
}

impl MTreeEntry {
    pub fn leaf(oid: Oid, knn_distance: Option<f64>) -> Self {
        MTreeEntry::Leaf {
            oid,
            parent_distance: 0.0,
            knn_distance,
        }
    }

    /// Routing entry for a written node whose entries' parent distances
    /// are relative to `routing`.
    pub fn routing_for(node: &Node<MTreeEntry>, routing: Oid, parent_distance: f64) -> Self {
        let mut entry = MTreeEntry::Routing {
            child: node.page_id(),
            routing,
            covering_radius: 0.0,
            parent_distance,
            knn_distance: None,
        };
        entry.adjust_to(node);
        entry
    }

    /// The object an entry stands for: the indexed object or the routing object.
    pub fn object(&self) -> Oid {
        match self {
            MTreeEntry::Leaf { oid, .. } => *oid,
            MTreeEntry::Routing { routing, .. } => *routing,
        }
    }

    pub fn parent_distance(&self) -> f64 {
        match self {
            MTreeEntry::Leaf {
                parent_distance, ..
            }
            | MTreeEntry::Routing {
                parent_distance, ..
            } => *parent_distance,
        }
    }

    pub fn set_parent_distance(&mut self, distance: f64) {
        match self {
            MTreeEntry::Leaf {
                parent_distance, ..
            }
            | MTreeEntry::Routing {
                parent_distance, ..
            } => *parent_distance = distance,
        }
    }

    /// Radius of the ball covering everything below the entry; zero for objects.
    pub fn covering_radius(&self) -> f64 {
        match self {
            MTreeEntry::Leaf { .. } => 0.0,
            MTreeEntry::Routing {
                covering_radius, ..
            } => *covering_radius,
        }
    }

    pub fn knn_distance(&self) -> Option<f64> {
        match self {
            MTreeEntry::Leaf { knn_distance, .. } | MTreeEntry::Routing { knn_distance, .. } => {
                *knn_distance
            }
        }
    }

    pub fn set_knn_distance(&mut self, value: Option<f64>) {
        match self {
            MTreeEntry::Leaf { knn_distance, .. } | MTreeEntry::Routing { knn_distance, .. } => {
                *knn_distance = value
            }
        }
    }
}

impl TreeEntry for MTreeEntry {
    fn child(&self) -> Option<PageId> {
        match self {
            MTreeEntry::Routing { child, .. } => Some(*child),
            MTreeEntry::Leaf { .. } => None,
        }
    }

    fn oid(&self) -> Option<Oid> {
        match self {
            MTreeEntry::Leaf { oid, .. } => Some(*oid),
            MTreeEntry::Routing { .. } => None,
        }
    }

    fn adjust_to(&mut self, node: &Node<Self>) -> bool {
        let MTreeEntry::Routing {
            covering_radius,
            knn_distance,
            ..
        } = self
        else {
            return false;
        };
        let radius = covering_radius_of(&node.entries);
        let knn = aggregate_knn(&node.entries);
        let changed = radius != *covering_radius || knn != *knn_distance;
        *covering_radius = radius;
        *knn_distance = knn;
        changed
    }
}

/// Radius covering all `entries` around the routing object their parent
/// distances refer to.
pub fn covering_radius_of(entries: &[MTreeEntry]) -> f64 {
    entries
        .iter()
        .map(|e| e.parent_distance() + e.covering_radius())
        .fold(0.0, f64::max)
}

/// Largest k-distance among `entries`, if any entry carries one.
pub fn aggregate_knn(entries: &[MTreeEntry]) -> Option<f64> {
    entries
        .iter()
        .filter_map(MTreeEntry::knn_distance)
        .reduce(f64::max)
}

/// Lower bound on the distance from a query to anything in a ball, given
/// the distance `d` to its centre.
///
/// Slightly conservative: covering radii are sums of rounded distances.
pub fn ball_lower_bound(d: f64, radius: f64) -> f64 {
    let slack = (d.abs() + radius.abs()) * 1e-12;
    (d - radius - slack).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn leaf(oid: u32, parent_distance: f64, knn: Option<f64>) -> MTreeEntry {
        MTreeEntry::Leaf {
            oid: Oid(oid),
            parent_distance,
            knn_distance: knn,
        }
    }

    #[test]
    fn test_routing_for_node() {
        let mut node = Node::new_leaf().sibling(vec![
            leaf(0, 0.0, Some(1.5)),
            leaf(1, 2.0, Some(0.5)),
            leaf(2, 1.0, Some(3.0)),
        ]);
        node.set_page_id(PageId(7));
        let entry = MTreeEntry::routing_for(&node, Oid(0), 4.0);
        assert_eq!(entry.child(), Some(PageId(7)));
        assert_eq!(entry.object(), Oid(0));
        assert_eq!(entry.covering_radius(), 2.0);
        assert_eq!(entry.parent_distance(), 4.0);
        assert_eq!(entry.knn_distance(), Some(3.0));
    }

    #[test]
    fn test_covering_radius_includes_child_radius() {
        let entries = vec![
            MTreeEntry::Routing {
                child: PageId(2),
                routing: Oid(0),
                covering_radius: 3.0,
                parent_distance: 1.0,
                knn_distance: None,
            },
            leaf(5, 3.5, None),
        ];
        assert_eq!(covering_radius_of(&entries), 4.0);
        assert_eq!(aggregate_knn(&entries), None);
        assert_eq!(covering_radius_of(&[]), 0.0);
    }

    #[test]
    fn test_adjust_reports_changes() {
        let mut node = Node::new_leaf().sibling(vec![leaf(0, 1.0, None)]);
        node.set_page_id(PageId(3));
        let mut entry = MTreeEntry::routing_for(&node, Oid(0), 0.0);
        assert!(!entry.adjust_to(&node));
        node.entries.push(leaf(1, 2.0, None));
        assert!(entry.adjust_to(&node));
        assert_eq!(entry.covering_radius(), 2.0);
    }

    #[test]
    fn test_ball_lower_bound() {
        assert_eq!(ball_lower_bound(1.0, 2.0), 0.0);
        assert_relative_eq!(ball_lower_bound(5.0, 2.0), 3.0, epsilon = 1e-9);
        assert!(ball_lower_bound(5.0, 2.0) <= 3.0);
    }
}
