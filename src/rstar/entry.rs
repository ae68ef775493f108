//! R*-tree entries.

use crate::page::{Page, PageId};
use crate::relation::Oid;
use crate::spatial::Mbr;
use crate::tree::{Node, TreeEntry};
use serde::{Deserialize, Serialize};

/// An entry of an R*-tree node.
///
/// `knn_distance` is only maintained by the RdKNN variant: the object's
/// k_max-distance in a leaf, the largest one below a directory entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SpatialEntry {
    /// An object with a copy of its coordinates.
    Leaf {
        oid: Oid,
        coords: Vec<f64>,
        knn_distance: Option<f64>,
    },
    /// A child node and the rectangle covering everything below it.
    Directory {
        child: PageId,
        mbr: Mbr,
        knn_distance: Option<f64>,
    },
}

impl SpatialEntry {
    pub fn leaf(oid: Oid, coords: Vec<f64>) -> Self {
        SpatialEntry::Leaf {
            oid,
            coords,
            knn_distance: None,
        }
    }

    /// Directory entry for a written node, covering all of its entries.
    ///
    /// `None` for an empty node, which has no bounding rectangle.
    pub fn directory(node: &Node<SpatialEntry>) -> Option<Self> {
        Some(SpatialEntry::Directory {
            child: node.page_id(),
            mbr: node_mbr(&node.entries)?,
            knn_distance: aggregate_knn(&node.entries),
        })
    }

    pub fn knn_distance(&self) -> Option<f64> {
        match self {
            SpatialEntry::Leaf { knn_distance, .. }
            | SpatialEntry::Directory { knn_distance, .. } => *knn_distance,
        }
    }

    pub fn set_knn_distance(&mut self, value: Option<f64>) {
        match self {
            SpatialEntry::Leaf { knn_distance, .. }
            | SpatialEntry::Directory { knn_distance, .. } => *knn_distance = value,
        }
    }

    /// The entry's rectangle; degenerate for leaf entries.
    pub fn mbr(&self) -> Mbr {
        match self {
            SpatialEntry::Leaf { coords, .. } => Mbr::from_point(coords),
            SpatialEntry::Directory { mbr, .. } => mbr.clone(),
        }
    }

    pub fn dimension(&self) -> usize {
        match self {
            SpatialEntry::Leaf { coords, .. } => coords.len(),
            SpatialEntry::Directory { mbr, .. } => mbr.dimension(),
        }
    }

    pub fn lower(&self, d: usize) -> f64 {
        match self {
            SpatialEntry::Leaf { coords, .. } => coords[d],
            SpatialEntry::Directory { mbr, .. } => mbr.min()[d],
        }
    }

    pub fn upper(&self, d: usize) -> f64 {
        match self {
            SpatialEntry::Leaf { coords, .. } => coords[d],
            SpatialEntry::Directory { mbr, .. } => mbr.max()[d],
        }
    }

    pub fn center(&self, d: usize) -> f64 {
        (self.lower(d) + self.upper(d)) / 2.0
    }

    /// Whether the entry could be, or lead to, the point `coords`.
    pub fn may_contain(&self, coords: &[f64]) -> bool {
        match self {
            SpatialEntry::Leaf { coords: own, .. } => own.as_slice() == coords,
            SpatialEntry::Directory { mbr, .. } => mbr.contains_point(coords),
        }
    }
}

impl TreeEntry for SpatialEntry {
    fn child(&self) -> Option<PageId> {
        match self {
            SpatialEntry::Directory { child, .. } => Some(*child),
            SpatialEntry::Leaf { .. } => None,
        }
    }

    fn oid(&self) -> Option<Oid> {
        match self {
            SpatialEntry::Leaf { oid, .. } => Some(*oid),
            SpatialEntry::Directory { .. } => None,
        }
    }

    fn adjust_to(&mut self, node: &Node<Self>) -> bool {
        let SpatialEntry::Directory {
            mbr, knn_distance, ..
        } = self
        else {
            return false;
        };
        let mut changed = false;
        if let Some(fresh) = node_mbr(&node.entries) {
            if fresh != *mbr {
                *mbr = fresh;
                changed = true;
            }
        }
        let knn = aggregate_knn(&node.entries);
        if knn != *knn_distance {
            *knn_distance = knn;
            changed = true;
        }
        changed
    }
}

/// Union of the rectangles of `entries`. `None` if there are none.
pub fn node_mbr(entries: &[SpatialEntry]) -> Option<Mbr> {
    let (first, rest) = entries.split_first()?;
    let mut mbr = first.mbr();
    for entry in rest {
        match entry {
            SpatialEntry::Leaf { coords, .. } => mbr.extend(&Mbr::from_point(coords)),
            SpatialEntry::Directory { mbr: other, .. } => mbr.extend(other),
        }
    }
    Some(mbr)
}

/// Largest k-distance among `entries`, if any entry carries one.
pub fn aggregate_knn(entries: &[SpatialEntry]) -> Option<f64> {
    entries
        .iter()
        .filter_map(SpatialEntry::knn_distance)
        .reduce(f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(oid: u32, x: f64, y: f64) -> SpatialEntry {
        SpatialEntry::leaf(Oid(oid), vec![x, y])
    }

    #[test]
    fn test_node_mbr() {
        let entries = vec![leaf(0, 1.0, 5.0), leaf(1, -2.0, 3.0), leaf(2, 0.0, 7.0)];
        let mbr = node_mbr(&entries).unwrap();
        assert_eq!(mbr.min(), &[-2.0, 3.0]);
        assert_eq!(mbr.max(), &[1.0, 7.0]);
        assert!(node_mbr(&[]).is_none());
    }

    #[test]
    fn test_directory_adjusts_to_node() {
        let mut node = Node::new_leaf().sibling(vec![leaf(0, 0.0, 0.0), leaf(1, 1.0, 1.0)]);
        node.set_page_id(PageId(4));
        let mut entry = SpatialEntry::directory(&node).unwrap();
        assert_eq!(entry.child(), Some(PageId(4)));
        assert!(!entry.adjust_to(&node));

        node.entries.push(leaf(2, 3.0, -1.0));
        assert!(entry.adjust_to(&node));
        assert_eq!(entry.mbr(), Mbr::new(vec![0.0, -1.0], vec![3.0, 1.0]));
    }

    #[test]
    fn test_directory_aggregates_knn_distance() {
        let mut node = Node::new_leaf().sibling(vec![leaf(0, 0.0, 0.0), leaf(1, 1.0, 1.0)]);
        node.set_page_id(PageId(2));
        let mut entry = SpatialEntry::directory(&node).unwrap();
        assert_eq!(entry.knn_distance(), None);

        node.entries[0].set_knn_distance(Some(0.5));
        node.entries[1].set_knn_distance(Some(2.5));
        assert!(entry.adjust_to(&node));
        assert_eq!(entry.knn_distance(), Some(2.5));

        node.entries[1].set_knn_distance(Some(1.0));
        assert!(entry.adjust_to(&node));
        assert_eq!(entry.knn_distance(), Some(1.0));
        assert!(!entry.adjust_to(&node));
    }

    #[test]
    fn test_leaf_accessors() {
        let e = leaf(3, 2.0, 4.0);
        assert_eq!(e.oid(), Some(Oid(3)));
        assert!(e.is_leaf_entry());
        assert_eq!(e.center(1), 4.0);
        assert!(e.may_contain(&[2.0, 4.0]));
        assert!(!e.may_contain(&[2.0, 4.5]));
    }
}
