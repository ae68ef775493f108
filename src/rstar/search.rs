//! Lower-bound expansion of R*-tree nodes for the best-first searches.

use super::entry::SpatialEntry;
use super::RStarTree;
use crate::distance::SpatialDistance;
use crate::error::Result;
use crate::page::PageId;
use crate::query::best_first::{Candidate, SearchTree};
use crate::query::Neighbor;

/// A query point bound to a tree and a spatial distance.
pub struct SpatialSearch<'a> {
    tree: &'a RStarTree,
    distance: &'a dyn SpatialDistance,
    query: &'a [f64],
}

impl<'a> SpatialSearch<'a> {
    pub fn new(tree: &'a RStarTree, distance: &'a dyn SpatialDistance, query: &'a [f64]) -> Self {
        Self {
            tree,
            distance,
            query,
        }
    }
}

impl SearchTree for SpatialSearch<'_> {
    fn expand(
        &self,
        page: PageId,
        _pivot: Option<f64>,
        threshold: f64,
        out: &mut Vec<Candidate>,
    ) -> Result<()> {
        let node = self.tree.core.node(page)?;
        let statistics = self.tree.core.statistics();
        for entry in &node.entries {
            match entry {
                SpatialEntry::Leaf { oid, coords, .. } => {
                    statistics.count_distance();
                    let distance = self.distance.point_distance(self.query, coords);
                    if distance <= threshold {
                        out.push(Candidate::Object(Neighbor::new(*oid, distance)));
                    }
                }
                SpatialEntry::Directory { child, mbr, .. } => {
                    let bound = self.distance.min_dist(self.query, mbr);
                    if bound <= threshold {
                        out.push(Candidate::Node {
                            page: *child,
                            bound,
                            pivot: None,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
