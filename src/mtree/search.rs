//! Lower-bound expansion of M-tree nodes for the best-first searches.

use super::entry::{ball_lower_bound, MTreeEntry};
use super::MTree;
use crate::distance::Distance;
use crate::error::Result;
use crate::page::PageId;
use crate::query::best_first::{Candidate, SearchTree};
use crate::query::Neighbor;
use crate::relation::Relation;

/// A query object bound to a tree and the relation holding its objects.
pub struct MetricSearch<'a, O, D, R> {
    tree: &'a MTree<O, D>,
    relation: &'a R,
    query: &'a O,
}

impl<'a, O, D, R> MetricSearch<'a, O, D, R> {
    pub fn new(tree: &'a MTree<O, D>, relation: &'a R, query: &'a O) -> Self {
        Self {
            tree,
            relation,
            query,
        }
    }
}

impl<O, D, R> SearchTree for MetricSearch<'_, O, D, R>
where
    D: Distance<O>,
    R: Relation<Object = O>,
{
    fn expand(
        &self,
        page: PageId,
        pivot: Option<f64>,
        threshold: f64,
        out: &mut Vec<Candidate>,
    ) -> Result<()> {
        let node = self.tree.core.node(page)?;
        for entry in &node.entries {
            // |d(q, p) - d(e, p)| bounds d(q, e) from below without computing it
            if let Some(to_parent) = pivot {
                let gap = (to_parent - entry.parent_distance()).abs();
                if ball_lower_bound(gap, entry.covering_radius()) > threshold {
                    continue;
                }
            }
            let object = self.tree.object(self.relation, entry.object())?;
            let distance = self.tree.measure(self.query, object);
            match entry {
                MTreeEntry::Leaf { oid, .. } => {
                    if distance <= threshold {
                        out.push(Candidate::Object(Neighbor::new(*oid, distance)));
                    }
                }
                MTreeEntry::Routing {
                    child,
                    covering_radius,
                    ..
                } => {
                    let bound = ball_lower_bound(distance, *covering_radius);
                    if bound <= threshold {
                        out.push(Candidate::Node {
                            page: *child,
                            bound,
                            pivot: Some(distance),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
