//! MkMax tree: an M-tree whose entries carry k_max-nearest-neighbor
//! distances, supporting reverse kNN queries for any k up to k_max.

use super::entry::{aggregate_knn, ball_lower_bound, MTreeEntry};
use super::search::MetricSearch;
use super::MTree;
use crate::distance::Distance;
use crate::error::{check_k, IndexError, Result};
use crate::page::PageId;
use crate::persistence;
use crate::query::best_first::PriorityCursor;
use crate::query::{DistanceList, Neighbor};
use crate::relation::{Oid, Relation};
use crate::settings::MkMaxSettings;
use crate::statistics::Statistics;
use crate::tree::{TreeCore, TreeStats};
use log::debug;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug)]
pub struct MkMaxTree<O, D> {
    tree: MTree<O, D>,
    k_max: usize,
}

impl<O, D: Distance<O>> MkMaxTree<O, D> {
    pub fn new(distance: D, settings: MkMaxSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            tree: MTree::new(distance, settings.mtree)?,
            k_max: settings.k_max,
        })
    }

    /// Build a tree over every object of a relation.
    pub fn from_relation<R>(relation: &R, distance: D, settings: MkMaxSettings) -> Result<Self>
    where
        O: Sync,
        D: Sync,
        R: Relation<Object = O> + Sync,
    {
        let mut tree = Self::new(distance, settings)?;
        tree.bulk_load(relation, relation.ids())?;
        Ok(tree)
    }

    pub fn k_max(&self) -> usize {
        self.k_max
    }

    /// The underlying M-tree.
    pub fn tree(&self) -> &MTree<O, D> {
        &self.tree
    }

    pub fn distance(&self) -> &D {
        self.tree.distance()
    }

    pub fn height(&self) -> usize {
        self.tree.height()
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn statistics(&self) -> &Statistics {
        self.tree.statistics()
    }

    pub fn stats(&self) -> TreeStats {
        self.tree.stats()
    }

    /// Insert one object and update the k-distances it affects.
    ///
    /// Only objects that will have the new one among their k_max nearest
    /// neighbors can see their k-distance shrink, and those are exactly
    /// the reverse neighbors of the new object.
    pub fn insert<R>(&mut self, relation: &R, oid: Oid) -> Result<()>
    where
        R: Relation<Object = O>,
    {
        let object = relation.get(oid).ok_or_else(|| {
            IndexError::invalid(format!("object {} is not in the relation", oid))
        })?;
        let mut affected: Vec<Oid> = self
            .reverse_candidates(relation, object)?
            .into_iter()
            .map(|n| n.oid)
            .collect();
        self.tree.insert_object(relation, oid, Some(f64::INFINITY))?;
        affected.push(oid);

        let mut updates = HashMap::with_capacity(affected.len());
        for p in affected {
            updates.insert(p, self.k_distance(relation, p, self.k_max)?);
        }
        debug!("insert {}: {} k-distances updated", oid, updates.len());
        for (p, k_distance) in updates {
            self.set_k_distance(relation, p, k_distance)?;
        }
        Ok(())
    }

    /// Insert objects structurally, then compute every k-distance at once.
    pub fn bulk_load<R>(&mut self, relation: &R, ids: impl IntoIterator<Item = Oid>) -> Result<()>
    where
        O: Sync,
        D: Sync,
        R: Relation<Object = O> + Sync,
    {
        if !self.is_empty() {
            return Err(IndexError::Unsupported {
                operation: "bulk load into a non-empty tree",
                index: "MkMaxTree",
            });
        }
        let ids: Vec<Oid> = ids.into_iter().collect();
        self.tree.bulk_load(relation, ids.iter().copied())?;

        let this = &*self;
        let k_distances = ids
            .par_iter()
            .map(|&oid| Ok((oid, this.k_distance(relation, oid, this.k_max)?)))
            .collect::<Result<HashMap<Oid, f64>>>()?;
        self.refresh_subtree(PageId::ROOT, &k_distances)?;
        debug!("computed {} k-distances for k_max = {}", k_distances.len(), self.k_max);
        Ok(())
    }

    /// Deletion would require recomputing the k-distances of every reverse
    /// neighbor of the removed object; it is not offered.
    pub fn delete<R>(&mut self, _relation: &R, _oid: Oid) -> Result<bool>
    where
        R: Relation<Object = O>,
    {
        Err(IndexError::Unsupported {
            operation: "delete",
            index: "MkMaxTree",
        })
    }

    pub fn knn<R>(&self, relation: &R, query: &O, k: usize) -> Result<DistanceList>
    where
        R: Relation<Object = O>,
    {
        self.tree.knn(relation, query, k)
    }

    pub fn range<R>(&self, relation: &R, query: &O, radius: f64) -> Result<DistanceList>
    where
        R: Relation<Object = O>,
    {
        self.tree.range(relation, query, radius)
    }

    pub fn priority<'a, R>(
        &'a self,
        relation: &'a R,
        query: &'a O,
    ) -> PriorityCursor<MetricSearch<'a, O, D, R>>
    where
        R: Relation<Object = O>,
    {
        self.tree.priority(relation, query)
    }

    /// Objects having `id` among their `k` nearest neighbors, `k <= k_max`.
    ///
    /// Unknown ids have no reverse neighbors.
    pub fn rknn<R>(&self, relation: &R, id: Oid, k: usize) -> Result<DistanceList>
    where
        R: Relation<Object = O>,
    {
        check_k(k)?;
        if k > self.k_max {
            return Err(IndexError::invalid(format!(
                "k = {} exceeds k_max = {}",
                k, self.k_max
            )));
        }
        self.statistics().count_rknn_query();
        let Some(query) = relation.get(id) else {
            return Ok(DistanceList::default());
        };
        let candidates = self.reverse_candidates(relation, query)?;
        if k == self.k_max {
            return Ok(DistanceList::from_unsorted(candidates));
        }
        let mut found = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if candidate.distance <= self.k_distance(relation, candidate.oid, k)? {
                found.push(candidate);
            }
        }
        Ok(DistanceList::from_unsorted(found))
    }

    /// Verify the M-tree invariants plus the exact k_max-distance of every
    /// object.
    pub fn check_integrity<R>(&self, relation: &R) -> Result<()>
    where
        R: Relation<Object = O>,
    {
        self.tree.check_integrity(relation)?;
        for entry in self.tree.core.leaf_entries()? {
            let oid = entry.object();
            let expected = self.k_distance(relation, oid, self.k_max)?;
            let stored = entry.knn_distance().unwrap_or(f64::NAN);
            let equal = stored == expected || (stored - expected).abs() <= 1e-9 * expected.abs();
            if !equal {
                return Err(IndexError::corrupted(format!(
                    "object {} stores k-distance {}, actual {}",
                    oid, stored, expected
                )));
            }
        }
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let settings = MkMaxSettings::new(self.tree.settings().clone(), self.k_max);
        persistence::save(
            path,
            self.tree.core.header(),
            &settings,
            self.tree.core.page_file(),
        )
    }

    pub fn open(path: impl AsRef<Path>, distance: D) -> Result<Self> {
        let (header, settings, pages) = persistence::load::<MTreeEntry, MkMaxSettings>(path)?;
        settings.validate()?;
        let core = TreeCore::from_parts(header, pages)?;
        Ok(Self {
            tree: MTree::from_parts(core, distance, settings.mtree)?,
            k_max: settings.k_max,
        })
    }

    /// Objects `p` in the tree with `d(p, query) <= kdist_kmax(p)`.
    fn reverse_candidates<R>(&self, relation: &R, query: &O) -> Result<Vec<Neighbor>>
    where
        R: Relation<Object = O>,
    {
        let mut found = Vec::new();
        let mut stack = vec![PageId::ROOT];
        while let Some(page) = stack.pop() {
            let node = self.tree.core.node(page)?;
            for entry in &node.entries {
                let bound = entry.knn_distance().unwrap_or(f64::INFINITY);
                let object = self.tree.object(relation, entry.object())?;
                let distance = self.tree.measure(object, query);
                match entry {
                    MTreeEntry::Leaf { oid, .. } => {
                        if distance <= bound {
                            found.push(Neighbor::new(*oid, distance));
                        }
                    }
                    MTreeEntry::Routing {
                        child,
                        covering_radius,
                        ..
                    } => {
                        if ball_lower_bound(distance, *covering_radius) <= bound {
                            stack.push(*child);
                        }
                    }
                }
            }
        }
        Ok(found)
    }

    /// Distance from `oid` to its k-th nearest neighbor in the tree.
    fn k_distance<R>(&self, relation: &R, oid: Oid, k: usize) -> Result<f64>
    where
        R: Relation<Object = O>,
    {
        let object = self.tree.object(relation, oid)?;
        let neighbors = self.tree.knn(relation, object, k)?;
        if neighbors.len() < k {
            return Ok(f64::INFINITY);
        }
        Ok(neighbors.last().map_or(f64::INFINITY, |n| n.distance))
    }

    /// Store a new k-distance for one object and refresh the bounds above it.
    fn set_k_distance<R>(&mut self, relation: &R, oid: Oid, k_distance: f64) -> Result<()>
    where
        R: Relation<Object = O>,
    {
        let path = self
            .tree
            .find_path(relation, oid)?
            .ok_or_else(|| IndexError::corrupted(format!("object {} not found in the tree", oid)))?;
        let slot = path
            .entry_slot()
            .ok_or_else(|| IndexError::corrupted("path does not end at an entry"))?;
        let mut leaf = self.tree.core.node(path.node())?.clone();
        let entry = leaf
            .entries
            .get_mut(slot)
            .ok_or_else(|| IndexError::corrupted("stale path slot"))?;
        if entry.knn_distance() == Some(k_distance) {
            return Ok(());
        }
        entry.set_knn_distance(Some(k_distance));
        self.tree.core.write_node(leaf);
        self.tree.core.adjust_path(&path)
    }

    /// Apply k-distances to every leaf entry below `page`, recomputing the
    /// aggregated bounds on the way up. Returns the subtree's bound.
    fn refresh_subtree(&mut self, page: PageId, k_distances: &HashMap<Oid, f64>) -> Result<Option<f64>> {
        let mut node = self.tree.core.node(page)?.clone();
        for entry in node.entries.iter_mut() {
            let value = match entry {
                MTreeEntry::Leaf {
                    oid, knn_distance, ..
                } => k_distances.get(oid).copied().or(*knn_distance),
                MTreeEntry::Routing { child, .. } => {
                    let child = *child;
                    self.refresh_subtree(child, k_distances)?
                }
            };
            entry.set_knn_distance(value);
        }
        let bound = aggregate_knn(&node.entries);
        self.tree.core.write_node(node);
        Ok(bound)
    }
}
