//! RdKNN tree: an R*-tree whose entries carry k_max-nearest-neighbor
//! distances, answering reverse kNN queries for any k up to k_max.
//!
//! A directory entry stores the largest k-distance below it, so a subtree
//! whose rectangle is farther from the query than that bound holds no
//! reverse neighbor. Unlike the MkMax tree, objects can be deleted: only
//! the reverse neighbors of the removed object change their k-distance.

use super::entry::{aggregate_knn, SpatialEntry};
use super::search::SpatialSearch;
use super::RStarTree;
use crate::distance::{Distance, SpatialDistance};
use crate::error::{check_k, IndexError, Result};
use crate::page::PageId;
use crate::persistence;
use crate::query::best_first::PriorityCursor;
use crate::query::{DistanceList, Neighbor};
use crate::relation::{Oid, Relation};
use crate::settings::RdKnnSettings;
use crate::statistics::Statistics;
use crate::tree::{TreeCore, TreePath, TreeStats};
use crate::vector::Vector;
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
struct RdKnnMeta {
    settings: RdKnnSettings,
    dimension: Option<usize>,
}

#[derive(Debug)]
pub struct RdKnnTree<D> {
    tree: RStarTree,
    distance: D,
    k_max: usize,
}

impl<D: Distance<Vector>> RdKnnTree<D> {
    pub fn new(distance: D, settings: RdKnnSettings) -> Result<Self> {
        settings.validate()?;
        let tree = RStarTree::new(settings.rstar)?;
        Self::from_parts(tree, distance, settings.k_max)
    }

    fn from_parts(tree: RStarTree, distance: D, k_max: usize) -> Result<Self> {
        if distance.as_spatial().is_none() {
            return Err(IndexError::invalid(
                "RdKNN trees require a distance with a rectangle lower bound",
            ));
        }
        Ok(Self {
            tree,
            distance,
            k_max,
        })
    }

    /// Bulk-load a tree over every object of a relation.
    pub fn from_relation<R>(relation: &R, distance: D, settings: RdKnnSettings) -> Result<Self>
    where
        D: Sync,
        R: Relation<Object = Vector>,
    {
        let mut tree = Self::new(distance, settings)?;
        let ids = relation.ids();
        tree.bulk_load(ids.iter().filter_map(|&id| relation.get(id).map(|v| (id, v))))?;
        Ok(tree)
    }

    pub fn k_max(&self) -> usize {
        self.k_max
    }

    /// The underlying R*-tree.
    pub fn tree(&self) -> &RStarTree {
        &self.tree
    }

    pub fn distance(&self) -> &D {
        &self.distance
    }

    pub fn dimension(&self) -> Option<usize> {
        self.tree.dimension()
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
    pub fn insert(&mut self, oid: Oid, vector: &Vector) -> Result<()> {
        self.tree.check_query(vector.as_slice())?;
        let mut affected = self.reverse_candidates(vector.as_slice())?;
        self.tree.insert(oid, vector)?;
        affected.push((Neighbor::new(oid, 0.0), vector.as_slice().to_vec()));
        self.update_k_distances(affected)?;
        debug!("insert {}: k-distances refreshed", oid);
        Ok(())
    }

    /// Pack objects into leaves, then compute every k-distance at once.
    pub fn bulk_load<'v>(
        &mut self,
        objects: impl IntoIterator<Item = (Oid, &'v Vector)>,
    ) -> Result<()>
    where
        D: Sync,
    {
        self.tree.bulk_load(objects)?;
        let leaves = self.tree.leaf_entries()?;

        let this = &*self;
        let k_distances = leaves
            .par_iter()
            .filter_map(|entry| match entry {
                SpatialEntry::Leaf { oid, coords, .. } => Some((*oid, coords)),
                SpatialEntry::Directory { .. } => None,
            })
            .map(|(oid, coords)| Ok((oid, this.k_distance(coords, this.k_max)?)))
            .collect::<Result<HashMap<Oid, f64>>>()?;
        self.refresh_subtree(PageId::ROOT, &k_distances)?;
        debug!("computed {} k-distances for k_max = {}", k_distances.len(), self.k_max);
        Ok(())
    }

    /// Remove an object stored at `vector`. Returns `false` if it is not in
    /// the tree.
    ///
    /// The k-distances of the removed object's reverse neighbors grow back
    /// to their value without it.
    pub fn delete(&mut self, oid: Oid, vector: &Vector) -> Result<bool> {
        if self.tree.find_path(oid, vector)?.is_none() {
            return Ok(false);
        }
        let affected: Vec<(Neighbor, Vec<f64>)> = self
            .reverse_candidates(vector.as_slice())?
            .into_iter()
            .filter(|(n, _)| n.oid != oid)
            .collect();
        self.tree.delete(oid, vector)?;
        debug!("delete {}: {} k-distances to refresh", oid, affected.len());
        self.update_k_distances(affected)?;
        Ok(true)
    }

    pub fn knn(&self, query: &[f64], k: usize) -> Result<DistanceList> {
        self.tree.knn(self.spatial()?, query, k)
    }

    pub fn range(&self, query: &[f64], radius: f64) -> Result<DistanceList> {
        self.tree.range(self.spatial()?, query, radius)
    }

    pub fn priority<'a>(&'a self, query: &'a [f64]) -> Result<PriorityCursor<SpatialSearch<'a>>> {
        self.tree.priority(self.spatial()?, query)
    }

    /// Objects having `query` among their `k` nearest neighbors, `k <= k_max`.
    pub fn rknn(&self, query: &Vector, k: usize) -> Result<DistanceList> {
        self.check_rknn_k(k)?;
        self.tree.check_query(query.as_slice())?;
        self.statistics().count_rknn_query();
        let candidates = self.reverse_candidates(query.as_slice())?;
        if k == self.k_max {
            return Ok(DistanceList::from_unsorted(
                candidates.into_iter().map(|(n, _)| n).collect(),
            ));
        }
        let mut found = Vec::with_capacity(candidates.len());
        for (candidate, coords) in candidates {
            if candidate.distance <= self.k_distance(&coords, k)? {
                found.push(candidate);
            }
        }
        Ok(DistanceList::from_unsorted(found))
    }

    pub(crate) fn check_rknn_k(&self, k: usize) -> Result<()> {
        check_k(k)?;
        if k > self.k_max {
            return Err(IndexError::invalid(format!(
                "k = {} exceeds k_max = {}",
                k, self.k_max
            )));
        }
        Ok(())
    }

    /// Verify the R*-tree invariants plus the exact k_max-distance of every
    /// object.
    pub fn check_integrity(&self) -> Result<()> {
        self.tree.check_integrity()?;
        for entry in self.tree.leaf_entries()? {
            let SpatialEntry::Leaf {
                oid,
                coords,
                knn_distance,
            } = entry
            else {
                return Err(IndexError::corrupted("directory entry in leaf node"));
            };
            let expected = self.k_distance(&coords, self.k_max)?;
            let stored = knn_distance.unwrap_or(f64::NAN);
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
        let meta = RdKnnMeta {
            settings: RdKnnSettings::new(self.tree.settings.clone(), self.k_max),
            dimension: self.tree.dimension,
        };
        persistence::save(path, self.tree.core.header(), &meta, self.tree.core.page_file())
    }

    pub fn open(path: impl AsRef<Path>, distance: D) -> Result<Self> {
        let (header, meta, pages) = persistence::load::<SpatialEntry, RdKnnMeta>(path)?;
        meta.settings.validate()?;
        let tree = RStarTree {
            core: TreeCore::from_parts(header, pages)?,
            settings: meta.settings.rstar,
            dimension: meta.dimension,
        };
        Self::from_parts(tree, distance, meta.settings.k_max)
    }

    fn spatial(&self) -> Result<&dyn SpatialDistance> {
        self.distance
            .as_spatial()
            .ok_or_else(|| IndexError::invalid("distance has no rectangle lower bound"))
    }

    /// Objects `p` in the tree with `d(p, query) <= kdist_kmax(p)`, with
    /// their coordinates.
    fn reverse_candidates(&self, query: &[f64]) -> Result<Vec<(Neighbor, Vec<f64>)>> {
        let spatial = self.spatial()?;
        let statistics = self.tree.statistics();
        let mut found = Vec::new();
        let mut stack = vec![PageId::ROOT];
        while let Some(page) = stack.pop() {
            let node = self.tree.core.node(page)?;
            for entry in &node.entries {
                let bound = entry.knn_distance().unwrap_or(f64::INFINITY);
                match entry {
                    SpatialEntry::Leaf { oid, coords, .. } => {
                        statistics.count_distance();
                        let distance = spatial.point_distance(coords, query);
                        if distance <= bound {
                            found.push((Neighbor::new(*oid, distance), coords.clone()));
                        }
                    }
                    SpatialEntry::Directory { child, mbr, .. } => {
                        if spatial.min_dist(query, mbr) <= bound {
                            stack.push(*child);
                        }
                    }
                }
            }
        }
        Ok(found)
    }

    /// Distance from the point `coords` to its k-th nearest neighbor in the tree.
    fn k_distance(&self, coords: &[f64], k: usize) -> Result<f64> {
        let neighbors = self.knn(coords, k)?;
        if neighbors.len() < k {
            return Ok(f64::INFINITY);
        }
        Ok(neighbors.last().map_or(f64::INFINITY, |n| n.distance))
    }

    /// Recompute the k_max-distances of `objects` and store them.
    fn update_k_distances(&mut self, objects: Vec<(Neighbor, Vec<f64>)>) -> Result<()> {
        let mut updates = Vec::with_capacity(objects.len());
        for (neighbor, coords) in objects {
            let k_distance = self.k_distance(&coords, self.k_max)?;
            updates.push((neighbor.oid, coords, k_distance));
        }
        for (oid, coords, k_distance) in updates {
            self.set_k_distance(oid, &coords, k_distance)?;
        }
        Ok(())
    }

    /// Store a new k-distance for one object and refresh the bounds above it.
    fn set_k_distance(&mut self, oid: Oid, coords: &[f64], k_distance: f64) -> Result<()> {
        let path = self
            .tree
            .core
            .find_path_to_object(&TreePath::root(), oid, &|e: &SpatialEntry| {
                e.may_contain(coords)
            })?
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
    /// directory bounds on the way up. Returns the subtree's bound.
    fn refresh_subtree(
        &mut self,
        page: PageId,
        k_distances: &HashMap<Oid, f64>,
    ) -> Result<Option<f64>> {
        let mut node = self.tree.core.node(page)?.clone();
        for entry in node.entries.iter_mut() {
            let value = match entry {
                SpatialEntry::Leaf {
                    oid, knn_distance, ..
                } => k_distances.get(oid).copied().or(*knn_distance),
                SpatialEntry::Directory { child, .. } => {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceMetric;
    use crate::query::LinearScan;
    use crate::relation::MemoryRelation;
    use crate::settings::RStarTreeSettings;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use tempfile::TempDir;

    fn random_relation(n: usize, seed: u64) -> MemoryRelation<Vector> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| Vector::new(vec![rng.gen_range(0.0..10.0), rng.gen_range(0.0..10.0)]))
            .collect()
    }

    fn settings(k_max: usize) -> RdKnnSettings {
        RdKnnSettings::new(RStarTreeSettings::new(4, 4), k_max)
    }

    fn assert_rknn_matches_scan(tree: &RdKnnTree<DistanceMetric>, relation: &MemoryRelation<Vector>) {
        let scan = LinearScan::new(relation, &DistanceMetric::Euclidean);
        for (id, v) in relation.iter() {
            for k in 1..=tree.k_max() {
                assert_eq!(
                    tree.rknn(v, k).unwrap().oids(),
                    scan.rknn_by_id(id, k).unwrap().oids(),
                    "rknn of {} with k = {}",
                    id,
                    k
                );
            }
        }
    }

    #[test]
    fn test_rejects_distance_without_rectangle_bound() {
        assert!(matches!(
            RdKnnTree::new(DistanceMetric::Cosine, settings(3)),
            Err(IndexError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_bulk_load_rknn_matches_brute_force() {
        let relation = random_relation(60, 31);
        let tree = RdKnnTree::from_relation(&relation, DistanceMetric::Euclidean, settings(3)).unwrap();
        assert!(tree.height() >= 3);
        tree.check_integrity().unwrap();
        assert_rknn_matches_scan(&tree, &relation);
    }

    #[test]
    fn test_incremental_insert_keeps_k_distances() {
        let relation = random_relation(50, 32);
        let mut tree = RdKnnTree::new(DistanceMetric::Euclidean, settings(2)).unwrap();
        for (oid, v) in relation.iter() {
            tree.insert(oid, v).unwrap();
        }
        assert_eq!(tree.len(), 50);
        tree.check_integrity().unwrap();
        assert_rknn_matches_scan(&tree, &relation);
    }

    #[test]
    fn test_delete_refreshes_reverse_neighbors() {
        let relation = random_relation(80, 33);
        let mut tree = RdKnnTree::from_relation(&relation, DistanceMetric::Euclidean, settings(3)).unwrap();
        let mut remaining = MemoryRelation::new();
        for (oid, v) in relation.iter() {
            if oid.0 % 3 == 0 {
                assert!(tree.delete(oid, v).unwrap());
                assert!(!tree.delete(oid, v).unwrap());
            } else {
                remaining.insert(oid, v.clone());
            }
        }
        assert_eq!(tree.len(), remaining.len());
        tree.check_integrity().unwrap();
        assert_rknn_matches_scan(&tree, &remaining);
    }

    #[test]
    fn test_fewer_objects_than_k_max() {
        let relation = random_relation(3, 34);
        let tree = RdKnnTree::from_relation(&relation, DistanceMetric::Euclidean, settings(5)).unwrap();
        for entry in tree.tree().leaf_entries().unwrap() {
            assert_eq!(entry.knn_distance(), Some(f64::INFINITY));
        }
        let query = relation.get(Oid(0)).unwrap();
        assert_eq!(tree.rknn(query, 5).unwrap().len(), 3);
    }

    #[test]
    fn test_invalid_rknn_queries() {
        let relation = random_relation(20, 35);
        let tree = RdKnnTree::from_relation(&relation, DistanceMetric::Euclidean, settings(3)).unwrap();
        let query = relation.get(Oid(1)).unwrap();
        assert!(matches!(tree.rknn(query, 0), Err(IndexError::InvalidParameter { .. })));
        assert!(matches!(tree.rknn(query, 4), Err(IndexError::InvalidParameter { .. })));
        assert!(matches!(
            tree.rknn(&Vector::new(vec![1.0, 2.0, 3.0]), 2),
            Err(IndexError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_save_and_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rdknn.idx");
        let relation = random_relation(40, 36);
        let tree = RdKnnTree::from_relation(&relation, DistanceMetric::Euclidean, settings(3)).unwrap();
        tree.save(&path).unwrap();

        let reopened = RdKnnTree::open(&path, DistanceMetric::Euclidean).unwrap();
        assert_eq!(reopened.k_max(), 3);
        assert_eq!(reopened.len(), 40);
        reopened.check_integrity().unwrap();
        let query = relation.get(Oid(7)).unwrap();
        assert_eq!(reopened.rknn(query, 2).unwrap(), tree.rknn(query, 2).unwrap());
    }
}
