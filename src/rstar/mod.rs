//! R*-tree over vectors.
//!
//! Leaf entries keep a copy of each object's coordinates, so searches never
//! touch the relation. Insertion uses forced reinsertion and the topological
//! split; bulk loads pack leaves sort-tile-recursively. [`RdKnnTree`] adds
//! k-distances for reverse kNN queries.

pub mod bulk;
pub mod entry;
mod insert;
pub mod rdknn;
pub mod search;
pub mod split;

pub use entry::SpatialEntry;
pub use rdknn::RdKnnTree;
pub use search::SpatialSearch;

use crate::distance::SpatialDistance;
use crate::error::{check_k, check_radius, IndexError, Result};
use crate::page::Page;
use crate::persistence;
use crate::query::best_first::{knn_search, range_search, PriorityCursor};
use crate::query::DistanceList;
use crate::relation::{Oid, Relation};
use crate::settings::RStarTreeSettings;
use crate::statistics::Statistics;
use crate::tree::{Node, TreeCore, TreePath, TreeStats};
use crate::vector::Vector;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings stored alongside the nodes of a saved tree.
#[derive(Debug, Serialize, Deserialize)]
struct RStarMeta {
    settings: RStarTreeSettings,
    dimension: Option<usize>,
}

/// An R*-tree index.
#[derive(Debug)]
pub struct RStarTree {
    core: TreeCore<SpatialEntry>,
    settings: RStarTreeSettings,
    dimension: Option<usize>,
}

impl RStarTree {
    /// Create an empty tree.
    pub fn new(settings: RStarTreeSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            core: TreeCore::new(settings.header()),
            settings,
            dimension: None,
        })
    }

    /// Bulk-load a tree over every object of a relation.
    pub fn from_relation<R>(relation: &R, settings: RStarTreeSettings) -> Result<Self>
    where
        R: Relation<Object = Vector>,
    {
        let mut tree = Self::new(settings)?;
        let ids = relation.ids();
        tree.bulk_load(ids.iter().filter_map(|&id| relation.get(id).map(|v| (id, v))))?;
        Ok(tree)
    }

    pub fn settings(&self) -> &RStarTreeSettings {
        &self.settings
    }

    /// Dimensionality of the indexed vectors; `None` until the first insert.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn height(&self) -> usize {
        self.core.height()
    }

    pub fn len(&self) -> usize {
        self.core.size()
    }

    pub fn is_empty(&self) -> bool {
        self.core.is_empty()
    }

    pub fn statistics(&self) -> &Statistics {
        self.core.statistics()
    }

    pub fn stats(&self) -> TreeStats {
        self.core.stats()
    }

    pub fn core(&self) -> &TreeCore<SpatialEntry> {
        &self.core
    }

    /// Insert one object.
    pub fn insert(&mut self, oid: Oid, vector: &Vector) -> Result<()> {
        self.accept_dimension(vector.dimension())?;
        let entry = SpatialEntry::leaf(oid, vector.as_slice().to_vec());
        self.insert_at_level(entry, 0, &mut Vec::new())?;
        self.core.header_mut().size += 1;
        Ok(())
    }

    /// Pack objects directly into leaves. Only allowed on an empty tree.
    pub fn bulk_load<'v>(
        &mut self,
        objects: impl IntoIterator<Item = (Oid, &'v Vector)>,
    ) -> Result<()> {
        if !self.is_empty() {
            return Err(IndexError::Unsupported {
                operation: "bulk load into a non-empty tree",
                index: "RStarTree",
            });
        }
        let mut dimension = self.dimension;
        let mut entries = Vec::new();
        for (oid, vector) in objects {
            match dimension {
                Some(expected) => vector.check_dimension(expected)?,
                None => dimension = Some(vector.dimension()),
            }
            entries.push(SpatialEntry::leaf(oid, vector.as_slice().to_vec()));
        }
        if entries.is_empty() {
            return Ok(());
        }
        if dimension == Some(0) {
            return Err(IndexError::invalid("cannot index zero-dimensional vectors"));
        }
        self.dimension = dimension;
        self.core
            .bulk_load_levels(entries, bulk::str_partition, directory_entry)?;
        debug!(
            "bulk loaded {} objects, height {}",
            self.len(),
            self.height()
        );
        Ok(())
    }

    /// Remove an object stored at `vector`. Returns `false` if it is not in the tree.
    pub fn delete(&mut self, oid: Oid, vector: &Vector) -> Result<bool> {
        let Some(path) = self.find_path(oid, vector)? else {
            return Ok(false);
        };
        let (_, orphans) = self.core.delete_path(&path)?;
        for entry in orphans {
            self.insert_at_level(entry, 0, &mut Vec::new())?;
        }
        Ok(true)
    }

    /// Path from the root to the leaf entry of `oid`, searching only
    /// subtrees whose rectangle contains `vector`.
    pub fn find_path(&self, oid: Oid, vector: &Vector) -> Result<Option<TreePath>> {
        if self.dimension != Some(vector.dimension()) {
            return Ok(None);
        }
        let coords = vector.as_slice();
        self.core
            .find_path_to_object(&TreePath::root(), oid, &|e: &SpatialEntry| {
                e.may_contain(coords)
            })
    }

    /// Every leaf entry, in tree order.
    pub fn leaf_entries(&self) -> Result<Vec<SpatialEntry>> {
        self.core.leaf_entries()
    }

    /// The `k` nearest objects to `query`.
    pub fn knn(
        &self,
        distance: &dyn SpatialDistance,
        query: &[f64],
        k: usize,
    ) -> Result<DistanceList> {
        check_k(k)?;
        self.check_query(query)?;
        self.statistics().count_knn_query();
        knn_search(&SpatialSearch::new(self, distance, query), k)
    }

    /// All objects within `radius` of `query`.
    pub fn range(
        &self,
        distance: &dyn SpatialDistance,
        query: &[f64],
        radius: f64,
    ) -> Result<DistanceList> {
        check_radius(radius)?;
        self.check_query(query)?;
        self.statistics().count_range_query();
        range_search(&SpatialSearch::new(self, distance, query), radius)
    }

    /// Objects in ascending distance from `query`, computed lazily.
    pub fn priority<'a>(
        &'a self,
        distance: &'a dyn SpatialDistance,
        query: &'a [f64],
    ) -> Result<PriorityCursor<SpatialSearch<'a>>> {
        self.check_query(query)?;
        Ok(PriorityCursor::new(SpatialSearch::new(self, distance, query)))
    }

    /// Verify capacities, leaf depth, object count and that every
    /// directory rectangle covers its child.
    pub fn check_integrity(&self) -> Result<()> {
        let dimension = self.dimension;
        self.core.check_integrity(&mut |entry, child| {
            let SpatialEntry::Directory { mbr, .. } = entry else {
                return Err(IndexError::corrupted("leaf entry in directory node"));
            };
            if Some(mbr.dimension()) != dimension {
                return Err(IndexError::corrupted(format!(
                    "rectangle of page {} has dimension {}",
                    child.page_id(),
                    mbr.dimension()
                )));
            }
            if let Some(below) = entry::aggregate_knn(&child.entries) {
                if entry.knn_distance().map_or(true, |bound| bound < below) {
                    return Err(IndexError::corrupted(format!(
                        "k-distance bound of page {} is below its entries",
                        child.page_id()
                    )));
                }
            }
            match entry::node_mbr(&child.entries) {
                Some(actual) if mbr.contains(&actual) => Ok(()),
                Some(_) => Err(IndexError::corrupted(format!(
                    "rectangle of page {} does not cover its entries",
                    child.page_id()
                ))),
                None => Err(IndexError::corrupted(format!(
                    "empty non-root page {}",
                    child.page_id()
                ))),
            }
        })
    }

    /// Write the tree to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let meta = RStarMeta {
            settings: self.settings.clone(),
            dimension: self.dimension,
        };
        persistence::save(path, self.core.header(), &meta, self.core.page_file())
    }

    /// Read a tree written by [`RStarTree::save`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let (header, meta, pages) = persistence::load::<SpatialEntry, RStarMeta>(path)?;
        meta.settings.validate()?;
        Ok(Self {
            core: TreeCore::from_parts(header, pages)?,
            settings: meta.settings,
            dimension: meta.dimension,
        })
    }

    fn accept_dimension(&mut self, dimension: usize) -> Result<()> {
        match self.dimension {
            Some(expected) if expected != dimension => Err(IndexError::DimensionMismatch {
                expected,
                actual: dimension,
            }),
            Some(_) => Ok(()),
            None if dimension == 0 => Err(IndexError::invalid("cannot index zero-dimensional vectors")),
            None => {
                self.dimension = Some(dimension);
                Ok(())
            }
        }
    }

    fn check_query(&self, query: &[f64]) -> Result<()> {
        match self.dimension {
            Some(expected) if expected != query.len() => Err(IndexError::DimensionMismatch {
                expected,
                actual: query.len(),
            }),
            _ => Ok(()),
        }
    }
}

/// Directory entry for a node that has just been written.
pub(crate) fn directory_entry(node: &Node<SpatialEntry>) -> Result<SpatialEntry> {
    SpatialEntry::directory(node).ok_or_else(|| {
        IndexError::corrupted(format!(
            "empty page {} cannot be linked into its parent",
            node.page_id()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceMetric;
    use crate::query::LinearScan;
    use crate::relation::MemoryRelation;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use tempfile::TempDir;

    fn random_relation(n: usize, dim: usize, seed: u64) -> MemoryRelation<Vector> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| Vector::new((0..dim).map(|_| rng.gen_range(0.0..100.0)).collect()))
            .collect()
    }

    fn small_settings() -> RStarTreeSettings {
        RStarTreeSettings::new(8, 8)
    }

    #[test]
    fn test_empty_tree() {
        let tree = RStarTree::new(small_settings()).unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.height(), 1);
        let result = tree.knn(&DistanceMetric::Euclidean, &[0.0, 0.0], 3).unwrap();
        assert!(result.is_empty());
        tree.check_integrity().unwrap();
    }

    #[test]
    fn test_insert_grows_and_stays_valid() {
        let relation = random_relation(300, 2, 1);
        let mut tree = RStarTree::new(small_settings()).unwrap();
        for (oid, v) in relation.iter() {
            tree.insert(oid, v).unwrap();
        }
        assert_eq!(tree.len(), 300);
        assert!(tree.height() >= 3);
        tree.check_integrity().unwrap();

        for (oid, v) in relation.iter() {
            assert!(tree.find_path(oid, v).unwrap().is_some(), "{} not found", oid);
        }
    }

    #[test]
    fn test_insert_matches_linear_scan() {
        let relation = random_relation(400, 3, 2);
        let mut tree = RStarTree::new(small_settings()).unwrap();
        for (oid, v) in relation.iter() {
            tree.insert(oid, v).unwrap();
        }
        let scan = LinearScan::new(&relation, &DistanceMetric::Euclidean);
        let queries = random_relation(20, 3, 3);
        for (_, q) in queries.iter() {
            let expected = scan.knn(q, 7).unwrap();
            let actual = tree.knn(&DistanceMetric::Euclidean, q.as_slice(), 7).unwrap();
            assert_eq!(actual.oids(), expected.oids());
        }
    }

    #[test]
    fn test_bulk_load_only_on_empty_tree() {
        let relation = random_relation(50, 2, 4);
        let mut tree = RStarTree::from_relation(&relation, small_settings()).unwrap();
        assert_eq!(tree.len(), 50);
        tree.check_integrity().unwrap();

        let err = tree.bulk_load(relation.iter()).unwrap_err();
        assert!(err.is_unsupported());
        assert_eq!(tree.len(), 50);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut tree = RStarTree::new(small_settings()).unwrap();
        tree.insert(Oid(0), &Vector::new(vec![1.0, 2.0])).unwrap();
        assert!(matches!(
            tree.insert(Oid(1), &Vector::new(vec![1.0, 2.0, 3.0])),
            Err(IndexError::DimensionMismatch { expected: 2, actual: 3 })
        ));
        assert!(tree.knn(&DistanceMetric::Euclidean, &[1.0], 1).is_err());
    }

    #[test]
    fn test_invalid_query_parameters() {
        let tree = RStarTree::from_relation(&random_relation(10, 2, 5), small_settings()).unwrap();
        assert!(matches!(
            tree.knn(&DistanceMetric::Euclidean, &[0.0, 0.0], 0),
            Err(IndexError::InvalidParameter { .. })
        ));
        assert!(matches!(
            tree.range(&DistanceMetric::Euclidean, &[0.0, 0.0], -1.0),
            Err(IndexError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_delete_all() {
        let relation = random_relation(200, 2, 6);
        let mut tree = RStarTree::from_relation(&relation, small_settings()).unwrap();

        for (i, (oid, v)) in relation.iter().enumerate() {
            assert!(tree.delete(oid, v).unwrap());
            assert!(!tree.delete(oid, v).unwrap());
            assert_eq!(tree.len(), 200 - i - 1);
            if i % 25 == 0 {
                tree.check_integrity().unwrap();
            }
        }
        assert!(tree.is_empty());
        assert_eq!(tree.height(), 1);
        tree.check_integrity().unwrap();
    }

    #[test]
    fn test_delete_keeps_remaining_objects() {
        let relation = random_relation(150, 2, 7);
        let mut tree = RStarTree::from_relation(&relation, small_settings()).unwrap();
        for (oid, v) in relation.iter().filter(|(oid, _)| oid.0 % 2 == 0) {
            assert!(tree.delete(oid, v).unwrap());
        }
        tree.check_integrity().unwrap();
        for (oid, v) in relation.iter() {
            assert_eq!(tree.find_path(oid, v).unwrap().is_some(), oid.0 % 2 == 1);
        }
    }

    #[test]
    fn test_priority_cursor_matches_knn() {
        let relation = random_relation(120, 2, 8);
        let tree = RStarTree::from_relation(&relation, small_settings()).unwrap();
        let query = [50.0, 50.0];
        let knn = tree.knn(&DistanceMetric::Manhattan, &query, 15).unwrap();
        let incremental: Vec<Oid> = tree
            .priority(&DistanceMetric::Manhattan, &query)
            .unwrap()
            .take(15)
            .map(|n| n.unwrap().oid)
            .collect();
        assert_eq!(incremental, knn.oids());
    }

    #[test]
    fn test_save_and_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rstar.idx");
        let relation = random_relation(100, 2, 9);
        let tree = RStarTree::from_relation(&relation, small_settings()).unwrap();
        tree.save(&path).unwrap();

        let reopened = RStarTree::open(&path).unwrap();
        assert_eq!(reopened.len(), 100);
        assert_eq!(reopened.height(), tree.height());
        assert_eq!(reopened.dimension(), Some(2));
        reopened.check_integrity().unwrap();
        let q = [10.0, 90.0];
        assert_eq!(
            reopened.knn(&DistanceMetric::Euclidean, &q, 5).unwrap(),
            tree.knn(&DistanceMetric::Euclidean, &q, 5).unwrap()
        );
    }
}
