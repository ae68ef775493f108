//! Index traits for pluggable query backends.
//!
//! An index is asked for a searcher bound to a distance function. It answers
//! `None` when it cannot accelerate queries under that distance, and the
//! caller falls back to a [`LinearScan`]; [`QueryBuilder`] does exactly that.

use super::heap::{DistanceList, Neighbor};
use super::linear::LinearScan;
use crate::distance::{Distance, SpatialDistance};
use crate::error::{check_k, check_radius, Result};
use crate::mtree::{MTree, MkMaxTree};
use crate::relation::{Oid, Relation};
use crate::rstar::{RStarTree, RdKnnTree};
use crate::settings::{MTreeSettings, MkMaxSettings, RStarTreeSettings, RdKnnSettings};
use crate::vector::Vector;
use log::debug;

/// Lazily computed neighbors in ascending (distance, oid) order.
pub type NeighborIter<'a> = Box<dyn Iterator<Item = Result<Neighbor>> + 'a>;

pub trait KnnQuery<O> {
    fn knn_by_object(&self, query: &O, k: usize) -> Result<DistanceList>;

    /// KNN of a stored object; empty if the id is unknown.
    fn knn_by_id(&self, id: Oid, k: usize) -> Result<DistanceList>;
}

pub trait RangeQuery<O> {
    fn range_by_object(&self, query: &O, radius: f64) -> Result<DistanceList>;

    /// Range query around a stored object; empty if the id is unknown.
    fn range_by_id(&self, id: Oid, radius: f64) -> Result<DistanceList>;
}

pub trait PriorityQuery<O> {
    fn priority_by_object<'q>(&'q self, query: &'q O) -> Result<NeighborIter<'q>>;
}

pub trait RknnQuery {
    /// Objects having `id` among their `k` nearest neighbors.
    fn rknn_by_id(&self, id: Oid, k: usize) -> Result<DistanceList>;
}

/// A search structure over a relation.
///
/// Each constructor returns `None` if the index cannot answer that kind of
/// query under `distance`.
pub trait Index<O, D> {
    fn knn_query<'a>(&'a self, distance: &'a D) -> Option<Box<dyn KnnQuery<O> + 'a>>;

    fn range_query<'a>(&'a self, distance: &'a D) -> Option<Box<dyn RangeQuery<O> + 'a>>;

    fn priority_query<'a>(&'a self, distance: &'a D) -> Option<Box<dyn PriorityQuery<O> + 'a>>;

    fn rknn_query<'a>(&'a self, _distance: &'a D) -> Option<Box<dyn RknnQuery + 'a>> {
        None
    }
}

/// Builds an index over a relation.
pub trait IndexFactory<'r, R: Relation> {
    type Index: 'r;

    fn instantiate(&self, relation: &'r R) -> Result<Self::Index>;
}

impl<O, R, D> KnnQuery<O> for LinearScan<'_, R, D>
where
    R: Relation<Object = O>,
    D: Distance<O>,
{
    fn knn_by_object(&self, query: &O, k: usize) -> Result<DistanceList> {
        self.knn(query, k)
    }

    fn knn_by_id(&self, id: Oid, k: usize) -> Result<DistanceList> {
        LinearScan::knn_by_id(self, id, k)
    }
}

impl<O, R, D> RangeQuery<O> for LinearScan<'_, R, D>
where
    R: Relation<Object = O>,
    D: Distance<O>,
{
    fn range_by_object(&self, query: &O, radius: f64) -> Result<DistanceList> {
        self.range(query, radius)
    }

    fn range_by_id(&self, id: Oid, radius: f64) -> Result<DistanceList> {
        LinearScan::range_by_id(self, id, radius)
    }
}

impl<O, R, D> PriorityQuery<O> for LinearScan<'_, R, D>
where
    R: Relation<Object = O>,
    D: Distance<O>,
{
    fn priority_by_object<'q>(&'q self, query: &'q O) -> Result<NeighborIter<'q>> {
        Ok(Box::new(self.ranking(query).into_iter().map(Ok)))
    }
}

impl<R, D> RknnQuery for LinearScan<'_, R, D>
where
    R: Relation,
    D: Distance<R::Object>,
{
    fn rknn_by_id(&self, id: Oid, k: usize) -> Result<DistanceList> {
        LinearScan::rknn_by_id(self, id, k)
    }
}

/// An R*-tree over a vector relation.
///
/// Accelerates any distance with a spatial lower bound.
#[derive(Debug)]
pub struct RStarTreeIndex<'r, R> {
    tree: RStarTree,
    relation: &'r R,
}

impl<'r, R: Relation<Object = Vector>> RStarTreeIndex<'r, R> {
    pub fn new(tree: RStarTree, relation: &'r R) -> Self {
        Self { tree, relation }
    }

    pub fn tree(&self) -> &RStarTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut RStarTree {
        &mut self.tree
    }

    fn searcher<'a>(&'a self, distance: &'a dyn Distance<Vector>) -> Option<RStarSearcher<'a, R>> {
        let spatial = distance.as_spatial()?;
        Some(RStarSearcher {
            tree: &self.tree,
            relation: self.relation,
            distance: spatial,
        })
    }
}

impl<R, D> Index<Vector, D> for RStarTreeIndex<'_, R>
where
    R: Relation<Object = Vector>,
    D: Distance<Vector>,
{
    fn knn_query<'a>(&'a self, distance: &'a D) -> Option<Box<dyn KnnQuery<Vector> + 'a>> {
        let searcher = self.searcher(distance)?;
        Some(Box::new(searcher))
    }

    fn range_query<'a>(&'a self, distance: &'a D) -> Option<Box<dyn RangeQuery<Vector> + 'a>> {
        let searcher = self.searcher(distance)?;
        Some(Box::new(searcher))
    }

    fn priority_query<'a>(&'a self, distance: &'a D) -> Option<Box<dyn PriorityQuery<Vector> + 'a>> {
        let searcher = self.searcher(distance)?;
        Some(Box::new(searcher))
    }
}

struct RStarSearcher<'a, R> {
    tree: &'a RStarTree,
    relation: &'a R,
    distance: &'a dyn SpatialDistance,
}

impl<R: Relation<Object = Vector>> KnnQuery<Vector> for RStarSearcher<'_, R> {
    fn knn_by_object(&self, query: &Vector, k: usize) -> Result<DistanceList> {
        self.tree.knn(self.distance, query.as_slice(), k)
    }

    fn knn_by_id(&self, id: Oid, k: usize) -> Result<DistanceList> {
        check_k(k)?;
        match self.relation.get(id) {
            Some(query) => self.knn_by_object(query, k),
            None => Ok(DistanceList::default()),
        }
    }
}

impl<R: Relation<Object = Vector>> RangeQuery<Vector> for RStarSearcher<'_, R> {
    fn range_by_object(&self, query: &Vector, radius: f64) -> Result<DistanceList> {
        self.tree.range(self.distance, query.as_slice(), radius)
    }

    fn range_by_id(&self, id: Oid, radius: f64) -> Result<DistanceList> {
        check_radius(radius)?;
        match self.relation.get(id) {
            Some(query) => self.range_by_object(query, radius),
            None => Ok(DistanceList::default()),
        }
    }
}

impl<R: Relation<Object = Vector>> PriorityQuery<Vector> for RStarSearcher<'_, R> {
    fn priority_by_object<'q>(&'q self, query: &'q Vector) -> Result<NeighborIter<'q>> {
        let cursor = self.tree.priority(self.distance, query.as_slice())?;
        Ok(Box::new(cursor))
    }
}

/// An M-tree over a relation.
///
/// Accelerates queries only under the distance the tree was built with.
#[derive(Debug)]
pub struct MTreeIndex<'r, O, D, R> {
    tree: MTree<O, D>,
    relation: &'r R,
}

impl<'r, O, D, R> MTreeIndex<'r, O, D, R>
where
    D: Distance<O> + PartialEq,
    R: Relation<Object = O>,
{
    pub fn new(tree: MTree<O, D>, relation: &'r R) -> Self {
        Self { tree, relation }
    }

    pub fn tree(&self) -> &MTree<O, D> {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut MTree<O, D> {
        &mut self.tree
    }

    fn searcher(&self, distance: &D) -> Option<MetricSearcher<'_, O, D, R>> {
        if distance != self.tree.distance() {
            debug!("M-tree cannot accelerate a foreign distance");
            return None;
        }
        Some(MetricSearcher {
            tree: &self.tree,
            relation: self.relation,
        })
    }
}

impl<O, D, R> Index<O, D> for MTreeIndex<'_, O, D, R>
where
    D: Distance<O> + PartialEq,
    R: Relation<Object = O>,
{
    fn knn_query<'a>(&'a self, distance: &'a D) -> Option<Box<dyn KnnQuery<O> + 'a>> {
        let searcher = self.searcher(distance)?;
        Some(Box::new(searcher))
    }

    fn range_query<'a>(&'a self, distance: &'a D) -> Option<Box<dyn RangeQuery<O> + 'a>> {
        let searcher = self.searcher(distance)?;
        Some(Box::new(searcher))
    }

    fn priority_query<'a>(&'a self, distance: &'a D) -> Option<Box<dyn PriorityQuery<O> + 'a>> {
        let searcher = self.searcher(distance)?;
        Some(Box::new(searcher))
    }
}

struct MetricSearcher<'a, O, D, R> {
    tree: &'a MTree<O, D>,
    relation: &'a R,
}

impl<O, D, R> KnnQuery<O> for MetricSearcher<'_, O, D, R>
where
    D: Distance<O>,
    R: Relation<Object = O>,
{
    fn knn_by_object(&self, query: &O, k: usize) -> Result<DistanceList> {
        self.tree.knn(self.relation, query, k)
    }

    fn knn_by_id(&self, id: Oid, k: usize) -> Result<DistanceList> {
        check_k(k)?;
        match self.relation.get(id) {
            Some(query) => self.knn_by_object(query, k),
            None => Ok(DistanceList::default()),
        }
    }
}

impl<O, D, R> RangeQuery<O> for MetricSearcher<'_, O, D, R>
where
    D: Distance<O>,
    R: Relation<Object = O>,
{
    fn range_by_object(&self, query: &O, radius: f64) -> Result<DistanceList> {
        self.tree.range(self.relation, query, radius)
    }

    fn range_by_id(&self, id: Oid, radius: f64) -> Result<DistanceList> {
        check_radius(radius)?;
        match self.relation.get(id) {
            Some(query) => self.range_by_object(query, radius),
            None => Ok(DistanceList::default()),
        }
    }
}

impl<O, D, R> PriorityQuery<O> for MetricSearcher<'_, O, D, R>
where
    D: Distance<O>,
    R: Relation<Object = O>,
{
    fn priority_by_object<'q>(&'q self, query: &'q O) -> Result<NeighborIter<'q>> {
        Ok(Box::new(self.tree.priority(self.relation, query)))
    }
}

/// An MkMax tree over a relation: an [`MTreeIndex`] that also answers
/// reverse kNN queries for k up to k_max.
#[derive(Debug)]
pub struct MkMaxTreeIndex<'r, O, D, R> {
    tree: MkMaxTree<O, D>,
    relation: &'r R,
}

impl<'r, O, D, R> MkMaxTreeIndex<'r, O, D, R>
where
    D: Distance<O> + PartialEq,
    R: Relation<Object = O>,
{
    pub fn new(tree: MkMaxTree<O, D>, relation: &'r R) -> Self {
        Self { tree, relation }
    }

    pub fn tree(&self) -> &MkMaxTree<O, D> {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut MkMaxTree<O, D> {
        &mut self.tree
    }

    fn searcher(&self, distance: &D) -> Option<MetricSearcher<'_, O, D, R>> {
        if distance != self.tree.distance() {
            return None;
        }
        Some(MetricSearcher {
            tree: self.tree.tree(),
            relation: self.relation,
        })
    }
}

impl<O, D, R> Index<O, D> for MkMaxTreeIndex<'_, O, D, R>
where
    D: Distance<O> + PartialEq,
    R: Relation<Object = O>,
{
    fn knn_query<'a>(&'a self, distance: &'a D) -> Option<Box<dyn KnnQuery<O> + 'a>> {
        let searcher = self.searcher(distance)?;
        Some(Box::new(searcher))
    }

    fn range_query<'a>(&'a self, distance: &'a D) -> Option<Box<dyn RangeQuery<O> + 'a>> {
        let searcher = self.searcher(distance)?;
        Some(Box::new(searcher))
    }

    fn priority_query<'a>(&'a self, distance: &'a D) -> Option<Box<dyn PriorityQuery<O> + 'a>> {
        let searcher = self.searcher(distance)?;
        Some(Box::new(searcher))
    }

    fn rknn_query<'a>(&'a self, distance: &'a D) -> Option<Box<dyn RknnQuery + 'a>> {
        if distance != self.tree.distance() {
            return None;
        }
        Some(Box::new(RknnSearcher {
            tree: &self.tree,
            relation: self.relation,
        }))
    }
}

struct RknnSearcher<'a, O, D, R> {
    tree: &'a MkMaxTree<O, D>,
    relation: &'a R,
}

impl<O, D, R> RknnQuery for RknnSearcher<'_, O, D, R>
where
    D: Distance<O>,
    R: Relation<Object = O>,
{
    fn rknn_by_id(&self, id: Oid, k: usize) -> Result<DistanceList> {
        self.tree.rknn(self.relation, id, k)
    }
}

/// An RdKNN tree over a vector relation: an R*-tree index that also
/// answers reverse kNN queries under the distance it was built with.
#[derive(Debug)]
pub struct RdKnnTreeIndex<'r, D, R> {
    tree: RdKnnTree<D>,
    relation: &'r R,
}

impl<'r, D, R> RdKnnTreeIndex<'r, D, R>
where
    D: Distance<Vector> + PartialEq,
    R: Relation<Object = Vector>,
{
    pub fn new(tree: RdKnnTree<D>, relation: &'r R) -> Self {
        Self { tree, relation }
    }

    pub fn tree(&self) -> &RdKnnTree<D> {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut RdKnnTree<D> {
        &mut self.tree
    }

    fn searcher<'a>(&'a self, distance: &'a dyn Distance<Vector>) -> Option<RStarSearcher<'a, R>> {
        let spatial = distance.as_spatial()?;
        Some(RStarSearcher {
            tree: self.tree.tree(),
            relation: self.relation,
            distance: spatial,
        })
    }
}

impl<D, R> Index<Vector, D> for RdKnnTreeIndex<'_, D, R>
where
    D: Distance<Vector> + PartialEq,
    R: Relation<Object = Vector>,
{
    fn knn_query<'a>(&'a self, distance: &'a D) -> Option<Box<dyn KnnQuery<Vector> + 'a>> {
        let searcher = self.searcher(distance)?;
        Some(Box::new(searcher))
    }

    fn range_query<'a>(&'a self, distance: &'a D) -> Option<Box<dyn RangeQuery<Vector> + 'a>> {
        let searcher = self.searcher(distance)?;
        Some(Box::new(searcher))
    }

    fn priority_query<'a>(&'a self, distance: &'a D) -> Option<Box<dyn PriorityQuery<Vector> + 'a>> {
        let searcher = self.searcher(distance)?;
        Some(Box::new(searcher))
    }

    fn rknn_query<'a>(&'a self, distance: &'a D) -> Option<Box<dyn RknnQuery + 'a>> {
        if distance != self.tree.distance() {
            return None;
        }
        Some(Box::new(SpatialRknnSearcher {
            tree: &self.tree,
            relation: self.relation,
        }))
    }
}

struct SpatialRknnSearcher<'a, D, R> {
    tree: &'a RdKnnTree<D>,
    relation: &'a R,
}

impl<D, R> RknnQuery for SpatialRknnSearcher<'_, D, R>
where
    D: Distance<Vector>,
    R: Relation<Object = Vector>,
{
    fn rknn_by_id(&self, id: Oid, k: usize) -> Result<DistanceList> {
        match self.relation.get(id) {
            Some(query) => self.tree.rknn(query, k),
            None => {
                self.tree.check_rknn_k(k)?;
                Ok(DistanceList::default())
            }
        }
    }
}

/// Bulk-loads an [`RStarTreeIndex`].
#[derive(Debug, Clone, Default)]
pub struct RStarTreeFactory {
    pub settings: RStarTreeSettings,
}

impl<'r, R> IndexFactory<'r, R> for RStarTreeFactory
where
    R: Relation<Object = Vector> + 'r,
{
    type Index = RStarTreeIndex<'r, R>;

    fn instantiate(&self, relation: &'r R) -> Result<Self::Index> {
        let tree = RStarTree::from_relation(relation, self.settings.clone())?;
        Ok(RStarTreeIndex::new(tree, relation))
    }
}

/// Builds an [`MTreeIndex`] under a fixed distance.
#[derive(Debug, Clone)]
pub struct MTreeFactory<D> {
    pub distance: D,
    pub settings: MTreeSettings,
}

impl<'r, O, D, R> IndexFactory<'r, R> for MTreeFactory<D>
where
    O: 'r,
    D: Distance<O> + PartialEq + Clone + 'r,
    R: Relation<Object = O> + 'r,
{
    type Index = MTreeIndex<'r, O, D, R>;

    fn instantiate(&self, relation: &'r R) -> Result<Self::Index> {
        let tree = MTree::from_relation(relation, self.distance.clone(), self.settings.clone())?;
        Ok(MTreeIndex::new(tree, relation))
    }
}

/// Builds an [`MkMaxTreeIndex`] under a fixed distance.
#[derive(Debug, Clone)]
pub struct MkMaxTreeFactory<D> {
    pub distance: D,
    pub settings: MkMaxSettings,
}

impl<'r, O, D, R> IndexFactory<'r, R> for MkMaxTreeFactory<D>
where
    O: Sync + 'r,
    D: Distance<O> + PartialEq + Clone + Sync + 'r,
    R: Relation<Object = O> + Sync + 'r,
{
    type Index = MkMaxTreeIndex<'r, O, D, R>;

    fn instantiate(&self, relation: &'r R) -> Result<Self::Index> {
        let tree = MkMaxTree::from_relation(relation, self.distance.clone(), self.settings.clone())?;
        Ok(MkMaxTreeIndex::new(tree, relation))
    }
}

/// Bulk-loads an [`RdKnnTreeIndex`] under a fixed distance.
#[derive(Debug, Clone)]
pub struct RdKnnTreeFactory<D> {
    pub distance: D,
    pub settings: RdKnnSettings,
}

impl<'r, D, R> IndexFactory<'r, R> for RdKnnTreeFactory<D>
where
    D: Distance<Vector> + PartialEq + Clone + Sync + 'r,
    R: Relation<Object = Vector> + 'r,
{
    type Index = RdKnnTreeIndex<'r, D, R>;

    fn instantiate(&self, relation: &'r R) -> Result<Self::Index> {
        let tree = RdKnnTree::from_relation(relation, self.distance.clone(), self.settings.clone())?;
        Ok(RdKnnTreeIndex::new(tree, relation))
    }
}

/// Picks an index searcher when one is available, the linear scan otherwise.
pub struct QueryBuilder<'a, O, D, R> {
    relation: &'a R,
    distance: &'a D,
    index: Option<&'a dyn Index<O, D>>,
}

impl<'a, O, D, R> QueryBuilder<'a, O, D, R>
where
    D: Distance<O>,
    R: Relation<Object = O>,
{
    pub fn new(relation: &'a R, distance: &'a D) -> Self {
        Self {
            relation,
            distance,
            index: None,
        }
    }

    pub fn with_index(mut self, index: &'a dyn Index<O, D>) -> Self {
        self.index = Some(index);
        self
    }

    fn scan(&self) -> LinearScan<'a, R, D> {
        LinearScan::new(self.relation, self.distance)
    }

    pub fn knn(&self) -> Box<dyn KnnQuery<O> + 'a> {
        match self.index.and_then(|index| index.knn_query(self.distance)) {
            Some(query) => query,
            None => {
                debug!("no index accelerates kNN queries, using a linear scan");
                Box::new(self.scan())
            }
        }
    }

    pub fn range(&self) -> Box<dyn RangeQuery<O> + 'a> {
        match self.index.and_then(|index| index.range_query(self.distance)) {
            Some(query) => query,
            None => {
                debug!("no index accelerates range queries, using a linear scan");
                Box::new(self.scan())
            }
        }
    }

    pub fn priority(&self) -> Box<dyn PriorityQuery<O> + 'a> {
        match self.index.and_then(|index| index.priority_query(self.distance)) {
            Some(query) => query,
            None => Box::new(self.scan()),
        }
    }

    pub fn rknn(&self) -> Box<dyn RknnQuery + 'a> {
        match self.index.and_then(|index| index.rknn_query(self.distance)) {
            Some(query) => query,
            None => Box::new(self.scan()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceMetric;
    use crate::relation::MemoryRelation;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn relation(n: usize) -> MemoryRelation<Vector> {
        let mut rng = StdRng::seed_from_u64(11);
        (0..n)
            .map(|_| Vector::new(vec![rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)]))
            .collect()
    }

    #[test]
    fn test_rstar_capability_follows_spatial_bound() {
        let data = relation(100);
        let index = RStarTreeFactory {
            settings: RStarTreeSettings::new(8, 8),
        }
        .instantiate(&data)
        .unwrap();

        assert!(index.knn_query(&DistanceMetric::Euclidean).is_some());
        assert!(index.range_query(&DistanceMetric::Maximum).is_some());
        assert!(index.knn_query(&DistanceMetric::Cosine).is_none());
        assert!(index.rknn_query(&DistanceMetric::Euclidean).is_none());
    }

    #[test]
    fn test_mtree_capability_requires_same_distance() {
        let data = relation(60);
        let index = MTreeFactory {
            distance: DistanceMetric::Euclidean,
            settings: MTreeSettings::new(6, 6),
        }
        .instantiate(&data)
        .unwrap();

        assert!(index.knn_query(&DistanceMetric::Euclidean).is_some());
        assert!(index.knn_query(&DistanceMetric::Manhattan).is_none());
    }

    #[test]
    fn test_builder_falls_back_to_linear_scan() {
        let data = relation(80);
        let index = RStarTreeFactory {
            settings: RStarTreeSettings::new(8, 8),
        }
        .instantiate(&data)
        .unwrap();
        let query = Vector::new(vec![0.5, 0.5]);
        let scan = LinearScan::new(&data, &DistanceMetric::Cosine);

        let cosine = QueryBuilder::new(&data, &DistanceMetric::Cosine).with_index(&index);
        assert_eq!(
            cosine.knn().knn_by_object(&query, 5).unwrap(),
            scan.knn(&query, 5).unwrap()
        );

        let euclidean = QueryBuilder::new(&data, &DistanceMetric::Euclidean).with_index(&index);
        let scan = LinearScan::new(&data, &DistanceMetric::Euclidean);
        assert_eq!(
            euclidean.knn().knn_by_id(Oid(3), 7).unwrap(),
            scan.knn_by_id(Oid(3), 7).unwrap()
        );
        assert_eq!(
            euclidean.range().range_by_object(&query, 0.2).unwrap(),
            scan.range(&query, 0.2).unwrap()
        );
        assert!(euclidean.knn().knn_by_id(Oid(999), 3).unwrap().is_empty());
    }

    #[test]
    fn test_priority_through_builder() {
        let data = relation(40);
        let index = MTreeFactory {
            distance: DistanceMetric::Euclidean,
            settings: MTreeSettings::new(4, 4),
        }
        .instantiate(&data)
        .unwrap();
        let query = Vector::new(vec![0.1, 0.9]);
        let builder = QueryBuilder::new(&data, &DistanceMetric::Euclidean).with_index(&index);
        let searcher = builder.priority();
        let first: Vec<Oid> = searcher
            .priority_by_object(&query)
            .unwrap()
            .take(5)
            .map(|n| n.unwrap().oid)
            .collect();
        let expected = LinearScan::new(&data, &DistanceMetric::Euclidean)
            .knn(&query, 5)
            .unwrap()
            .oids();
        assert_eq!(first, expected);
    }

    #[test]
    fn test_rknn_through_mkmax_index() {
        let data = relation(40);
        let index = MkMaxTreeFactory {
            distance: DistanceMetric::Euclidean,
            settings: MkMaxSettings::new(MTreeSettings::new(4, 4), 3),
        }
        .instantiate(&data)
        .unwrap();
        let scan = LinearScan::new(&data, &DistanceMetric::Euclidean);
        let builder = QueryBuilder::new(&data, &DistanceMetric::Euclidean).with_index(&index);
        let rknn = builder.rknn();
        for id in [Oid(0), Oid(17), Oid(39)] {
            assert_eq!(
                rknn.rknn_by_id(id, 2).unwrap(),
                scan.rknn_by_id(id, 2).unwrap()
            );
        }
        let plain = QueryBuilder::new(&data, &DistanceMetric::Manhattan).with_index(&index);
        assert!(!plain.rknn().rknn_by_id(Oid(0), 2).unwrap().is_empty());
    }

    #[test]
    fn test_rdknn_index_capabilities() {
        let data = relation(50);
        let index = RdKnnTreeFactory {
            distance: DistanceMetric::Euclidean,
            settings: RdKnnSettings::new(RStarTreeSettings::new(4, 4), 3),
        }
        .instantiate(&data)
        .unwrap();

        assert!(index.rknn_query(&DistanceMetric::Euclidean).is_some());
        assert!(index.rknn_query(&DistanceMetric::Manhattan).is_none());
        assert!(index.knn_query(&DistanceMetric::Manhattan).is_some());
        assert!(index.knn_query(&DistanceMetric::Cosine).is_none());

        let scan = LinearScan::new(&data, &DistanceMetric::Euclidean);
        let builder = QueryBuilder::new(&data, &DistanceMetric::Euclidean).with_index(&index);
        let rknn = builder.rknn();
        for id in [Oid(0), Oid(25), Oid(49)] {
            assert_eq!(
                rknn.rknn_by_id(id, 2).unwrap(),
                scan.rknn_by_id(id, 2).unwrap()
            );
        }
        assert!(rknn.rknn_by_id(Oid(500), 2).unwrap().is_empty());
        assert!(rknn.rknn_by_id(Oid(500), 4).is_err());
    }
}
