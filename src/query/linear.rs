//! Brute-force searches over a whole relation.
//!
//! Slow but always applicable: the fallback for queries no index can
//! accelerate, and the reference the indexes are tested against.

use super::heap::{DistanceList, KnnHeap, Neighbor};
use crate::distance::Distance;
use crate::error::{check_k, check_radius, Result};
use crate::relation::{Oid, Relation};

/// Linear scan over a relation with a fixed distance function.
#[derive(Debug)]
pub struct LinearScan<'a, R, D> {
    relation: &'a R,
    distance: &'a D,
}

impl<R, D> Clone for LinearScan<'_, R, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R, D> Copy for LinearScan<'_, R, D> {}

impl<'a, R, D> LinearScan<'a, R, D>
where
    R: Relation,
    D: Distance<R::Object>,
{
    pub fn new(relation: &'a R, distance: &'a D) -> Self {
        Self { relation, distance }
    }

    /// The `k` nearest objects to `query`.
    pub fn knn(&self, query: &R::Object, k: usize) -> Result<DistanceList> {
        check_k(k)?;
        let mut heap = KnnHeap::new(k);
        for id in self.relation.ids() {
            if let Some(object) = self.relation.get(id) {
                heap.insert(Neighbor::new(id, self.distance.distance(query, object)));
            }
        }
        Ok(heap.into_list())
    }

    /// KNN of a stored object; empty if the id is unknown.
    pub fn knn_by_id(&self, id: Oid, k: usize) -> Result<DistanceList> {
        check_k(k)?;
        match self.relation.get(id) {
            Some(query) => self.knn(query, k),
            None => Ok(DistanceList::default()),
        }
    }

    /// All objects within `radius` of `query`, inclusive.
    pub fn range(&self, query: &R::Object, radius: f64) -> Result<DistanceList> {
        check_radius(radius)?;
        let mut found = Vec::new();
        for id in self.relation.ids() {
            if let Some(object) = self.relation.get(id) {
                let distance = self.distance.distance(query, object);
                if distance <= radius {
                    found.push(Neighbor::new(id, distance));
                }
            }
        }
        Ok(DistanceList::from_unsorted(found))
    }

    pub fn range_by_id(&self, id: Oid, radius: f64) -> Result<DistanceList> {
        check_radius(radius)?;
        match self.relation.get(id) {
            Some(query) => self.range(query, radius),
            None => Ok(DistanceList::default()),
        }
    }

    /// Every object, ordered by distance to `query`.
    pub fn ranking(&self, query: &R::Object) -> DistanceList {
        let neighbors = self
            .relation
            .ids()
            .into_iter()
            .filter_map(|id| {
                self.relation
                    .get(id)
                    .map(|object| Neighbor::new(id, self.distance.distance(query, object)))
            })
            .collect();
        DistanceList::from_unsorted(neighbors)
    }

    /// Distance from `id` to its k-th nearest neighbor (itself included);
    /// infinite if the relation holds fewer than `k` objects.
    pub fn k_distance(&self, id: Oid, k: usize) -> Result<f64> {
        let knn = self.knn_by_id(id, k)?;
        if knn.len() < k {
            return Ok(f64::INFINITY);
        }
        Ok(knn.last().map_or(f64::INFINITY, |n| n.distance))
    }

    /// Objects that have `id` among their `k` nearest neighbors.
    pub fn rknn_by_id(&self, id: Oid, k: usize) -> Result<DistanceList> {
        check_k(k)?;
        let Some(query) = self.relation.get(id) else {
            return Ok(DistanceList::default());
        };
        let mut found = Vec::new();
        for candidate in self.relation.ids() {
            let Some(object) = self.relation.get(candidate) else {
                continue;
            };
            let distance = self.distance.distance(object, query);
            if distance <= self.k_distance(candidate, k)? {
                found.push(Neighbor::new(candidate, distance));
            }
        }
        Ok(DistanceList::from_unsorted(found))
    }
}
