//! M-tree: a balanced ball tree for arbitrary metric distances.
//!
//! Nodes store object ids only; objects are read from the relation the
//! tree was built over, which must therefore be passed to every operation.

pub mod entry;
pub mod mkmax;
pub mod search;
pub mod split;

pub use entry::MTreeEntry;
pub use mkmax::MkMaxTree;
pub use search::MetricSearch;

use self::entry::{aggregate_knn, ball_lower_bound};
use self::split::{DistanceMatrix, Splitter};
use crate::distance::Distance;
use crate::error::{check_k, check_radius, IndexError, Result};
use crate::page::Page;
use crate::persistence;
use crate::query::best_first::{knn_search, range_search, PriorityCursor};
use crate::query::DistanceList;
use crate::relation::{Oid, Relation};
use crate::settings::MTreeSettings;
use crate::statistics::Statistics;
use crate::tree::{TreeCore, TreePath, TreeStats};
use log::{debug, trace};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::marker::PhantomData;
use std::path::Path;

/// An M-tree over objects of type `O` under distance `D`.
#[derive(Debug)]
pub struct MTree<O, D> {
    core: TreeCore<MTreeEntry>,
    distance: D,
    settings: MTreeSettings,
    rng: StdRng,
    _object: PhantomData<fn(&O)>,
}

impl<O, D: Distance<O>> MTree<O, D> {
    /// Create an empty tree.
    pub fn new(distance: D, settings: MTreeSettings) -> Result<Self> {
        settings.validate()?;
        let header = settings.header();
        Self::from_parts(TreeCore::new(header), distance, settings)
    }

    fn from_parts(core: TreeCore<MTreeEntry>, distance: D, settings: MTreeSettings) -> Result<Self> {
        if !distance.is_metric() {
            return Err(IndexError::invalid(
                "M-trees require a distance satisfying the triangle inequality",
            ));
        }
        Ok(Self {
            core,
            distance,
            rng: StdRng::seed_from_u64(settings.seed),
            settings,
            _object: PhantomData,
        })
    }

    /// Build a tree over every object of a relation.
    pub fn from_relation<R>(relation: &R, distance: D, settings: MTreeSettings) -> Result<Self>
    where
        R: Relation<Object = O>,
    {
        let mut tree = Self::new(distance, settings)?;
        tree.bulk_load(relation, relation.ids())?;
        Ok(tree)
    }

    pub fn distance(&self) -> &D {
        &self.distance
    }

    pub fn settings(&self) -> &MTreeSettings {
        &self.settings
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

    pub fn core(&self) -> &TreeCore<MTreeEntry> {
        &self.core
    }

    /// Insert one object of the relation.
    pub fn insert<R>(&mut self, relation: &R, oid: Oid) -> Result<()>
    where
        R: Relation<Object = O>,
    {
        self.insert_object(relation, oid, None)
    }

    /// Insert objects one by one into an empty tree.
    pub fn bulk_load<R>(&mut self, relation: &R, ids: impl IntoIterator<Item = Oid>) -> Result<()>
    where
        R: Relation<Object = O>,
    {
        if !self.is_empty() {
            return Err(IndexError::Unsupported {
                operation: "bulk load into a non-empty tree",
                index: "MTree",
            });
        }
        for oid in ids {
            self.insert(relation, oid)?;
        }
        debug!("loaded {} objects, height {}", self.len(), self.height());
        Ok(())
    }

    /// Remove an object. Returns `false` if it is not in the tree.
    pub fn delete<R>(&mut self, relation: &R, oid: Oid) -> Result<bool>
    where
        R: Relation<Object = O>,
    {
        let Some(path) = self.find_path(relation, oid)? else {
            return Ok(false);
        };
        let (_, orphans) = self.core.delete_path(&path)?;
        for entry in orphans {
            self.insert_entry(relation, entry)?;
        }
        Ok(true)
    }

    /// Path from the root to the leaf entry of `oid`.
    ///
    /// Only balls that may contain the object are searched; if the object
    /// is missing from the relation every subtree is.
    pub fn find_path<R>(&self, relation: &R, oid: Oid) -> Result<Option<TreePath>>
    where
        R: Relation<Object = O>,
    {
        let object = relation.get(oid);
        self.core
            .find_path_to_object(&TreePath::root(), oid, &|e: &MTreeEntry| {
                match (object, relation.get(e.object())) {
                    (Some(object), Some(routing)) => {
                        ball_lower_bound(self.measure(object, routing), e.covering_radius()) <= 0.0
                    }
                    _ => true,
                }
            })
    }

    /// The `k` nearest objects to `query`.
    pub fn knn<R>(&self, relation: &R, query: &O, k: usize) -> Result<DistanceList>
    where
        R: Relation<Object = O>,
    {
        check_k(k)?;
        self.statistics().count_knn_query();
        knn_search(&MetricSearch::new(self, relation, query), k)
    }

    /// All objects within `radius` of `query`.
    pub fn range<R>(&self, relation: &R, query: &O, radius: f64) -> Result<DistanceList>
    where
        R: Relation<Object = O>,
    {
        check_radius(radius)?;
        self.statistics().count_range_query();
        range_search(&MetricSearch::new(self, relation, query), radius)
    }

    /// Objects in ascending distance from `query`, computed lazily.
    pub fn priority<'a, R>(
        &'a self,
        relation: &'a R,
        query: &'a O,
    ) -> PriorityCursor<MetricSearch<'a, O, D, R>>
    where
        R: Relation<Object = O>,
    {
        PriorityCursor::new(MetricSearch::new(self, relation, query))
    }

    /// Verify capacities, leaf depth and object count, and that every
    /// routing entry's parent distances, covering radius and k-distance
    /// bound agree with its child.
    pub fn check_integrity<R>(&self, relation: &R) -> Result<()>
    where
        R: Relation<Object = O>,
    {
        self.core.check_integrity(&mut |entry, child| {
            let routing = self.object(relation, entry.object())?;
            for e in &child.entries {
                let d = self.measure(self.object(relation, e.object())?, routing);
                if (d - e.parent_distance()).abs() > 1e-9 * d.max(1.0) {
                    return Err(IndexError::corrupted(format!(
                        "parent distance of {} in page {} is {}, actual {}",
                        e.object(),
                        child.page_id(),
                        e.parent_distance(),
                        d
                    )));
                }
                if e.parent_distance() + e.covering_radius() > entry.covering_radius() {
                    return Err(IndexError::corrupted(format!(
                        "ball of page {} does not cover {}",
                        child.page_id(),
                        e.object()
                    )));
                }
            }
            if let Some(bound) = aggregate_knn(&child.entries) {
                if entry.knn_distance().map_or(true, |k| k < bound) {
                    return Err(IndexError::corrupted(format!(
                        "k-distance bound of page {} is below its entries'",
                        child.page_id()
                    )));
                }
            }
            Ok(())
        })
    }

    /// Write the tree to a file. The distance function is not saved.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        persistence::save(path, self.core.header(), &self.settings, self.core.page_file())
    }

    /// Read a tree written by [`MTree::save`], to be used with `distance`.
    pub fn open(path: impl AsRef<Path>, distance: D) -> Result<Self> {
        let (header, settings, pages) = persistence::load::<MTreeEntry, MTreeSettings>(path)?;
        settings.validate()?;
        Self::from_parts(TreeCore::from_parts(header, pages)?, distance, settings)
    }

    /// Insert an object with an initial k-distance and count it.
    fn insert_object<R>(&mut self, relation: &R, oid: Oid, knn_distance: Option<f64>) -> Result<()>
    where
        R: Relation<Object = O>,
    {
        if relation.get(oid).is_none() {
            return Err(IndexError::invalid(format!(
                "object {} is not in the relation",
                oid
            )));
        }
        self.insert_entry(relation, MTreeEntry::leaf(oid, knn_distance))?;
        self.core.header_mut().size += 1;
        Ok(())
    }

    /// Place a leaf entry, fixing its parent distance, and treat overflow.
    fn insert_entry<R>(&mut self, relation: &R, mut entry: MTreeEntry) -> Result<()>
    where
        R: Relation<Object = O>,
    {
        let object = self.object(relation, entry.object())?;
        let (path, parent_distance) = self.choose_leaf(relation, object)?;
        entry.set_parent_distance(parent_distance);
        let mut node = self.core.node(path.node())?.clone();
        node.entries.push(entry);
        self.core.write_node(node);
        self.treat_overflow(relation, path)
    }

    /// Descend to the leaf for `object`, returning the path and the
    /// distance to the leaf's routing object.
    ///
    /// A child whose ball already holds the object is preferred, the one
    /// with the nearest routing object first; otherwise the child needing
    /// the least radius increase.
    fn choose_leaf<R>(&self, relation: &R, object: &O) -> Result<(TreePath, f64)>
    where
        R: Relation<Object = O>,
    {
        let mut path = TreePath::root();
        let mut parent_distance = 0.0;
        loop {
            let node = self.core.node(path.node())?;
            if node.is_leaf() {
                return Ok((path, parent_distance));
            }
            let mut best: Option<(usize, bool, f64, f64)> = None;
            for (slot, e) in node.entries.iter().enumerate() {
                let d = self.measure(object, self.object(relation, e.object())?);
                let outside = d > e.covering_radius();
                let key = if outside { d - e.covering_radius() } else { d };
                let better = match best {
                    None => true,
                    Some((_, best_outside, best_key, _)) => {
                        (outside, key) < (best_outside, best_key)
                    }
                };
                if better {
                    best = Some((slot, outside, key, d));
                }
            }
            let (slot, _, _, d) =
                best.ok_or_else(|| IndexError::corrupted("empty directory node on insertion path"))?;
            let child = TreeCore::child_of(&node.entries[slot])?;
            trace!("depth {}: descend into page {}", path.depth(), child);
            path = path.descend(slot, child);
            parent_distance = d;
        }
    }

    fn treat_overflow<R>(&mut self, relation: &R, path: TreePath) -> Result<()>
    where
        R: Relation<Object = O>,
    {
        let node = self.core.node(path.node())?;
        if !self.core.has_overflow(node) {
            return self.core.adjust_path(&path);
        }
        self.split_node(relation, path)
    }

    fn split_node<R>(&mut self, relation: &R, path: TreePath) -> Result<()>
    where
        R: Relation<Object = O>,
    {
        let node = self.core.node(path.node())?.clone();
        let page = node.page_id();
        let template = node.sibling(Vec::new());
        let objects = node
            .entries
            .iter()
            .map(|e| self.object(relation, e.object()))
            .collect::<Result<Vec<&O>>>()?;
        let matrix = DistanceMatrix::compute(objects.len(), |i, j| {
            Ok(self.measure(objects[i], objects[j]))
        })?;
        let splitter = Splitter {
            promotion: self.settings.promotion,
            distribution: self.settings.distribution,
            minimum: self.core.header().minimum(node.is_leaf()),
        };
        let (left, right) = splitter.split(node.entries, &matrix, &mut self.rng);

        let routing = [left.routing, right.routing];
        let mut left_node = template.sibling(left.entries);
        left_node.set_page_id(page);
        let right_node = template.sibling(right.entries);
        debug!(
            "split page {} into {} + {} entries around {} and {}",
            page,
            left_node.len(),
            right_node.len(),
            routing[0],
            routing[1]
        );

        let (Some(parent_path), Some(slot)) = (path.parent(), path.slot_in_parent()) else {
            return self.core.grow_root(left_node, right_node, |i, half| {
                Ok(MTreeEntry::routing_for(half, routing[i], 0.0))
            });
        };

        // distances of the new routing objects to the parent's routing object
        let parent_routing = self.routing_of(&parent_path)?;
        let mut parent_distances = [0.0; 2];
        if let Some(p) = parent_routing {
            let p = self.object(relation, p)?;
            for (i, r) in routing.iter().enumerate() {
                parent_distances[i] = self.measure(self.object(relation, *r)?, p);
            }
        }

        self.core.write_node(left_node);
        let right_id = self.core.write_node(right_node);
        let mut parent = self.core.node(parent_path.node())?.clone();
        parent.entries[slot] =
            MTreeEntry::routing_for(self.core.node(page)?, routing[0], parent_distances[0]);
        parent.entries.push(MTreeEntry::routing_for(
            self.core.node(right_id)?,
            routing[1],
            parent_distances[1],
        ));
        self.core.write_node(parent);
        self.treat_overflow(relation, parent_path)
    }

    /// Routing object of the node at `path`; `None` for the root.
    fn routing_of(&self, path: &TreePath) -> Result<Option<Oid>> {
        let (Some(parent), Some(slot)) = (path.parent(), path.slot_in_parent()) else {
            return Ok(None);
        };
        let node = self.core.node(parent.node())?;
        node.entries
            .get(slot)
            .map(|e| Some(e.object()))
            .ok_or_else(|| IndexError::corrupted("stale path slot"))
    }

    /// Look up an object the tree refers to; a missing one means the tree
    /// and relation are out of sync.
    fn object<'r, R>(&self, relation: &'r R, oid: Oid) -> Result<&'r O>
    where
        R: Relation<Object = O>,
    {
        relation
            .get(oid)
            .ok_or_else(|| IndexError::corrupted(format!("object {} is missing from the relation", oid)))
    }

    /// Distance between two objects, counted in the statistics.
    fn measure(&self, a: &O, b: &O) -> f64 {
        self.core.statistics().count_distance();
        self.distance.distance(a, b)
    }
}
