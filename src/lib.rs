//! # Tree Index
//!
//! Page-oriented search trees with a branch-and-bound query engine.
//!
//! This library provides:
//! - R*-trees over vectors (forced reinsertion, topological split, STR bulk load)
//! - M-trees over any metric, and the MkMax variant answering reverse kNN queries
//! - RdKNN trees: R*-trees answering reverse kNN queries, with deletion
//! - kNN, range, reverse kNN and incremental (priority) searches
//! - A linear scan that every query falls back to when no index applies
//! - Checksummed persistence of whole trees
//!
//! ## Example
//!
//! ```rust
//! use tree_index::{DistanceMetric, MemoryRelation, RStarTree, RStarTreeSettings, Vector};
//!
//! let relation = MemoryRelation::from_vectors(vec![
//!     Vector::new(vec![0.0, 0.0]),
//!     Vector::new(vec![1.0, 1.0]),
//!     Vector::new(vec![5.0, 5.0]),
//! ])
//! .unwrap();
//! let tree = RStarTree::from_relation(&relation, RStarTreeSettings::default()).unwrap();
//!
//! let nearest = tree.knn(&DistanceMetric::Euclidean, &[0.9, 0.8], 2).unwrap();
//! assert_eq!(nearest.oids(), vec![tree_index::Oid(1), tree_index::Oid(0)]);
//! ```

pub mod distance;
pub mod error;
pub mod mtree;
pub mod page;
pub mod persistence;
pub mod query;
pub mod relation;
pub mod rstar;
pub mod settings;
pub mod spatial;
pub mod statistics;
pub mod tree;
pub mod vector;

pub use distance::{Distance, DistanceMetric, LevenshteinDistance, SpatialDistance};
pub use error::{IndexError, Result};
pub use mtree::{MTree, MkMaxTree};
pub use query::{
    DistanceList, Index, IndexFactory, KnnQuery, LinearScan, Neighbor, PriorityQuery,
    QueryBuilder, RangeQuery, RknnQuery,
};
pub use relation::{MemoryRelation, Oid, Relation};
pub use rstar::{RStarTree, RdKnnTree};
pub use settings::{
    Distribution, MTreeSettings, MkMaxSettings, Promotion, RStarTreeSettings, RdKnnSettings,
};
pub use statistics::{Statistics, StatisticsSnapshot};
pub use vector::Vector;
