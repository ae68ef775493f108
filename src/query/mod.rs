//! Query engine: result containers, the linear scan, best-first tree
//! searches and the index traits tying them together.

pub mod best_first;
pub mod heap;
pub mod index;
pub mod linear;

pub use best_first::{Candidate, PriorityCursor, SearchTree};
pub use heap::{DistanceList, KnnHeap, Neighbor};
pub use index::{
    Index, IndexFactory, KnnQuery, MTreeFactory, MTreeIndex, MkMaxTreeFactory, MkMaxTreeIndex,
    NeighborIter, PriorityQuery, QueryBuilder, RStarTreeFactory, RStarTreeIndex, RangeQuery,
    RdKnnTreeFactory, RdKnnTreeIndex, RknnQuery,
};
pub use linear::LinearScan;
