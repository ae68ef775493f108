//! M-tree node splits: promotion of two routing objects, then distribution
//! of the entries between them.

use super::entry::MTreeEntry;
use crate::error::Result;
use crate::relation::Oid;
use crate::settings::{Distribution, Promotion};
use rand::rngs::StdRng;
use rand::seq::index::sample;

/// Symmetric matrix of distances between the objects of a node's entries.
pub struct DistanceMatrix {
    n: usize,
    values: Vec<f64>,
}

impl DistanceMatrix {
    /// Compute all pairwise distances with `distance(i, j)` for `i < j`.
    pub fn compute(n: usize, mut distance: impl FnMut(usize, usize) -> Result<f64>) -> Result<Self> {
        let mut values = vec![0.0; n * n];
        for i in 0..n {
            for j in i + 1..n {
                let d = distance(i, j)?;
                values[i * n + j] = d;
                values[j * n + i] = d;
            }
        }
        Ok(Self { n, values })
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.n + j]
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }
}

/// One half of a split: the routing object and its entries, whose parent
/// distances already refer to it.
#[derive(Debug)]
pub struct SplitHalf {
    pub routing: Oid,
    pub entries: Vec<MTreeEntry>,
}

/// Strategy pair used to split overflowing nodes.
#[derive(Debug, Clone, Copy)]
pub struct Splitter {
    pub promotion: Promotion,
    pub distribution: Distribution,
    /// Minimum number of entries per half.
    pub minimum: usize,
}

impl Splitter {
    /// Split `entries` in two, given their pairwise distances.
    pub fn split(
        &self,
        entries: Vec<MTreeEntry>,
        matrix: &DistanceMatrix,
        rng: &mut StdRng,
    ) -> (SplitHalf, SplitHalf) {
        let (a, b) = self.promote(matrix, rng);
        let (left, right) = self.distribute(matrix, a, b);
        let routing = (entries[a].object(), entries[b].object());

        let mut slots: Vec<Option<MTreeEntry>> = entries.into_iter().map(Some).collect();
        let mut take = |indices: Vec<usize>, pivot: usize| -> Vec<MTreeEntry> {
            indices
                .into_iter()
                .filter_map(|i| {
                    let mut entry = slots[i].take()?;
                    entry.set_parent_distance(matrix.get(i, pivot));
                    Some(entry)
                })
                .collect()
        };
        let left = take(left, a);
        let right = take(right, b);
        (
            SplitHalf {
                routing: routing.0,
                entries: left,
            },
            SplitHalf {
                routing: routing.1,
                entries: right,
            },
        )
    }

    fn promote(&self, matrix: &DistanceMatrix, rng: &mut StdRng) -> (usize, usize) {
        let n = matrix.len();
        match self.promotion {
            Promotion::FarthestPair => {
                let mut best = (0, 1);
                for i in 0..n {
                    for j in i + 1..n {
                        if matrix.get(i, j) > matrix.get(best.0, best.1) {
                            best = (i, j);
                        }
                    }
                }
                best
            }
            Promotion::MinMaxRadius => {
                let mut best = ((0, 1), f64::INFINITY);
                for i in 0..n {
                    for j in i + 1..n {
                        let (left, right) = self.distribute(matrix, i, j);
                        let radius = radius(matrix, &left, i).max(radius(matrix, &right, j));
                        if radius < best.1 {
                            best = ((i, j), radius);
                        }
                    }
                }
                best.0
            }
            Promotion::Random => {
                let pair = sample(rng, n, 2);
                (pair.index(0), pair.index(1))
            }
        }
    }

    /// Assign every entry index to routing object `a` or `b`.
    fn distribute(&self, matrix: &DistanceMatrix, a: usize, b: usize) -> (Vec<usize>, Vec<usize>) {
        let others = (0..matrix.len()).filter(|&i| i != a && i != b);
        match self.distribution {
            Distribution::Hyperplane => {
                let mut left = vec![a];
                let mut right = vec![b];
                for i in others {
                    if matrix.get(i, a) <= matrix.get(i, b) {
                        left.push(i);
                    } else {
                        right.push(i);
                    }
                }
                self.rebalance(matrix, &mut left, a, &mut right);
                self.rebalance(matrix, &mut right, b, &mut left);
                (left, right)
            }
            Distribution::Balanced => {
                let mut remaining: Vec<usize> = others.collect();
                let mut left = vec![a];
                let mut right = vec![b];
                let mut to_left = true;
                while !remaining.is_empty() {
                    let (side, pivot) = if to_left {
                        (&mut left, a)
                    } else {
                        (&mut right, b)
                    };
                    let pos = nearest(matrix, &remaining, pivot);
                    side.push(remaining.swap_remove(pos));
                    to_left = !to_left;
                }
                (left, right)
            }
        }
    }

    /// Move entries nearest to `pivot` from `other` until `side` holds the minimum.
    fn rebalance(&self, matrix: &DistanceMatrix, side: &mut Vec<usize>, pivot: usize, other: &mut Vec<usize>) {
        while side.len() < self.minimum && other.len() > self.minimum {
            // other[0] is the other routing object and stays
            let pos = 1 + nearest(matrix, &other[1..], pivot);
            side.push(other.remove(pos));
        }
    }
}

/// Position in `candidates` of the index nearest to `pivot`.
fn nearest(matrix: &DistanceMatrix, candidates: &[usize], pivot: usize) -> usize {
    candidates
        .iter()
        .enumerate()
        .min_by(|a, b| {
            matrix
                .get(*a.1, pivot)
                .total_cmp(&matrix.get(*b.1, pivot))
                .then(a.1.cmp(b.1))
        })
        .map_or(0, |(pos, _)| pos)
}

/// Covering radius of `members` around `pivot`, counting child radii as zero.
fn radius(matrix: &DistanceMatrix, members: &[usize], pivot: usize) -> f64 {
    members
        .iter()
        .map(|&i| matrix.get(i, pivot))
        .fold(0.0, f64::max)
}
