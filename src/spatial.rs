//! Minimum bounding rectangles

use serde::{Deserialize, Serialize};

/// Axis-aligned minimum bounding (hyper-)rectangle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mbr {
    min: Vec<f64>,
    max: Vec<f64>,
}

impl Mbr {
    /// Create a rectangle from its lower and upper corners.
    ///
    /// Both corners must have the same dimension and `min[i] <= max[i]`.
    pub fn new(min: Vec<f64>, max: Vec<f64>) -> Self {
        debug_assert_eq!(min.len(), max.len());
        debug_assert!(min.iter().zip(&max).all(|(lo, hi)| lo <= hi));
        Self { min, max }
    }

    /// Degenerate rectangle covering exactly one point.
    pub fn from_point(point: &[f64]) -> Self {
        Self {
            min: point.to_vec(),
            max: point.to_vec(),
        }
    }

    /// Smallest rectangle covering all given rectangles. `None` if empty.
    pub fn union_all<'a>(mut mbrs: impl Iterator<Item = &'a Mbr>) -> Option<Mbr> {
        let mut acc = mbrs.next()?.clone();
        for m in mbrs {
            acc.extend(m);
        }
        Some(acc)
    }

    pub fn dimension(&self) -> usize {
        self.min.len()
    }

    pub fn min(&self) -> &[f64] {
        &self.min
    }

    pub fn max(&self) -> &[f64] {
        &self.max
    }

    /// Centre coordinate along dimension `d`.
    pub fn center(&self, d: usize) -> f64 {
        (self.min[d] + self.max[d]) / 2.0
    }

    pub fn centroid(&self) -> Vec<f64> {
        (0..self.dimension()).map(|d| self.center(d)).collect()
    }

    /// Grow this rectangle to also cover `other`.
    pub fn extend(&mut self, other: &Mbr) {
        for d in 0..self.dimension() {
            self.min[d] = self.min[d].min(other.min[d]);
            self.max[d] = self.max[d].max(other.max[d]);
        }
    }

    pub fn union(&self, other: &Mbr) -> Mbr {
        let mut u = self.clone();
        u.extend(other);
        u
    }

    pub fn volume(&self) -> f64 {
        self.min
            .iter()
            .zip(&self.max)
            .map(|(lo, hi)| hi - lo)
            .product()
    }

    /// Sum of the edge lengths (the R* "margin").
    pub fn margin(&self) -> f64 {
        self.min.iter().zip(&self.max).map(|(lo, hi)| hi - lo).sum()
    }

    /// Volume of the intersection with `other`, zero if disjoint.
    pub fn overlap(&self, other: &Mbr) -> f64 {
        let mut vol = 1.0;
        for d in 0..self.dimension() {
            let lo = self.min[d].max(other.min[d]);
            let hi = self.max[d].min(other.max[d]);
            if hi < lo {
                return 0.0;
            }
            vol *= hi - lo;
        }
        vol
    }

    /// Volume increase needed to also cover `other`.
    pub fn enlargement(&self, other: &Mbr) -> f64 {
        self.union(other).volume() - self.volume()
    }

    pub fn contains(&self, other: &Mbr) -> bool {
        (0..self.dimension()).all(|d| self.min[d] <= other.min[d] && other.max[d] <= self.max[d])
    }

    pub fn contains_point(&self, point: &[f64]) -> bool {
        (0..self.dimension()).all(|d| self.min[d] <= point[d] && point[d] <= self.max[d])
    }

    pub fn intersects(&self, other: &Mbr) -> bool {
        (0..self.dimension()).all(|d| self.min[d] <= other.max[d] && other.min[d] <= self.max[d])
    }
}
