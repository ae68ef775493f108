//! Distance functions consumed by the indexes

use crate::spatial::Mbr;
use crate::vector::Vector;
use serde::{Deserialize, Serialize};

/// A pluggable distance between two objects.
///
/// Implementations must be deterministic. Metric trees additionally rely on
/// the triangle inequality (`is_metric`), R*-trees on a spatial lower bound
/// (`as_spatial`).
pub trait Distance<O: ?Sized> {
    fn distance(&self, a: &O, b: &O) -> f64;

    /// Whether the triangle inequality holds.
    fn is_metric(&self) -> bool {
        false
    }

    /// The rectangle lower-bound variant of this distance, if it has one.
    fn as_spatial(&self) -> Option<&dyn SpatialDistance> {
        None
    }
}

/// Distance on coordinate slices with rectangle lower bounds.
pub trait SpatialDistance {
    /// Distance between two points. Must agree with the object distance.
    fn point_distance(&self, a: &[f64], b: &[f64]) -> f64;

    /// Lower bound on the distance from `point` to anything inside `mbr`.
    fn min_dist(&self, point: &[f64], mbr: &Mbr) -> f64;

    /// Lower bound on the distance between anything in `a` and anything in `b`.
    fn min_dist_mbr(&self, a: &Mbr, b: &Mbr) -> f64;
}

/// Distance metrics on vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Euclidean (L2) distance
    Euclidean,
    /// Manhattan (L1) distance
    Manhattan,
    /// Maximum (L-infinity) distance
    Maximum,
    /// Cosine distance (1 - cosine similarity). Neither spatial nor metric.
    Cosine,
}

impl DistanceMetric {
    fn combine(&self, diffs: impl Iterator<Item = f64>) -> f64 {
        match self {
            DistanceMetric::Euclidean => diffs.map(|d| d * d).sum::<f64>().sqrt(),
            DistanceMetric::Manhattan => diffs.map(f64::abs).sum(),
            DistanceMetric::Maximum => diffs.map(f64::abs).fold(0.0, f64::max),
            DistanceMetric::Cosine => unreachable!("cosine has no coordinate-wise form"),
        }
    }
}

impl Distance<Vector> for DistanceMetric {
    fn distance(&self, a: &Vector, b: &Vector) -> f64 {
        match self {
            DistanceMetric::Cosine => cosine_distance(a, b),
            _ => self.point_distance(a.as_slice(), b.as_slice()),
        }
    }

    fn is_metric(&self) -> bool {
        !matches!(self, DistanceMetric::Cosine)
    }

    fn as_spatial(&self) -> Option<&dyn SpatialDistance> {
        match self {
            DistanceMetric::Cosine => None,
            _ => Some(self),
        }
    }
}

impl SpatialDistance for DistanceMetric {
    fn point_distance(&self, a: &[f64], b: &[f64]) -> f64 {
        self.combine(a.iter().zip(b).map(|(x, y)| x - y))
    }

    fn min_dist(&self, point: &[f64], mbr: &Mbr) -> f64 {
        self.combine((0..point.len()).map(|d| {
            let p = point[d];
            if p < mbr.min()[d] {
                mbr.min()[d] - p
            } else if p > mbr.max()[d] {
                p - mbr.max()[d]
            } else {
                0.0
            }
        }))
    }

    fn min_dist_mbr(&self, a: &Mbr, b: &Mbr) -> f64 {
        self.combine((0..a.dimension()).map(|d| {
            if a.max()[d] < b.min()[d] {
                b.min()[d] - a.max()[d]
            } else if b.max()[d] < a.min()[d] {
                a.min()[d] - b.max()[d]
            } else {
                0.0
            }
        }))
    }
}

/// Compute cosine distance between two vectors (1 - cosine similarity).
///
/// A zero vector has distance 1 to everything but itself.
pub fn cosine_distance(v1: &Vector, v2: &Vector) -> f64 {
    let norm1 = v1.norm();
    let norm2 = v2.norm();
    if norm1 == 0.0 || norm2 == 0.0 {
        return if norm1 == norm2 { 0.0 } else { 1.0 };
    }
    let dot: f64 = v1
        .as_slice()
        .iter()
        .zip(v2.as_slice())
        .map(|(a, b)| a * b)
        .sum();
    // Clamp to [-1, 1] to handle floating point errors
    1.0 - (dot / (norm1 * norm2)).clamp(-1.0, 1.0)
}

/// Edit distance between strings; a metric on arbitrary (non-vector) objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevenshteinDistance;

impl Distance<String> for LevenshteinDistance {
    fn distance(&self, a: &String, b: &String) -> f64 {
        let b: Vec<char> = b.chars().collect();
        let mut prev: Vec<usize> = (0..=b.len()).collect();
        let mut cur = vec![0; b.len() + 1];
        for (i, ca) in a.chars().enumerate() {
            cur[0] = i + 1;
            for (j, cb) in b.iter().enumerate() {
                let subst = prev[j] + usize::from(ca != *cb);
                cur[j + 1] = subst.min(prev[j + 1] + 1).min(cur[j] + 1);
            }
            std::mem::swap(&mut prev, &mut cur);
        }
        prev[b.len()] as f64
    }

    fn is_metric(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_euclidean_distance() {
        let v1 = Vector::new(vec![1.0, 2.0, 3.0]);
        let v2 = Vector::new(vec![4.0, 5.0, 6.0]);
        let dist = DistanceMetric::Euclidean.distance(&v1, &v2);
        assert_relative_eq!(dist, 5.196152422706632, epsilon = 1e-12);
    }

    #[test]
    fn test_manhattan_and_maximum() {
        let v1 = Vector::new(vec![1.0, -2.0]);
        let v2 = Vector::new(vec![4.0, 2.0]);
        assert_relative_eq!(DistanceMetric::Manhattan.distance(&v1, &v2), 7.0);
        assert_relative_eq!(DistanceMetric::Maximum.distance(&v1, &v2), 4.0);
    }

    #[test]
    fn test_cosine_distance() {
        let x = Vector::new(vec![1.0, 0.0]);
        let y = Vector::new(vec![0.0, 1.0]);
        let neg = Vector::new(vec![-1.0, 0.0]);
        assert_relative_eq!(cosine_distance(&x, &x), 0.0, epsilon = 1e-12);
        assert_relative_eq!(cosine_distance(&x, &y), 1.0, epsilon = 1e-12);
        assert_relative_eq!(cosine_distance(&x, &neg), 2.0, epsilon = 1e-12);
        assert_relative_eq!(cosine_distance(&x, &Vector::new(vec![0.0, 0.0])), 1.0);
    }

    #[test]
    fn test_capabilities() {
        assert!(DistanceMetric::Euclidean.as_spatial().is_some());
        assert!(DistanceMetric::Euclidean.is_metric());
        assert!(DistanceMetric::Cosine.as_spatial().is_none());
        assert!(!DistanceMetric::Cosine.is_metric());
    }

    #[test]
    fn test_min_dist_point() {
        let mbr = Mbr::new(vec![0.0, 0.0], vec![1.0, 1.0]);
        let d = DistanceMetric::Euclidean;
        assert_relative_eq!(d.min_dist(&[0.5, 0.5], &mbr), 0.0);
        assert_relative_eq!(d.min_dist(&[4.0, 5.0], &mbr), 5.0);
        assert_relative_eq!(DistanceMetric::Manhattan.min_dist(&[4.0, 5.0], &mbr), 7.0);
        assert_relative_eq!(DistanceMetric::Maximum.min_dist(&[-2.0, 0.5], &mbr), 2.0);
    }

    #[test]
    fn test_min_dist_never_exceeds_point_distance() {
        let mbr = Mbr::new(vec![-1.0, 2.0], vec![3.0, 4.0]);
        let q = [5.0, -1.0];
        for corner in [[-1.0, 2.0], [3.0, 4.0], [1.0, 3.0], [3.0, 2.0]] {
            for m in [
                DistanceMetric::Euclidean,
                DistanceMetric::Manhattan,
                DistanceMetric::Maximum,
            ] {
                assert!(m.min_dist(&q, &mbr) <= m.point_distance(&q, &corner) + 1e-12);
            }
        }
    }

    #[test]
    fn test_min_dist_mbr() {
        let a = Mbr::new(vec![0.0, 0.0], vec![1.0, 1.0]);
        let b = Mbr::new(vec![4.0, 5.0], vec![6.0, 6.0]);
        assert_relative_eq!(DistanceMetric::Euclidean.min_dist_mbr(&a, &b), 5.0);
        assert_relative_eq!(DistanceMetric::Euclidean.min_dist_mbr(&a, &a), 0.0);
    }

    #[test]
    fn test_levenshtein() {
        let d = LevenshteinDistance;
        assert_eq!(d.distance(&"kitten".to_string(), &"sitting".to_string()), 3.0);
        assert_eq!(d.distance(&"".to_string(), &"abc".to_string()), 3.0);
        assert_eq!(d.distance(&"same".to_string(), &"same".to_string()), 0.0);
    }
}
