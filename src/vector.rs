//! Feature vector type

use crate::error::{IndexError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A point in n-dimensional space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    data: Vec<f64>,
}

impl Vector {
    /// Create a new vector from a Vec<f64>
    pub fn new(data: Vec<f64>) -> Self {
        Self { data }
    }

    /// Get the dimension of the vector
    pub fn dimension(&self) -> usize {
        self.data.len()
    }

    /// Get the underlying data as a slice
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Check if this vector has the same dimension as another
    pub fn has_same_dimension(&self, other: &Vector) -> bool {
        self.dimension() == other.dimension()
    }

    /// Compute the L2 norm (magnitude) of the vector
    pub fn norm(&self) -> f64 {
        self.data.iter().map(|x| x * x).sum::<f64>().sqrt()
    }

    /// Fail with `DimensionMismatch` unless the vector has `expected` coordinates.
    pub fn check_dimension(&self, expected: usize) -> Result<()> {
        if self.dimension() != expected {
            return Err(IndexError::DimensionMismatch {
                expected,
                actual: self.dimension(),
            });
        }
        Ok(())
    }
}

impl From<Vec<f64>> for Vector {
    fn from(data: Vec<f64>) -> Self {
        Vector::new(data)
    }
}

impl FromStr for Vector {
    type Err = IndexError;

    /// Parse a vector from a comma-separated string
    fn from_str(s: &str) -> Result<Self> {
        let data: Result<Vec<f64>> = s
            .split(',')
            .map(|x| {
                x.trim().parse::<f64>().map_err(|_| {
                    IndexError::invalid(format!("Invalid float in vector: {:?}", x))
                })
            })
            .collect();
        let data = data?;
        if let Some(bad) = data.iter().find(|x| !x.is_finite()) {
            return Err(IndexError::invalid(format!(
                "Vector coordinates must be finite, got {}",
                bad
            )));
        }
        Ok(Vector::new(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_vector_creation() {
        let v = Vector::new(vec![1.0, 2.0, 3.0]);
        assert_eq!(v.dimension(), 3);
        assert_eq!(v.as_slice(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_vector_norm() {
        let v = Vector::new(vec![3.0, 4.0]);
        assert_relative_eq!(v.norm(), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_from_str() {
        let v: Vector = "1.0, 2.0, 3.0".parse().unwrap();
        assert_eq!(v.dimension(), 3);
        assert_eq!(v.as_slice(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_from_str_rejects_garbage() {
        assert!("1.0, abc".parse::<Vector>().is_err());
        assert!("1.0, inf".parse::<Vector>().is_err());
    }

    #[test]
    fn test_check_dimension() {
        let v = Vector::new(vec![1.0, 2.0]);
        assert!(v.check_dimension(2).is_ok());
        assert!(matches!(
            v.check_dimension(3),
            Err(IndexError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }
}
