//! Tree parameters: capacities, fill factors and split strategies.
//!
//! Settings are plain serde structs so that they can be kept in a JSON file
//! next to a saved index.

use crate::error::{IndexError, Result};
use crate::tree::TreeHeader;
use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Bytes of per-node bookkeeping in a page: page id, leaf flag, entry count.
const NODE_OVERHEAD: usize = 12;

/// Capacities below this work but make for deep trees.
const SMALL_CAPACITY: usize = 10;

/// Parameters of an R*-tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RStarTreeSettings {
    /// Maximum number of entries in a leaf node.
    pub leaf_capacity: usize,
    /// Maximum number of entries in a directory node.
    pub dir_capacity: usize,
    /// Minimum fill of non-root nodes, as a fraction of capacity.
    pub min_fill: f64,
    /// Fraction of an overflowing node's entries that is reinserted before splitting.
    pub reinsert_fraction: f64,
}

impl Default for RStarTreeSettings {
    fn default() -> Self {
        Self {
            leaf_capacity: 32,
            dir_capacity: 32,
            min_fill: 0.4,
            reinsert_fraction: 0.3,
        }
    }
}

impl RStarTreeSettings {
    pub fn new(leaf_capacity: usize, dir_capacity: usize) -> Self {
        Self {
            leaf_capacity,
            dir_capacity,
            ..Self::default()
        }
    }

    /// Derive capacities from a page size in bytes.
    ///
    /// A leaf entry holds an object id and `dimension` coordinates, a
    /// directory entry a page id and a rectangle.
    pub fn from_page_size(page_size: usize, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(IndexError::invalid("dimension must be at least 1"));
        }
        let usable = page_size.saturating_sub(NODE_OVERHEAD);
        let settings = Self::new(usable / (4 + 8 * dimension), usable / (4 + 16 * dimension));
        settings.validate()?;
        Ok(settings)
    }

    pub fn with_min_fill(mut self, min_fill: f64) -> Self {
        self.min_fill = min_fill;
        self
    }

    pub fn with_reinsert_fraction(mut self, fraction: f64) -> Self {
        self.reinsert_fraction = fraction;
        self
    }

    pub fn validate(&self) -> Result<()> {
        check_capacity("leaf", self.leaf_capacity)?;
        check_capacity("directory", self.dir_capacity)?;
        check_fraction("min_fill", self.min_fill, 0.5)?;
        check_fraction("reinsert_fraction", self.reinsert_fraction, 0.5)?;
        Ok(())
    }

    /// Header of an empty tree with these capacities.
    pub fn header(&self) -> TreeHeader {
        TreeHeader::new(
            self.leaf_capacity,
            self.dir_capacity,
            minimum(self.leaf_capacity, self.min_fill),
            minimum(self.dir_capacity, self.min_fill),
        )
    }
}

/// How an overflowing M-tree node picks its two new routing objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Promotion {
    /// The two entries farthest apart.
    FarthestPair,
    /// The pair minimising the larger of the two resulting covering radii.
    MinMaxRadius,
    /// Two entries drawn with a seeded generator.
    Random,
}

/// How the entries of a split M-tree node are assigned to the two routing objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distribution {
    /// Each entry goes to its nearer routing object.
    Hyperplane,
    /// Both sides alternately take their nearest remaining entry.
    Balanced,
}

/// Parameters of an M-tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MTreeSettings {
    pub leaf_capacity: usize,
    pub dir_capacity: usize,
    pub min_fill: f64,
    pub promotion: Promotion,
    pub distribution: Distribution,
    /// Seed for [`Promotion::Random`].
    pub seed: u64,
}

impl Default for MTreeSettings {
    fn default() -> Self {
        Self {
            leaf_capacity: 32,
            dir_capacity: 32,
            min_fill: 0.0,
            promotion: Promotion::FarthestPair,
            distribution: Distribution::Hyperplane,
            seed: 0,
        }
    }
}

impl MTreeSettings {
    pub fn new(leaf_capacity: usize, dir_capacity: usize) -> Self {
        Self {
            leaf_capacity,
            dir_capacity,
            ..Self::default()
        }
    }

    /// Derive capacities from a page size in bytes.
    ///
    /// Leaf entries hold an object id and a parent distance; directory
    /// entries a page id, a routing object id, the parent distance, the
    /// covering radius and a k-distance bound.
    pub fn from_page_size(page_size: usize) -> Result<Self> {
        let usable = page_size.saturating_sub(NODE_OVERHEAD);
        let settings = Self::new(usable / (4 + 8), usable / (4 + 4 + 3 * 8));
        settings.validate()?;
        Ok(settings)
    }

    pub fn with_min_fill(mut self, min_fill: f64) -> Self {
        self.min_fill = min_fill;
        self
    }

    pub fn with_promotion(mut self, promotion: Promotion) -> Self {
        self.promotion = promotion;
        self
    }

    pub fn with_distribution(mut self, distribution: Distribution) -> Self {
        self.distribution = distribution;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        check_capacity("leaf", self.leaf_capacity)?;
        check_capacity("directory", self.dir_capacity)?;
        check_fraction("min_fill", self.min_fill, 0.5)?;
        Ok(())
    }

    pub fn header(&self) -> TreeHeader {
        TreeHeader::new(
            self.leaf_capacity,
            self.dir_capacity,
            minimum(self.leaf_capacity, self.min_fill),
            minimum(self.dir_capacity, self.min_fill),
        )
    }
}

/// Parameters of an MkMax tree: an M-tree plus the largest supported k.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MkMaxSettings {
    pub mtree: MTreeSettings,
    pub k_max: usize,
}

impl Default for MkMaxSettings {
    fn default() -> Self {
        Self {
            mtree: MTreeSettings::default(),
            k_max: 10,
        }
    }
}

impl MkMaxSettings {
    pub fn new(mtree: MTreeSettings, k_max: usize) -> Self {
        Self { mtree, k_max }
    }

    pub fn validate(&self) -> Result<()> {
        self.mtree.validate()?;
        if self.k_max == 0 {
            return Err(IndexError::invalid("k_max must be at least 1"));
        }
        Ok(())
    }
}

/// Parameters of an RdKNN tree: an R*-tree plus the largest supported k.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RdKnnSettings {
    pub rstar: RStarTreeSettings,
    pub k_max: usize,
}

impl Default for RdKnnSettings {
    fn default() -> Self {
        Self {
            rstar: RStarTreeSettings::default(),
            k_max: 10,
        }
    }
}

impl RdKnnSettings {
    pub fn new(rstar: RStarTreeSettings, k_max: usize) -> Self {
        Self { rstar, k_max }
    }

    pub fn validate(&self) -> Result<()> {
        self.rstar.validate()?;
        if self.k_max == 0 {
            return Err(IndexError::invalid("k_max must be at least 1"));
        }
        Ok(())
    }
}

/// Load settings (or anything else serde can read) from a JSON file.
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let bytes = std::fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| IndexError::SerializationError(e.to_string()))
}

/// Minimum fill in entries; never below one so that empty nodes get dissolved.
fn minimum(capacity: usize, min_fill: f64) -> usize {
    ((capacity as f64 * min_fill).floor() as usize).max(1)
}

fn check_capacity(kind: &str, capacity: usize) -> Result<()> {
    if capacity <= 2 {
        return Err(IndexError::invalid(format!(
            "{} capacity must be larger than 2, got {}",
            kind, capacity
        )));
    }
    if capacity < SMALL_CAPACITY {
        warn!(
            "{} capacity {} is very small, consider a larger page size",
            kind, capacity
        );
    }
    Ok(())
}

fn check_fraction(name: &str, value: f64, max: f64) -> Result<()> {
    if !(0.0..=max).contains(&value) {
        return Err(IndexError::invalid(format!(
            "{} must be within [0, {}], got {}",
            name, max, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        assert!(RStarTreeSettings::default().validate().is_ok());
        assert!(MTreeSettings::default().validate().is_ok());
        assert!(MkMaxSettings::default().validate().is_ok());
        assert!(RdKnnSettings::default().validate().is_ok());
        assert!(RdKnnSettings::new(RStarTreeSettings::default(), 0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_rstar_header_minimums() {
        let header = RStarTreeSettings::new(20, 10).header();
        assert_eq!(header.leaf_capacity, 20);
        assert_eq!(header.leaf_minimum, 8);
        assert_eq!(header.dir_minimum, 4);
        assert_eq!(header.height, 1);
    }

    #[test]
    fn test_mtree_minimum_is_at_least_one() {
        let header = MTreeSettings::new(8, 8).header();
        assert_eq!(header.leaf_minimum, 1);
        assert_eq!(header.dir_minimum, 1);
    }

    #[test]
    fn test_from_page_size() {
        // (1024 - 12) / (4 + 16) = 50, (1024 - 12) / (4 + 32) = 28
        let settings = RStarTreeSettings::from_page_size(1024, 2).unwrap();
        assert_eq!(settings.leaf_capacity, 50);
        assert_eq!(settings.dir_capacity, 28);

        // (1024 - 12) / 12 = 84, (1024 - 12) / 32 = 31
        let settings = MTreeSettings::from_page_size(1024).unwrap();
        assert_eq!(settings.leaf_capacity, 84);
        assert_eq!(settings.dir_capacity, 31);
    }

    #[test]
    fn test_tiny_pages_rejected() {
        assert!(matches!(
            RStarTreeSettings::from_page_size(64, 8),
            Err(IndexError::InvalidParameter { .. })
        ));
        assert!(RStarTreeSettings::from_page_size(1024, 0).is_err());
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(RStarTreeSettings::new(2, 10).validate().is_err());
        assert!(RStarTreeSettings::default().with_min_fill(0.6).validate().is_err());
        assert!(RStarTreeSettings::default()
            .with_reinsert_fraction(-0.1)
            .validate()
            .is_err());
        assert!(MTreeSettings::default().with_min_fill(f64::NAN).validate().is_err());
        assert!(MkMaxSettings::new(MTreeSettings::default(), 0).validate().is_err());
    }

    #[test]
    fn test_load_json_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"leaf_capacity": 20, "promotion": "MinMaxRadius"}"#).unwrap();

        let settings: MTreeSettings = load_json(&path).unwrap();
        assert_eq!(settings.leaf_capacity, 20);
        assert_eq!(settings.dir_capacity, 32);
        assert_eq!(settings.promotion, Promotion::MinMaxRadius);
    }

    #[test]
    fn test_load_json_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            load_json::<RStarTreeSettings>(&path),
            Err(IndexError::SerializationError(_))
        ));
        assert!(matches!(
            load_json::<RStarTreeSettings>(dir.path().join("missing.json")),
            Err(IndexError::IoError(_))
        ));
    }
}
