//! Error types for the index engine

use crate::page::PageId;
use thiserror::Error;

/// Result type alias for index operations
pub type Result<T> = std::result::Result<T, IndexError>;

/// Error types that can occur while building or querying an index
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid parameter: {reason}")]
    InvalidParameter { reason: String },

    #[error("Unsupported operation: {operation} is not implemented by {index}")]
    Unsupported {
        operation: &'static str,
        index: &'static str,
    },

    #[error("Page {0} not found in page file")]
    PageNotFound(PageId),

    #[error("Tree corrupted: {0}")]
    Corrupted(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl IndexError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        IndexError::InvalidParameter {
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupted(reason: impl Into<String>) -> Self {
        IndexError::Corrupted(reason.into())
    }

    /// Whether this error reports an operation the index deliberately omits.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, IndexError::Unsupported { .. })
    }
}

/// Reject k = 0 at the call site.
pub(crate) fn check_k(k: usize) -> Result<()> {
    if k == 0 {
        return Err(IndexError::invalid("k must be at least 1"));
    }
    Ok(())
}

/// Reject negative or NaN radii at the call site.
pub(crate) fn check_radius(radius: f64) -> Result<()> {
    if radius.is_nan() || radius < 0.0 {
        return Err(IndexError::invalid(format!(
            "radius must be non-negative, got {}",
            radius
        )));
    }
    Ok(())
}
