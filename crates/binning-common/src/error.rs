//! Error types for the binning pipeline.

use thiserror::Error;

/// Result type alias using BinningError.
pub type Result<T> = std::result::Result<T, BinningError>;

/// Primary error type for bin collection, paging and product handling.
#[derive(Debug, Error)]
pub enum BinningError {
    // === Capacity / state violations ===
    #[error("spatial bin collector has already been completed")]
    CollectorSealed,

    #[error("temporal bin list is in read mode, no further bins can be added")]
    ListSealed,

    #[error("temporal bin list capacity of {capacity} bins exceeded")]
    CapacityExceeded { capacity: u64 },

    #[error("bin position {position} is out of range (list holds {len} bins)")]
    IndexOutOfRange { position: u64, len: u64 },

    #[error("temporal bin list has not been written yet")]
    NotYetWritten,

    #[error("spatial bins must arrive in non-decreasing index order (got {index} after {previous})")]
    UnsortedBins { previous: u64, index: u64 },

    // === I/O ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Input errors ===
    #[error("Invalid geometry: {0}")]
    Geometry(String),

    #[error("Invalid time specification: {0}")]
    InvalidTime(String),

    #[error("Product error: {0}")]
    Product(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BinningError {
    /// Create a Product error.
    pub fn product(msg: impl Into<String>) -> Self {
        Self::Product(msg.into())
    }

    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a Geometry error.
    pub fn geometry(msg: impl Into<String>) -> Self {
        Self::Geometry(msg.into())
    }

    /// True for errors that signal a misuse of a collector or list
    /// (programming errors, never recoverable).
    pub fn is_state_violation(&self) -> bool {
        matches!(
            self,
            BinningError::CollectorSealed
                | BinningError::ListSealed
                | BinningError::CapacityExceeded { .. }
                | BinningError::IndexOutOfRange { .. }
                | BinningError::NotYetWritten
                | BinningError::UnsortedBins { .. }
        )
    }
}
