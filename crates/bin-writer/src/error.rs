//! Error types for bin file writing.

use binning_common::{BinIndex, BinningError};
use thiserror::Error;

/// Errors that can occur while writing a bin file.
#[derive(Error, Debug)]
pub enum WriterError {
    /// Reading the bin source failed.
    #[error(transparent)]
    Binning(#[from] BinningError),

    /// The bin source is not strictly ascending.
    #[error("bins must be strictly ascending by index (found {previous} before {index})")]
    UnsortedBins { previous: BinIndex, index: BinIndex },

    /// A bin index lies outside the grid.
    #[error("bin index {index} is outside the grid of {num_bins} bins")]
    BinOutOfRange { index: BinIndex, num_bins: u64 },

    /// A bin carries a different number of features than declared.
    #[error("bin {index} has {actual} features, expected {expected}")]
    FeatureCountMismatch {
        index: BinIndex,
        expected: usize,
        actual: usize,
    },

    /// The grid cannot be written densely.
    #[error("grid of {num_bins} bins exceeds the dense format limit of {limit} records; use the sparse format")]
    GridTooLarge { num_bins: u64, limit: u64 },

    /// Nothing to write.
    #[error("no bins to write")]
    NoBins,

    /// Storage/IO error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl WriterError {
    /// Create a Storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<std::io::Error> for WriterError {
    fn from(e: std::io::Error) -> Self {
        Self::Binning(BinningError::Io(e))
    }
}

/// Result type for writer operations.
pub type Result<T> = std::result::Result<T, WriterError>;
