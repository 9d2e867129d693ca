//! Shared test utilities for the l3-binning workspace.
//!
//! This crate provides common testing infrastructure including:
//! - A small fixed-column planetary grid for hand-checkable scenarios
//! - In-memory source products with affine geo-coding
//! - Bin and raster data generators
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{MemoryProduct, RegularGrid};
//! ```

pub mod fixtures;
pub mod generators;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;

/// Create a temporary directory with a recognizable prefix.
pub fn temp_test_dir(prefix: &str) -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .expect("Failed to create temp directory")
}

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Macro asserting that a sequence of bins is sorted by ascending index.
///
/// ```ignore
/// use test_utils::assert_sorted_by_index;
///
/// assert_sorted_by_index!(bins);
/// ```
#[macro_export]
macro_rules! assert_sorted_by_index {
    ($bins:expr) => {{
        let indices: Vec<u64> = $bins.iter().map(|b| b.index).collect();
        for pair in indices.windows(2) {
            assert!(
                pair[0] <= pair[1],
                "bins not sorted: {} before {} in {:?}",
                pair[0],
                pair[1],
                indices
            );
        }
    }};
}

#[cfg(test)]
mod tests {
    use binning_common::SpatialBin;

    #[test]
    fn test_assert_approx_eq_passes() {
        assert_approx_eq!(1.0001, 1.0, 0.001);
        assert_approx_eq!(0.0, 0.0, 0.0001);
        assert_approx_eq!(-5.5, -5.500001, 0.0001);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_assert_approx_eq_fails() {
        assert_approx_eq!(1.1, 1.0, 0.001);
    }

    #[test]
    #[should_panic(expected = "bins not sorted")]
    fn test_assert_sorted_by_index_fails() {
        let bins = vec![SpatialBin::new(3, 1, vec![]), SpatialBin::new(1, 1, vec![])];
        assert_sorted_by_index!(bins);
    }
}
