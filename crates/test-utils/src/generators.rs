//! Test data generators for creating synthetic observations and bins.
//!
//! These generators create predictable, verifiable test data patterns
//! that can be used across the test suite.

use binning_common::{BinIndex, SpatialBin, TemporalBin};

/// Creates a test grid with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50); // 10 * 5
/// assert_eq!(grid[0], 0.0);   // col=0, row=0 -> 0*1000 + 0
/// assert_eq!(grid[1], 1000.0); // col=1, row=0 -> 1*1000 + 0
/// assert_eq!(grid[10], 1.0);  // col=0, row=1 -> 0*1000 + 1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// Creates a grid filled with a constant value.
pub fn create_constant_grid(width: usize, height: usize, value: f32) -> Vec<f32> {
    vec![value; width * height]
}

/// Creates a grid where every `nan_every`-th value (row-major) is NaN and
/// all others equal `value`.
pub fn create_grid_with_nans(width: usize, height: usize, value: f32, nan_every: usize) -> Vec<f32> {
    (0..width * height)
        .map(|i| {
            if nan_every > 0 && i % nan_every == 0 {
                f32::NAN
            } else {
                value
            }
        })
        .collect()
}

/// Deterministic pseudo-random sequence (linear congruential generator).
///
/// Reproducible across platforms so that shuffled test inputs are stable.
pub fn lcg_sequence(seed: u32, count: usize) -> Vec<u32> {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    (0..count)
        .map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            state >> 8
        })
        .collect()
}

/// Spatial bins with one observation each at the given indices.
///
/// Features are `[index, 1.0]` so that merged results are easy to verify.
pub fn create_spatial_bins(indices: &[BinIndex]) -> Vec<SpatialBin> {
    indices
        .iter()
        .map(|&index| SpatialBin::new(index, 1, vec![index as f32, 1.0]))
        .collect()
}

/// Spatial bins at pseudo-random indices below `max_index`, in arrival order.
pub fn create_shuffled_spatial_bins(seed: u32, count: usize, max_index: BinIndex) -> Vec<SpatialBin> {
    let indices: Vec<BinIndex> = lcg_sequence(seed, count)
        .into_iter()
        .map(|v| v as BinIndex % max_index.max(1))
        .collect();
    create_spatial_bins(&indices)
}

/// Temporal bins at the given (ascending) indices.
///
/// `num_obs` equals `index + 1` and the single feature equals the index.
pub fn create_temporal_bins(indices: &[BinIndex]) -> Vec<TemporalBin> {
    indices
        .iter()
        .map(|&index| TemporalBin::new(index, index as u32 + 1, 1, vec![index as f32]))
        .collect()
}
