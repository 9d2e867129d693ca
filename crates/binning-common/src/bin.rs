//! Bin records.

/// Global row-major identifier of a grid cell.
///
/// Ascending order is row-major order, starting at the north pole.
pub type BinIndex = u64;

/// Partial aggregate of one grid cell, produced from a single product slice.
///
/// Several spatial bins may share an index; merging them is the job of the
/// [`Aggregator`](crate::Aggregator), never of the collectors.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialBin {
    pub index: BinIndex,
    pub num_obs: u32,
    pub num_passes: u32,
    /// Opaque accumulator payload.
    pub features: Vec<f32>,
}

impl SpatialBin {
    /// Create a spatial bin seen in exactly one pass.
    pub fn new(index: BinIndex, num_obs: u32, features: Vec<f32>) -> Self {
        Self {
            index,
            num_obs,
            num_passes: 1,
            features,
        }
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }
}

/// Merged result of all spatial bins sharing one index.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalBin {
    pub index: BinIndex,
    pub num_obs: u32,
    pub num_passes: u32,
    pub features: Vec<f32>,
}

impl TemporalBin {
    pub fn new(index: BinIndex, num_obs: u32, num_passes: u32, features: Vec<f32>) -> Self {
        Self {
            index,
            num_obs,
            num_passes,
            features,
        }
    }

    /// A bin without observations: zero counts and NaN features.
    pub fn empty(index: BinIndex, feature_count: usize) -> Self {
        Self {
            index,
            num_obs: 0,
            num_passes: 0,
            features: vec![f32::NAN; feature_count],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.num_obs == 0
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_temporal_bin() {
        let bin = TemporalBin::empty(42, 3);
        assert_eq!(bin.index, 42);
        assert!(bin.is_empty());
        assert_eq!(bin.feature_count(), 3);
        assert!(bin.features.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_spatial_bin_single_pass() {
        let bin = SpatialBin::new(7, 4, vec![1.0, 2.0]);
        assert_eq!(bin.num_passes, 1);
        assert_eq!(bin.feature_count(), 2);
    }
}
