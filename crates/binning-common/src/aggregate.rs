//! Aggregator capability: creates and merges bin feature vectors.

use crate::bin::{BinIndex, SpatialBin, TemporalBin};

/// Produces spatial bins from raw observations and merges them into
/// temporal bins.
///
/// Feature vectors are opaque to every other component; only the
/// aggregator knows their layout.
pub trait Aggregator: Send + Sync {
    /// Names of the input variables, in sample order.
    fn variable_names(&self) -> &[String];

    /// Names of the temporal (output) features, in feature order.
    fn feature_names(&self) -> Vec<String>;

    /// Build the spatial bin of one cell from the observations of one slice.
    ///
    /// `samples` holds one row of `variable_names().len()` values per
    /// observation.
    fn spatial_bin(&self, index: BinIndex, samples: &[f32]) -> SpatialBin;

    /// Merge all spatial bins of one cell into its temporal bin.
    fn temporal_bin(&self, index: BinIndex, spatial_bins: &[SpatialBin]) -> TemporalBin;
}

/// Arithmetic mean and standard deviation of every variable.
///
/// Spatial features per variable: `[sum, sum of squares, count]`.
/// Temporal features per variable: `[mean, sigma]`. NaN samples are ignored.
#[derive(Debug, Clone)]
pub struct MeanAggregator {
    variables: Vec<String>,
}

impl MeanAggregator {
    const SPATIAL_STRIDE: usize = 3;

    pub fn new(variables: Vec<String>) -> Self {
        Self { variables }
    }
}

impl Aggregator for MeanAggregator {
    fn variable_names(&self) -> &[String] {
        &self.variables
    }

    fn feature_names(&self) -> Vec<String> {
        self.variables
            .iter()
            .flat_map(|v| [format!("{}_mean", v), format!("{}_sigma", v)])
            .collect()
    }

    fn spatial_bin(&self, index: BinIndex, samples: &[f32]) -> SpatialBin {
        let num_vars = self.variables.len().max(1);
        let mut features = vec![0.0f32; self.variables.len() * Self::SPATIAL_STRIDE];
        let mut num_obs = 0u32;

        for row in samples.chunks_exact(num_vars) {
            num_obs += 1;
            for (var, &value) in row.iter().enumerate().take(self.variables.len()) {
                if value.is_nan() {
                    continue;
                }
                let base = var * Self::SPATIAL_STRIDE;
                features[base] += value;
                features[base + 1] += value * value;
                features[base + 2] += 1.0;
            }
        }

        SpatialBin::new(index, num_obs, features)
    }

    fn temporal_bin(&self, index: BinIndex, spatial_bins: &[SpatialBin]) -> TemporalBin {
        let num_vars = self.variables.len();
        let mut sums = vec![0.0f64; num_vars * Self::SPATIAL_STRIDE];
        let mut num_obs = 0u32;
        let mut num_passes = 0u32;

        for bin in spatial_bins {
            num_obs += bin.num_obs;
            num_passes += bin.num_passes;
            for (acc, &value) in sums.iter_mut().zip(bin.features.iter()) {
                *acc += value as f64;
            }
        }

        let mut features = Vec::with_capacity(num_vars * 2);
        for var in 0..num_vars {
            let base = var * Self::SPATIAL_STRIDE;
            let count = sums[base + 2];
            if count > 0.0 {
                let mean = sums[base] / count;
                let variance = (sums[base + 1] / count - mean * mean).max(0.0);
                features.push(mean as f32);
                features.push(variance.sqrt() as f32);
            } else {
                features.push(f32::NAN);
                features.push(f32::NAN);
            }
        }

        TemporalBin::new(index, num_obs, num_passes, features)
    }
}
