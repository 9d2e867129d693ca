//! Observation slices and the binner capability that consumes them.

use std::collections::BTreeMap;

use bin_store::SpatialBinConsumer;
use binning_common::{
    Aggregator, BinIndex, PixelWindow, PlanetaryGrid, Result, SourceProduct,
};
use tracing::trace;

/// The samples of one processing window of a product.
pub struct ObservationSlice<'p> {
    pub product: &'p dyn SourceProduct,
    pub window: PixelWindow,
    /// One row-major sample array per variable, in variable order.
    pub variables: Vec<Vec<f32>>,
    /// Per pixel validity; `None` means every pixel is valid.
    pub mask: Option<Vec<bool>>,
    /// Sub-pixel offsets, used in both directions.
    pub super_sampling_steps: Vec<f64>,
}

impl<'p> ObservationSlice<'p> {
    /// Number of pixels in the window.
    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn is_valid(&self, pixel: usize) -> bool {
        self.mask.as_ref().map_or(true, |mask| mask[pixel])
    }

    /// Append the variable samples of one pixel to `out`.
    pub fn extend_samples(&self, pixel: usize, out: &mut Vec<f32>) {
        out.extend(self.variables.iter().map(|values| values[pixel]));
    }
}

/// Turns observation slices into spatial bins.
pub trait ObservationBinner {
    /// Bin one slice. Returns the number of observations used.
    fn process_slice(&self, slice: &ObservationSlice<'_>) -> Result<u64>;
}

/// Reference binner: every valid sub-pixel sample is located on the grid
/// and the samples of each cell become one spatial bin.
pub struct GridObservationBinner<'a, C: SpatialBinConsumer> {
    grid: &'a dyn PlanetaryGrid,
    aggregator: &'a dyn Aggregator,
    consumer: &'a C,
}

impl<'a, C: SpatialBinConsumer> GridObservationBinner<'a, C> {
    pub fn new(
        grid: &'a dyn PlanetaryGrid,
        aggregator: &'a dyn Aggregator,
        consumer: &'a C,
    ) -> Self {
        Self {
            grid,
            aggregator,
            consumer,
        }
    }
}

impl<C: SpatialBinConsumer> ObservationBinner for GridObservationBinner<'_, C> {
    fn process_slice(&self, slice: &ObservationSlice<'_>) -> Result<u64> {
        let geo_coding = match slice.product.geo_coding() {
            Some(gc) if gc.can_get_geo_pos() => gc,
            _ => return Ok(0),
        };

        let mut cells: BTreeMap<BinIndex, Vec<f32>> = BTreeMap::new();
        let mut observations = 0u64;
        let window = slice.window;

        for row in 0..window.height {
            for col in 0..window.width {
                let pixel = row * window.width + col;
                if !slice.is_valid(pixel) {
                    continue;
                }
                let x = (window.x + col) as f64;
                let y = (window.y + row) as f64;
                for &sy in &slice.super_sampling_steps {
                    for &sx in &slice.super_sampling_steps {
                        let pos = match geo_coding.geo_pos(x + sx, y + sy) {
                            Some(pos) if pos.is_valid() => pos,
                            _ => continue,
                        };
                        let index = self.grid.bin_index(pos.lat, pos.lon);
                        slice.extend_samples(pixel, cells.entry(index).or_default());
                        observations += 1;
                    }
                }
            }
        }

        let bins: Vec<_> = cells
            .into_iter()
            .map(|(index, samples)| self.aggregator.spatial_bin(index, &samples))
            .collect();
        trace!(
            product = slice.product.name(),
            y = window.y,
            bins = bins.len(),
            observations,
            "Slice binned"
        );
        if !bins.is_empty() {
            self.consumer.consume_spatial_bins(bins)?;
        }
        Ok(observations)
    }
}
