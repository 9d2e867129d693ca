//! Product binning driver.

use std::time::Instant;

use binning_common::{BinningError, Raster, Result, SourceProduct};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::observation::{ObservationBinner, ObservationSlice};
use crate::window::{processing_windows, super_sampling_steps};

/// Slicing parameters of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductBinnerConfig {
    /// Window height, overriding the preferred tile height.
    pub slice_height: Option<usize>,
    /// Sub-pixels per pixel side.
    pub super_sampling: u32,
    /// Band whose non-zero samples mark valid pixels.
    pub mask_band: Option<String>,
}

/// Feeds the windows of each product into an observation binner.
pub struct ProductBinner<'a, B: ObservationBinner> {
    binner: &'a B,
    variables: Vec<String>,
    config: ProductBinnerConfig,
}

impl<'a, B: ObservationBinner> ProductBinner<'a, B> {
    pub fn new(binner: &'a B, variables: Vec<String>, config: ProductBinnerConfig) -> Self {
        Self {
            binner,
            variables,
            config,
        }
    }

    pub fn config(&self) -> &ProductBinnerConfig {
        &self.config
    }

    fn raster<'p>(&self, product: &'p dyn SourceProduct, name: &str) -> Result<&'p dyn Raster> {
        product.raster(name).ok_or_else(|| {
            BinningError::product(format!(
                "product '{}' has no band '{}'",
                product.name(),
                name
            ))
        })
    }

    /// Bin all windows of a product. Returns the number of observations.
    pub fn process_product(&self, product: &dyn SourceProduct) -> Result<u64> {
        let started = Instant::now();

        let variables = self
            .variables
            .iter()
            .map(|name| self.raster(product, name))
            .collect::<Result<Vec<_>>>()?;
        let mask = self
            .config
            .mask_band
            .as_deref()
            .map(|name| self.raster(product, name))
            .transpose()?;

        let mut rasters = variables.clone();
        rasters.extend(mask);
        let windows = processing_windows(
            product.width(),
            product.height(),
            &rasters,
            self.config.slice_height,
        );
        let steps = super_sampling_steps(self.config.super_sampling);

        let mut observations = 0u64;
        for window in &windows {
            let slice = ObservationSlice {
                product,
                window: *window,
                variables: variables
                    .iter()
                    .map(|raster| raster.read_window(window))
                    .collect::<Result<Vec<_>>>()?,
                mask: mask
                    .map(|raster| raster.read_window(window))
                    .transpose()?
                    .map(|values| values.iter().map(|&v| v != 0.0 && !v.is_nan()).collect()),
                super_sampling_steps: steps.clone(),
            };
            let count = self.binner.process_slice(&slice)?;
            debug!(
                product = product.name(),
                x = window.x,
                y = window.y,
                width = window.width,
                height = window.height,
                observations = count,
                "Processed slice"
            );
            observations += count;
        }

        info!(
            product = product.name(),
            slices = windows.len(),
            observations,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Spatially binned product"
        );
        Ok(observations)
    }
}
