//! One binning run: filter, spatial binning, temporal binning, write.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use bin_store::{GeneralSpatialBinCollector, TemporalBinList};
use bin_writer::{BinFileMetadata, BinWriter};
use binning_common::{
    geo_boundary, Aggregator, BoundingBox, PlanetaryGrid, Polygon, SourceProduct,
};
use chrono::{DateTime, Utc};
use product_filter::{create_source_product_filter, DEFAULT_BOUNDARY_STEP};
use spatial_binner::{GridObservationBinner, ProductBinner};
use tracing::{debug, info, warn};

use crate::config::BinningRunConfig;

/// Outcome of a run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Products that passed the filter chain.
    pub accepted: usize,
    /// `(product name, reason)` of every product left out.
    pub rejected: Vec<(String, String)>,
    pub observations: u64,
    /// Records written to the bin file.
    pub bins_written: u64,
    /// The bin file, `None` if no bins were produced.
    pub output: Option<PathBuf>,
}

/// Min start / max end time over the accepted products.
#[derive(Debug, Default)]
struct TimeCoverage {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl TimeCoverage {
    fn update(&mut self, product: &dyn SourceProduct) {
        if let Some(t) = product.start_time() {
            self.start = Some(self.start.map_or(t, |s| s.min(t)));
        }
        if let Some(t) = product.end_time() {
            self.end = Some(self.end.map_or(t, |e| e.max(t)));
        }
    }
}

pub struct BinningRun<'a> {
    config: &'a BinningRunConfig,
    grid: &'a dyn PlanetaryGrid,
    aggregator: &'a dyn Aggregator,
    cancelled: Option<&'a AtomicBool>,
}

impl<'a> BinningRun<'a> {
    pub fn new(
        config: &'a BinningRunConfig,
        grid: &'a dyn PlanetaryGrid,
        aggregator: &'a dyn Aggregator,
    ) -> Self {
        Self {
            config,
            grid,
            aggregator,
            cancelled: None,
        }
    }

    /// Abort between products once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.cancelled = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled
            .map_or(false, |flag| flag.load(Ordering::SeqCst))
    }

    /// Run over the given products.
    ///
    /// Products that fail to load are logged and reported as rejected.
    pub fn run<I, P>(&self, products: I) -> Result<RunSummary>
    where
        I: IntoIterator<Item = Result<P>>,
        P: SourceProduct,
    {
        let started = Instant::now();
        let config = self.config;
        let start_time = config.start_time()?;
        let end_time = config.end_time()?;
        let region = config.region_polygon()?;
        let scratch_root = config.scratch_dir.as_deref();

        let mut filter = create_source_product_filter(
            config.data_period()?,
            start_time,
            end_time,
            region.clone(),
        );
        info!(filters = ?filter.chain_names(), "Product filter chain");

        let collector = GeneralSpatialBinCollector::new(self.grid.num_bins(), scratch_root)?;
        let observation_binner = GridObservationBinner::new(self.grid, self.aggregator, &collector);
        let binner = ProductBinner::new(
            &observation_binner,
            self.aggregator.variable_names().to_vec(),
            config.binner_config(),
        );

        let mut summary = RunSummary::default();
        let mut coverage = TimeCoverage::default();
        let mut footprint: Option<BoundingBox> = None;
        let mut source_names = Vec::new();

        for product in products {
            if self.is_cancelled() {
                anyhow::bail!("Binning run cancelled");
            }
            let product = match product {
                Ok(product) => product,
                Err(e) => {
                    warn!(error = %format!("{:#}", e), "Failed to read source product");
                    summary
                        .rejected
                        .push(("<unreadable>".to_string(), format!("{:#}", e)));
                    continue;
                }
            };

            if !filter.accept(&product) {
                let reason = filter.reason().unwrap_or("rejected").to_string();
                warn!(product = product.name(), reason = %reason, "Filtered out product");
                summary.rejected.push((product.name().to_string(), reason));
                continue;
            }

            info!(product = product.name(), "Spatial binning of product");
            debug!(
                start_time = ?product.start_time(),
                end_time = ?product.end_time(),
                "Product time span"
            );
            coverage.update(&product);
            summary.observations += binner
                .process_product(&product)
                .with_context(|| format!("Spatial binning of product '{}' failed", product.name()))?;
            summary.accepted += 1;
            source_names.push(product.name().to_string());

            if region.is_none() {
                if let Some(boundary) = geo_boundary(&product, DEFAULT_BOUNDARY_STEP) {
                    match Polygon::from_geo_positions(&boundary) {
                        Ok(polygon) => {
                            let bounds = polygon.bounds();
                            footprint = Some(footprint.map_or(bounds, |f| f.union(&bounds)));
                        }
                        Err(e) => warn!(
                            product = product.name(),
                            error = %e,
                            "Footprint not usable, left out of the output region"
                        ),
                    }
                }
            }
        }

        let collection = collector.complete()?;
        if collection.is_empty() {
            warn!("No bins have been generated, no output has been written");
            collection.close()?;
            return Ok(summary);
        }

        let region = region.or_else(|| footprint.as_ref().map(Polygon::from_bbox));

        // Temporal binning
        let num_bins = collection.max_bin_count();
        let mut temporal = TemporalBinList::new(num_bins, scratch_root)?;
        let temporal_started = Instant::now();
        let hundredth = (num_bins / 100).max(1);
        let mut since_last = 0u64;
        let mut percent = 0u32;
        for group in collection.into_groups() {
            let (index, spatial_bins) = group?;
            temporal.add(self.aggregator.temporal_bin(index, &spatial_bins))?;
            since_last += 1;
            if since_last >= hundredth {
                since_last = 0;
                percent += 1;
                info!(percent, "Finished temporal bins");
            }
        }
        // max_bin_count over-counts indices spilled more than once
        if percent < 100 {
            info!(percent = 100u32, "Finished temporal bins");
        }
        info!(
            bins = temporal.len(),
            elapsed_ms = temporal_started.elapsed().as_millis() as u64,
            "Temporal binning done"
        );

        // Write
        let output = config.output.path.clone();
        let metadata = self.metadata(&output, &source_names, start_time, end_time, &coverage, region);
        let writer = BinWriter::new(
            self.grid,
            self.aggregator.feature_names(),
            metadata,
            config.writer.clone(),
        );
        info!(path = %output.display(), format = %config.output.format, "Writing binned data");
        let written = writer
            .write_to_path(config.output.format, &output, &mut temporal)
            .with_context(|| format!("Failed to write bin file {:?}", output))?;
        temporal.close()?;

        summary.bins_written = written.records;
        summary.output = Some(output);
        info!(
            products = summary.accepted,
            rejected = summary.rejected.len(),
            observations = summary.observations,
            bins = summary.bins_written,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Binning run complete"
        );
        Ok(summary)
    }

    fn metadata(
        &self,
        output: &std::path::Path,
        source_names: &[String],
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        coverage: &TimeCoverage,
        region: Option<Polygon>,
    ) -> BinFileMetadata {
        let product_name = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut metadata = BinFileMetadata {
            time_coverage_start: start_time.or(coverage.start),
            time_coverage_end: end_time.or(coverage.end),
            region: region.map(|r| r.to_wkt()),
            super_sampling: self.config.super_sampling,
            properties: Default::default(),
        }
        .with_property("product_name", product_name)
        .with_property("software_name", env!("CARGO_PKG_NAME"))
        .with_property("software_version", env!("CARGO_PKG_VERSION"))
        .with_property("processing_time", Utc::now().to_rfc3339())
        .with_property("source_products", source_names.join(","));

        for (key, value) in &self.config.properties {
            metadata = metadata.with_property(key, value.clone());
        }
        metadata
    }
}
