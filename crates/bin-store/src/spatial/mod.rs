//! Spatial bin collector: in-memory stage, file-backed stage and the
//! coordinator that spills one into the other.

mod file;
mod general;
mod memory;

pub use file::{FileSpatialBinCollector, SpatialBinFiles, SpatialBinGroups};
pub use general::{GeneralSpatialBinCollector, SpatialBinCollection};
pub use memory::MemorySpatialBinCollector;

use binning_common::{Result, SpatialBin};

/// Receives the spatial bins produced for one observation slice.
pub trait SpatialBinConsumer: Send + Sync {
    fn consume_spatial_bins(&self, bins: Vec<SpatialBin>) -> Result<()>;
}

const MIN_BINS_PER_FILE: u64 = 100_000;
const MAX_FILES: u64 = 10_000;

/// Index range covered by one spill file for a grid of `max_bins` cells.
pub fn bins_per_file(max_bins: u64) -> u64 {
    partition_size(max_bins, MIN_BINS_PER_FILE, MAX_FILES)
}

/// `max(min_per_file, ceil(n / min(ceil(n / min_per_file), max_files)))`,
/// with `n = 0` treated as 1.
pub(crate) fn partition_size(n: u64, min_per_file: u64, max_files: u64) -> u64 {
    let n = n.max(1);
    let file_count = n.div_ceil(min_per_file).min(max_files);
    min_per_file.max(n.div_ceil(file_count))
}
