use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use binning_common::{BinningError, Result, SpatialBin};
use tracing::{debug, info};

use super::file::{FileSpatialBinCollector, SpatialBinFiles, SpatialBinGroups};
use super::memory::MemorySpatialBinCollector;
use super::SpatialBinConsumer;

/// Spatial bin collector that keeps bins in memory and spills them to disk.
///
/// Every batch goes to the in-memory stage. Once that stage holds more
/// than `spill_threshold` distinct indices it is drained, in ascending
/// order, into the file-backed stage. Producers may call
/// [`consume`](Self::consume) concurrently.
#[derive(Debug)]
pub struct GeneralSpatialBinCollector {
    memory: MemorySpatialBinCollector,
    files: Mutex<Option<FileSpatialBinCollector>>,
    spill_threshold: usize,
    max_bin_count: AtomicU64,
    spills: AtomicUsize,
}

impl GeneralSpatialBinCollector {
    /// Distinct indices held in memory before spilling.
    pub const DEFAULT_SPILL_THRESHOLD: usize = 12_000;

    /// Create a collector for a grid of `max_bins` cells.
    pub fn new(max_bins: u64, scratch_root: Option<&Path>) -> Result<Self> {
        Self::with_spill_threshold(max_bins, scratch_root, Self::DEFAULT_SPILL_THRESHOLD)
    }

    pub fn with_spill_threshold(
        max_bins: u64,
        scratch_root: Option<&Path>,
        spill_threshold: usize,
    ) -> Result<Self> {
        Ok(Self {
            memory: MemorySpatialBinCollector::new(),
            files: Mutex::new(Some(FileSpatialBinCollector::new(max_bins, scratch_root)?)),
            spill_threshold,
            max_bin_count: AtomicU64::new(0),
            spills: AtomicUsize::new(0),
        })
    }

    fn lock_files(&self) -> MutexGuard<'_, Option<FileSpatialBinCollector>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a batch of spatial bins in any order.
    pub fn consume(&self, bins: Vec<SpatialBin>) -> Result<()> {
        self.memory.consume(bins)?;
        if self.memory.len() > self.spill_threshold {
            let mut files = self.lock_files();
            let collector = files.as_mut().ok_or(BinningError::CollectorSealed)?;
            // Another producer may have spilled while we waited for the lock
            if self.memory.len() > self.spill_threshold {
                let distinct = self.spill(collector)?;
                let spill = self.spills.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(spill, distinct, "Spilled spatial bins to disk");
            }
        }
        Ok(())
    }

    fn spill(&self, collector: &mut FileSpatialBinCollector) -> Result<usize> {
        let (bins, distinct) = self.memory.drain();
        if distinct > 0 {
            collector.consume(bins)?;
            self.max_bin_count
                .fetch_add(distinct as u64, Ordering::Relaxed);
        }
        Ok(distinct)
    }

    /// Number of times the memory stage was spilled so far.
    pub fn spill_count(&self) -> usize {
        self.spills.load(Ordering::Relaxed)
    }

    /// Drain the memory stage, seal both stages and hand out the collected bins.
    pub fn complete(&self) -> Result<SpatialBinCollection> {
        self.memory.complete()?;
        let mut files = self.lock_files();
        let mut collector = files.take().ok_or(BinningError::CollectorSealed)?;
        self.spill(&mut collector)?;

        let files = collector.complete()?;
        let collection = SpatialBinCollection {
            files,
            max_bin_count: self.max_bin_count.load(Ordering::Relaxed),
        };
        info!(
            max_bin_count = collection.max_bin_count,
            spills = self.spill_count(),
            spill_files = collection.file_count(),
            "Spatial binning completed"
        );
        Ok(collection)
    }
}

impl SpatialBinConsumer for GeneralSpatialBinCollector {
    fn consume_spatial_bins(&self, bins: Vec<SpatialBin>) -> Result<()> {
        self.consume(bins)
    }
}

/// Result of spatial binning: every spatial bin, grouped by index.
#[derive(Debug)]
pub struct SpatialBinCollection {
    files: SpatialBinFiles,
    max_bin_count: u64,
}

impl SpatialBinCollection {
    /// Upper bound on the number of distinct bin indices.
    ///
    /// Indices spilled in different drains are counted once per drain.
    pub fn max_bin_count(&self) -> u64 {
        self.max_bin_count
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.files.file_count()
    }

    /// Iterate the `(index, spatial bins)` groups in ascending index order.
    pub fn into_groups(self) -> SpatialBinGroups {
        self.files.into_groups()
    }

    pub fn close(self) -> Result<()> {
        self.files.close()
    }
}
