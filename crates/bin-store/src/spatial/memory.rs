use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use binning_common::{BinIndex, BinningError, Result, SpatialBin};

use super::SpatialBinConsumer;

#[derive(Debug, Default)]
struct MemoryState {
    bins: BTreeMap<BinIndex, Vec<SpatialBin>>,
    sealed: bool,
}

/// In-memory stage: spatial bins grouped by index, guarded by a mutex.
#[derive(Debug, Default)]
pub struct MemorySpatialBinCollector {
    state: Mutex<MemoryState>,
}

impl MemorySpatialBinCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a batch of bins. Fails once the collector has been completed.
    pub fn consume(&self, bins: Vec<SpatialBin>) -> Result<()> {
        let mut state = self.lock();
        if state.sealed {
            return Err(BinningError::CollectorSealed);
        }
        for bin in bins {
            state.bins.entry(bin.index).or_default().push(bin);
        }
        Ok(())
    }

    /// Number of distinct bin indices held.
    pub fn len(&self) -> usize {
        self.lock().bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().bins.is_empty()
    }

    /// Remove every bin, returned in ascending index order, together with
    /// the number of distinct indices drained.
    pub fn drain(&self) -> (Vec<SpatialBin>, usize) {
        let bins = std::mem::take(&mut self.lock().bins);
        let distinct = bins.len();
        (bins.into_values().flatten().collect(), distinct)
    }

    /// Refuse further bins. Completing twice is an error.
    pub fn complete(&self) -> Result<()> {
        let mut state = self.lock();
        if state.sealed {
            return Err(BinningError::CollectorSealed);
        }
        state.sealed = true;
        Ok(())
    }
}

impl SpatialBinConsumer for MemorySpatialBinCollector {
    fn consume_spatial_bins(&self, bins: Vec<SpatialBin>) -> Result<()> {
        self.consume(bins)
    }
}
