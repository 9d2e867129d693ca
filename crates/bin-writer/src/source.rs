//! Sorted temporal bin sequences consumed by the writers.

use bin_store::TemporalBinList;
use binning_common::{BinningError, Result, TemporalBin};

/// Random access to temporal bins sorted by ascending index.
///
/// The writers read it from the tail.
pub trait SortedBinSource {
    fn len(&self) -> u64;

    fn bin_at(&mut self, position: u64) -> Result<&TemporalBin>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SortedBinSource for TemporalBinList {
    fn len(&self) -> u64 {
        TemporalBinList::len(self)
    }

    fn bin_at(&mut self, position: u64) -> Result<&TemporalBin> {
        self.get(position)
    }
}

impl SortedBinSource for Vec<TemporalBin> {
    fn len(&self) -> u64 {
        Vec::len(self) as u64
    }

    fn bin_at(&mut self, position: u64) -> Result<&TemporalBin> {
        let len = Vec::len(self) as u64;
        self.get(position as usize)
            .ok_or(BinningError::IndexOutOfRange { position, len })
    }
}
