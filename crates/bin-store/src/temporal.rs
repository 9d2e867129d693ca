//! Paged, fixed-capacity list of temporal bins.
//!
//! Bins are appended sequentially during temporal binning and read back by
//! position by the bin writers. Only one page is held in memory; every other
//! page lives in a scratch file named after its page number.

use std::path::Path;

use binning_common::{BinningError, Result, TemporalBin};
use tracing::debug;

use crate::bin_io;
use crate::scratch::ScratchDir;
use crate::spatial::partition_size;

const MIN_BINS_PER_PAGE: u64 = 1_000;
const MAX_PAGES: u64 = 10_000;

/// Bins per page file for a list of `capacity` bins.
pub fn temporal_bins_per_file(capacity: u64) -> u64 {
    partition_size(capacity, MIN_BINS_PER_PAGE, MAX_PAGES)
}

fn page_name(page: u64) -> String {
    format!("page-{:05}.bin", page)
}

/// Access phase of a [`TemporalBinList`]. The transition is one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListState {
    Writing,
    Reading,
}

/// Page cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageStats {
    /// Pages read back from their files.
    pub page_loads: u64,
    /// Pages written to their files.
    pub page_flushes: u64,
    /// Reads served by the already loaded page.
    pub hits: u64,
}

/// Append-then-read list of temporal bins with a depth-1 page cache.
#[derive(Debug)]
pub struct TemporalBinList {
    scratch: ScratchDir,
    capacity: u64,
    bins_per_file: u64,
    len: u64,
    state: ListState,
    page: Vec<TemporalBin>,
    page_index: Option<u64>,
    page_dirty: bool,
    stats: PageStats,
}

impl TemporalBinList {
    pub fn new(capacity: u64, scratch_root: Option<&Path>) -> Result<Self> {
        let scratch = ScratchDir::create(scratch_root, "temporal-bins-")?;
        let bins_per_file = temporal_bins_per_file(capacity);
        debug!(capacity, bins_per_file, "Created temporal bin list");
        Ok(Self {
            scratch,
            capacity,
            bins_per_file,
            len: 0,
            state: ListState::Writing,
            page: Vec::new(),
            page_index: None,
            page_dirty: false,
            stats: PageStats::default(),
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn bins_per_file(&self) -> u64 {
        self.bins_per_file
    }

    pub fn state(&self) -> ListState {
        self.state
    }

    pub fn stats(&self) -> PageStats {
        self.stats
    }

    /// Append a bin. Only allowed before the first [`get`](Self::get).
    pub fn add(&mut self, bin: TemporalBin) -> Result<()> {
        if self.state == ListState::Reading {
            return Err(BinningError::ListSealed);
        }
        if self.len >= self.capacity {
            return Err(BinningError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        let page = self.len / self.bins_per_file;
        if self.page_index != Some(page) {
            self.flush_page()?;
            self.load_page(page)?;
        }
        self.page.push(bin);
        self.page_dirty = true;
        self.len += 1;
        Ok(())
    }

    /// Bin at `position`. The first call switches the list to read mode.
    pub fn get(&mut self, position: u64) -> Result<&TemporalBin> {
        if self.len == 0 {
            return Err(BinningError::NotYetWritten);
        }
        if position >= self.len {
            return Err(BinningError::IndexOutOfRange {
                position,
                len: self.len,
            });
        }
        if self.state == ListState::Writing {
            self.flush_page()?;
            self.state = ListState::Reading;
            debug!(len = self.len, "Temporal bin list switched to read mode");
        }

        let page = position / self.bins_per_file;
        if self.page_index == Some(page) {
            self.stats.hits += 1;
        } else {
            self.load_page(page)?;
        }

        let offset = (position - page * self.bins_per_file) as usize;
        self.page.get(offset).ok_or(BinningError::IndexOutOfRange {
            position,
            len: self.len,
        })
    }

    fn flush_page(&mut self) -> Result<()> {
        if let (Some(page), true) = (self.page_index, self.page_dirty) {
            bin_io::write_bins(&self.scratch.file(&page_name(page)), &self.page)?;
            self.page_dirty = false;
            self.stats.page_flushes += 1;
        }
        Ok(())
    }

    fn load_page(&mut self, page: u64) -> Result<()> {
        let path = self.scratch.file(&page_name(page));
        self.page = if path.exists() {
            self.stats.page_loads += 1;
            bin_io::read_bins(&path)?
        } else {
            Vec::new()
        };
        self.page_index = Some(page);
        self.page_dirty = false;
        Ok(())
    }

    /// Delete all page files.
    pub fn close(self) -> Result<()> {
        debug!(
            page_loads = self.stats.page_loads,
            page_flushes = self.stats.page_flushes,
            hits = self.stats.hits,
            "Closing temporal bin list"
        );
        self.scratch.close()
    }
}
