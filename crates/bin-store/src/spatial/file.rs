use std::collections::{btree_map, BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use binning_common::{BinIndex, BinningError, Result, SpatialBin};
use tracing::debug;

use super::bins_per_file;
use crate::bin_io;
use crate::scratch::ScratchDir;

fn file_name(file_index: u64) -> String {
    format!("bins-{:05}.dat", file_index)
}

/// File-backed stage of the spatial collector.
///
/// The index space is partitioned into ranges of `bins_per_file` cells; every
/// range has one append-only scratch file. Batches must arrive in
/// non-decreasing index order. [`complete`](Self::complete) consumes the
/// collector and returns the read-only [`SpatialBinFiles`].
#[derive(Debug)]
pub struct FileSpatialBinCollector {
    scratch: ScratchDir,
    bins_per_file: u64,
    buffer: Vec<SpatialBin>,
    current_file: Option<u64>,
    files: BTreeSet<u64>,
    bins_written: u64,
}

impl FileSpatialBinCollector {
    /// Create a collector for a grid of `max_bins` cells.
    pub fn new(max_bins: u64, scratch_root: Option<&Path>) -> Result<Self> {
        let scratch = ScratchDir::create(scratch_root, "spatial-bins-")?;
        Ok(Self {
            scratch,
            bins_per_file: bins_per_file(max_bins),
            buffer: Vec::new(),
            current_file: None,
            files: BTreeSet::new(),
            bins_written: 0,
        })
    }

    pub fn bins_per_file(&self) -> u64 {
        self.bins_per_file
    }

    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }

    /// Append a batch sorted by ascending index.
    pub fn consume(&mut self, bins: Vec<SpatialBin>) -> Result<()> {
        for pair in bins.windows(2) {
            if pair[1].index < pair[0].index {
                return Err(BinningError::UnsortedBins {
                    previous: pair[0].index,
                    index: pair[1].index,
                });
            }
        }

        for bin in bins {
            let file_index = bin.index / self.bins_per_file;
            if self.current_file != Some(file_index) {
                self.flush()?;
                self.current_file = Some(file_index);
            }
            self.buffer.push(bin);
        }
        self.flush()
    }

    fn flush(&mut self) -> Result<()> {
        let Some(file_index) = self.current_file else {
            return Ok(());
        };
        if self.buffer.is_empty() {
            return Ok(());
        }
        let path = self.scratch.file(&file_name(file_index));
        bin_io::append_bins(&path, &self.buffer)?;
        self.bins_written += self.buffer.len() as u64;
        self.files.insert(file_index);
        self.buffer.clear();
        Ok(())
    }

    /// Flush pending bins and seal the collector.
    pub fn complete(mut self) -> Result<SpatialBinFiles> {
        self.flush()?;
        debug!(
            files = self.files.len(),
            bins = self.bins_written,
            "Sealed spatial bin files"
        );
        let files = self
            .files
            .iter()
            .map(|&i| self.scratch.file(&file_name(i)))
            .collect();
        Ok(SpatialBinFiles {
            scratch: self.scratch,
            files,
            bins_written: self.bins_written,
        })
    }
}

/// Sealed, read-only set of spill files.
#[derive(Debug)]
pub struct SpatialBinFiles {
    scratch: ScratchDir,
    files: Vec<PathBuf>,
    bins_written: u64,
}

impl SpatialBinFiles {
    /// Number of non-empty spill files.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Total number of spatial bins stored.
    pub fn bins_written(&self) -> u64 {
        self.bins_written
    }

    pub fn is_empty(&self) -> bool {
        self.bins_written == 0
    }

    /// Iterate the bin groups in ascending index order.
    ///
    /// Each file is read whole into a transient sorted map and deleted
    /// afterwards, so the data can be iterated only once.
    pub fn into_groups(self) -> SpatialBinGroups {
        SpatialBinGroups {
            scratch: Some(self.scratch),
            files: self.files.into_iter(),
            current: BTreeMap::new().into_iter(),
        }
    }

    /// Delete all spill files without reading them.
    pub fn close(self) -> Result<()> {
        self.scratch.close()
    }
}

/// Ascending iterator over `(index, spatial bins)` groups of the spill files.
#[derive(Debug)]
pub struct SpatialBinGroups {
    scratch: Option<ScratchDir>,
    files: std::vec::IntoIter<PathBuf>,
    current: btree_map::IntoIter<BinIndex, Vec<SpatialBin>>,
}

impl SpatialBinGroups {
    fn load(path: &Path) -> Result<BTreeMap<BinIndex, Vec<SpatialBin>>> {
        let mut groups: BTreeMap<BinIndex, Vec<SpatialBin>> = BTreeMap::new();
        for bin in bin_io::read_bins::<SpatialBin>(path)? {
            groups.entry(bin.index).or_default().push(bin);
        }
        std::fs::remove_file(path)?;
        Ok(groups)
    }

    /// Remove the scratch directory, reporting I/O errors.
    pub fn close(mut self) -> Result<()> {
        match self.scratch.take() {
            Some(scratch) => scratch.close(),
            None => Ok(()),
        }
    }
}

impl Iterator for SpatialBinGroups {
    type Item = Result<(BinIndex, Vec<SpatialBin>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(group) = self.current.next() {
                return Some(Ok(group));
            }
            let path = self.files.next()?;
            match Self::load(&path) {
                Ok(groups) => self.current = groups.into_iter(),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bin(index: u64, num_obs: u32) -> SpatialBin {
        SpatialBin::new(index, num_obs, vec![index as f32])
    }

    #[test]
    fn test_bins_are_partitioned_by_range() {
        let root = tempfile::tempdir().unwrap();
        let mut collector = FileSpatialBinCollector::new(350_000, Some(root.path())).unwrap();
        assert_eq!(collector.bins_per_file(), 100_000);

        collector
            .consume(vec![bin(5, 1), bin(150_000, 1), bin(320_000, 1)])
            .unwrap();
        let scratch = collector.scratch_path().to_path_buf();
        assert!(scratch.join("bins-00000.dat").exists());
        assert!(scratch.join("bins-00001.dat").exists());
        assert!(!scratch.join("bins-00002.dat").exists());
        assert!(scratch.join("bins-00003.dat").exists());

        let files = collector.complete().unwrap();
        assert_eq!(files.file_count(), 3);
        assert_eq!(files.bins_written(), 3);
    }

    #[test]
    fn test_groups_merge_batches_by_index() {
        let root = tempfile::tempdir().unwrap();
        let mut collector = FileSpatialBinCollector::new(1_000, Some(root.path())).unwrap();
        collector.consume(vec![bin(3, 1), bin(7, 1)]).unwrap();
        collector.consume(vec![bin(1, 1), bin(3, 2)]).unwrap();
        let scratch = collector.scratch_path().to_path_buf();

        let groups: Vec<(u64, Vec<SpatialBin>)> = collector
            .complete()
            .unwrap()
            .into_groups()
            .collect::<Result<_>>()
            .unwrap();

        let indices: Vec<u64> = groups.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![1, 3, 7]);
        assert_eq!(groups[1].1.len(), 2);
        // Files are deleted once read
        assert!(!scratch.join("bins-00000.dat").exists());
    }

    #[test]
    fn test_unsorted_batch_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let mut collector = FileSpatialBinCollector::new(1_000, Some(root.path())).unwrap();
        let err = collector.consume(vec![bin(8, 1), bin(4, 1)]).unwrap_err();
        assert!(matches!(
            err,
            BinningError::UnsortedBins {
                previous: 8,
                index: 4
            }
        ));
    }

    #[test]
    fn test_close_removes_scratch() {
        let root = tempfile::tempdir().unwrap();
        let mut collector = FileSpatialBinCollector::new(1_000, Some(root.path())).unwrap();
        collector.consume(vec![bin(1, 1)]).unwrap();
        let scratch = collector.scratch_path().to_path_buf();
        collector.complete().unwrap().close().unwrap();
        assert!(!scratch.exists());
    }
}
