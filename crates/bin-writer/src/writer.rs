//! Row-grouped sparse and dense bin file writers.

use std::path::Path;
use std::sync::Arc;

use binning_common::{BinIndex, PlanetaryGrid, TemporalBin};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zarrs::array::{DataType, FillValue};
use zarrs_filesystem::FilesystemStore;

use crate::columns::{
    create_array, create_group, store_slice, BinListWriter, BinStorage, BIN_INDEX_DIM,
    BIN_LIST_DIM,
};
use crate::config::BinWriterConfig;
use crate::error::{Result, WriterError};
use crate::metadata::BinFileMetadata;
use crate::source::SortedBinSource;

/// Largest record count addressable by the dense format.
pub const DENSE_RECORD_LIMIT: u64 = i32::MAX as u64;

/// Layout of the output bin file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinFileFormat {
    /// Only populated cells, located through per-row index tables.
    #[default]
    Sparse,
    /// Every cell of the grid, empty cells as placeholder records.
    Dense,
}

impl BinFileFormat {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sparse" => Some(Self::Sparse),
            "dense" => Some(Self::Dense),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sparse => "sparse",
            Self::Dense => "dense",
        }
    }
}

impl std::fmt::Display for BinFileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub format: BinFileFormat,
    /// Records in `/bin_list`.
    pub records: u64,
    /// Records carrying a real (populated) bin.
    pub bins: u64,
    pub rows: usize,
}

/// Walks a sorted bin source from its tail, one grid row at a time,
/// starting with the last (southernmost) row.
struct RowWalker<'s> {
    source: &'s mut dyn SortedBinSource,
    remaining: u64,
    next_higher: Option<BinIndex>,
    num_bins: u64,
}

impl<'s> RowWalker<'s> {
    fn new(source: &'s mut dyn SortedBinSource, num_bins: u64) -> Self {
        let remaining = source.len();
        Self {
            source,
            remaining,
            next_higher: None,
            num_bins,
        }
    }

    /// Bins of `row` in ascending order. Rows must be requested in
    /// descending order.
    fn take_row(&mut self, grid: &dyn PlanetaryGrid, row: usize) -> Result<Vec<TemporalBin>> {
        let mut bins = Vec::new();
        while self.remaining > 0 {
            let bin = self.source.bin_at(self.remaining - 1)?;
            if bin.index >= self.num_bins {
                return Err(WriterError::BinOutOfRange {
                    index: bin.index,
                    num_bins: self.num_bins,
                });
            }
            if let Some(higher) = self.next_higher {
                if bin.index >= higher {
                    return Err(WriterError::UnsortedBins {
                        previous: bin.index,
                        index: higher,
                    });
                }
            }
            if grid.row_index(bin.index) != row {
                break;
            }
            self.next_higher = Some(bin.index);
            bins.push(bin.clone());
            self.remaining -= 1;
        }
        bins.reverse();
        Ok(bins)
    }
}

/// Per-row geometry shared by both layouts.
struct RowGeometry {
    max: Vec<i32>,
    vsize: Vec<f64>,
    hsize: Vec<f64>,
}

impl RowGeometry {
    fn new(grid: &dyn PlanetaryGrid) -> Self {
        let num_rows = grid.num_rows();
        let vsize = 180.0 / num_rows as f64;
        let max: Vec<i32> = (0..num_rows).map(|r| grid.num_cols(r) as i32).collect();
        let hsize = max.iter().map(|&cols| 360.0 / cols as f64).collect();
        Self {
            max,
            vsize: vec![vsize; num_rows],
            hsize,
        }
    }

    fn store<S: BinStorage>(&self, storage: &Arc<S>, config: &BinWriterConfig) -> Result<()> {
        let len = self.max.len() as u64;
        let max = index_array(storage, "max", len, DataType::Int32, FillValue::from(0i32), config)?;
        store_slice(&max, 0, &self.max)?;
        let vsize = index_array(storage, "vsize", len, DataType::Float64, FillValue::from(f64::NAN), config)?;
        store_slice(&vsize, 0, &self.vsize)?;
        let hsize = index_array(storage, "hsize", len, DataType::Float64, FillValue::from(f64::NAN), config)?;
        store_slice(&hsize, 0, &self.hsize)
    }
}

fn index_array<S: BinStorage>(
    storage: &Arc<S>,
    name: &str,
    len: u64,
    data_type: DataType,
    fill_value: FillValue,
    config: &BinWriterConfig,
) -> Result<zarrs::array::Array<S>> {
    create_array(
        storage,
        &format!("/{}/{}", BIN_INDEX_DIM, name),
        len,
        data_type,
        fill_value,
        BIN_INDEX_DIM,
        config,
    )
}

/// Remove a previous bin file at `path`. Anything else at that path is
/// left untouched and reported as an error.
fn clear_output_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let replaceable = path.is_dir()
        && (path.join("zarr.json").is_file() || std::fs::read_dir(path)?.next().is_none());
    if !replaceable {
        return Err(WriterError::config(format!(
            "output path {:?} exists and is not a bin file",
            path
        )));
    }
    debug!(path = %path.display(), "Replacing existing bin file");
    std::fs::remove_dir_all(path)?;
    Ok(())
}

/// Serializes the sorted temporal bins of a run.
pub struct BinWriter<'a> {
    grid: &'a dyn PlanetaryGrid,
    feature_names: Vec<String>,
    metadata: BinFileMetadata,
    config: BinWriterConfig,
}

impl<'a> BinWriter<'a> {
    pub fn new(
        grid: &'a dyn PlanetaryGrid,
        feature_names: Vec<String>,
        metadata: BinFileMetadata,
        config: BinWriterConfig,
    ) -> Self {
        Self {
            grid,
            feature_names,
            metadata,
            config,
        }
    }

    /// Write a bin file into a directory, replacing the Zarr store there.
    ///
    /// An existing path is only replaced if it is a Zarr store or an empty
    /// directory.
    pub fn write_to_path(
        &self,
        format: BinFileFormat,
        path: &Path,
        source: &mut dyn SortedBinSource,
    ) -> Result<WriteSummary> {
        self.check_format(format)?;
        clear_output_dir(path)?;
        std::fs::create_dir_all(path)?;
        let store = FilesystemStore::new(path).map_err(|e| WriterError::storage(e.to_string()))?;
        self.write(format, Arc::new(store), source)
    }

    pub fn write<S: BinStorage>(
        &self,
        format: BinFileFormat,
        storage: Arc<S>,
        source: &mut dyn SortedBinSource,
    ) -> Result<WriteSummary> {
        self.config.validate().map_err(WriterError::config)?;
        let summary = match format {
            BinFileFormat::Sparse => self.write_sparse(storage, source)?,
            BinFileFormat::Dense => self.write_dense(storage, source)?,
        };
        info!(
            format = %summary.format,
            records = summary.records,
            bins = summary.bins,
            rows = summary.rows,
            "Wrote bin file"
        );
        Ok(summary)
    }

    fn check_format(&self, format: BinFileFormat) -> Result<()> {
        let num_bins = self.grid.num_bins();
        if format == BinFileFormat::Dense && num_bins > DENSE_RECORD_LIMIT {
            return Err(WriterError::GridTooLarge {
                num_bins,
                limit: DENSE_RECORD_LIMIT,
            });
        }
        Ok(())
    }

    fn create_groups<S: BinStorage>(
        &self,
        storage: &Arc<S>,
        format: BinFileFormat,
        num_records: u64,
    ) -> Result<()> {
        let attrs = self.metadata.to_attributes(
            format.as_str(),
            self.grid.num_rows(),
            num_records,
            &self.feature_names,
        );
        create_group(storage, "/", attrs)?;
        create_group(storage, &format!("/{}", BIN_INDEX_DIM), Default::default())?;
        create_group(storage, &format!("/{}", BIN_LIST_DIM), Default::default())
    }

    /// Sparse layout: one record per populated cell plus per-row
    /// `start_num`, `begin`, `offset`, `extent` tables.
    pub fn write_sparse<S: BinStorage>(
        &self,
        storage: Arc<S>,
        source: &mut dyn SortedBinSource,
    ) -> Result<WriteSummary> {
        let num_records = source.len();
        if num_records == 0 {
            return Err(WriterError::NoBins);
        }
        let num_rows = self.grid.num_rows();

        self.create_groups(&storage, BinFileFormat::Sparse, num_records)?;
        let mut list = BinListWriter::create(&storage, num_records, &self.feature_names, &self.config)?;

        let mut start_num = vec![0i64; num_rows];
        let mut begin = vec![-1i64; num_rows];
        let mut offset = vec![0i64; num_rows];
        let mut extent = vec![0i32; num_rows];

        let mut walker = RowWalker::new(source, self.grid.num_bins());
        for row in (0..num_rows).rev() {
            let bins = walker.take_row(self.grid, row)?;
            start_num[row] = self.grid.first_bin_index(row) as i64;
            offset[row] = list.position() as i64;
            extent[row] = bins.len() as i32;
            if let Some(first) = bins.first() {
                begin[row] = first.index as i64;
            }
            for bin in &bins {
                list.push(bin.index, bin)?;
            }
        }
        let records = list.finish()?;
        debug!(records, "Sparse bin list written");

        let index = |name: &str, data_type: DataType, fill_value: FillValue| {
            index_array(&storage, name, num_rows as u64, data_type, fill_value, &self.config)
        };
        store_slice(&index("start_num", DataType::Int64, FillValue::from(0i64))?, 0, &start_num)?;
        store_slice(&index("begin", DataType::Int64, FillValue::from(-1i64))?, 0, &begin)?;
        store_slice(&index("offset", DataType::Int64, FillValue::from(0i64))?, 0, &offset)?;
        store_slice(&index("extent", DataType::Int32, FillValue::from(0i32))?, 0, &extent)?;
        RowGeometry::new(self.grid).store(&storage, &self.config)?;

        Ok(WriteSummary {
            format: BinFileFormat::Sparse,
            records,
            bins: records,
            rows: num_rows,
        })
    }

    /// Dense layout: one record per grid cell.
    ///
    /// Empty cells are written from a single shared placeholder with zero
    /// observations and NaN features.
    pub fn write_dense<S: BinStorage>(
        &self,
        storage: Arc<S>,
        source: &mut dyn SortedBinSource,
    ) -> Result<WriteSummary> {
        self.check_format(BinFileFormat::Dense)?;
        let num_bins = self.grid.num_bins();
        let num_rows = self.grid.num_rows();

        self.create_groups(&storage, BinFileFormat::Dense, num_bins)?;
        let mut list = BinListWriter::create(&storage, num_bins, &self.feature_names, &self.config)?;
        let placeholder = TemporalBin::empty(0, self.feature_names.len());

        let mut populated = 0u64;
        let mut walker = RowWalker::new(source, num_bins);
        for row in (0..num_rows).rev() {
            let bins = walker.take_row(self.grid, row)?;
            populated += bins.len() as u64;

            let first = self.grid.first_bin_index(row);
            let mut real = bins.iter().peekable();
            for index in first..first + self.grid.num_cols(row) as BinIndex {
                match real.next_if(|bin| bin.index == index) {
                    Some(bin) => list.push(index, bin)?,
                    None => list.push(index, &placeholder)?,
                }
            }
        }
        let records = list.finish()?;
        debug!(records, populated, "Dense bin list written");

        RowGeometry::new(self.grid).store(&storage, &self.config)?;

        Ok(WriteSummary {
            format: BinFileFormat::Dense,
            records,
            bins: populated,
            rows: num_rows,
        })
    }
}
