//! Planetary grid capability.

use crate::bin::BinIndex;

/// Addressing scheme of the global binning grid.
///
/// Row 0 is the northernmost row; bin indices are assigned row by row,
/// west to east. A grid must be immutable for the lifetime of a run.
pub trait PlanetaryGrid: Send + Sync {
    /// Number of grid rows.
    fn num_rows(&self) -> usize;

    /// Total number of cells.
    fn num_bins(&self) -> u64;

    /// Row containing the given bin.
    fn row_index(&self, bin: BinIndex) -> usize;

    /// Number of cells in the given row.
    fn num_cols(&self, row: usize) -> usize;

    /// Center (lat, lon) of the given bin in degrees.
    fn center_lat_lon(&self, bin: BinIndex) -> (f64, f64);

    /// Index of the first (westernmost) bin of the given row.
    fn first_bin_index(&self, row: usize) -> BinIndex;

    /// Bin containing the given geographic position.
    fn bin_index(&self, lat: f64, lon: f64) -> BinIndex;
}

/// Equal-area sinusoidal grid as used by the SeaWiFS/SeaDAS Level-3 products.
///
/// Every row spans `180 / num_rows` degrees of latitude; the number of
/// cells per row shrinks with the cosine of the row's center latitude.
#[derive(Debug, Clone)]
pub struct SeaGrid {
    num_rows: usize,
    center_lats: Vec<f64>,
    base_bins: Vec<BinIndex>,
    num_cols: Vec<usize>,
    num_bins: u64,
}

impl SeaGrid {
    /// Default number of rows (9.28 km cells at the equator).
    pub const DEFAULT_NUM_ROWS: usize = 2160;

    pub fn new(num_rows: usize) -> Self {
        let num_rows = num_rows.max(1);
        let mut center_lats = Vec::with_capacity(num_rows);
        let mut base_bins = Vec::with_capacity(num_rows);
        let mut num_cols = Vec::with_capacity(num_rows);

        let mut base: BinIndex = 0;
        for row in 0..num_rows {
            let lat = 90.0 - (row as f64 + 0.5) * 180.0 / num_rows as f64;
            let cols = ((2.0 * num_rows as f64 * lat.to_radians().cos()) + 0.5) as usize;
            let cols = cols.max(1);
            center_lats.push(lat);
            base_bins.push(base);
            num_cols.push(cols);
            base += cols as BinIndex;
        }

        Self {
            num_rows,
            center_lats,
            base_bins,
            num_cols,
            num_bins: base,
        }
    }

    /// Center latitude of a row.
    pub fn center_lat(&self, row: usize) -> f64 {
        self.center_lats[row]
    }
}

impl PlanetaryGrid for SeaGrid {
    fn num_rows(&self) -> usize {
        self.num_rows
    }

    fn num_bins(&self) -> u64 {
        self.num_bins
    }

    fn row_index(&self, bin: BinIndex) -> usize {
        let pos = self.base_bins.partition_point(|&base| base <= bin);
        pos.saturating_sub(1).min(self.num_rows - 1)
    }

    fn num_cols(&self, row: usize) -> usize {
        self.num_cols[row]
    }

    fn center_lat_lon(&self, bin: BinIndex) -> (f64, f64) {
        let row = self.row_index(bin);
        let col = (bin - self.base_bins[row]) as f64;
        let lon = -180.0 + (col + 0.5) * 360.0 / self.num_cols[row] as f64;
        (self.center_lats[row], lon)
    }

    fn first_bin_index(&self, row: usize) -> BinIndex {
        self.base_bins[row]
    }

    fn bin_index(&self, lat: f64, lon: f64) -> BinIndex {
        let row = ((90.0 - lat) * self.num_rows as f64 / 180.0).floor();
        let row = (row.max(0.0) as usize).min(self.num_rows - 1);

        let lon = normalize_lon(lon);
        let cols = self.num_cols[row];
        let col = ((lon + 180.0) * cols as f64 / 360.0).floor();
        let col = (col.max(0.0) as usize).min(cols - 1);

        self.base_bins[row] + col as BinIndex
    }
}

/// Wrap a longitude into [-180, 180).
pub fn normalize_lon(lon: f64) -> f64 {
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped >= 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}
