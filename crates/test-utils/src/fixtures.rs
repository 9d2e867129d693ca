//! Common test fixtures for binning tests.
//!
//! This module provides a tiny planetary grid and in-memory source products
//! that represent the common scenarios of the binning pipeline.

use binning_common::{
    BinIndex, BinningError, GeoCoding, GeoPos, PixelWindow, PlanetaryGrid, Raster, Result,
    SourceProduct,
};
use chrono::{DateTime, Utc};

/// Common region definitions for testing, as WKT.
pub mod region {
    /// The whole globe
    pub const GLOBAL: &str = "POLYGON((-180 -90, 180 -90, 180 90, -180 90, -180 -90))";

    /// North Sea
    pub const NORTH_SEA: &str = "POLYGON((-4 51, 9 51, 9 61, -4 61, -4 51))";

    /// South Pacific, far away from every fixture product
    pub const SOUTH_PACIFIC: &str =
        "POLYGON((-150 -50, -120 -50, -120 -30, -150 -30, -150 -50))";
}

/// Planetary grid with the same number of cells in every row.
///
/// `RegularGrid::new(4, 4)` is the 4×4 grid of the hand-checked writer
/// scenarios: bins 0..4 are row 0 (north), bins 12..16 row 3 (south).
#[derive(Debug, Clone)]
pub struct RegularGrid {
    num_rows: usize,
    num_cols: usize,
}

impl RegularGrid {
    pub fn new(num_rows: usize, num_cols: usize) -> Self {
        Self {
            num_rows: num_rows.max(1),
            num_cols: num_cols.max(1),
        }
    }
}

impl PlanetaryGrid for RegularGrid {
    fn num_rows(&self) -> usize {
        self.num_rows
    }

    fn num_bins(&self) -> u64 {
        (self.num_rows * self.num_cols) as u64
    }

    fn row_index(&self, bin: BinIndex) -> usize {
        ((bin / self.num_cols as u64) as usize).min(self.num_rows - 1)
    }

    fn num_cols(&self, _row: usize) -> usize {
        self.num_cols
    }

    fn center_lat_lon(&self, bin: BinIndex) -> (f64, f64) {
        let row = self.row_index(bin);
        let col = (bin % self.num_cols as u64) as f64;
        let lat = 90.0 - (row as f64 + 0.5) * 180.0 / self.num_rows as f64;
        let lon = -180.0 + (col + 0.5) * 360.0 / self.num_cols as f64;
        (lat, lon)
    }

    fn first_bin_index(&self, row: usize) -> BinIndex {
        (row * self.num_cols) as BinIndex
    }

    fn bin_index(&self, lat: f64, lon: f64) -> BinIndex {
        let row = ((90.0 - lat) * self.num_rows as f64 / 180.0).floor();
        let row = (row.max(0.0) as usize).min(self.num_rows - 1);
        let col = ((lon + 180.0).rem_euclid(360.0) * self.num_cols as f64 / 360.0).floor();
        let col = (col.max(0.0) as usize).min(self.num_cols - 1);
        (row * self.num_cols + col) as BinIndex
    }
}

/// Geo-coding mapping pixel `(x, y)` to `(lat0 - y * dlat, lon0 + x * dlon)`.
#[derive(Debug, Clone, Copy)]
pub struct AffineGeoCoding {
    pub lon0: f64,
    pub lat0: f64,
    pub dlon: f64,
    pub dlat: f64,
    pub usable: bool,
}

impl AffineGeoCoding {
    /// Upper left corner at `(lat0, lon0)` with square pixels of `step` degrees.
    pub fn new(lat0: f64, lon0: f64, step: f64) -> Self {
        Self {
            lon0,
            lat0,
            dlon: step,
            dlat: step,
            usable: true,
        }
    }
}

impl GeoCoding for AffineGeoCoding {
    fn can_get_geo_pos(&self) -> bool {
        self.usable
    }

    fn geo_pos(&self, x: f64, y: f64) -> Option<GeoPos> {
        if !self.usable {
            return None;
        }
        Some(GeoPos::new(self.lat0 - y * self.dlat, self.lon0 + x * self.dlon))
    }
}

/// A band held in memory, optionally with a native tile size.
#[derive(Debug, Clone)]
pub struct MemoryRaster {
    pub name: String,
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
    pub tile_size: Option<(usize, usize)>,
}

impl Raster for MemoryRaster {
    fn name(&self) -> &str {
        &self.name
    }

    fn tile_size(&self) -> Option<(usize, usize)> {
        self.tile_size
    }

    fn read_window(&self, window: &PixelWindow) -> Result<Vec<f32>> {
        if window.x + window.width > self.width || window.y + window.height > self.height {
            return Err(BinningError::product(format!(
                "window {:?} outside raster '{}' of {}x{}",
                window, self.name, self.width, self.height
            )));
        }
        let mut out = Vec::with_capacity(window.len());
        for row in window.y..window.y + window.height {
            let start = row * self.width + window.x;
            out.extend_from_slice(&self.data[start..start + window.width]);
        }
        Ok(out)
    }
}

/// A source product held entirely in memory.
///
/// # Example
///
/// ```
/// use test_utils::MemoryProduct;
///
/// let product = MemoryProduct::new("scene", 8, 4)
///     .with_geo_coding(50.0, 0.0, 1.0)
///     .with_band("chl", vec![1.0; 32]);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryProduct {
    pub name: String,
    pub width: usize,
    pub height: usize,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub geo_coding: Option<AffineGeoCoding>,
    pub rasters: Vec<MemoryRaster>,
}

impl MemoryProduct {
    pub fn new(name: &str, width: usize, height: usize) -> Self {
        Self {
            name: name.to_string(),
            width,
            height,
            start_time: None,
            end_time: None,
            geo_coding: None,
            rasters: Vec::new(),
        }
    }

    pub fn with_geo_coding(mut self, lat0: f64, lon0: f64, step: f64) -> Self {
        self.geo_coding = Some(AffineGeoCoding::new(lat0, lon0, step));
        self
    }

    /// Attach a geo-coding that cannot provide any position.
    pub fn with_unusable_geo_coding(mut self) -> Self {
        let mut geo_coding = AffineGeoCoding::new(0.0, 0.0, 1.0);
        geo_coding.usable = false;
        self.geo_coding = Some(geo_coding);
        self
    }

    pub fn with_times(
        mut self,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> Self {
        self.start_time = start_time;
        self.end_time = end_time;
        self
    }

    pub fn with_band(self, name: &str, data: Vec<f32>) -> Self {
        self.with_tiled_band(name, data, None)
    }

    pub fn with_tiled_band(
        mut self,
        name: &str,
        data: Vec<f32>,
        tile_size: Option<(usize, usize)>,
    ) -> Self {
        assert_eq!(
            data.len(),
            self.width * self.height,
            "band '{}' has the wrong number of samples",
            name
        );
        self.rasters.push(MemoryRaster {
            name: name.to_string(),
            width: self.width,
            height: self.height,
            data,
            tile_size,
        });
        self
    }
}

impl SourceProduct for MemoryProduct {
    fn name(&self) -> &str {
        &self.name
    }

    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    fn geo_coding(&self) -> Option<&dyn GeoCoding> {
        self.geo_coding.as_ref().map(|g| g as &dyn GeoCoding)
    }

    fn raster(&self, name: &str) -> Option<&dyn Raster> {
        self.rasters
            .iter()
            .find(|r| r.name == name)
            .map(|r| r as &dyn Raster)
    }
}
