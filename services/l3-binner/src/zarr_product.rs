//! Source products stored as Zarr V3 directories.
//!
//! A product is a root group whose attributes describe the scene:
//!
//! ```json
//! {
//!   "product_name": "A2003001000000.L2_LAC_OC",
//!   "start_time": "2003-01-01T00:00:00Z",
//!   "end_time": "2003-01-01T00:05:00Z",
//!   "bands": ["chl", "l2_flags"],
//!   "geo_transform": {"lat0": 60.0, "lon0": -10.0, "dlat": 0.01, "dlon": 0.01}
//! }
//! ```
//!
//! Every band is a two-dimensional `[height, width]` float32 array at
//! `/<band>`. Instead of `geo_transform`, `"lat_band"` and `"lon_band"` may
//! name two bands holding the pixel center positions.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use binning_common::{
    parse_date_utc, BinningError, GeoCoding, GeoPos, PixelWindow, Raster, SourceProduct,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use walkdir::WalkDir;
use zarrs::array::Array;
use zarrs::array_subset::ArraySubset;
use zarrs::group::Group;
use zarrs_filesystem::FilesystemStore;

/// Affine pixel to lat/lon transform; pixel (0, 0) is the upper left corner.
#[derive(Debug, Clone, Copy, Deserialize)]
struct GeoTransform {
    lat0: f64,
    lon0: f64,
    dlat: f64,
    dlon: f64,
}

enum ZarrGeoCoding {
    Affine(GeoTransform),
    /// Pixel center positions, row-major.
    Pixel {
        width: usize,
        height: usize,
        lat: Vec<f32>,
        lon: Vec<f32>,
    },
}

impl GeoCoding for ZarrGeoCoding {
    fn can_get_geo_pos(&self) -> bool {
        true
    }

    fn geo_pos(&self, x: f64, y: f64) -> Option<GeoPos> {
        match self {
            ZarrGeoCoding::Affine(t) => Some(GeoPos::new(t.lat0 - y * t.dlat, t.lon0 + x * t.dlon)),
            ZarrGeoCoding::Pixel {
                width,
                height,
                lat,
                lon,
            } => {
                if x < 0.0 || y < 0.0 {
                    return None;
                }
                let (col, row) = (x as usize, y as usize);
                if col >= *width || row >= *height {
                    return None;
                }
                let i = row * width + col;
                Some(GeoPos::new(lat[i] as f64, lon[i] as f64))
            }
        }
    }
}

struct ZarrBand {
    name: String,
    array: Array<FilesystemStore>,
    tile_size: Option<(usize, usize)>,
}

impl ZarrBand {
    fn open(store: &Arc<FilesystemStore>, name: &str) -> Result<Self> {
        let array = Array::open(store.clone(), &format!("/{}", name))
            .with_context(|| format!("Failed to open band '{}'", name))?;
        anyhow::ensure!(
            array.shape().len() == 2,
            "Band '{}' must be two-dimensional, has shape {:?}",
            name,
            array.shape()
        );

        let origin = vec![0u64; 2];
        let tile_size = array
            .chunk_grid()
            .chunk_shape(&origin, array.shape())
            .ok()
            .flatten()
            .map(|shape| (shape[1].get() as usize, shape[0].get() as usize));

        Ok(Self {
            name: name.to_string(),
            array,
            tile_size,
        })
    }

    fn size(&self) -> (usize, usize) {
        let shape = self.array.shape();
        (shape[1] as usize, shape[0] as usize)
    }

    fn read_all(&self) -> Result<Vec<f32>> {
        let (width, height) = self.size();
        Ok(self.read_window(&PixelWindow::new(0, 0, width, height))?)
    }
}

impl Raster for ZarrBand {
    fn name(&self) -> &str {
        &self.name
    }

    fn tile_size(&self) -> Option<(usize, usize)> {
        self.tile_size
    }

    fn read_window(&self, window: &PixelWindow) -> binning_common::Result<Vec<f32>> {
        // Zarr uses [row, col] indexing
        let subset = ArraySubset::new_with_start_shape(
            vec![window.y as u64, window.x as u64],
            vec![window.height as u64, window.width as u64],
        )
        .map_err(|e| BinningError::product(e.to_string()))?;
        self.array
            .retrieve_array_subset_elements(&subset)
            .map_err(|e| BinningError::product(format!("band '{}': {}", self.name, e)))
    }
}

/// A source product read from a Zarr directory.
pub struct ZarrProduct {
    name: String,
    path: PathBuf,
    width: usize,
    height: usize,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    geo_coding: Option<ZarrGeoCoding>,
    bands: Vec<ZarrBand>,
}

impl ZarrProduct {
    pub fn open(path: &Path) -> Result<Self> {
        let store = Arc::new(
            FilesystemStore::new(path)
                .with_context(|| format!("Failed to open Zarr store {:?}", path))?,
        );
        let group = Group::open(store.clone(), "/")
            .with_context(|| format!("Failed to open root group of {:?}", path))?;
        let attrs = group.attributes();

        let name = attrs
            .get("product_name")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "unknown".to_string());

        let band_names: Vec<String> = attrs
            .get("bands")
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .context("Attribute 'bands' must be a list of names")?
            .unwrap_or_default();
        anyhow::ensure!(!band_names.is_empty(), "Product {:?} lists no bands", path);

        let bands = band_names
            .iter()
            .map(|band| ZarrBand::open(&store, band))
            .collect::<Result<Vec<_>>>()?;
        let (width, height) = bands[0].size();
        for band in &bands {
            anyhow::ensure!(
                band.size() == (width, height),
                "Band '{}' is {:?}, expected {:?}",
                band.name,
                band.size(),
                (width, height)
            );
        }

        let geo_coding = Self::geo_coding_from(attrs, &bands, width, height)?;

        let product = Self {
            name,
            path: path.to_path_buf(),
            width,
            height,
            start_time: time_attr(attrs, "start_time")?,
            end_time: time_attr(attrs, "end_time")?,
            geo_coding,
            bands,
        };
        debug!(
            product = %product.name,
            width,
            height,
            bands = product.bands.len(),
            "Opened Zarr product"
        );
        Ok(product)
    }

    fn geo_coding_from(
        attrs: &Map<String, Value>,
        bands: &[ZarrBand],
        width: usize,
        height: usize,
    ) -> Result<Option<ZarrGeoCoding>> {
        if let Some(transform) = attrs.get("geo_transform") {
            let transform: GeoTransform = serde_json::from_value(transform.clone())
                .context("Invalid 'geo_transform' attribute")?;
            return Ok(Some(ZarrGeoCoding::Affine(transform)));
        }

        match (named_band(attrs, bands, "lat_band")?, named_band(attrs, bands, "lon_band")?) {
            (Some(lat), Some(lon)) => Ok(Some(ZarrGeoCoding::Pixel {
                width,
                height,
                lat: lat.read_all()?,
                lon: lon.read_all()?,
            })),
            _ => Ok(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The band named by attribute `key`, if the attribute is present.
fn named_band<'b>(
    attrs: &Map<String, Value>,
    bands: &'b [ZarrBand],
    key: &str,
) -> Result<Option<&'b ZarrBand>> {
    match attrs.get(key).and_then(|v| v.as_str()) {
        None => Ok(None),
        Some(name) => bands
            .iter()
            .find(|b| b.name == name)
            .map(Some)
            .with_context(|| format!("'{}' names unknown band '{}'", key, name)),
    }
}

fn time_attr(attrs: &Map<String, Value>, key: &str) -> Result<Option<DateTime<Utc>>> {
    attrs
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| parse_date_utc(s).with_context(|| format!("Invalid '{}' attribute", key)))
        .transpose()
}

impl SourceProduct for ZarrProduct {
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
        self.bands
            .iter()
            .find(|b| b.name == name)
            .map(|b| b as &dyn Raster)
    }
}

fn is_zarr_dir(path: &Path) -> bool {
    path.is_dir() && path.extension().map_or(false, |ext| ext == "zarr")
}

/// Resolve source paths to product directories, sorted and deduplicated.
///
/// A `*.zarr` directory is a product; any other directory is searched
/// recursively for `*.zarr` directories.
pub fn find_products(sources: &[PathBuf]) -> Vec<PathBuf> {
    let mut found = BTreeSet::new();
    for source in sources {
        if is_zarr_dir(source) {
            found.insert(source.clone());
            continue;
        }
        let mut walker = WalkDir::new(source).into_iter();
        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(source = %source.display(), error = %e, "Failed to search source path");
                    continue;
                }
            };
            if entry.file_type().is_dir() && is_zarr_dir(entry.path()) {
                found.insert(entry.path().to_path_buf());
                walker.skip_current_dir();
            }
        }
    }
    if found.is_empty() {
        warn!("The given source paths did not match any products");
    }
    found.into_iter().collect()
}
