//! Source product model.
//!
//! A source product is one input scene: a stack of equally sized rasters
//! with a geo-coding and an optional acquisition time span. Decoding the
//! underlying file format is left to implementors of these traits.

use chrono::{DateTime, Utc};

use crate::error::Result;

/// A geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPos {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPos {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// A rectangular pixel region of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelWindow {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelWindow {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Number of pixels in the window.
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Clip this window to an image of the given size.
    pub fn clip(&self, image_width: usize, image_height: usize) -> PixelWindow {
        let x = self.x.min(image_width);
        let y = self.y.min(image_height);
        PixelWindow {
            x,
            y,
            width: (self.x + self.width).min(image_width) - x,
            height: (self.y + self.height).min(image_height) - y,
        }
    }
}

/// Pixel to geographic position transformation of a product.
pub trait GeoCoding: Send + Sync {
    /// Whether this geo-coding is able to provide positions at all.
    fn can_get_geo_pos(&self) -> bool;

    /// Position of the (possibly fractional) pixel coordinate.
    ///
    /// Pixel (0.5, 0.5) is the center of the upper left pixel.
    fn geo_pos(&self, x: f64, y: f64) -> Option<GeoPos>;
}

/// One band (or mask) of a product.
pub trait Raster: Send + Sync {
    fn name(&self) -> &str;

    /// Native tile size (width, height), if the storage is tiled.
    fn tile_size(&self) -> Option<(usize, usize)>;

    /// Read the samples of a window in row-major order.
    fn read_window(&self, window: &PixelWindow) -> Result<Vec<f32>>;
}

/// An input scene.
pub trait SourceProduct: Send + Sync {
    fn name(&self) -> &str;

    fn width(&self) -> usize;

    fn height(&self) -> usize;

    fn start_time(&self) -> Option<DateTime<Utc>>;

    fn end_time(&self) -> Option<DateTime<Utc>>;

    fn geo_coding(&self) -> Option<&dyn GeoCoding>;

    fn raster(&self, name: &str) -> Option<&dyn Raster>;
}

/// Trace the geographic boundary of a product clockwise along its edge pixels.
///
/// Every `step`-th edge pixel center is sampled; corners are always
/// included. Returns `None` if the product has no usable geo-coding or
/// fewer than three valid boundary positions.
pub fn geo_boundary(product: &dyn SourceProduct, step: usize) -> Option<Vec<GeoPos>> {
    let geo_coding = product.geo_coding()?;
    if !geo_coding.can_get_geo_pos() {
        return None;
    }

    let w = product.width();
    let h = product.height();
    if w == 0 || h == 0 {
        return None;
    }
    let step = step.max(1);

    let mut pixels: Vec<(usize, usize)> = Vec::new();
    let mut push_edge = |from: usize, to: usize, at: &dyn Fn(usize) -> (usize, usize)| {
        let mut i = from;
        while i < to {
            pixels.push(at(i));
            i += step;
        }
    };

    // top: left to right, right: top to bottom, bottom: right to left, left: bottom to top
    push_edge(0, w - 1, &|i| (i, 0));
    push_edge(0, h - 1, &|i| (w - 1, i));
    push_edge(0, w - 1, &|i| (w - 1 - i, h - 1));
    push_edge(0, h - 1, &|i| (0, h - 1 - i));
    if pixels.is_empty() {
        pixels.push((0, 0));
    }

    let boundary: Vec<GeoPos> = pixels
        .into_iter()
        .filter_map(|(x, y)| geo_coding.geo_pos(x as f64 + 0.5, y as f64 + 0.5))
        .filter(GeoPos::is_valid)
        .collect();

    if boundary.len() < 3 {
        None
    } else {
        Some(boundary)
    }
}
