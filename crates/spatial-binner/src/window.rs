//! Processing windows and super-sampling offsets.

use binning_common::{PixelWindow, Raster};

/// Largest default window height.
const MAX_TILE_HEIGHT: usize = 512;

/// Default window height for a product of the given height.
pub fn preferred_tile_height(product_height: usize) -> usize {
    product_height.min(MAX_TILE_HEIGHT)
}

/// Split a `width` x `height` product into processing windows.
///
/// If every raster shares one native tile size whose height equals the
/// window height, the native tiles are used. Otherwise the product is cut
/// into full-width strips; the last strip absorbs the remainder.
pub fn processing_windows(
    width: usize,
    height: usize,
    rasters: &[&dyn Raster],
    slice_height: Option<usize>,
) -> Vec<PixelWindow> {
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let window_height = slice_height
        .unwrap_or_else(|| preferred_tile_height(height))
        .clamp(1, height);

    match common_tile_size(rasters) {
        Some((tile_w, tile_h)) if tile_h == window_height && tile_w > 0 => {
            tiles(width, height, tile_w, tile_h)
        }
        _ => strips(width, height, window_height),
    }
}

fn common_tile_size(rasters: &[&dyn Raster]) -> Option<(usize, usize)> {
    let first = rasters.first()?.tile_size()?;
    rasters
        .iter()
        .all(|r| r.tile_size() == Some(first))
        .then_some(first)
}

fn tiles(width: usize, height: usize, tile_w: usize, tile_h: usize) -> Vec<PixelWindow> {
    let mut windows = Vec::new();
    for y in (0..height).step_by(tile_h) {
        for x in (0..width).step_by(tile_w) {
            windows.push(PixelWindow::new(x, y, tile_w, tile_h).clip(width, height));
        }
    }
    windows
}

fn strips(width: usize, height: usize, strip_height: usize) -> Vec<PixelWindow> {
    let count = (height / strip_height).max(1);
    (0..count)
        .map(|i| {
            let y = i * strip_height;
            let h = if i + 1 == count { height - y } else { strip_height };
            PixelWindow::new(0, y, width, h)
        })
        .collect()
}

/// Sub-pixel sampling offsets within a pixel for a super-sampling factor.
pub fn super_sampling_steps(factor: u32) -> Vec<f64> {
    if factor <= 1 {
        return vec![0.5];
    }
    let n = factor as f64;
    (0..factor).map(|i| (i as f64 + 0.5) / n).collect()
}
