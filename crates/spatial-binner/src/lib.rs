//! Spatial binning of source products.
//!
//! A [`ProductBinner`] cuts a product into rectangular processing windows,
//! reads the variable rasters (and the optional mask) of every window into
//! an [`ObservationSlice`] and hands it to an [`ObservationBinner`]. The
//! reference [`GridObservationBinner`] maps each valid sub-pixel to a grid
//! cell and emits the resulting spatial bins to a
//! [`SpatialBinConsumer`](bin_store::SpatialBinConsumer).

pub mod binner;
pub mod observation;
pub mod window;

pub use binner::{ProductBinner, ProductBinnerConfig};
pub use observation::{GridObservationBinner, ObservationBinner, ObservationSlice};
pub use window::{preferred_tile_height, processing_windows, super_sampling_steps};
