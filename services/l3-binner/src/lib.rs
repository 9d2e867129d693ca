//! Level-3 binning runs.
//!
//! Composes the product filter chain, the spatial product binner, the
//! spatial bin collector, the temporal bin list and the bin writers into
//! one run driven by a [`BinningRunConfig`].

pub mod config;
pub mod pipeline;
pub mod zarr_product;

pub use config::{BinningRunConfig, OutputConfig};
pub use pipeline::{BinningRun, RunSummary};
pub use zarr_product::{find_products, ZarrProduct};
