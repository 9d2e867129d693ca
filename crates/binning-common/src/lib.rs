//! Common types and capabilities shared across the L3 binning crates.
//!
//! The crates of this workspace never look inside the grid addressing
//! scheme, the aggregation math or the source raster decoding. They talk
//! to those through the traits defined here:
//!
//! - [`PlanetaryGrid`]: row/column/bin-index math of the global grid
//! - [`Aggregator`]: creates and merges per-bin feature vectors
//! - [`SourceProduct`], [`GeoCoding`], [`Raster`]: one input scene
//!
//! Reference implementations ([`SeaGrid`], [`MeanAggregator`]) are
//! provided so that a run can be executed end to end.

pub mod aggregate;
pub mod bin;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod product;
pub mod time;

pub use aggregate::{Aggregator, MeanAggregator};
pub use bin::{BinIndex, SpatialBin, TemporalBin};
pub use error::{BinningError, Result};
pub use geometry::{BoundingBox, Polygon};
pub use grid::{PlanetaryGrid, SeaGrid};
pub use product::{geo_boundary, GeoCoding, GeoPos, PixelWindow, Raster, SourceProduct};
pub use time::{parse_date_utc, DataPeriod, PeriodMembership, TimeRange};
