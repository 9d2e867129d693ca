//! Source product filters.
//!
//! A [`ProductFilter`] decides whether a source product takes part in a
//! binning run. Filters are chained: a filter first asks its parent and
//! only evaluates its own predicate if the parent accepted. A rejected
//! product is not an error; the filter keeps a human readable
//! [`reason`](ProductFilter::reason) for the run report.

pub mod chain;

pub use chain::{
    create_source_product_filter, FilterKind, ProductFilter, DEFAULT_BOUNDARY_STEP,
};
