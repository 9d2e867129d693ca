//! Level-3 bin file writers.
//!
//! Serializes the ascending temporal bin sequence of a run into a Zarr V3
//! store with two groups:
//!
//! ```text
//! /bin_index/   per grid row (dimension `bin_index`)
//! /bin_list/    per written record (dimension `bin_list`)
//! ```
//!
//! Two layouts are supported, see [`BinFileFormat`]. In both, rows are
//! written from the last (southernmost) grid row to the first, cells
//! ascending within a row.

pub mod columns;
pub mod config;
pub mod error;
pub mod metadata;
pub mod source;
pub mod writer;

pub use columns::{BinStorage, BIN_INDEX_DIM, BIN_LIST_DIM, OUTPUT_BUFFER_LEN};
pub use config::{BinWriterConfig, ZarrCompression};
pub use error::{Result, WriterError};
pub use metadata::BinFileMetadata;
pub use source::SortedBinSource;
pub use writer::{BinFileFormat, BinWriter, WriteSummary, DENSE_RECORD_LIMIT};
