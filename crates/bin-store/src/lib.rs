//! Bin collection and paging for the L3 binning pipeline.
//!
//! Two storage structures live here:
//!
//! - the **spatial bin collector**, a two-tier cache that keeps spatial bins
//!   in memory and spills them to range-partitioned scratch files once the
//!   working set grows too large ([`GeneralSpatialBinCollector`]);
//! - the **temporal bin list**, a fixed-capacity, append-then-read list of
//!   temporal bins paged to disk with a single in-memory page
//!   ([`TemporalBinList`]).
//!
//! Both own a private [`ScratchDir`] that is deleted on close or drop.

pub mod bin_io;
pub mod scratch;
pub mod spatial;
pub mod temporal;

pub use bin_io::BinRecord;
pub use scratch::{cleanup_registered, install_cleanup_hook, ScratchDir};
pub use spatial::{
    bins_per_file, FileSpatialBinCollector, GeneralSpatialBinCollector,
    MemorySpatialBinCollector, SpatialBinCollection, SpatialBinConsumer, SpatialBinFiles,
    SpatialBinGroups,
};
pub use temporal::{temporal_bins_per_file, ListState, PageStats, TemporalBinList};
