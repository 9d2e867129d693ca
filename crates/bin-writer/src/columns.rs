//! One-dimensional Zarr arrays of the bin file.

use std::sync::Arc;

use binning_common::{BinIndex, TemporalBin};
use serde_json::{json, Map};
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::codec::BytesToBytesCodecTraits;
use zarrs::array::{Array, ArrayBuilder, DataType, Element, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::GroupBuilder;
use zarrs::storage::{ReadableStorageTraits, WritableStorageTraits};

use crate::config::{BinWriterConfig, ZarrCompression};
use crate::error::{Result, WriterError};

/// Records buffered before the bin list columns are written.
pub const OUTPUT_BUFFER_LEN: usize = 4096;

/// Name of the dimension of the per-row index arrays.
pub const BIN_INDEX_DIM: &str = "bin_index";
/// Name of the dimension of the per-bin arrays.
pub const BIN_LIST_DIM: &str = "bin_list";

/// Storage usable by the writers.
pub trait BinStorage: ReadableStorageTraits + WritableStorageTraits + 'static {}

impl<S: ReadableStorageTraits + WritableStorageTraits + 'static> BinStorage for S {}

/// Create a group with the given attributes.
pub(crate) fn create_group<S: BinStorage>(
    storage: &Arc<S>,
    path: &str,
    attrs: Map<String, serde_json::Value>,
) -> Result<()> {
    let group = GroupBuilder::new()
        .attributes(attrs)
        .build(storage.clone(), path)
        .map_err(|e| WriterError::storage(e.to_string()))?;
    group
        .store_metadata()
        .map_err(|e| WriterError::storage(e.to_string()))
}

fn compression_codec(
    config: &BinWriterConfig,
    typesize: usize,
) -> Result<Option<Arc<dyn BytesToBytesCodecTraits>>> {
    let compressor = match config.compression {
        ZarrCompression::None => return Ok(None),
        ZarrCompression::BloscLz4 => BloscCompressor::LZ4,
        ZarrCompression::BloscZstd => BloscCompressor::Zstd,
    };

    let level = BloscCompressionLevel::try_from(config.compression_level)
        .map_err(|_| WriterError::config("Invalid compression level"))?;

    let (shuffle, typesize) = if config.shuffle {
        (BloscShuffleMode::Shuffle, Some(typesize))
    } else {
        (BloscShuffleMode::NoShuffle, None)
    };

    // BloscCodec::new(cname, clevel, blocksize, shuffle_mode, typesize)
    let codec = BloscCodec::new(compressor, level, None, shuffle, typesize)
        .map_err(|e| WriterError::config(e.to_string()))?;
    Ok(Some(Arc::new(codec)))
}

fn type_size(data_type: &DataType) -> usize {
    match data_type {
        DataType::UInt64 | DataType::Int64 | DataType::Float64 => 8,
        DataType::UInt32 | DataType::Int32 | DataType::Float32 => 4,
        _ => 1,
    }
}

/// Create and store the metadata of a one-dimensional array.
pub(crate) fn create_array<S: BinStorage>(
    storage: &Arc<S>,
    path: &str,
    len: u64,
    data_type: DataType,
    fill_value: FillValue,
    dimension: &str,
    config: &BinWriterConfig,
) -> Result<Array<S>> {
    let typesize = type_size(&data_type);
    let chunk_len = (config.chunk_len as u64).min(len).max(1);
    let chunk_grid: zarrs::array::ChunkGrid = vec![chunk_len]
        .try_into()
        .map_err(|e| WriterError::config(format!("{:?}", e)))?;

    let mut attrs = Map::new();
    attrs.insert("_ARRAY_DIMENSIONS".to_string(), json!([dimension]));

    let mut binding = ArrayBuilder::new(vec![len], data_type, chunk_grid, fill_value);
    let mut builder = binding.attributes(attrs);
    if let Some(codec) = compression_codec(config, typesize)? {
        builder = builder.bytes_to_bytes_codecs(vec![codec]);
    }

    let array = builder
        .build(storage.clone(), path)
        .map_err(|e| WriterError::storage(e.to_string()))?;
    array
        .store_metadata()
        .map_err(|e| WriterError::storage(e.to_string()))?;
    Ok(array)
}

/// Write `data` to a one-dimensional array starting at `origin`.
pub(crate) fn store_slice<S: BinStorage, T: Element>(
    array: &Array<S>,
    origin: u64,
    data: &[T],
) -> Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    let subset = ArraySubset::new_with_start_shape(vec![origin], vec![data.len() as u64])
        .map_err(|e| WriterError::storage(e.to_string()))?;
    array
        .store_array_subset_elements(&subset, data)
        .map_err(|e| WriterError::storage(e.to_string()))
}

/// Buffered writer of the `/bin_list` arrays.
///
/// Records are appended in output order; every [`OUTPUT_BUFFER_LEN`]
/// records the buffer is flushed at the current origin, which then
/// advances.
pub(crate) struct BinListWriter<S: BinStorage> {
    bin_num: Array<S>,
    nobs: Array<S>,
    nscenes: Array<S>,
    features: Vec<Array<S>>,
    buf_bin_num: Vec<u64>,
    buf_nobs: Vec<u32>,
    buf_nscenes: Vec<u32>,
    buf_features: Vec<Vec<f32>>,
    origin: u64,
    len: u64,
}

impl<S: BinStorage> BinListWriter<S> {
    pub fn create(
        storage: &Arc<S>,
        len: u64,
        feature_names: &[String],
        config: &BinWriterConfig,
    ) -> Result<Self> {
        let column = |name: &str, data_type: DataType, fill_value: FillValue| {
            create_array(
                storage,
                &format!("/{}/{}", BIN_LIST_DIM, name),
                len,
                data_type,
                fill_value,
                BIN_LIST_DIM,
                config,
            )
        };

        let bin_num = column("bin_num", DataType::UInt64, FillValue::from(0u64))?;
        let nobs = column("nobs", DataType::UInt32, FillValue::from(0u32))?;
        let nscenes = column("nscenes", DataType::UInt32, FillValue::from(0u32))?;
        let features = feature_names
            .iter()
            .map(|name| column(name, DataType::Float32, FillValue::from(f32::NAN)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            bin_num,
            nobs,
            nscenes,
            buf_features: vec![Vec::with_capacity(OUTPUT_BUFFER_LEN); features.len()],
            features,
            buf_bin_num: Vec::with_capacity(OUTPUT_BUFFER_LEN),
            buf_nobs: Vec::with_capacity(OUTPUT_BUFFER_LEN),
            buf_nscenes: Vec::with_capacity(OUTPUT_BUFFER_LEN),
            origin: 0,
            len,
        })
    }

    /// Records written or buffered so far.
    pub fn position(&self) -> u64 {
        self.origin + self.buf_bin_num.len() as u64
    }

    /// Append a record; `index` overrides the bin's own index.
    pub fn push(&mut self, index: BinIndex, bin: &TemporalBin) -> Result<()> {
        if bin.features.len() != self.features.len() {
            return Err(WriterError::FeatureCountMismatch {
                index,
                expected: self.features.len(),
                actual: bin.features.len(),
            });
        }
        if self.position() >= self.len {
            return Err(WriterError::storage(format!(
                "bin list overflow at record {}",
                self.position()
            )));
        }

        self.buf_bin_num.push(index);
        self.buf_nobs.push(bin.num_obs);
        self.buf_nscenes.push(bin.num_passes);
        for (column, &value) in self.buf_features.iter_mut().zip(bin.features.iter()) {
            column.push(value);
        }

        if self.buf_bin_num.len() == OUTPUT_BUFFER_LEN {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        store_slice(&self.bin_num, self.origin, &self.buf_bin_num)?;
        store_slice(&self.nobs, self.origin, &self.buf_nobs)?;
        store_slice(&self.nscenes, self.origin, &self.buf_nscenes)?;
        for (array, column) in self.features.iter().zip(self.buf_features.iter()) {
            store_slice(array, self.origin, column)?;
        }

        self.origin += self.buf_bin_num.len() as u64;
        self.buf_bin_num.clear();
        self.buf_nobs.clear();
        self.buf_nscenes.clear();
        for column in &mut self.buf_features {
            column.clear();
        }
        Ok(())
    }

    /// Flush the remaining records. Returns the number of records written.
    pub fn finish(mut self) -> Result<u64> {
        self.flush()?;
        Ok(self.origin)
    }
}
