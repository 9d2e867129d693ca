//! Binary bin record codec.
//!
//! Record layout (big-endian, no header, no checksum):
//!
//! ```text
//! i64  bin index
//! u32  number of observations
//! u32  number of passes
//! u32  feature count n
//! f32  feature[0..n]
//! ```
//!
//! A file is a plain concatenation of records. A truncated trailing record
//! is treated as end of data.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use binning_common::{BinIndex, Result, SpatialBin, TemporalBin};
use bytes::{Buf, BufMut, BytesMut};

/// Size of the fixed record header in bytes.
pub const RECORD_HEADER_LEN: usize = 8 + 4 + 4 + 4;

/// A bin that can be stored with the binary codec.
pub trait BinRecord: Sized {
    fn index(&self) -> BinIndex;
    fn num_obs(&self) -> u32;
    fn num_passes(&self) -> u32;
    fn features(&self) -> &[f32];
    fn from_parts(index: BinIndex, num_obs: u32, num_passes: u32, features: Vec<f32>) -> Self;
}

impl BinRecord for SpatialBin {
    fn index(&self) -> BinIndex {
        self.index
    }
    fn num_obs(&self) -> u32 {
        self.num_obs
    }
    fn num_passes(&self) -> u32 {
        self.num_passes
    }
    fn features(&self) -> &[f32] {
        &self.features
    }
    fn from_parts(index: BinIndex, num_obs: u32, num_passes: u32, features: Vec<f32>) -> Self {
        SpatialBin {
            index,
            num_obs,
            num_passes,
            features,
        }
    }
}

impl BinRecord for TemporalBin {
    fn index(&self) -> BinIndex {
        self.index
    }
    fn num_obs(&self) -> u32 {
        self.num_obs
    }
    fn num_passes(&self) -> u32 {
        self.num_passes
    }
    fn features(&self) -> &[f32] {
        &self.features
    }
    fn from_parts(index: BinIndex, num_obs: u32, num_passes: u32, features: Vec<f32>) -> Self {
        TemporalBin::new(index, num_obs, num_passes, features)
    }
}

/// Encoded size of a record with the given number of features.
pub fn encoded_len(feature_count: usize) -> usize {
    RECORD_HEADER_LEN + 4 * feature_count
}

/// Append one encoded record to the buffer.
pub fn encode_bin<B: BinRecord>(buf: &mut BytesMut, bin: &B) {
    let features = bin.features();
    buf.reserve(encoded_len(features.len()));
    buf.put_i64(bin.index() as i64);
    buf.put_u32(bin.num_obs());
    buf.put_u32(bin.num_passes());
    buf.put_u32(features.len() as u32);
    for &value in features {
        buf.put_f32(value);
    }
}

/// Decode all complete records of a buffer.
pub fn decode_bins<B: BinRecord>(mut data: &[u8]) -> Vec<B> {
    let mut bins = Vec::new();
    while data.remaining() >= RECORD_HEADER_LEN {
        let index = data.get_i64() as BinIndex;
        let num_obs = data.get_u32();
        let num_passes = data.get_u32();
        let count = data.get_u32() as usize;
        if data.remaining() / 4 < count {
            break;
        }
        let features = (0..count).map(|_| data.get_f32()).collect();
        bins.push(B::from_parts(index, num_obs, num_passes, features));
    }
    bins
}

fn encode_all<B: BinRecord>(bins: &[B]) -> BytesMut {
    let mut buf = BytesMut::new();
    for bin in bins {
        encode_bin(&mut buf, bin);
    }
    buf
}

/// Append records to a file, creating it if needed.
pub fn append_bins<B: BinRecord>(path: &Path, bins: &[B]) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(&encode_all(bins))?;
    Ok(())
}

/// Replace the content of a file with the given records.
pub fn write_bins<B: BinRecord>(path: &Path, bins: &[B]) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(&encode_all(bins))?;
    Ok(())
}

/// Read every complete record of a file.
pub fn read_bins<B: BinRecord>(path: &Path) -> Result<Vec<B>> {
    let mut data = Vec::new();
    File::open(path)?.read_to_end(&mut data)?;
    Ok(decode_bins(&data))
}
