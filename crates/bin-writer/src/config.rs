//! Configuration for the bin writers.

use serde::{Deserialize, Serialize};

/// Storage layout settings of the output bin file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BinWriterConfig {
    /// Chunk length of every one-dimensional array.
    pub chunk_len: usize,

    /// Compression codec for the arrays.
    pub compression: ZarrCompression,

    /// Compression level (1-9).
    pub compression_level: u8,

    /// Enable byte shuffle filter for better compression.
    pub shuffle: bool,
}

impl Default for BinWriterConfig {
    fn default() -> Self {
        Self {
            chunk_len: 65_536,
            compression: ZarrCompression::BloscZstd,
            compression_level: 1,
            shuffle: true,
        }
    }
}

impl BinWriterConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_len == 0 {
            return Err("chunk_len must be > 0".to_string());
        }

        if self.compression_level == 0 || self.compression_level > 9 {
            return Err("compression_level must be 1-9".to_string());
        }

        Ok(())
    }
}

/// Compression codec for the bin arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZarrCompression {
    /// No compression.
    None,
    /// Blosc with LZ4.
    BloscLz4,
    /// Blosc with Zstd (recommended).
    #[default]
    BloscZstd,
}

impl ZarrCompression {
    /// Get the codec name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::BloscLz4 => "blosc_lz4",
            Self::BloscZstd => "blosc_zstd",
        }
    }
}

impl std::fmt::Display for ZarrCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
