// File: src/snapshot/compression.rs
//
// Stream-compression primitives used by the compressed snapshot codecs

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Compression algorithms supported for snapshot bodies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    None,
    Gzip,
    Lz4,
}

impl Default for CompressionType {
    fn default() -> Self {
        CompressionType::None
    }
}

impl std::fmt::Display for CompressionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompressionType::None => write!(f, "none"),
            CompressionType::Gzip => write!(f, "gzip"),
            CompressionType::Lz4 => write!(f, "lz4"),
        }
    }
}

impl std::str::FromStr for CompressionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(CompressionType::None),
            "gzip" => Ok(CompressionType::Gzip),
            "lz4" => Ok(CompressionType::Lz4),
            other => Err(format!("unknown compression type '{}'", other)),
        }
    }
}

/// Byte-level compressor for snapshot bodies.
pub trait Compressor: Send + Sync {
    fn compression_type(&self) -> CompressionType;

    fn compress(&self, data: &[u8]) -> EngineResult<Vec<u8>>;

    fn decompress(&self, data: &[u8]) -> EngineResult<Vec<u8>>;
}

/// Gzip compressor backed by flate2.
pub struct GzipCompressor;

impl Compressor for GzipCompressor {
    fn compression_type(&self) -> CompressionType {
        CompressionType::Gzip
    }

    fn compress(&self, data: &[u8]) -> EngineResult<Vec<u8>> {
        use flate2::{write::GzEncoder, Compression};
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).map_err(|e| EngineError::Snapshot {
            message: format!("gzip compression failed: {}", e),
        })?;

        encoder.finish().map_err(|e| EngineError::Snapshot {
            message: format!("gzip compression finalization failed: {}", e),
        })
    }

    fn decompress(&self, data: &[u8]) -> EngineResult<Vec<u8>> {
        use flate2::read::GzDecoder;
        use std::io::Read;

        let mut decoder = GzDecoder::new(data);
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| EngineError::Snapshot {
                message: format!("gzip decompression failed: {}", e),
            })?;

        Ok(decompressed)
    }
}

/// LZ4 compressor backed by lz4_flex.
pub struct Lz4Compressor;

impl Compressor for Lz4Compressor {
    fn compression_type(&self) -> CompressionType {
        CompressionType::Lz4
    }

    fn compress(&self, data: &[u8]) -> EngineResult<Vec<u8>> {
        Ok(lz4_flex::compress_prepend_size(data))
    }

    fn decompress(&self, data: &[u8]) -> EngineResult<Vec<u8>> {
        lz4_flex::decompress_size_prepended(data).map_err(|e| EngineError::Snapshot {
            message: format!("lz4 decompression failed: {}", e),
        })
    }
}
