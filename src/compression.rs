// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Transparent compression for the persistent tier.
//!
//! Uses zstd with magic-bytes detection, so uncompressed payloads written
//! by older processes (or below the size threshold) still read back.
//!
//! # Feature Flag
//!
//! Compression requires the `compression` feature (on by default). Without
//! it, [`maybe_compress`] is a pass-through and compressed payloads fail to
//! decode with [`CompressionError::Unsupported`].
//!
//! The local tier and the bus never compress: entries are relayed as-is and
//! only the Redis copy is shrunk when the entry carries the hint.

/// Zstd magic bytes (little-endian): 0xFD2FB528
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Default compression level (3 is a good balance of speed/ratio)
#[cfg(feature = "compression")]
const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    #[error("compression failed: {0}")]
    CompressFailed(String),

    #[error("decompression failed: {0}")]
    DecompressFailed(String),

    #[error("payload is zstd-compressed but the `compression` feature is disabled")]
    Unsupported,
}

/// Check if data is zstd-compressed by checking magic bytes.
#[inline]
#[must_use]
pub fn is_compressed(data: &[u8]) -> bool {
    data.len() >= 4 && data[..4] == ZSTD_MAGIC
}

/// Compress bytes with the default level.
#[cfg(feature = "compression")]
pub fn compress_bytes(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    zstd::encode_all(data, DEFAULT_COMPRESSION_LEVEL)
        .map_err(|e| CompressionError::CompressFailed(e.to_string()))
}

/// Compress when `data` is at least `threshold` bytes and not already zstd.
///
/// Falls back to the original bytes if compression does not shrink them.
pub fn maybe_compress(data: Vec<u8>, threshold: usize) -> Result<Vec<u8>, CompressionError> {
    #[cfg(feature = "compression")]
    {
        if data.len() < threshold || is_compressed(&data) {
            return Ok(data);
        }
        let compressed = compress_bytes(&data)?;
        if compressed.len() < data.len() {
            Ok(compressed)
        } else {
            Ok(data)
        }
    }
    #[cfg(not(feature = "compression"))]
    {
        let _ = threshold;
        Ok(data)
    }
}

/// Decompress if the payload carries the zstd magic, else return it unchanged.
pub fn decompress_bytes(data: Vec<u8>) -> Result<Vec<u8>, CompressionError> {
    if !is_compressed(&data) {
        return Ok(data);
    }
    #[cfg(feature = "compression")]
    {
        zstd::decode_all(data.as_slice()).map_err(|e| CompressionError::DecompressFailed(e.to_string()))
    }
    #[cfg(not(feature = "compression"))]
    {
        Err(CompressionError::Unsupported)
    }
}
