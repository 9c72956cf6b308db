//! Compression utilities for cache payloads.

use crate::types::CompressionType;
use relay_core::{Error, Result};
use std::io::{Read, Write};

/// Compress data using the specified algorithm.
pub fn compress(data: &[u8], algorithm: CompressionType) -> Result<Vec<u8>> {
    match algorithm {
        CompressionType::None => Ok(data.to_vec()),
        CompressionType::Zstd => compress_zstd(data),
    }
}

/// Decompress data using the specified algorithm.
pub fn decompress(data: &[u8], algorithm: CompressionType) -> Result<Vec<u8>> {
    match algorithm {
        CompressionType::None => Ok(data.to_vec()),
        CompressionType::Zstd => decompress_zstd(data),
    }
}

fn compress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = zstd::Encoder::new(Vec::new(), 3)
        .map_err(|e| Error::Cache(format!("Zstd compression failed: {}", e)))?;
    encoder
        .write_all(data)
        .map_err(|e| Error::Cache(format!("Zstd write failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| Error::Cache(format!("Zstd finish failed: {}", e)))
}

fn decompress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = zstd::Decoder::new(data)
        .map_err(|e| Error::Cache(format!("Zstd decompression failed: {}", e)))?;
    let mut output = Vec::new();
    decoder
        .read_to_end(&mut output)
        .map_err(|e| Error::Cache(format!("Zstd read failed: {}", e)))?;
    Ok(output)
}
