//! Cache types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Compression algorithm.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    None,
    #[default]
    Zstd,
}

/// Stored entry metadata, without the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// Cache key.
    pub key: String,
    /// Hex sha256 of the payload.
    pub checksum: String,
    /// Payload size in bytes.
    pub size_bytes: u64,
    /// When the entry was last written.
    pub created_at: DateTime<Utc>,
}

/// A cached entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub metadata: CacheMetadata,
    pub payload: Vec<u8>,
}

impl CacheEntry {
    pub fn key(&self) -> &str {
        &self.metadata.key
    }
}

/// Result of a successful restore.
#[derive(Debug, Clone)]
pub struct RestoredEntry {
    pub entry: CacheEntry,
    /// Whether the requested key matched exactly, not through a restore key.
    pub exact_match: bool,
}

/// Acknowledgement of a save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveAck {
    pub key: String,
    pub checksum: String,
    pub size_bytes: u64,
    /// False when an identical payload was already stored under the key.
    pub written: bool,
}
