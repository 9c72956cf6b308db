//! Content-keyed cache store for Relay CI.
//!
//! Entries are addressed by keys derived from project state (toolchain and
//! lock files). Restores try the exact key first and then fall back to
//! restore-key prefixes.

pub mod archiver;
pub mod compression;
pub mod keys;
pub mod provider;
pub mod types;

pub use archiver::{create_archive, extract_archive};
pub use compression::{compress, decompress};
pub use keys::{CacheKey, checksum, derive_key, key_for_files, matches_prefix, sanitize_key};
pub use provider::{CacheStore, FilesystemCacheStore, MemoryCacheStore};
pub use types::{CacheEntry, CacheMetadata, CompressionType, RestoredEntry, SaveAck};
