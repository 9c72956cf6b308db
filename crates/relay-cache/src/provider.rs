//! Cache store trait and implementations.

use crate::keys::{checksum, matches_prefix, sanitize_key};
use crate::types::{CacheEntry, CacheMetadata, RestoredEntry, SaveAck};
use async_trait::async_trait;
use chrono::Utc;
use relay_core::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Trait for cache storage backends.
///
/// Implementors provide raw keyed storage; restore-key fallback and
/// identical-payload detection are shared through the provided methods.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get the entry stored under exactly `key`.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Metadata for the entry stored under exactly `key`.
    async fn metadata(&self, key: &str) -> Result<Option<CacheMetadata>>;

    /// Store an entry, replacing any existing one with the same key.
    async fn put(&self, entry: CacheEntry) -> Result<()>;

    /// List entries whose key starts with `prefix`, most recent first.
    async fn list(&self, prefix: &str) -> Result<Vec<CacheMetadata>>;

    /// Delete a cache entry. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Restore by exact key, then by each restore-key prefix in order.
    ///
    /// A miss is `Ok(None)`.
    async fn restore(&self, key: &str, restore_keys: &[String]) -> Result<Option<RestoredEntry>> {
        if let Some(entry) = self.get(key).await? {
            info!(key = %key, size_bytes = entry.metadata.size_bytes, "Cache hit");
            return Ok(Some(RestoredEntry {
                entry,
                exact_match: true,
            }));
        }

        for prefix in restore_keys {
            for candidate in self.list(prefix).await? {
                if let Some(entry) = self.get(&candidate.key).await? {
                    info!(key = %key, matched = %candidate.key, "Cache hit on restore key");
                    return Ok(Some(RestoredEntry {
                        entry,
                        exact_match: false,
                    }));
                }
            }
        }

        info!(key = %key, "Cache miss");
        Ok(None)
    }

    /// Save `payload` under `key`. A payload identical to the stored one is
    /// not rewritten.
    async fn save(&self, key: &str, payload: Vec<u8>) -> Result<SaveAck> {
        let sum = checksum(&payload);
        let size_bytes = payload.len() as u64;

        if let Some(existing) = self.metadata(key).await?
            && existing.checksum == sum
        {
            debug!(key = %key, "Cache entry unchanged, skipping save");
            return Ok(SaveAck {
                key: key.to_string(),
                checksum: sum,
                size_bytes,
                written: false,
            });
        }

        let entry = CacheEntry {
            metadata: CacheMetadata {
                key: key.to_string(),
                checksum: sum.clone(),
                size_bytes,
                created_at: Utc::now(),
            },
            payload,
        };
        self.put(entry).await?;
        info!(key = %key, size_bytes, "Cache saved");

        Ok(SaveAck {
            key: key.to_string(),
            checksum: sum,
            size_bytes,
            written: true,
        })
    }
}

fn most_recent_first(entries: &mut [CacheMetadata]) {
    entries.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.key.cmp(&a.key))
    });
}

/// In-memory cache store. Concurrent readers, last writer wins.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn metadata(&self, key: &str) -> Result<Option<CacheMetadata>> {
        Ok(self
            .entries
            .read()
            .await
            .get(key)
            .map(|e| e.metadata.clone()))
    }

    async fn put(&self, entry: CacheEntry) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(entry.metadata.key.clone(), entry);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<CacheMetadata>> {
        let mut entries: Vec<CacheMetadata> = self
            .entries
            .read()
            .await
            .values()
            .filter(|e| matches_prefix(&e.metadata.key, prefix))
            .map(|e| e.metadata.clone())
            .collect();
        most_recent_first(&mut entries);
        Ok(entries)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Filesystem cache store.
///
/// Each entry is a payload file plus a `.json` metadata sidecar, both named
/// after the sanitized key.
pub struct FilesystemCacheStore {
    root_dir: PathBuf,
}

impl FilesystemCacheStore {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Per-user cache directory.
    pub fn default_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "relay", "relay").map(|d| d.cache_dir().to_path_buf())
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn payload_path(&self, key: &str) -> PathBuf {
        self.root_dir.join(format!("{}.bin", sanitize_key(key)))
    }

    fn metadata_path(&self, key: &str) -> PathBuf {
        self.root_dir.join(format!("{}.json", sanitize_key(key)))
    }

    async fn read_metadata(path: &Path) -> Result<Option<CacheMetadata>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Cache(format!("Failed to read cache metadata: {}", e))),
        }
    }
}

impl Default for FilesystemCacheStore {
    fn default() -> Self {
        Self::new(Self::default_dir().unwrap_or_else(|| PathBuf::from(".relay/cache")))
    }
}

#[async_trait]
impl CacheStore for FilesystemCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let Some(metadata) = self.metadata(key).await? else {
            return Ok(None);
        };
        match tokio::fs::read(self.payload_path(key)).await {
            Ok(payload) => Ok(Some(CacheEntry { metadata, payload })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Cache(format!("Failed to read cache: {}", e))),
        }
    }

    async fn metadata(&self, key: &str) -> Result<Option<CacheMetadata>> {
        Self::read_metadata(&self.metadata_path(key)).await
    }

    async fn put(&self, entry: CacheEntry) -> Result<()> {
        tokio::fs::create_dir_all(&self.root_dir)
            .await
            .map_err(|e| Error::Cache(format!("Failed to create cache dir: {}", e)))?;

        let key = entry.metadata.key.clone();
        tokio::fs::write(self.payload_path(&key), &entry.payload)
            .await
            .map_err(|e| Error::Cache(format!("Failed to write cache: {}", e)))?;
        // Sidecar last: an entry is visible only once its payload is complete.
        let sidecar = serde_json::to_vec_pretty(&entry.metadata)?;
        tokio::fs::write(self.metadata_path(&key), sidecar)
            .await
            .map_err(|e| Error::Cache(format!("Failed to write cache metadata: {}", e)))?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<CacheMetadata>> {
        if !self.root_dir.exists() {
            return Ok(vec![]);
        }

        let mut entries = vec![];
        let mut read_dir = tokio::fs::read_dir(&self.root_dir)
            .await
            .map_err(|e| Error::Cache(format!("Failed to read cache dir: {}", e)))?;

        while let Some(dir_entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| Error::Cache(format!("Failed to read entry: {}", e)))?
        {
            let path = dir_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(metadata) = Self::read_metadata(&path).await?
                && matches_prefix(&metadata.key, prefix)
            {
                entries.push(metadata);
            }
        }

        most_recent_first(&mut entries);
        Ok(entries)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        for path in [self.metadata_path(key), self.payload_path(key)] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::Cache(format!("Failed to delete cache: {}", e))),
            }
        }
        Ok(())
    }
}
